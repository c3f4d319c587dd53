// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::BufRead;
use std::mem;

use anyhow::Result;

use crate::bindings::Bindings;
use crate::expr;
use crate::log_lines;
use crate::test_case::{Segment, Segmenter, TestId};

pub const CONDITION_LABEL: &str = "Condition:";

/// Finds the location and raw condition text of a condition line.
///
/// The location is the text inside the first `[`...`]` pair, the condition
/// is everything after the first `Condition:` label, trimmed.
pub fn extract_condition(line: &str) -> Option<(&str, &str)> {
    let open = line.find('[')?;
    let close = open + line[open..].find(']')?;
    let label = line.find(CONDITION_LABEL)?;

    let location = &line[open + 1..close];
    let raw = line[label + CONDITION_LABEL.len()..].trim();

    Some((location, raw))
}

/// A condition evaluation point observed while a test was running.
///
/// `context` holds the variable statements logged since the previous
/// condition of the same test. Event lines and other chatter are not kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionRecord {
    pub test_id: TestId,
    pub location: String,
    pub raw: String,
    pub context: Vec<String>,
    pub resolved: String,
    pub result: Option<bool>,
}

impl ConditionRecord {
    /// Resolves the context into bindings, substitutes them into the raw
    /// condition and evaluates it. Evaluation failures leave `result` unset.
    pub fn new(test_id: TestId, location: String, raw: String, context: Vec<String>) -> Self {
        let bindings = Bindings::resolve(&context);
        let resolved = bindings.substitute(&raw);

        let result = match expr::evaluate(&resolved) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!("unable to evaluate `{resolved}` at {location}: {err}");
                None
            }
        };

        Self {
            test_id,
            location,
            raw,
            context,
            resolved,
            result,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestBlock {
    pub test_id: TestId,
    pub conditions: Vec<ConditionRecord>,

    /// Whether the block ended with an explicit end marker, as opposed to a
    /// new start marker or the end of the log.
    pub closed: bool,
}

impl TestBlock {
    fn new(test_id: TestId) -> Self {
        Self {
            test_id,
            conditions: vec![],
            closed: false,
        }
    }
}

/// Transient state of the condition pass.
#[derive(Debug, Default)]
struct ConditionParser {
    segmenter: Segmenter,
    active: Option<TestBlock>,
    context: Vec<String>,
    blocks: Vec<TestBlock>,
}

impl ConditionParser {
    fn step(&mut self, line: &str) {
        match self.segmenter.step(line) {
            Segment::Start => {
                self.finish_block(false);
                self.active = self.segmenter.current().cloned().map(TestBlock::new);
            }
            Segment::End => self.finish_block(true),
            Segment::MalformedStart => self.finish_block(false),
            Segment::Body => self.body_line(line),
            Segment::Outside => {
                if extract_condition(line).is_some() {
                    debug!("ignoring condition outside of a test: {line}");
                }
            }
        }
    }

    fn body_line(&mut self, line: &str) {
        if !line.contains(CONDITION_LABEL) {
            if Bindings::is_context_line(line) {
                self.context.push(line.to_owned());
            }
            return;
        }

        let Some((location, raw)) = extract_condition(line) else {
            debug!("skipping condition without location: {line}");
            return;
        };

        let Some(block) = &mut self.active else {
            return;
        };

        let context = mem::take(&mut self.context);
        let record = ConditionRecord::new(
            block.test_id.clone(),
            location.to_owned(),
            raw.to_owned(),
            context,
        );
        block.conditions.push(record);
    }

    // Blocks that recorded nothing are dropped.
    fn finish_block(&mut self, closed: bool) {
        self.context.clear();

        if let Some(mut block) = self.active.take() {
            if !block.conditions.is_empty() {
                block.closed = closed;
                self.blocks.push(block);
            }
        }
    }
}

/// Condition records from a log, grouped by the test that produced them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConditionLog {
    pub blocks: Vec<TestBlock>,
}

impl ConditionLog {
    pub fn parse(reader: impl BufRead) -> Result<Self> {
        let mut parser = ConditionParser::default();
        let mut line_count = 0;

        for line in log_lines(reader) {
            let line = line?;
            line_count += 1;
            parser.step(&line);
        }
        parser.finish_block(false);

        let log = Self {
            blocks: parser.blocks,
        };

        info!(
            "read {line_count} lines, {} conditions in {} tests ({} closed)",
            log.records().count(),
            log.blocks.len(),
            log.closed_blocks().count(),
        );

        Ok(log)
    }

    /// Blocks terminated by an end marker.
    pub fn closed_blocks(&self) -> impl Iterator<Item = &TestBlock> {
        self.blocks.iter().filter(|block| block.closed)
    }

    pub fn records(&self) -> impl Iterator<Item = &ConditionRecord> {
        self.blocks.iter().flat_map(|block| block.conditions.iter())
    }
}
