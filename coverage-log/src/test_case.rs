// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

pub const START_TEST_MARKER: &str = "=== START TEST:";
pub const END_TEST_MARKER: &str = "=== END TEST:";

/// Identity of an instrumented test method, taken from the signature in its
/// start marker, e.g. `<FooTest: void testBar()>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestId {
    pub class: String,
    pub method: String,
}

impl TestId {
    pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }

    /// Reads the signature between the first `<` and the first `>` of a start
    /// marker line.
    ///
    /// The method is everything after the last `:` of the signature, so
    /// `<Foo: void bar()>` yields class `Foo` and method `void bar()`.
    pub fn from_start_marker(line: &str) -> Option<Self> {
        let start = line.find('<')?;
        let end = line.find('>')?;
        if end <= start {
            return None;
        }

        let signature = &line[start + 1..end];
        let id = match signature.rsplit_once(':') {
            Some((class, method)) => Self::new(class.trim(), method.trim()),
            None => Self::new("", signature.trim()),
        };

        Some(id)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class.is_empty() {
            write!(f, "{}", self.method)
        } else {
            write!(f, "{}: {}", self.class, self.method)
        }
    }
}

/// What a single log line means to the test segmenter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    /// A well-formed start marker opened a new test.
    Start,

    /// A start marker whose signature could not be read. Any active test is
    /// dropped and following lines are ignored until the next valid start.
    MalformedStart,

    /// An end marker closed the active test, if there was one.
    End,

    /// An ordinary line inside an active test.
    Body,

    /// An ordinary line with no active test.
    Outside,
}

/// Tracks which test the log is currently inside.
#[derive(Clone, Debug, Default)]
pub struct Segmenter {
    current: Option<TestId>,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&TestId> {
        self.current.as_ref()
    }

    pub fn step(&mut self, line: &str) -> Segment {
        if line.starts_with(START_TEST_MARKER) {
            self.current = TestId::from_start_marker(line);

            if self.current.is_some() {
                Segment::Start
            } else {
                debug!("ignoring malformed start marker: {line}");
                Segment::MalformedStart
            }
        } else if line.starts_with(END_TEST_MARKER) {
            self.current = None;
            Segment::End
        } else if self.current.is_some() {
            Segment::Body
        } else {
            Segment::Outside
        }
    }
}
