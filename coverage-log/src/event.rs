// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::log_lines;
use crate::test_case::{Segment, Segmenter};

const EXERCISED_TAG: &str = r#""event":"EXERCISED""#;
const SUBCONDITION_TAG: &str = r#""event":"SUBCONDITION_CHECKED""#;

// Older instrumentation emits the same events without quoting.
const LEGACY_EXERCISED_TAG: &str = "event: EXERCISED";
const LEGACY_SUBCONDITION_TAG: &str = "event: SUBCONDITION_CHECKED";

/// A structured coverage event emitted by the instrumented product code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoverageEvent {
    Exercised { location: String },
    SubconditionChecked { location: String, index: String },
}

impl CoverageEvent {
    pub fn parse(line: &str) -> Option<Self> {
        if line.contains(EXERCISED_TAG) {
            Some(Self::Exercised {
                location: quoted_location(line),
            })
        } else if line.contains(SUBCONDITION_TAG) {
            let index = extract_between(line, r#""index":"#, "}")
                .replace('"', "")
                .trim()
                .to_string();

            Some(Self::SubconditionChecked {
                location: quoted_location(line),
                index,
            })
        } else if line.contains(LEGACY_EXERCISED_TAG) {
            Some(Self::Exercised {
                location: legacy_location(line),
            })
        } else if line.contains(LEGACY_SUBCONDITION_TAG) {
            Some(Self::SubconditionChecked {
                location: legacy_location(line),
                index: extract_field(line, "index: ").to_string(),
            })
        } else {
            None
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::Exercised { location } => location,
            Self::SubconditionChecked { location, .. } => location,
        }
    }
}

fn quoted_location(line: &str) -> String {
    let file = extract_between(line, r#""file":""#, r#"""#);
    let line_number = extract_between(line, r#""line":""#, r#"""#);
    format!("{file}:{line_number}")
}

fn legacy_location(line: &str) -> String {
    let file = extract_field(line, "file: ");
    let line_number = extract_field(line, "line: ");
    format!("{file}:{line_number}")
}

/// Returns the text between the first `start` token and the next `end` token
/// after it, or an empty string if either is missing.
pub fn extract_between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    let Some(begin) = text.find(start).map(|ix| ix + start.len()) else {
        return "";
    };

    match text[begin..].find(end) {
        Some(len) => &text[begin..begin + len],
        None => "",
    }
}

// Unquoted field values run to the next `,` or `}`.
fn extract_field<'a>(text: &'a str, start: &str) -> &'a str {
    let Some(begin) = text.find(start).map(|ix| ix + start.len()) else {
        return "";
    };

    let rest = &text[begin..];
    let len = rest.find([',', '}']).unwrap_or(rest.len());
    rest[..len].trim()
}

#[derive(Clone, Debug, Default)]
struct LocationHits {
    exercised: BTreeSet<String>,
    subconditions: BTreeMap<String, BTreeSet<String>>,
}

/// Line and subcondition hits per source location, attributed to the tests
/// that produced them.
#[derive(Clone, Debug, Default)]
pub struct CoverageMap {
    locations: BTreeMap<String, LocationHits>,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from a log in a single pass.
    ///
    /// Tests are identified by the method part of their signature.
    pub fn parse(reader: impl BufRead) -> Result<Self> {
        let mut map = Self::new();
        let mut segmenter = Segmenter::new();
        let mut line_count = 0;
        let mut event_count = 0;

        for line in log_lines(reader) {
            let line = line?;
            line_count += 1;

            if segmenter.step(&line) != Segment::Body {
                continue;
            }

            let (Some(test), Some(event)) = (segmenter.current(), CoverageEvent::parse(&line))
            else {
                continue;
            };

            map.record(&test.method, event);
            event_count += 1;
        }

        info!(
            "read {line_count} lines, {event_count} coverage events at {} locations",
            map.locations.len()
        );

        Ok(map)
    }

    pub fn record(&mut self, test: &str, event: CoverageEvent) {
        match event {
            CoverageEvent::Exercised { location } => {
                let hits = self.locations.entry(location).or_default();
                hits.exercised.insert(test.to_owned());
            }
            CoverageEvent::SubconditionChecked { location, index } => {
                let hits = self.locations.entry(location).or_default();
                hits.subconditions
                    .entry(index)
                    .or_default()
                    .insert(test.to_owned());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn to_json(&self) -> CoverageJson {
        let locations = self
            .locations
            .iter()
            .map(|(location, hits)| {
                let entry = LocationCoverageJson {
                    exercised: HitsJson::new(&hits.exercised),
                    subconditions: hits
                        .subconditions
                        .iter()
                        .map(|(index, tests)| (index.clone(), HitsJson::new(tests)))
                        .collect(),
                };
                (location.clone(), entry)
            })
            .collect();

        CoverageJson { locations }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CoverageJson {
    #[serde(flatten)]
    pub locations: BTreeMap<String, LocationCoverageJson>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocationCoverageJson {
    pub exercised: HitsJson,
    pub subconditions: BTreeMap<String, HitsJson>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HitsJson {
    pub cnt: usize,
    pub testcases: Vec<String>,
}

impl HitsJson {
    fn new(tests: &BTreeSet<String>) -> Self {
        Self {
            cnt: tests.len(),
            testcases: tests.iter().cloned().collect(),
        }
    }
}
