// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::condition::ConditionRecord;
use crate::test_case::TestId;

/// Everything observed at one source location.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationEntry {
    pub test_ids: BTreeSet<TestId>,
    pub results: BTreeSet<Option<bool>>,
    pub conditions: Vec<ConditionRecord>,
}

impl LocationEntry {
    fn insert(&mut self, record: &ConditionRecord) {
        self.test_ids.insert(record.test_id.clone());
        self.results.insert(record.result);
        self.conditions.push(record.clone());
    }
}

/// Condition records regrouped by location.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationIndex {
    entries: BTreeMap<String, LocationEntry>,
}

impl LocationIndex {
    pub fn build<'a>(records: impl IntoIterator<Item = &'a ConditionRecord>) -> Self {
        let mut entries: BTreeMap<String, LocationEntry> = BTreeMap::new();

        for record in records {
            entries
                .entry(record.location.clone())
                .or_default()
                .insert(record);
        }

        Self { entries }
    }

    pub fn get(&self, location: &str) -> Option<&LocationEntry> {
        self.entries.get(location)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LocationEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> LocationConditionsJson {
        let locations = self
            .entries
            .iter()
            .map(|(location, entry)| (location.clone(), LocationEntryJson::from(entry)))
            .collect();

        LocationConditionsJson { locations }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocationConditionsJson {
    #[serde(flatten)]
    pub locations: BTreeMap<String, LocationEntryJson>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocationEntryJson {
    pub testcases_cnt: usize,
    pub testcases: Vec<String>,
    pub results: Vec<Option<bool>>,
    pub conditions: Vec<ConditionJson>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConditionJson {
    pub raw: String,
    pub context: Vec<String>,
    pub resolved: String,
    pub result: Option<bool>,
    pub test_id: String,
}

impl From<&LocationEntry> for LocationEntryJson {
    fn from(entry: &LocationEntry) -> Self {
        let testcases: BTreeSet<String> = entry.test_ids.iter().map(|id| id.to_string()).collect();

        Self {
            testcases_cnt: entry.test_ids.len(),
            testcases: testcases.into_iter().collect(),
            results: entry.results.iter().copied().collect(),
            conditions: entry.conditions.iter().map(ConditionJson::from).collect(),
        }
    }
}

impl From<&ConditionRecord> for ConditionJson {
    fn from(record: &ConditionRecord) -> Self {
        Self {
            raw: record.raw.clone(),
            context: record.context.clone(),
            resolved: record.resolved.clone(),
            result: record.result,
            test_id: record.test_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(test: &str, location: &str, raw: &str, context: &[&str]) -> ConditionRecord {
        ConditionRecord::new(
            TestId::new("FooTest", test),
            location.into(),
            raw.into(),
            context.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn sample() -> Vec<ConditionRecord> {
        vec![
            record("void b()", "Foo.java:10", "x < 3", &["x = 1"]),
            record("void a()", "Foo.java:10", "x < 3", &["x = 5"]),
            record("void a()", "Foo.java:10", "x < 3", &[]),
            record("void b()", "Foo.java:10", "x < 3", &["x = 0"]),
            record("void a()", "Foo.java:20", "r != null", &["r != null"]),
        ]
    }

    #[test]
    fn test_groups_by_location() {
        let records = sample();
        let index = LocationIndex::build(&records);

        assert_eq!(index.len(), 2);

        let entry = index.get("Foo.java:10").unwrap();
        assert_eq!(entry.test_ids.len(), 2);
        assert_eq!(entry.conditions.len(), 4);
        assert_eq!(
            entry.results.iter().copied().collect::<Vec<_>>(),
            [None, Some(false), Some(true)]
        );

        let entry = index.get("Foo.java:20").unwrap();
        assert_eq!(entry.conditions[0].resolved, "NotNone != null");
        assert_eq!(entry.results.iter().copied().collect::<Vec<_>>(), [Some(true)]);
    }

    #[test]
    fn test_json_entry() {
        let records = sample();
        let json = LocationIndex::build(&records).to_json();
        let entry = &json.locations["Foo.java:10"];

        assert_eq!(entry.testcases_cnt, 2);
        assert_eq!(entry.testcases, ["FooTest: void a()", "FooTest: void b()"]);
        assert_eq!(entry.results, [None, Some(false), Some(true)]);
        assert_eq!(entry.conditions[0].test_id, "FooTest: void b()");
        assert_eq!(entry.conditions[0].resolved, "1 < 3");
        assert_eq!(entry.conditions[0].context, ["x = 1"]);
    }

    #[test]
    fn test_rebuild_is_stable() {
        let records = sample();
        let first = LocationIndex::build(&records).to_json();
        let second = LocationIndex::build(&records).to_json();

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty() {
        let index = LocationIndex::build(std::iter::empty());
        assert!(index.is_empty());
        assert!(index.to_json().locations.is_empty());
    }
}
