// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs;

use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::json;

use coverage_log::{ConditionLog, CoverageMap, LocationIndex};

const MIXED_LOG: &str = r#"
=== START TEST: <com.example.FooTest: void testNull()> ===
{"event":"EXERCISED","file":"Foo.java","line":"10"}
x == null
[Foo.java:10] Condition: x == y
{"event":"SUBCONDITION_CHECKED","file":"Foo.java","line":"10","index":0}
=== END TEST: <com.example.FooTest: void testNull()> ===
=== START TEST: <com.example.FooTest: void testValue()> ===
{"event":"EXERCISED","file":"Foo.java","line":"10"}
$i0 = 4
$i1 = 4
[Foo.java:10] Condition: $i0 == $i1
x != 0
[Foo.java:12] Condition: x != null
=== END TEST: <com.example.FooTest: void testValue()> ===
"#;

#[test]
fn test_condition_view() -> Result<()> {
    let log = ConditionLog::parse(MIXED_LOG.as_bytes())?;
    assert_eq!(log.closed_blocks().count(), 2);

    let index = LocationIndex::build(log.records());
    let actual = serde_json::to_value(index.to_json())?;

    let expected = json!({
        "Foo.java:10": {
            "testcases_cnt": 2,
            "testcases": [
                "com.example.FooTest: void testNull()",
                "com.example.FooTest: void testValue()"
            ],
            "results": [null, true],
            "conditions": [
                {
                    "raw": "x == y",
                    "context": ["x == null"],
                    "resolved": "None == y",
                    "result": null,
                    "test_id": "com.example.FooTest: void testNull()"
                },
                {
                    "raw": "$i0 == $i1",
                    "context": [
                        "$i0 = 4",
                        "$i1 = 4"
                    ],
                    "resolved": "4 == 4",
                    "result": true,
                    "test_id": "com.example.FooTest: void testValue()"
                }
            ]
        },
        "Foo.java:12": {
            "testcases_cnt": 1,
            "testcases": ["com.example.FooTest: void testValue()"],
            "results": [true],
            "conditions": [
                {
                    "raw": "x != null",
                    "context": ["x != 0"],
                    "resolved": "NotNone != null",
                    "result": true,
                    "test_id": "com.example.FooTest: void testValue()"
                }
            ]
        }
    });

    assert_eq!(actual, expected);

    Ok(())
}

#[test]
fn test_coverage_view_reads_same_log() -> Result<()> {
    let json = CoverageMap::parse(MIXED_LOG.as_bytes())?.to_json();
    let actual = serde_json::to_value(json)?;

    let expected = json!({
        "Foo.java:10": {
            "exercised": {
                "cnt": 2,
                "testcases": ["void testNull()", "void testValue()"]
            },
            "subconditions": {
                "0": { "cnt": 1, "testcases": ["void testNull()"] }
            }
        }
    });

    assert_eq!(actual, expected);

    Ok(())
}

#[test]
fn test_views_from_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("coverage.log");
    fs::write(&path, MIXED_LOG)?;

    let coverage = coverage_log::coverage_from_path(&path)?;
    assert_eq!(coverage.locations.len(), 1);

    let conditions = coverage_log::conditions_from_path(&path)?;
    assert_eq!(
        conditions.locations.keys().collect::<Vec<_>>(),
        ["Foo.java:10", "Foo.java:12"]
    );

    Ok(())
}

#[test]
fn test_missing_log_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.log");

    let err = coverage_log::conditions_from_path(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("unable to open log"));
}
