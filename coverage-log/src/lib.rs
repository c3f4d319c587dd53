// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[macro_use]
extern crate log;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

pub mod bindings;
pub mod condition;
pub mod event;
pub mod expr;
pub mod location;
pub mod test_case;

pub use bindings::{Binding, Bindings};
pub use condition::{ConditionLog, ConditionRecord, TestBlock};
pub use event::{CoverageEvent, CoverageJson, CoverageMap};
pub use location::{LocationConditionsJson, LocationEntry, LocationIndex};
pub use test_case::TestId;

/// Opens a log for a streaming, line-by-line pass.
pub fn open_log(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("unable to open log: {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Coverage-event view of the log at `path`.
pub fn coverage_from_path(path: impl AsRef<Path>) -> Result<CoverageJson> {
    let map = CoverageMap::parse(open_log(path)?)?;
    Ok(map.to_json())
}

/// Modeled-condition view of the log at `path`.
pub fn conditions_from_path(path: impl AsRef<Path>) -> Result<LocationConditionsJson> {
    let log = ConditionLog::parse(open_log(path)?)?;
    let index = LocationIndex::build(log.records());
    info!("indexed conditions at {} locations", index.len());
    Ok(index.to_json())
}

// Lines are trimmed and blank lines skipped before either pass sees them.
pub(crate) fn log_lines(reader: impl BufRead) -> impl Iterator<Item = Result<String>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) => {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                None
            } else if trimmed.len() == line.len() {
                Some(Ok(line))
            } else {
                Some(Ok(trimmed.to_owned()))
            }
        }
        Err(err) => Some(Err(anyhow::Error::new(err).context("unable to read log line"))),
    })
}
