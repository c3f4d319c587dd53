// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[macro_use]
extern crate log;

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Class files above this many bytes can overflow the bytecode
/// instrumenter's internal tables.
pub const DEFAULT_MAX_SIZE: u64 = 1000;

pub const DEFAULT_EXTENSION: &str = "class";

#[derive(Clone, Debug)]
pub struct PruneOptions {
    pub root: PathBuf,
    pub max_size: u64,
    pub extension: String,
    pub dry_run: bool,
}

impl PruneOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_size: DEFAULT_MAX_SIZE,
            extension: DEFAULT_EXTENSION.to_owned(),
            dry_run: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Number of files with a matching extension.
    pub scanned: usize,

    /// Files over the size limit, sorted. Deleted unless this was a dry run.
    pub oversized: Vec<PathBuf>,
}

/// Recursively lists files under `root` with the given extension, sorted.
pub fn find_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let extension = extension.trim_start_matches('.');
    let mut files = vec![];

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("unable to walk: {}", root.display()))?;

        if !entry.file_type().is_file() {
            continue;
        }

        if entry.path().extension() == Some(OsStr::new(extension)) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Deletes every matching file larger than `max_size` bytes.
pub fn prune(options: &PruneOptions) -> Result<PruneReport> {
    let files = find_files(&options.root, &options.extension)?;
    info!(
        "found {} .{} files under {}",
        files.len(),
        options.extension.trim_start_matches('.'),
        options.root.display()
    );

    let mut report = PruneReport {
        scanned: files.len(),
        oversized: vec![],
    };

    for file in files {
        let size = fs::metadata(&file)
            .with_context(|| format!("unable to read metadata: {}", file.display()))?
            .len();

        if size <= options.max_size {
            continue;
        }

        if !options.dry_run {
            fs::remove_file(&file)
                .with_context(|| format!("unable to delete: {}", file.display()))?;
            debug!("deleted {} ({size} bytes)", file.display());
        }

        report.oversized.push(file);
    }

    info!(
        "{} {} files over {} bytes",
        if options.dry_run { "would delete" } else { "deleted" },
        report.oversized.len(),
        options.max_size
    );

    Ok(report)
}
