// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use class_pruner::{PruneOptions, DEFAULT_EXTENSION, DEFAULT_MAX_SIZE};

#[derive(Parser, Debug)]
#[command(version, about = "Delete compiled classes too large to instrument")]
struct Opt {
    #[arg(default_value = "target/test-classes")]
    root: PathBuf,

    /// Largest file size, in bytes, to keep.
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    max_size: u64,

    #[arg(long, default_value = DEFAULT_EXTENSION)]
    extension: String,

    /// Report oversized files without deleting them.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let opt = Opt::parse();
    let options = PruneOptions {
        root: opt.root,
        max_size: opt.max_size,
        extension: opt.extension,
        dry_run: opt.dry_run,
    };

    let report = class_pruner::prune(&options)?;

    println!(
        "scanned {} files under {}",
        report.scanned,
        options.root.display()
    );

    if report.oversized.is_empty() {
        println!("no oversized files found");
        return Ok(());
    }

    let verb = if options.dry_run {
        "would delete"
    } else {
        "deleted"
    };
    println!(
        "{verb} {} files over {} bytes:",
        report.oversized.len(),
        options.max_size
    );
    for path in &report.oversized {
        println!(" - {}", path.display());
    }

    Ok(())
}
