// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

const DEFAULT_COVERAGE_OUTPUT: &str = "location_based_coverage_final.json";
const DEFAULT_CONDITIONS_OUTPUT: &str = "location_based_conditions.json";

#[derive(Parser, Debug)]
#[command(version, about = "Index a test execution log by source location")]
struct Opt {
    #[command(subcommand)]
    view: View,
}

#[derive(Subcommand, Debug)]
enum View {
    /// Line and subcondition hits per location, from structured events.
    Coverage(ViewOpt),

    /// Modeled `Condition:` evaluations per location.
    Conditions(ViewOpt),
}

#[derive(clap::Args, Debug)]
struct ViewOpt {
    input: PathBuf,

    /// Output path, or `-` for stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let opt = Opt::parse();

    match opt.view {
        View::Coverage(opt) => {
            let json = coverage_log::coverage_from_path(&opt.input)?;
            let output = opt.output.unwrap_or_else(|| DEFAULT_COVERAGE_OUTPUT.into());
            emit(&json, &output)?;
        }
        View::Conditions(opt) => {
            let json = coverage_log::conditions_from_path(&opt.input)?;
            let output = opt.output.unwrap_or_else(|| DEFAULT_CONDITIONS_OUTPUT.into());
            emit(&json, &output)?;
        }
    }

    Ok(())
}

fn emit(value: &impl Serialize, output: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;

    if output == Path::new("-") {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{text}")?;
        return Ok(());
    }

    fs::write(output, text)
        .with_context(|| format!("unable to write output: {}", output.display()))?;
    log::info!("wrote {}", output.display());

    Ok(())
}
