// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line entry point: load a pipeline configuration and drive the
//! self-calibration loop for every configured target.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use mkat_selfcal::jobs::{Recipe, SubprocessEngine};
use mkat_selfcal::params::SelfcalConfig;
use mkat_selfcal::selfcal::run_targets;
use mkat_selfcal::SelfcalError;

#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    about = "Self-calibration loop orchestration for radio-interferometry imaging pipelines"
)]
struct Args {
    /// Path to the pipeline configuration file (YAML).
    #[clap(short, long)]
    config: PathBuf,

    /// Path to the executable that runs queued jobs. Each job is handed to
    /// it as `<runner> <tool_id>` with the job serialised as JSON on stdin.
    #[clap(short, long)]
    runner: PathBuf,

    /// Only verify that the configuration was correctly ingested and print
    /// out high-level information.
    #[clap(short = 'n', long)]
    dry_run: bool,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,
}

/// Activate a logger. All log messages are put onto `stdout`.
fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        _ => builder.filter_level(log::LevelFilter::Trace),
    };
    builder.init();
}

fn main() -> Result<(), SelfcalError> {
    let args = Args::parse();
    setup_logging(args.verbosity);
    info!("mkat_selfcal {}", env!("CARGO_PKG_VERSION"));

    let params = SelfcalConfig::from_path(&args.config)?.into_params()?;
    params.log_summary();
    if args.dry_run {
        info!("Dry run requested; not submitting any jobs.");
        return Ok(());
    }

    let mut recipe = Recipe::new(Box::new(SubprocessEngine::new(&args.runner)));
    for (target, outcome) in run_targets(&params, &mut recipe)? {
        info!(
            "{target}: iteration {} is the final result ({:?})",
            outcome.final_iteration, outcome.stop_reason
        );
    }

    info!("mkat_selfcal complete.");
    Ok(())
}
