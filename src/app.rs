//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs logging
//! - parses CLI arguments
//! - simulates data and fits the selected models
//! - prints reports
//! - writes optional exports
//! - re-prints saved results

use std::sync::Once;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, FitArgs, ShowArgs, SimulateArgs};
use crate::error::AppError;

pub mod pipeline;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "SCHOOLFX_LOG";

const DEFAULT_LOG_FILTER: &str = "school_effects=info";

static TRACING_INIT: Once = Once::new();

/// Entry point for the `schoolfx` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate(args) => handle_simulate(args),
        Command::Fit(args) => handle_fit(args),
        Command::Show(args) => handle_show(args),
    }
}

/// Install the stderr fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = args.run_config();
    let sim = pipeline::run_simulation(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&config, sim.data.len(), &sim.truth)
    );

    if let Some(path) = &config.export_data {
        crate::io::write_dataset_csv(path, &sim.data)?;
    }

    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = args.run_config();
    let run = pipeline::run_fit(&config)?;
    let sim = &run.simulation;

    println!(
        "{}",
        crate::report::format_run_summary(&config, sim.data.len(), &sim.truth)
    );
    for (fit, cmp) in run.fits.iter().zip(&run.comparisons) {
        println!("{}", crate::report::format_model_comparison(fit, cmp));
    }

    // Optional exports.
    if let Some(path) = &config.export_data {
        crate::io::write_dataset_csv(path, &sim.data)?;
    }
    if let Some(path) = &config.export_results {
        crate::io::write_results_json(path, &config, &sim.truth, &run.fits)?;
    }

    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let file = crate::io::read_results_json(&args.results)?;
    println!("{}", crate::report::format_results_file(&file));
    Ok(())
}
