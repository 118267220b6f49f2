//! Command-line parsing for the school-effects simulator.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! simulation and estimation code. Flags are turned into a plain
//! [`RunConfig`](crate::domain::RunConfig) before anything else runs.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{ModelSpec, Noise, RunConfig};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "schoolfx",
    version,
    about = "Simulate hierarchical test scores and compare pooled, fixed- and random-effects fits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Simulate a dataset and print the true parameters.
    Simulate(SimulateArgs),
    /// Simulate a dataset, fit the selected model(s) and compare against the truth.
    Fit(FitArgs),
    /// Re-print a results JSON written by `schoolfx fit --export-results`.
    Show(ShowArgs),
}

/// Options shared by every subcommand.
#[derive(Debug, Args, Clone)]
pub struct SimulationArgs {
    /// Number of schools.
    #[arg(long, env = "SCHOOLFX_SCHOOLS", default_value_t = 4)]
    pub schools: usize,

    /// Number of simulated students (rows).
    #[arg(short = 'n', long, env = "SCHOOLFX_ROWS", default_value_t = 100_000)]
    pub rows: usize,

    /// Standard deviation of the per-student noise.
    #[arg(long, default_value_t = 1)]
    pub individual_noise: u32,

    /// Standard deviation of the school-level noise added to every row's score.
    #[arg(long, default_value_t = 1)]
    pub school_noise: u32,

    /// Random seed.
    #[arg(long, env = "SCHOOLFX_SEED", default_value_t = 42)]
    pub seed: u64,
}

/// Options for `schoolfx simulate`.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub sim: SimulationArgs,

    /// Write the simulated dataset to CSV.
    #[arg(long = "export-data", value_name = "CSV")]
    pub export_data: Option<PathBuf>,
}

/// Options for `schoolfx fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub sim: SimulationArgs,

    /// Which model(s) to fit.
    #[arg(long, value_enum, default_value_t = ModelSpec::All)]
    pub model: ModelSpec,

    /// Write the simulated dataset to CSV.
    #[arg(long = "export-data", value_name = "CSV")]
    pub export_data: Option<PathBuf>,

    /// Write truth and per-model results to JSON.
    #[arg(long = "export-results", value_name = "JSON")]
    pub export_results: Option<PathBuf>,
}

/// Options for `schoolfx show`.
#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Results JSON produced by `schoolfx fit --export-results`.
    #[arg(long, value_name = "JSON")]
    pub results: PathBuf,
}

impl SimulationArgs {
    fn to_config(&self, model_spec: ModelSpec) -> RunConfig {
        RunConfig {
            num_schools: self.schools,
            rows: self.rows,
            noise: Noise {
                individual_noise: self.individual_noise,
                school_noise: self.school_noise,
            },
            seed: self.seed,
            model_spec,
            export_data: None,
            export_results: None,
        }
    }
}

impl SimulateArgs {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            export_data: self.export_data.clone(),
            ..self.sim.to_config(ModelSpec::All)
        }
    }
}

impl FitArgs {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            export_data: self.export_data.clone(),
            export_results: self.export_results.clone(),
            ..self.sim.to_config(self.model)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_flags_map_to_run_config() {
        let cli = Cli::try_parse_from([
            "schoolfx",
            "fit",
            "--schools",
            "6",
            "-n",
            "500",
            "--school-noise",
            "0",
            "--seed",
            "9",
            "--model",
            "re-full-ols",
            "--export-results",
            "out.json",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = args.run_config();
        assert_eq!(config.num_schools, 6);
        assert_eq!(config.rows, 500);
        assert_eq!(config.noise, Noise { individual_noise: 1, school_noise: 0 });
        assert_eq!(config.seed, 9);
        assert_eq!(config.model_spec, ModelSpec::ReFullOls);
        assert_eq!(config.export_results, Some(PathBuf::from("out.json")));
        assert!(config.export_data.is_none());
    }

    #[test]
    fn simulate_accepts_data_export() {
        let cli = Cli::try_parse_from(["schoolfx", "simulate", "--export-data", "d.csv"]).unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        let config = args.run_config();
        assert_eq!(config.export_data, Some(PathBuf::from("d.csv")));
        assert!(config.export_results.is_none());
    }

    #[test]
    fn show_requires_a_results_path() {
        let cli = Cli::try_parse_from(["schoolfx", "show", "--results", "run.json"]).unwrap();
        let Command::Show(args) = cli.command else {
            panic!("expected show");
        };
        assert_eq!(args.results, PathBuf::from("run.json"));
        assert!(Cli::try_parse_from(["schoolfx", "show"]).is_err());
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert!(Cli::try_parse_from(["schoolfx", "fit", "--model", "lasso"]).is_err());
    }
}
