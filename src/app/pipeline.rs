//! Shared pipeline logic used by every subcommand.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! seed -> simulate -> fit -> compare
//!
//! The front-end can then focus on presentation and exports.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::data::DataGeneration;
use crate::domain::{Dataset, Parameters, RunConfig};
use crate::error::AppError;
use crate::fit::{ModelFit, fit_all};
use crate::report::{Comparison, compare};

/// A simulated dataset and the parameters it was drawn from.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub data: Dataset,
    pub truth: Parameters,
}

/// All computed outputs of a single `schoolfx fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub simulation: Simulation,
    pub fits: Vec<ModelFit>,
    /// One comparison per entry of `fits`.
    pub comparisons: Vec<Comparison>,
}

/// Simulate a dataset from `config`, seeded for reproducibility.
pub fn run_simulation(config: &RunConfig) -> Result<Simulation, AppError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (data, truth) =
        DataGeneration::new(config.num_schools).simulate_data(config.rows, config.noise, &mut rng)?;
    Ok(Simulation { data, truth })
}

/// Simulate, fit the configured models and compare each fit against the truth.
pub fn run_fit(config: &RunConfig) -> Result<RunOutput, AppError> {
    let simulation = run_simulation(config)?;
    let fits = fit_all(&config.model_spec.kinds(), &simulation.data)?;
    let comparisons = fits
        .iter()
        .map(|fit| compare(&simulation.truth, &fit.results))
        .collect();

    Ok(RunOutput {
        simulation,
        fits,
        comparisons,
    })
}
