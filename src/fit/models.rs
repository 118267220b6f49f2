//! The five fitting strategies.
//!
//! Each [`ModelKind`] owns its formula (see `domain::types`). OLS variants go
//! straight from the coefficient table to [`ModelResults`]. Random-effects
//! variants first add one pseudo-coefficient per school and random effect:
//!
//! - `school_<id>`: the school's random-intercept BLUP
//! - `school_<id>:air_quality`: the school's random-slope BLUP
//!
//! Bounds for these are `blup ± 1.96 · sqrt(variance component)`: one
//! population-level width shared by every school, not a per-school interval.

use serde::Serialize;

use crate::domain::{Dataset, ModelKind, ModelResults};
use crate::error::AppError;
use crate::fit::mixed::{GROUP_EFFECT, MixedLmFit, mixedlm};
use crate::fit::ols::ols;
use crate::fit::results::{CoefficientTable, get_results};

/// Width multiplier for the synthesized per-school random-effect bounds.
pub const RE_INTERVAL_Z: f64 = 1.96;

/// Fit statistics reported alongside the estimates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "estimator", rename_all = "snake_case")]
pub enum FitSummary {
    Ols {
        n_obs: usize,
        df_resid: usize,
        sigma2: f64,
        r_squared: f64,
    },
    Mixed {
        n_obs: usize,
        n_groups: usize,
        scale: f64,
        log_likelihood: f64,
        iterations: u64,
        converged: bool,
    },
}

/// Output of a single model fit.
#[derive(Debug, Clone, Serialize)]
pub struct ModelFit {
    pub kind: ModelKind,
    /// The table `results` was built from (including pseudo-coefficients).
    pub coefficients: CoefficientTable,
    pub results: ModelResults,
    pub summary: FitSummary,
}

/// Fit one model to `data`.
///
/// Estimation failures (singular design, too few schools, non-finite
/// likelihood) are returned as errors; there is no partial result.
pub fn fit_model(kind: ModelKind, data: &Dataset) -> Result<ModelFit, AppError> {
    tracing::info!(model = kind.display_name(), rows = data.len(), "fitting");

    let (coefficients, summary) = match (kind.groups(), kind.re_formula()) {
        (Some(groups), Some(re_formula)) => {
            let fit = mixedlm(kind.formula(), data, groups, re_formula)?;
            let table = with_random_effects(&fit, groups);
            let summary = FitSummary::Mixed {
                n_obs: fit.n_obs,
                n_groups: fit.n_groups,
                scale: fit.scale,
                log_likelihood: fit.log_likelihood,
                iterations: fit.iterations,
                converged: fit.converged,
            };
            (table, summary)
        }
        _ => {
            let fit = ols(kind.formula(), data)?;
            let summary = FitSummary::Ols {
                n_obs: fit.n_obs,
                df_resid: fit.df_resid,
                sigma2: fit.sigma2,
                r_squared: fit.r_squared,
            };
            (fit.coefficients, summary)
        }
    };

    let results = get_results(&coefficients);
    Ok(ModelFit {
        kind,
        coefficients,
        results,
        summary,
    })
}

/// Fit every model in `kinds`, in order. Stops at the first failure.
pub fn fit_all(kinds: &[ModelKind], data: &Dataset) -> Result<Vec<ModelFit>, AppError> {
    kinds.iter().map(|&kind| fit_model(kind, data)).collect()
}

/// Copy the mixed-model table and append per-group BLUP pseudo-coefficients.
fn with_random_effects(fit: &MixedLmFit, groups: &str) -> CoefficientTable {
    let mut table = fit.coefficients.clone();
    let half_widths: Vec<f64> = (0..fit.re_names.len())
        .map(|k| RE_INTERVAL_Z * fit.cov_re_at(k, k).max(0.0).sqrt())
        .collect();

    for (group, blups) in &fit.random_effects {
        for ((re_name, &value), &hw) in fit.re_names.iter().zip(blups.iter()).zip(half_widths.iter()) {
            let name = if re_name == GROUP_EFFECT {
                format!("{groups}_{group}")
            } else {
                format!("{groups}_{group}:{re_name}")
            };
            table.push_interval(name, value, value - hw, value + hw);
        }
    }
    table
}
