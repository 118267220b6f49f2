//! Results JSON read/write.
//!
//! The JSON contains:
//! - run metadata (seed, sizes, noise, timestamp)
//! - the simulated ground truth
//! - each fitted model's estimates, bounds and fit summary

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ModelKind, ModelResults, Noise, Parameters, RunConfig};
use crate::error::AppError;
use crate::fit::ModelFit;

/// Serialized results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub seed: u64,
    pub num_schools: usize,
    pub rows: usize,
    pub noise: Noise,
    pub truth: Parameters,
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: ModelKind,
    pub formula: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub re_formula: Option<String>,
    pub results: ModelResults,
    /// Fit statistics, tagged by estimator.
    #[serde(default)]
    pub summary: Option<serde_json::Value>,
}

impl ModelEntry {
    fn from_fit(fit: &ModelFit) -> Result<Self, AppError> {
        let summary = serde_json::to_value(&fit.summary)
            .map_err(|e| AppError::new(2, format!("Failed to serialize fit summary: {e}")))?;
        Ok(Self {
            model: fit.kind,
            formula: fit.kind.formula().to_string(),
            re_formula: fit.kind.re_formula().map(str::to_string),
            results: fit.results.clone(),
            summary: Some(summary),
        })
    }
}

/// Write truth and fitted results to a JSON file.
pub fn write_results_json(
    path: &Path,
    config: &RunConfig,
    truth: &Parameters,
    fits: &[ModelFit],
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create results JSON '{}': {e}", path.display())))?;

    let models = fits.iter().map(ModelEntry::from_fit).collect::<Result<Vec<_>, _>>()?;
    let results = ResultsFile {
        tool: "schoolfx".to_string(),
        generated_at: Utc::now(),
        seed: config.seed,
        num_schools: config.num_schools,
        rows: config.rows,
        noise: config.noise,
        truth: truth.clone(),
        models,
    };

    serde_json::to_writer_pretty(file, &results)
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))?;

    tracing::info!(path = %path.display(), models = fits.len(), "wrote results JSON");
    Ok(())
}

/// Read a results JSON file.
pub fn read_results_json(path: &Path) -> Result<ResultsFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open results JSON '{}': {e}", path.display())))?;
    let results: ResultsFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid results JSON: {e}")))?;
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelSpec;
    use crate::fit::{CoefficientTable, FitSummary};

    #[test]
    fn results_file_keeps_truth_and_estimates() {
        let config = RunConfig {
            num_schools: 2,
            rows: 50,
            noise: Noise { individual_noise: 1, school_noise: 1 },
            seed: 7,
            model_spec: ModelSpec::ReInterceptOls,
            export_data: None,
            export_results: None,
        };
        let truth = Parameters {
            global_intercept: 3.0,
            parameter_of_interest: 4.0,
            school_intercepts: vec![1.0, 2.0],
            ..Parameters::default()
        };
        let estimate = Parameters {
            parameter_of_interest: 4.5,
            ..Parameters::default()
        };
        let fit = ModelFit {
            kind: ModelKind::ReInterceptOls,
            coefficients: CoefficientTable::new(),
            results: ModelResults {
                lower_bounds: estimate.clone(),
                mean: estimate.clone(),
                upper_bounds: estimate,
            },
            summary: FitSummary::Mixed {
                n_obs: 50,
                n_groups: 2,
                scale: 1.0,
                log_likelihood: -70.0,
                iterations: 12,
                converged: true,
            },
        };

        let path = std::env::temp_dir().join(format!("schoolfx-results-{}.json", std::process::id()));
        write_results_json(&path, &config, &truth, std::slice::from_ref(&fit)).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let back = read_results_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(raw.contains("\"generated_at\""));
        assert!(raw.contains("\"estimator\": \"mixed\""));
        assert_eq!(back.seed, 7);
        assert_eq!(back.truth, truth);
        assert_eq!(back.models.len(), 1);
        assert_eq!(back.models[0].model, ModelKind::ReInterceptOls);
        assert_eq!(back.models[0].re_formula.as_deref(), Some("~1"));
        assert_eq!(back.models[0].results, fit.results);
        let summary = back.models[0].summary.as_ref().unwrap();
        assert_eq!(summary["n_groups"], 2);
    }

    #[test]
    fn rejects_garbage() {
        let path = std::env::temp_dir().join(format!("schoolfx-garbage-{}.json", std::process::id()));
        std::fs::write(&path, "not json").unwrap();
        let err = read_results_json(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert_eq!(err.exit_code(), 2);
    }
}
