//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory as ground truth and as fitted output
//! - exported to JSON/CSV
//! - compared field-by-field in reports

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Global and per-school coefficients of the test-score model.
///
/// Used both for the simulated ground truth and for each fitted estimate
/// (point estimate and interval bounds).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub global_intercept: f64,
    /// Coefficient on `hours_studying`.
    pub parameter_of_interest: f64,
    /// Average air-quality slope across schools.
    pub air_quality: f64,
    /// One intercept per school (ground truth), or whatever per-school intercept
    /// terms a fit reports, in the order it reports them.
    pub school_intercepts: Vec<f64>,
    /// Per-school deviation from the mean air-quality slope.
    pub school_air_quality: Vec<f64>,
}

/// Gaussian noise standard deviations at the individual and school level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Noise {
    pub individual_noise: u32,
    pub school_noise: u32,
}

/// A fitted model summarized as a 95% interval plus point estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResults {
    pub lower_bounds: Parameters,
    pub mean: Parameters,
    pub upper_bounds: Parameters,
}

/// A single simulated student.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub test_scores: f64,
    pub hours_studying: f64,
    pub school: u32,
    pub air_quality: f64,
}

/// Borrowed view of a named dataset column.
#[derive(Debug, Clone, Copy)]
pub enum Column<'a> {
    Float(&'a [f64]),
    Integer(&'a [u32]),
}

impl Column<'_> {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Integer(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at row `i` as a float (integer columns are widened).
    pub fn value(&self, i: usize) -> f64 {
        match self {
            Column::Float(v) => v[i],
            Column::Integer(v) => f64::from(v[i]),
        }
    }
}

/// Simulated dataset, stored column-wise.
///
/// Columns are addressable by name (`test_scores`, `hours_studying`, `school`,
/// `air_quality`) so formulas can refer to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub test_scores: Vec<f64>,
    pub hours_studying: Vec<f64>,
    pub school: Vec<u32>,
    pub air_quality: Vec<f64>,
}

impl Dataset {
    pub const COLUMNS: [&'static str; 4] = ["test_scores", "hours_studying", "school", "air_quality"];

    pub fn with_capacity(n: usize) -> Self {
        Self {
            test_scores: Vec::with_capacity(n),
            hours_studying: Vec::with_capacity(n),
            school: Vec::with_capacity(n),
            air_quality: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, obs: Observation) {
        self.test_scores.push(obs.test_scores);
        self.hours_studying.push(obs.hours_studying);
        self.school.push(obs.school);
        self.air_quality.push(obs.air_quality);
    }

    pub fn len(&self) -> usize {
        self.test_scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_scores.is_empty()
    }

    pub fn row(&self, i: usize) -> Observation {
        Observation {
            test_scores: self.test_scores[i],
            hours_studying: self.hours_studying[i],
            school: self.school[i],
            air_quality: self.air_quality[i],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = Observation> + '_ {
        (0..self.len()).map(|i| self.row(i))
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<Column<'_>> {
        match name {
            "test_scores" => Some(Column::Float(&self.test_scores)),
            "hours_studying" => Some(Column::Float(&self.hours_studying)),
            "school" => Some(Column::Integer(&self.school)),
            "air_quality" => Some(Column::Float(&self.air_quality)),
            _ => None,
        }
    }
}

/// The five fitting strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Pooled OLS, ignores schools.
    NormalOls,
    /// OLS with a dummy-coded intercept per school.
    FeInterceptOls,
    /// OLS with per-school intercepts and per-school air-quality slopes.
    FullFeOls,
    /// Random-intercept mixed model grouped by school.
    ReInterceptOls,
    /// Random intercept and random air-quality slope grouped by school.
    ReFullOls,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::NormalOls,
        ModelKind::FeInterceptOls,
        ModelKind::FullFeOls,
        ModelKind::ReInterceptOls,
        ModelKind::ReFullOls,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::NormalOls => "Pooled OLS",
            ModelKind::FeInterceptOls => "FE intercept OLS",
            ModelKind::FullFeOls => "FE intercept + slope OLS",
            ModelKind::ReInterceptOls => "RE intercept",
            ModelKind::ReFullOls => "RE intercept + slope",
        }
    }

    /// Fixed-effects formula.
    pub fn formula(self) -> &'static str {
        match self {
            ModelKind::NormalOls => "test_scores ~ hours_studying",
            ModelKind::FeInterceptOls => "test_scores ~ hours_studying + C(school)",
            ModelKind::FullFeOls => {
                "test_scores ~ hours_studying + C(school) * air_quality + C(school)"
            }
            ModelKind::ReInterceptOls | ModelKind::ReFullOls => "test_scores ~ hours_studying",
        }
    }

    /// Random-effects formula for mixed models (`None` for OLS variants).
    pub fn re_formula(self) -> Option<&'static str> {
        match self {
            ModelKind::ReInterceptOls => Some("~1"),
            ModelKind::ReFullOls => Some("~air_quality"),
            _ => None,
        }
    }

    /// Grouping column for mixed models.
    pub fn groups(self) -> Option<&'static str> {
        self.re_formula().map(|_| "school")
    }
}

/// Which model(s) to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelSpec {
    All,
    NormalOls,
    FeInterceptOls,
    FullFeOls,
    ReInterceptOls,
    ReFullOls,
}

impl ModelSpec {
    pub fn kinds(self) -> Vec<ModelKind> {
        match self {
            ModelSpec::All => ModelKind::ALL.to_vec(),
            ModelSpec::NormalOls => vec![ModelKind::NormalOls],
            ModelSpec::FeInterceptOls => vec![ModelKind::FeInterceptOls],
            ModelSpec::FullFeOls => vec![ModelKind::FullFeOls],
            ModelSpec::ReInterceptOls => vec![ModelKind::ReInterceptOls],
            ModelSpec::ReFullOls => vec![ModelKind::ReFullOls],
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub num_schools: usize,
    pub rows: usize,
    pub noise: Noise,
    pub seed: u64,
    pub model_spec: ModelSpec,

    pub export_data: Option<PathBuf>,
    pub export_results: Option<PathBuf>,
}
