//! Reporting utilities: truth-vs-estimate comparison and formatted terminal output.
//!
//! We keep formatting code in one place so the fitting code stays clean and
//! output changes are localized.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::{ModelResults, Parameters};

/// One compared quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coverage {
    pub field: String,
    pub truth: f64,
    pub lower: f64,
    pub mean: f64,
    pub upper: f64,
    /// Whether the 95% interval contains the truth.
    pub covered: bool,
}

impl Coverage {
    fn new(field: impl Into<String>, truth: f64, lower: f64, mean: f64, upper: f64) -> Self {
        Self {
            field: field.into(),
            truth,
            lower,
            mean,
            upper,
            covered: lower <= truth && truth <= upper,
        }
    }

    pub fn bias(&self) -> f64 {
        self.mean - self.truth
    }
}

/// Truth-vs-estimate rows for one fit, plus notes for anything not comparable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Comparison {
    pub rows: Vec<Coverage>,
    pub notes: Vec<String>,
}

impl Comparison {
    pub fn covered_count(&self) -> usize {
        self.rows.iter().filter(|r| r.covered).count()
    }
}

/// Compare a fit against the ground truth.
///
/// Scalar fields are always compared. Per-school lists are compared
/// index-by-index only when the fit reports one value per school; fixed-effects
/// fits report treatment contrasts (one fewer), which are noted instead.
pub fn compare(truth: &Parameters, results: &ModelResults) -> Comparison {
    let (lo, mid, hi) = (&results.lower_bounds, &results.mean, &results.upper_bounds);
    let mut cmp = Comparison::default();

    cmp.rows.push(Coverage::new(
        "global_intercept",
        truth.global_intercept,
        lo.global_intercept,
        mid.global_intercept,
        hi.global_intercept,
    ));
    cmp.rows.push(Coverage::new(
        "parameter_of_interest",
        truth.parameter_of_interest,
        lo.parameter_of_interest,
        mid.parameter_of_interest,
        hi.parameter_of_interest,
    ));
    cmp.rows.push(Coverage::new(
        "air_quality",
        truth.air_quality,
        lo.air_quality,
        mid.air_quality,
        hi.air_quality,
    ));

    let lists = [
        (
            "school_intercepts",
            &truth.school_intercepts,
            &lo.school_intercepts,
            &mid.school_intercepts,
            &hi.school_intercepts,
        ),
        (
            "school_air_quality",
            &truth.school_air_quality,
            &lo.school_air_quality,
            &mid.school_air_quality,
            &hi.school_air_quality,
        ),
    ];
    for (name, t, l, m, h) in lists {
        if m.is_empty() {
            continue;
        }
        if m.len() != t.len() || l.len() != m.len() || h.len() != m.len() {
            cmp.notes.push(format!(
                "{name}: {} estimated vs {} true (not compared)",
                m.len(),
                t.len()
            ));
            continue;
        }
        for i in 0..m.len() {
            cmp.rows.push(Coverage::new(format!("{name}[{i}]"), t[i], l[i], m[i], h[i]));
        }
    }

    cmp
}
