//! Mapping flat, named coefficient tables back into [`Parameters`].
//!
//! Every estimator reports an ordered table of `(name, estimate, bounds)` rows.
//! The names decide where each value lands:
//!
//! | name                                   | field                    |
//! |----------------------------------------|--------------------------|
//! | `Intercept`                            | `global_intercept`       |
//! | `hours_studying`                       | `parameter_of_interest`  |
//! | `air_quality`                          | `air_quality`            |
//! | contains `school` and `air_quality`    | `school_air_quality[..]` |
//! | contains `school`                      | `school_intercepts[..]`  |
//! | anything else (variance components)    | ignored                  |
//!
//! Per-school values are appended in table order. Nothing here reorders them
//! by school id; that order is whatever the estimator produced.

use serde::{Deserialize, Serialize};

use crate::domain::{ModelResults, Parameters};

/// One row of a coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: Option<f64>,
    /// Lower 95% bound, when the estimator provides one.
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// Ordered coefficient table, as produced by a fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoefficientTable {
    rows: Vec<Coefficient>,
}

impl CoefficientTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Coefficient) {
        self.rows.push(row);
    }

    /// Add an estimate with a symmetric-or-not interval.
    pub fn push_interval(&mut self, name: impl Into<String>, estimate: f64, lower: f64, upper: f64) {
        self.rows.push(Coefficient {
            name: name.into(),
            estimate,
            std_error: None,
            lower: Some(lower),
            upper: Some(upper),
        });
    }

    /// Add a point value that has no interval (e.g. a variance component).
    pub fn push_point(&mut self, name: impl Into<String>, estimate: f64) {
        self.rows.push(Coefficient {
            name: name.into(),
            estimate,
            std_error: None,
            lower: None,
            upper: None,
        });
    }

    pub fn rows(&self) -> &[Coefficient] {
        &self.rows
    }

    pub fn get(&self, name: &str) -> Option<&Coefficient> {
        self.rows.iter().find(|c| c.name == name)
    }

    pub fn estimates(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.rows.iter().map(|c| (c.name.as_str(), c.estimate))
    }

    pub fn lower_bounds(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.rows.iter().filter_map(|c| c.lower.map(|v| (c.name.as_str(), v)))
    }

    pub fn upper_bounds(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.rows.iter().filter_map(|c| c.upper.map(|v| (c.name.as_str(), v)))
    }
}

/// Where a named coefficient lands in [`Parameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoefficientRole {
    GlobalIntercept,
    ParameterOfInterest,
    AirQuality,
    SchoolAirQuality,
    SchoolIntercept,
    Ignored,
}

/// Classify a coefficient name. First matching rule wins.
pub fn classify(name: &str) -> CoefficientRole {
    match name {
        "Intercept" => CoefficientRole::GlobalIntercept,
        "hours_studying" => CoefficientRole::ParameterOfInterest,
        "air_quality" => CoefficientRole::AirQuality,
        n if n.contains("school") && n.contains("air_quality") => CoefficientRole::SchoolAirQuality,
        n if n.contains("school") => CoefficientRole::SchoolIntercept,
        _ => CoefficientRole::Ignored,
    }
}

/// Fold `(name, value)` pairs into a [`Parameters`]; unset scalars stay `0.0`.
pub fn get_parameters<'a>(values: impl IntoIterator<Item = (&'a str, f64)>) -> Parameters {
    let mut params = Parameters::default();
    for (name, value) in values {
        match classify(name) {
            CoefficientRole::GlobalIntercept => params.global_intercept = value,
            CoefficientRole::ParameterOfInterest => params.parameter_of_interest = value,
            CoefficientRole::AirQuality => params.air_quality = value,
            CoefficientRole::SchoolAirQuality => params.school_air_quality.push(value),
            CoefficientRole::SchoolIntercept => params.school_intercepts.push(value),
            CoefficientRole::Ignored => {}
        }
    }
    params
}

/// Build the point estimate and both interval bounds from one table.
pub fn get_results(table: &CoefficientTable) -> ModelResults {
    ModelResults {
        mean: get_parameters(table.estimates()),
        lower_bounds: get_parameters(table.lower_bounds()),
        upper_bounds: get_parameters(table.upper_bounds()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_exhaustive_and_exclusive() {
        let cases = [
            ("Intercept", CoefficientRole::GlobalIntercept),
            ("hours_studying", CoefficientRole::ParameterOfInterest),
            ("air_quality", CoefficientRole::AirQuality),
            ("C(school)[T.1]:air_quality", CoefficientRole::SchoolAirQuality),
            ("school_3:air_quality", CoefficientRole::SchoolAirQuality),
            ("C(school)[T.2]", CoefficientRole::SchoolIntercept),
            ("school_0", CoefficientRole::SchoolIntercept),
            ("Group Var", CoefficientRole::Ignored),
            ("air_quality Var", CoefficientRole::Ignored),
            ("Group x air_quality Cov", CoefficientRole::Ignored),
            ("", CoefficientRole::Ignored),
        ];
        for (name, role) in cases {
            assert_eq!(classify(name), role, "{name}");
        }
    }

    #[test]
    fn per_school_values_keep_table_order() {
        let params = get_parameters([
            ("Intercept", 1.0),
            ("school_2", 20.0),
            ("school_0", 0.5),
            ("school_2:air_quality", -2.0),
            ("Group Var", 9.0),
            ("hours_studying", 3.0),
        ]);
        assert_eq!(params.global_intercept, 1.0);
        assert_eq!(params.parameter_of_interest, 3.0);
        assert_eq!(params.air_quality, 0.0);
        assert_eq!(params.school_intercepts, vec![20.0, 0.5]);
        assert_eq!(params.school_air_quality, vec![-2.0]);
    }

    #[test]
    fn bounds_skip_rows_without_intervals() {
        let mut table = CoefficientTable::new();
        table.push_interval("Intercept", 5.0, 4.0, 6.0);
        table.push_point("Group Var", 1.5);
        table.push_interval("school_0", 0.2, -1.0, 1.4);

        let results = get_results(&table);
        assert_eq!(results.mean.global_intercept, 5.0);
        assert_eq!(results.lower_bounds.global_intercept, 4.0);
        assert_eq!(results.upper_bounds.school_intercepts, vec![1.4]);
        assert_eq!(table.lower_bounds().count(), 2);
        assert_eq!(table.get("Group Var").unwrap().estimate, 1.5);
    }
}
