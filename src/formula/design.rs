//! Design-matrix construction from a parsed formula.
//!
//! The fitters never materialize the full `n × p` matrix. Instead they stream
//! design rows through [`Design::fill_row`] and accumulate whatever cross
//! products they need.
//!
//! Column naming follows the patsy convention so coefficient names are
//! recognizable: `Intercept`, `hours_studying`, `C(school)[T.1]`,
//! `C(school)[T.1]:air_quality`, and `C(school)[2]` for full-rank coding.

use std::collections::BTreeSet;

use crate::domain::{Column, Dataset};
use crate::error::AppError;
use crate::formula::parse::{Factor, Formula, Term};

/// One design column: a product of numeric columns, optionally restricted to
/// the rows where a categorical column equals `level`.
#[derive(Debug, Clone)]
struct DesignColumn<'a> {
    numeric: Vec<Column<'a>>,
    indicator: Option<(&'a [u32], u32)>,
}

impl DesignColumn<'_> {
    fn value(&self, i: usize) -> f64 {
        if let Some((codes, level)) = self.indicator {
            if codes[i] != level {
                return 0.0;
            }
        }
        self.numeric.iter().map(|c| c.value(i)).product()
    }
}

/// A formula bound to a dataset.
#[derive(Debug, Clone)]
pub struct Design<'a> {
    names: Vec<String>,
    columns: Vec<DesignColumn<'a>>,
    response: Option<Column<'a>>,
    n_rows: usize,
}

impl<'a> Design<'a> {
    /// Resolve every term of `formula` against `data`.
    pub fn build(formula: &Formula, data: &'a Dataset) -> Result<Self, AppError> {
        let response = match &formula.response {
            Some(name) => Some(lookup(data, name)?),
            None => None,
        };

        let mut names = Vec::new();
        let mut columns = Vec::new();

        if formula.intercept {
            names.push("Intercept".to_string());
            columns.push(DesignColumn {
                numeric: Vec::new(),
                indicator: None,
            });
        }

        for term in &formula.terms {
            expand_term(formula, term, data, &mut names, &mut columns)?;
        }

        if columns.is_empty() {
            return Err(AppError::input("Formula has no predictors."));
        }

        Ok(Self {
            names,
            columns,
            response,
            n_rows: data.len(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Fill the design row for observation `i`.
    ///
    /// # Panics
    /// Panics if `out.len() != self.n_cols()` or `i >= self.n_rows()`.
    pub fn fill_row(&self, i: usize, out: &mut [f64]) {
        for (slot, col) in out.iter_mut().zip(self.columns.iter()) {
            *slot = col.value(i);
        }
    }

    /// Response value for observation `i`.
    pub fn response(&self, i: usize) -> Result<f64, AppError> {
        self.response
            .map(|c| c.value(i))
            .ok_or_else(|| AppError::input("Formula has no response variable."))
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }
}

fn lookup<'a>(data: &'a Dataset, name: &str) -> Result<Column<'a>, AppError> {
    data.column(name)
        .ok_or_else(|| AppError::input(format!("Unknown column '{name}' in formula.")))
}

fn expand_term<'a>(
    formula: &Formula,
    term: &Term,
    data: &'a Dataset,
    names: &mut Vec<String>,
    columns: &mut Vec<DesignColumn<'a>>,
) -> Result<(), AppError> {
    let categoricals: Vec<&Factor> = term.factors.iter().filter(|f| f.is_categorical()).collect();
    if categoricals.len() > 1 {
        return Err(AppError::input(format!(
            "Term '{}' has more than one categorical factor.",
            term.label()
        )));
    }

    let mut numeric = Vec::new();
    for f in term.factors.iter().filter(|f| !f.is_categorical()) {
        numeric.push(lookup(data, f.column())?);
    }

    let Some(&cat) = categoricals.first() else {
        names.push(term.label());
        columns.push(DesignColumn { numeric, indicator: None });
        return Ok(());
    };

    let codes = match lookup(data, cat.column())? {
        Column::Integer(codes) => codes,
        Column::Float(_) => {
            return Err(AppError::input(format!(
                "{} requires an integer column.",
                cat.label()
            )));
        }
    };

    // Treatment coding when the marginal term is already spanned, full rank otherwise.
    let reduced = formula.contains(&term.without(cat));
    let levels: BTreeSet<u32> = codes.iter().copied().collect();
    let skip = usize::from(reduced);

    for level in levels.into_iter().skip(skip) {
        let level_label = if reduced {
            format!("{}[T.{level}]", cat.label())
        } else {
            format!("{}[{level}]", cat.label())
        };
        let name = term
            .factors
            .iter()
            .map(|f| if f == cat { level_label.clone() } else { f.label() })
            .collect::<Vec<_>>()
            .join(":");
        names.push(name);
        columns.push(DesignColumn {
            numeric: numeric.clone(),
            indicator: Some((codes, level)),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::formula::parse_formula;

    fn tiny() -> Dataset {
        let mut data = Dataset::default();
        for (i, school) in [0u32, 1, 2, 1].into_iter().enumerate() {
            data.push(Observation {
                test_scores: 10.0 + i as f64,
                hours_studying: i as f64,
                school,
                air_quality: 2.0 * i as f64,
            });
        }
        data
    }

    #[test]
    fn full_fixed_effects_names_follow_treatment_coding() {
        let data = tiny();
        let f = parse_formula("test_scores ~ hours_studying + C(school) * air_quality + C(school)")
            .unwrap();
        let design = Design::build(&f, &data).unwrap();
        assert_eq!(
            design.names(),
            &[
                "Intercept",
                "hours_studying",
                "C(school)[T.1]",
                "C(school)[T.2]",
                "air_quality",
                "C(school)[T.1]:air_quality",
                "C(school)[T.2]:air_quality",
            ]
        );

        let mut row = vec![0.0; design.n_cols()];
        design.fill_row(3, &mut row);
        assert_eq!(row, vec![1.0, 3.0, 1.0, 0.0, 6.0, 6.0, 0.0]);
        assert_eq!(design.response(3).unwrap(), 13.0);
    }

    #[test]
    fn missing_marginal_gives_full_rank_coding() {
        let data = tiny();
        let f = parse_formula("test_scores ~ C(school):air_quality").unwrap();
        let design = Design::build(&f, &data).unwrap();
        assert_eq!(
            design.names(),
            &[
                "Intercept",
                "C(school)[0]:air_quality",
                "C(school)[1]:air_quality",
                "C(school)[2]:air_quality",
            ]
        );

        let f = parse_formula("test_scores ~ 0 + C(school)").unwrap();
        let design = Design::build(&f, &data).unwrap();
        assert_eq!(design.names(), &["C(school)[0]", "C(school)[1]", "C(school)[2]"]);
    }

    #[test]
    fn rejects_unknown_and_non_integer_categoricals() {
        let data = tiny();
        for bad in ["test_scores ~ income", "test_scores ~ C(air_quality)", "income ~ hours_studying"] {
            let f = parse_formula(bad).unwrap();
            assert!(Design::build(&f, &data).is_err(), "{bad}");
        }
    }
}
