//! Ordinary least squares with classical inference.
//!
//! ```text
//! β̂ = (XᵀX)⁻¹ Xᵀy
//! σ̂² = SSE / (n − p)
//! se_j = sqrt(σ̂² [(XᵀX)⁻¹]_jj)
//! CI_j = β̂_j ± t(0.975; n − p) · se_j
//! ```
//!
//! Cross products are accumulated in one streaming pass, so the full design
//! matrix is never materialized.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::domain::Dataset;
use crate::error::AppError;
use crate::fit::results::{Coefficient, CoefficientTable};
use crate::formula::{Design, parse_formula};
use crate::math::{Gram, spd_inverse};

/// Two-sided 95% interval.
const CI_LEVEL: f64 = 0.95;

/// Output of [`ols`].
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: CoefficientTable,
    pub n_obs: usize,
    pub df_resid: usize,
    /// Residual variance estimate.
    pub sigma2: f64,
    pub r_squared: f64,
}

/// Fit `formula` to `data` by least squares.
pub fn ols(formula: &str, data: &Dataset) -> Result<OlsFit, AppError> {
    let parsed = parse_formula(formula)?;
    let design = Design::build(&parsed, data)?;
    if !design.has_response() {
        return Err(AppError::input(format!("OLS formula '{formula}' needs a response.")));
    }

    let n = design.n_rows();
    let p = design.n_cols();
    if n <= p {
        return Err(AppError::insufficient(format!(
            "Underdetermined OLS: n={n} <= p={p} for '{formula}'."
        )));
    }

    let mut gram = Gram::new(p + 1);
    let mut row = vec![0.0; p + 1];
    for i in 0..n {
        design.fill_row(i, &mut row[..p]);
        row[p] = design.response(i)?;
        gram.add(&row);
    }
    let full = gram.matrix();
    let xtx = DMatrix::from_fn(p, p, |r, c| full[(r, c)]);
    let xty = DVector::from_fn(p, |r, _| full[(r, p)]);

    let xtx_inv = spd_inverse(&xtx).ok_or_else(|| {
        AppError::estimation(format!("Singular design matrix for '{formula}'."))
    })?;
    let beta = &xtx_inv * &xty;

    // Second pass: exact residuals, plus a running mean/M2 of y for R².
    let mut sse = 0.0;
    let mut y_mean = 0.0;
    let mut y_m2 = 0.0;
    for i in 0..n {
        design.fill_row(i, &mut row[..p]);
        let y = design.response(i)?;
        let fitted: f64 = row[..p].iter().zip(beta.iter()).map(|(x, b)| x * b).sum();
        sse += (y - fitted).powi(2);

        let delta = y - y_mean;
        y_mean += delta / (i + 1) as f64;
        y_m2 += delta * (y - y_mean);
    }

    let df_resid = n - p;
    let sigma2 = sse / df_resid as f64;
    if !sigma2.is_finite() {
        return Err(AppError::estimation(format!(
            "Non-finite residual variance for '{formula}'."
        )));
    }
    let r_squared = if y_m2 > 0.0 { 1.0 - sse / y_m2 } else { 0.0 };

    let t_crit = t_critical(df_resid)?;
    let mut coefficients = CoefficientTable::new();
    for (j, name) in design.names().iter().enumerate() {
        let se = (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt();
        coefficients.push(Coefficient {
            name: name.clone(),
            estimate: beta[j],
            std_error: Some(se),
            lower: Some(beta[j] - t_crit * se),
            upper: Some(beta[j] + t_crit * se),
        });
    }

    tracing::info!(formula, n_obs = n, n_params = p, r_squared, "fitted OLS");

    Ok(OlsFit {
        coefficients,
        n_obs: n,
        df_resid,
        sigma2,
        r_squared,
    })
}

fn t_critical(df: usize) -> Result<f64, AppError> {
    let dist = StudentsT::new(0.0, 1.0, df as f64)
        .map_err(|e| AppError::estimation(format!("Student-t distribution error: {e}")))?;
    Ok(dist.inverse_cdf(0.5 + CI_LEVEL / 2.0))
}
