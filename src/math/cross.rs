//! Streaming cross products and small symmetric solves.
//!
//! Both estimators reduce the data to cross-product matrices before doing any
//! linear algebra:
//!
//! ```text
//! OLS:    [X y]ᵀ [X y]             (one matrix for the whole dataset)
//! mixed:  [X Z y]ᵀ [X Z y]         (one matrix per group)
//! ```
//!
//! The matrices are tiny (a handful of columns) regardless of the row count,
//! so every solve afterwards is cheap.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// Accumulates `Σ rᵀ r` over rows `r` of a fixed width.
///
/// Only the upper triangle is stored while accumulating; [`Gram::matrix`]
/// returns the full symmetric matrix.
#[derive(Debug, Clone)]
pub struct Gram {
    dim: usize,
    upper: Vec<f64>,
}

impl Gram {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            upper: vec![0.0; dim * dim],
        }
    }

    /// Add one row.
    ///
    /// # Panics
    /// Panics if `row` is not as wide as the accumulator.
    pub fn add(&mut self, row: &[f64]) {
        assert_eq!(row.len(), self.dim, "Gram row width mismatch");
        for j in 0..self.dim {
            let rj = row[j];
            if rj == 0.0 {
                continue;
            }
            let base = j * self.dim;
            for k in j..self.dim {
                self.upper[base + k] += rj * row[k];
            }
        }
    }

    pub fn matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.dim, self.dim, |r, c| {
            let (j, k) = if r <= c { (r, c) } else { (c, r) };
            self.upper[j * self.dim + k]
        })
    }
}

/// Smallest accepted ratio between the extreme diagonal entries of the
/// Cholesky factor; below this the matrix is treated as singular.
const MIN_PIVOT_RATIO: f64 = 1e-8;

fn cholesky(a: &DMatrix<f64>) -> Option<Cholesky<f64, Dyn>> {
    let chol = a.clone().cholesky()?;
    let diag = chol.l_dirty().diagonal();
    let max = diag.iter().copied().fold(0.0_f64, f64::max);
    let min = diag.iter().copied().fold(f64::INFINITY, f64::min);
    (max.is_finite() && max > 0.0 && min > max * MIN_PIVOT_RATIO).then_some(chol)
}

/// Inverse of a symmetric positive-definite matrix via Cholesky.
///
/// Returns `None` if the matrix is not numerically positive definite
/// (e.g. a rank-deficient design).
pub fn spd_inverse(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let chol = cholesky(a)?;
    let inv = chol.inverse();
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}

/// Solve `A x = b` for symmetric positive-definite `A`.
pub fn spd_solve(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let chol = cholesky(a)?;
    let x = chol.solve(b);
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// `ln det(A)` for symmetric positive-definite `A`.
pub fn spd_log_det(a: &DMatrix<f64>) -> Option<f64> {
    let chol = cholesky(a)?;
    let acc: f64 = chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum();
    Some(2.0 * acc)
}
