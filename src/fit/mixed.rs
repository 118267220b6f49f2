//! Linear mixed models with grouped random effects, fitted by REML.
//!
//! Model, for each group `g`:
//!
//! ```text
//! y_g = X_g β + Z_g b_g + ε_g,    b_g ~ N(0, Ψ),    ε_g ~ N(0, σ² I)
//! Ψ = σ² L Lᵀ                     (L lower triangular, relative covariance factor)
//! ```
//!
//! The data enter only through per-group cross products of `[X Z y]`, so each
//! evaluation of the criterion costs `O(groups · q³ + p³)` regardless of `n`.
//! With `M_g = I + Lᵀ Z_gᵀ Z_g L` (Woodbury):
//!
//! ```text
//! XᵀWX = Σ_g X_gᵀX_g − X_gᵀZ_g A_g Z_gᵀX_g,     A_g = L M_g⁻¹ Lᵀ
//! β̂    = (XᵀWX)⁻¹ XᵀWy
//! σ̂²   = rᵀWr / (n − p)
//! −2ℓ_R = (n − p)(1 + ln 2πσ̂²) + Σ_g ln|M_g| + ln|XᵀWX|
//! b̂_g  = A_g Z_gᵀ (y_g − X_g β̂)
//! ```
//!
//! `L` is found by Nelder–Mead (`argmin`) over its lower-triangular entries
//! (diagonal entries enter through `|·|`, so the search is unconstrained).
//!
//! Non-intercept columns of `X` and `Z` (and `y`) are centered before the cross
//! products are accumulated. With an intercept in the design this is a
//! unit-triangular reparameterization: the criterion is unchanged, and the
//! estimates are mapped back afterwards. It keeps the sums small, so the
//! criterion stays smooth in θ on large datasets.

use std::collections::BTreeMap;

use argmin::core::{
    CostFunction, Error as ArgminError, Executor, State, TerminationReason, TerminationStatus,
};
use argmin::solver::neldermead::NelderMead;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::domain::{Column, Dataset};
use crate::error::AppError;
use crate::fit::results::{Coefficient, CoefficientTable};
use crate::formula::{Design, parse_formula};
use crate::math::{Gram, spd_inverse, spd_log_det, spd_solve};

/// Name of the random intercept, as it appears in variance-component labels.
pub const GROUP_EFFECT: &str = "Group";

const INTERCEPT: &str = "Intercept";

/// Two-sided 95% interval for fixed effects.
const CI_LEVEL: f64 = 0.95;

/// Minimum number of groups needed to estimate a variance component.
const MIN_GROUPS: usize = 2;

/// Settings for the REML search.
#[derive(Debug, Clone)]
pub struct RemlOptions {
    pub max_iters: u64,
    /// The search stops once the standard deviation of the criterion across the
    /// simplex is below `rel_tol · (1 + |criterion at the start|)`.
    pub rel_tol: f64,
    /// Edge length of the initial simplex.
    pub initial_step: f64,
}

impl Default for RemlOptions {
    fn default() -> Self {
        Self {
            max_iters: 2_000,
            rel_tol: 1e-10,
            initial_step: 0.5,
        }
    }
}

/// Output of [`mixedlm`].
#[derive(Debug, Clone, Serialize)]
pub struct MixedLmFit {
    /// Fixed effects (with normal-theory intervals) followed by the variance
    /// components (point values only).
    pub coefficients: CoefficientTable,
    /// Random-effect names: `Group` for the intercept, then the column names.
    pub re_names: Vec<String>,
    /// Estimated random-effects covariance Ψ (absolute scale), row-major.
    pub cov_re: Vec<f64>,
    /// Residual variance σ².
    pub scale: f64,
    /// BLUPs per group, in ascending group order; one value per `re_names` entry.
    pub random_effects: BTreeMap<u32, Vec<f64>>,
    pub log_likelihood: f64,
    pub iterations: u64,
    pub converged: bool,
    pub n_obs: usize,
    pub n_groups: usize,
}

impl MixedLmFit {
    /// Entry `(i, j)` of Ψ.
    pub fn cov_re_at(&self, i: usize, j: usize) -> f64 {
        self.cov_re[i * self.re_names.len() + j]
    }
}

/// Per-group cross products of `[X Z y]`.
#[derive(Debug, Clone)]
struct GroupStats {
    xtx: DMatrix<f64>,
    xtz: DMatrix<f64>,
    ztz: DMatrix<f64>,
    xty: DVector<f64>,
    zty: DVector<f64>,
    yty: f64,
}

impl GroupStats {
    fn from_gram(gram: &Gram, p: usize, q: usize) -> Self {
        let m = gram.matrix();
        let y = p + q;
        Self {
            xtx: DMatrix::from_fn(p, p, |r, c| m[(r, c)]),
            xtz: DMatrix::from_fn(p, q, |r, c| m[(r, p + c)]),
            ztz: DMatrix::from_fn(q, q, |r, c| m[(p + r, p + c)]),
            xty: DVector::from_fn(p, |r, _| m[(r, y)]),
            zty: DVector::from_fn(q, |r, _| m[(p + r, y)]),
            yty: m[(y, y)],
        }
    }
}

/// Everything the criterion computes at one value of θ.
struct Profile {
    criterion: f64,
    beta: DVector<f64>,
    xtwx: DMatrix<f64>,
    sigma2: f64,
    /// `A_g = L M_g⁻¹ Lᵀ` per group, same order as the stats.
    a: Vec<DMatrix<f64>>,
}

struct Problem {
    groups: Vec<(u32, GroupStats)>,
    n: usize,
    p: usize,
    q: usize,
}

impl Problem {
    /// Unpack θ into the lower-triangular factor (column-major packing).
    fn factor(&self, theta: &[f64]) -> DMatrix<f64> {
        let mut l = DMatrix::zeros(self.q, self.q);
        let mut k = 0;
        for c in 0..self.q {
            for r in c..self.q {
                l[(r, c)] = if r == c { theta[k].abs() } else { theta[k] };
                k += 1;
            }
        }
        l
    }

    fn initial_theta(&self) -> Vec<f64> {
        let mut theta = Vec::with_capacity(self.q * (self.q + 1) / 2);
        for c in 0..self.q {
            for r in c..self.q {
                theta.push(if r == c { 1.0 } else { 0.0 });
            }
        }
        theta
    }

    fn profile(&self, theta: &[f64]) -> Option<Profile> {
        let l = self.factor(theta);
        let lt = l.transpose();
        let identity = DMatrix::<f64>::identity(self.q, self.q);

        let mut xtwx = DMatrix::<f64>::zeros(self.p, self.p);
        let mut xtwy = DVector::<f64>::zeros(self.p);
        let mut ytwy = 0.0;
        let mut log_det_m = 0.0;
        let mut a_all = Vec::with_capacity(self.groups.len());

        for (_, g) in &self.groups {
            let m = &identity + &lt * &g.ztz * &l;
            let m_inv = spd_inverse(&m)?;
            log_det_m += spd_log_det(&m)?;
            let a = &l * m_inv * &lt;

            let xtz_a = &g.xtz * &a;
            xtwx += &g.xtx - &xtz_a * g.xtz.transpose();
            xtwy += &g.xty - &xtz_a * &g.zty;
            ytwy += g.yty - (g.zty.transpose() * &a * &g.zty)[(0, 0)];
            a_all.push(a);
        }

        let beta = spd_solve(&xtwx, &xtwy)?;
        let rwr = ytwy - beta.dot(&xtwy);
        let dof = (self.n - self.p) as f64;
        if !(rwr.is_finite() && rwr > 0.0) {
            return None;
        }
        let sigma2 = rwr / dof;
        let log_det_xtwx = spd_log_det(&xtwx)?;

        let criterion = dof * (1.0 + (2.0 * std::f64::consts::PI * sigma2).ln())
            + log_det_m
            + log_det_xtwx;
        criterion.is_finite().then_some(Profile {
            criterion,
            beta,
            xtwx,
            sigma2,
            a: a_all,
        })
    }
}

/// Exposes the REML criterion to `argmin`. Points where it is undefined cost `+∞`.
struct RemlCost<'a> {
    problem: &'a Problem,
}

impl CostFunction for RemlCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, ArgminError> {
        Ok(self
            .problem
            .profile(theta)
            .map_or(f64::INFINITY, |pr| pr.criterion))
    }
}

/// Best θ found by the simplex search.
struct Search {
    theta: Vec<f64>,
    criterion: f64,
    iterations: u64,
    converged: bool,
}

fn minimize(problem: &Problem, opts: &RemlOptions) -> Result<Search, AppError> {
    let theta0 = problem.initial_theta();
    let f0 = problem
        .profile(&theta0)
        .map(|pr| pr.criterion)
        .ok_or_else(|| AppError::estimation("REML criterion is not finite at the starting point."))?;

    let mut simplex = vec![theta0.clone()];
    for i in 0..theta0.len() {
        let mut vertex = theta0.clone();
        vertex[i] += opts.initial_step;
        simplex.push(vertex);
    }
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(opts.rel_tol * (1.0 + f0.abs()))
        .map_err(|e| AppError::estimation(format!("Invalid REML search settings: {e}")))?;

    let result = Executor::new(RemlCost { problem }, solver)
        .configure(|state| state.max_iters(opts.max_iters))
        .run()
        .map_err(|e| AppError::estimation(format!("REML search failed: {e}")))?;

    let state = result.state();
    let theta = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| AppError::estimation("REML search returned no parameters."))?;
    let converged = matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    Ok(Search {
        theta,
        criterion: state.get_best_cost(),
        iterations: state.get_iter(),
        converged,
    })
}

/// `I − e_anchor · shiftᵀ`: maps centered coefficients back to raw columns.
fn uncenter(shift: &[f64], anchor: Option<usize>) -> DMatrix<f64> {
    let dim = shift.len();
    let mut t = DMatrix::identity(dim, dim);
    if let Some(k) = anchor {
        for (c, s) in shift.iter().enumerate() {
            t[(k, c)] -= s;
        }
    }
    t
}

/// Fit a linear mixed model.
///
/// - `formula`: fixed effects, e.g. `test_scores ~ hours_studying`
/// - `groups`: integer grouping column, e.g. `school`
/// - `re_formula`: random effects, e.g. `~1` (intercept) or `~air_quality`
///   (intercept + slope)
pub fn mixedlm(
    formula: &str,
    data: &Dataset,
    groups: &str,
    re_formula: &str,
) -> Result<MixedLmFit, AppError> {
    mixedlm_with_options(formula, data, groups, re_formula, &RemlOptions::default())
}

pub fn mixedlm_with_options(
    formula: &str,
    data: &Dataset,
    groups: &str,
    re_formula: &str,
    opts: &RemlOptions,
) -> Result<MixedLmFit, AppError> {
    let fixed = Design::build(&parse_formula(formula)?, data)?;
    if !fixed.has_response() {
        return Err(AppError::input(format!("Mixed model formula '{formula}' needs a response.")));
    }
    let re_parsed = parse_formula(re_formula)?;
    if re_parsed.response.is_some() {
        return Err(AppError::input(format!(
            "Random-effects formula '{re_formula}' must be one-sided."
        )));
    }
    let random = Design::build(&re_parsed, data)?;

    let group_codes = match data.column(groups) {
        Some(Column::Integer(codes)) => codes,
        Some(Column::Float(_)) => {
            return Err(AppError::input(format!("Grouping column '{groups}' must be integer.")));
        }
        None => return Err(AppError::input(format!("Unknown grouping column '{groups}'."))),
    };

    let n = fixed.n_rows();
    let p = fixed.n_cols();
    let q = random.n_cols();
    let re_names: Vec<String> = random
        .names()
        .iter()
        .map(|name| if name == INTERCEPT { GROUP_EFFECT.to_string() } else { name.clone() })
        .collect();

    let mut row = vec![0.0; p + q + 1];
    let fill = |i: usize, row: &mut [f64]| -> Result<(), AppError> {
        fixed.fill_row(i, &mut row[..p]);
        random.fill_row(i, &mut row[p..p + q]);
        row[p + q] = fixed.response(i)?;
        Ok(())
    };

    // Column means; only shifted where an intercept absorbs the shift.
    let x_anchor = fixed.names().iter().position(|name| name == INTERCEPT);
    let z_anchor = random.names().iter().position(|name| name == INTERCEPT);
    let mut shift = vec![0.0; p + q + 1];
    if n > 0 {
        let mut sums = vec![0.0; p + q + 1];
        for i in 0..n {
            fill(i, &mut row[..])?;
            for (s, v) in sums.iter_mut().zip(&row) {
                *s += v;
            }
        }
        let mean = |j: usize| sums[j] / n as f64;
        if let Some(k) = x_anchor {
            for j in (0..p).filter(|&j| j != k) {
                shift[j] = mean(j);
            }
            shift[p + q] = mean(p + q);
        }
        if let Some(k) = z_anchor {
            for j in (0..q).filter(|&j| j != k) {
                shift[p + j] = mean(p + j);
            }
        }
    }

    let mut grams: BTreeMap<u32, Gram> = BTreeMap::new();
    for (i, &g) in group_codes.iter().enumerate() {
        fill(i, &mut row[..])?;
        for (v, s) in row.iter_mut().zip(&shift) {
            *v -= s;
        }
        grams.entry(g).or_insert_with(|| Gram::new(p + q + 1)).add(&row);
    }

    let n_groups = grams.len();
    if n_groups < MIN_GROUPS {
        return Err(AppError::insufficient(format!(
            "Mixed model needs at least {MIN_GROUPS} groups, found {n_groups}."
        )));
    }
    if n <= p {
        return Err(AppError::insufficient(format!(
            "Underdetermined mixed model: n={n} <= p={p} for '{formula}'."
        )));
    }

    let problem = Problem {
        groups: grams
            .iter()
            .map(|(&g, gram)| (g, GroupStats::from_gram(gram, p, q)))
            .collect(),
        n,
        p,
        q,
    };

    let search = minimize(&problem, opts)?;
    tracing::debug!(
        iterations = search.iterations,
        criterion = search.criterion,
        theta = ?search.theta,
        "REML search finished"
    );
    if !search.converged {
        tracing::warn!(
            formula,
            re_formula,
            iterations = search.iterations,
            "REML search stopped before converging"
        );
    }

    let best = problem.profile(&search.theta).ok_or_else(|| {
        AppError::estimation(format!(
            "REML criterion is not finite at the optimum for '{formula}' / '{re_formula}'."
        ))
    })?;

    let xtwx_inv = spd_inverse(&best.xtwx).ok_or_else(|| {
        AppError::estimation(format!("Singular fixed-effects design for '{formula}'."))
    })?;
    let z_crit = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::estimation(format!("Normal distribution error: {e}")))?
        .inverse_cdf(0.5 + CI_LEVEL / 2.0);

    // Back to raw columns: β = Jβ_c (+ mean of y on the intercept), Cov = J Cov_c Jᵀ.
    let j = uncenter(&shift[..p], x_anchor);
    let mut beta = &j * &best.beta;
    if let Some(k) = x_anchor {
        beta[k] += shift[p + q];
    }
    let cov_beta = &j * (xtwx_inv * best.sigma2) * j.transpose();

    let mut coefficients = CoefficientTable::new();
    for (k, name) in fixed.names().iter().enumerate() {
        let se = cov_beta[(k, k)].max(0.0).sqrt();
        let est = beta[k];
        coefficients.push(Coefficient {
            name: name.clone(),
            estimate: est,
            std_error: Some(se),
            lower: Some(est - z_crit * se),
            upper: Some(est + z_crit * se),
        });
    }

    // Ψ = T Ψ_c Tᵀ and b = T b_c, with T = I − e_intercept · shift_zᵀ.
    let t = uncenter(&shift[p..p + q], z_anchor);
    let l = problem.factor(&search.theta);
    let psi_c = (&l * l.transpose()) * best.sigma2;
    let psi_raw = &t * psi_c * t.transpose();
    let psi = (&psi_raw + psi_raw.transpose()) * 0.5;
    for i in 0..q {
        for k in 0..=i {
            let name = if i == k {
                format!("{} Var", re_names[i])
            } else {
                format!("{} x {} Cov", re_names[k], re_names[i])
            };
            coefficients.push_point(name, psi[(i, k)]);
        }
    }

    let mut random_effects = BTreeMap::new();
    for ((g, stats), a) in problem.groups.iter().zip(best.a.iter()) {
        let resid = &stats.zty - stats.xtz.transpose() * &best.beta;
        let blup = &t * (a * resid);
        random_effects.insert(*g, blup.iter().copied().collect());
    }

    let log_likelihood = -0.5 * best.criterion;
    tracing::info!(
        formula,
        re_formula,
        n_obs = n,
        n_groups,
        scale = best.sigma2,
        log_likelihood,
        converged = search.converged,
        "fitted mixed model"
    );

    Ok(MixedLmFit {
        coefficients,
        re_names,
        cov_re: (0..q * q).map(|k| psi[(k / q, k % q)]).collect(),
        scale: best.sigma2,
        random_effects,
        log_likelihood,
        iterations: search.iterations,
        converged: search.converged,
        n_obs: n,
        n_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataGeneration;
    use crate::domain::{Noise, Observation};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal as NormalDist};

    /// Balanced random-intercept data: y = 5 + 2x + u_g + e.
    fn random_intercept_data(groups: u32, per_group: usize, seed: u64) -> (Dataset, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let unit = NormalDist::new(0.0, 1.0).unwrap();
        let u: Vec<f64> = (0..groups).map(|_| 3.0 * unit.sample(&mut rng)).collect();
        let mut data = Dataset::default();
        for g in 0..groups {
            for _ in 0..per_group {
                let x = 10.0 + unit.sample(&mut rng);
                let y = 5.0 + 2.0 * x + u[g as usize] + unit.sample(&mut rng);
                data.push(Observation {
                    test_scores: y,
                    hours_studying: x,
                    school: g,
                    air_quality: 10.0 + unit.sample(&mut rng),
                });
            }
        }
        (data, u)
    }

    #[test]
    fn random_intercept_recovers_fixed_slope_and_blups() {
        let (data, u) = random_intercept_data(8, 400, 17);
        let fit = mixedlm("test_scores ~ hours_studying", &data, "school", "~1").unwrap();

        let slope = fit.coefficients.get("hours_studying").unwrap();
        assert!((slope.estimate - 2.0).abs() < 0.1, "slope {}", slope.estimate);
        assert!(slope.lower.unwrap() < slope.estimate && slope.estimate < slope.upper.unwrap());
        assert!((fit.scale - 1.0).abs() < 0.1, "scale {}", fit.scale);

        assert_eq!(fit.re_names, vec!["Group".to_string()]);
        assert_eq!(fit.random_effects.len(), 8);
        let keys: Vec<u32> = fit.random_effects.keys().copied().collect();
        assert_eq!(keys, (0..8).collect::<Vec<_>>());

        // BLUPs are deviations around the intercept; compare after centering.
        let u_mean = u.iter().sum::<f64>() / u.len() as f64;
        let b_mean = fit.random_effects.values().map(|b| b[0]).sum::<f64>() / 8.0;
        for (g, b) in &fit.random_effects {
            let expected = u[*g as usize] - u_mean;
            assert!((b[0] - b_mean - expected).abs() < 0.2, "group {g}: {} vs {expected}", b[0]);
        }

        let var = fit.cov_re_at(0, 0);
        assert!(var > 0.5, "group variance {var}");
        assert_eq!(fit.coefficients.get("Group Var").unwrap().estimate, var);
        assert!(fit.coefficients.get("Group Var").unwrap().lower.is_none());
    }

    #[test]
    fn random_slope_reports_full_covariance() {
        let (data, _) = random_intercept_data(6, 300, 5);
        let fit = mixedlm("test_scores ~ hours_studying", &data, "school", "~air_quality").unwrap();
        assert_eq!(fit.re_names, vec!["Group".to_string(), "air_quality".to_string()]);
        for name in ["Group Var", "Group x air_quality Cov", "air_quality Var"] {
            assert!(fit.coefficients.get(name).is_some(), "{name}");
        }
        assert!((fit.cov_re_at(0, 1) - fit.cov_re_at(1, 0)).abs() < 1e-9);
        assert!(fit.cov_re_at(1, 1) >= 0.0);
        assert!(fit.random_effects.values().all(|b| b.len() == 2));
    }

    #[test]
    fn random_slope_search_converges_on_simulated_schools() {
        let mut rng = StdRng::seed_from_u64(2024);
        let noise = Noise { individual_noise: 1, school_noise: 1 };
        let (data, _) = DataGeneration::new(5).simulate_data(20_000, noise, &mut rng).unwrap();

        let fit = mixedlm("test_scores ~ hours_studying", &data, "school", "~air_quality").unwrap();
        assert!(fit.converged, "stopped after {} iterations", fit.iterations);
        assert!(fit.iterations < RemlOptions::default().max_iters);

        let intercept_only = mixedlm("test_scores ~ hours_studying", &data, "school", "~1").unwrap();
        assert!(intercept_only.converged);
    }

    #[test]
    fn iteration_cap_still_returns_a_fit() {
        let (data, _) = random_intercept_data(4, 100, 3);
        let opts = RemlOptions {
            max_iters: 1,
            ..RemlOptions::default()
        };
        let fit =
            mixedlm_with_options("test_scores ~ hours_studying", &data, "school", "~air_quality", &opts)
                .unwrap();
        assert!(!fit.converged);
        assert!(fit.iterations <= 1);
        assert!(fit.scale.is_finite());
    }

    #[test]
    fn shifting_a_covariate_only_moves_the_intercept() {
        let (data, _) = random_intercept_data(6, 200, 11);
        let mut shifted = Dataset::default();
        for obs in data.rows() {
            shifted.push(Observation {
                hours_studying: obs.hours_studying + 1_000.0,
                ..obs
            });
        }

        let base = mixedlm("test_scores ~ hours_studying", &data, "school", "~1").unwrap();
        let moved = mixedlm("test_scores ~ hours_studying", &shifted, "school", "~1").unwrap();

        let slope = base.coefficients.get("hours_studying").unwrap();
        let slope_moved = moved.coefficients.get("hours_studying").unwrap();
        assert!((slope.estimate - slope_moved.estimate).abs() < 1e-5);
        assert!((slope.std_error.unwrap() - slope_moved.std_error.unwrap()).abs() < 1e-5);

        let icpt = base.coefficients.get("Intercept").unwrap().estimate;
        let icpt_moved = moved.coefficients.get("Intercept").unwrap().estimate;
        assert!((icpt_moved + 1_000.0 * slope_moved.estimate - icpt).abs() < 1e-4);
        assert!((base.log_likelihood - moved.log_likelihood).abs() < 1e-4);
    }

    #[test]
    fn single_group_is_rejected() {
        let (data, _) = random_intercept_data(1, 50, 2);
        let err = mixedlm("test_scores ~ hours_studying", &data, "school", "~1").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn grouping_column_must_be_integer() {
        let (data, _) = random_intercept_data(3, 20, 2);
        let err = mixedlm("test_scores ~ hours_studying", &data, "air_quality", "~1").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = mixedlm("test_scores ~ hours_studying", &data, "school", "y ~ 1").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
