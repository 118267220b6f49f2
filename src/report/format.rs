//! Formatted terminal output.

use crate::domain::{Parameters, RunConfig};
use crate::fit::{FitSummary, ModelFit};
use crate::io::ResultsFile;
use crate::report::{Comparison, compare};

/// Header: run configuration and the simulated ground truth.
pub fn format_run_summary(config: &RunConfig, rows: usize, truth: &Parameters) -> String {
    let mut out = String::new();

    out.push_str("=== schoolfx - hierarchical parameter recovery ===\n");
    out.push_str(&format!(
        "Schools: {} | Rows: {} | Seed: {}\n",
        config.num_schools, rows, config.seed
    ));
    out.push_str(&format!(
        "Noise: individual={} school={}\n",
        config.noise.individual_noise, config.noise.school_noise
    ));
    out.push('\n');
    out.push_str(&format_parameters("True parameters", truth));
    out
}

/// A `Parameters` block.
pub fn format_parameters(title: &str, params: &Parameters) -> String {
    let mut out = String::new();
    out.push_str(&format!("{title}:\n"));
    out.push_str(&format!("  global_intercept      {:>12.4}\n", params.global_intercept));
    out.push_str(&format!("  parameter_of_interest {:>12.4}\n", params.parameter_of_interest));
    out.push_str(&format!("  air_quality           {:>12.4}\n", params.air_quality));
    out.push_str(&format!("  school_intercepts     {}\n", format_list(&params.school_intercepts)));
    out.push_str(&format!("  school_air_quality    {}\n", format_list(&params.school_air_quality)));
    out
}

/// One model's estimates against the truth.
pub fn format_model_comparison(fit: &ModelFit, cmp: &Comparison) -> String {
    let mut out = String::new();

    out.push_str(&format!("--- {} ---\n", fit.kind.display_name()));
    out.push_str(&format!("Formula: {}", fit.kind.formula()));
    if let Some(re) = fit.kind.re_formula() {
        out.push_str(&format!(" | groups: {} | re: {re}", fit.kind.groups().unwrap_or("-")));
    }
    out.push('\n');

    match &fit.summary {
        FitSummary::Ols {
            n_obs,
            df_resid,
            sigma2,
            r_squared,
        } => out.push_str(&format!(
            "OLS: n={n_obs} df_resid={df_resid} sigma2={sigma2:.4} R2={r_squared:.4}\n"
        )),
        FitSummary::Mixed {
            n_obs,
            n_groups,
            scale,
            log_likelihood,
            iterations,
            converged,
        } => out.push_str(&format!(
            "REML: n={n_obs} groups={n_groups} scale={scale:.4} logL={log_likelihood:.2} iters={iterations}{}\n",
            if *converged { "" } else { " (not converged)" }
        )),
    }

    out.push_str(&format_coverage_table(cmp));
    out
}

/// Truth-vs-estimate rows, notes and the coverage tally.
pub fn format_coverage_table(cmp: &Comparison) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<24} {:>10} {:>10} {:>10} {:>10} {:>9}  {}\n",
        "field", "truth", "lower", "mean", "upper", "bias", "covered"
    ));
    for row in &cmp.rows {
        out.push_str(&format!(
            "{:<24} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>9.4}  {}\n",
            row.field,
            row.truth,
            row.lower,
            row.mean,
            row.upper,
            row.bias(),
            if row.covered { "yes" } else { "NO" }
        ));
    }
    for note in &cmp.notes {
        out.push_str(&format!("note: {note}\n"));
    }
    out.push_str(&format!(
        "Coverage: {}/{} intervals contain the truth\n",
        cmp.covered_count(),
        cmp.rows.len()
    ));
    out
}

/// A saved results file, compared against the truth it recorded.
pub fn format_results_file(file: &ResultsFile) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== {} results generated {} ===\n",
        file.tool,
        file.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "Schools: {} | Rows: {} | Seed: {}\n",
        file.num_schools, file.rows, file.seed
    ));
    out.push_str(&format!(
        "Noise: individual={} school={}\n",
        file.noise.individual_noise, file.noise.school_noise
    ));
    out.push('\n');
    out.push_str(&format_parameters("True parameters", &file.truth));

    for entry in &file.models {
        out.push('\n');
        out.push_str(&format!("--- {} ---\n", entry.model.display_name()));
        out.push_str(&format!("Formula: {}", entry.formula));
        if let Some(re) = &entry.re_formula {
            out.push_str(&format!(" | re: {re}"));
        }
        out.push('\n');
        out.push_str(&format_coverage_table(&compare(&file.truth, &entry.results)));
    }
    out
}

fn format_list(values: &[f64]) -> String {
    if values.is_empty() {
        return "[]".to_string();
    }
    let items: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
    format!("[{}]", items.join(", "))
}
