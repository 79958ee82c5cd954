//! Post-processing of a single finished solver run.
//!
//! Produces `post_report.json`, `summary.txt`, `coefficients.svg` and
//! `residuals.svg` next to the solver outputs.

use crate::report::plot::{LinePlot, Series};
use crate::report::summary::write_json;
use crate::solver::parse::{CD_COLUMNS, CL_COLUMNS, CM_COLUMNS};
use crate::solver::{AerodynamicCoefficients, HistoryTable};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const ITERATION_COLUMNS: &[&str] = &["Inner_Iter", "Iteration", "ITER", "Time_Iter"];
const PALETTE: [&str; 6] = ["#1f77b4", "#d62728", "#2ca02c", "#9467bd", "#ff7f0e", "#8c564b"];

/// Summary statistics of one solver history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostReport {
    pub iterations: usize,
    pub coefficients: AerodynamicCoefficients,
    /// Trailing window used for the means.
    pub average_window: usize,
    pub mean_cl: f64,
    pub mean_cd: f64,
    pub mean_cm: Option<f64>,
    pub final_residuals: BTreeMap<String, f64>,
}

/// Files written by [`write_post_outputs`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostOutputs {
    pub report: PathBuf,
    pub summary: PathBuf,
    pub coefficients_plot: PathBuf,
    pub residuals_plot: PathBuf,
}

fn tail_mean(values: &[f64], window: usize) -> f64 {
    let n = window.max(1).min(values.len());
    if n == 0 {
        return f64::NAN;
    }
    values[values.len() - n..].iter().sum::<f64>() / n as f64
}

impl PostReport {
    /// Build the report from a parsed history and the final coefficients.
    pub fn from_history(
        table: &HistoryTable,
        coefficients: &AerodynamicCoefficients,
        window: usize,
    ) -> Result<Self> {
        let cl = table.series(CL_COLUMNS).context("read lift history")?;
        let cd = table.series(CD_COLUMNS).context("read drag history")?;
        let cm = table.series(CM_COLUMNS).ok();

        let mut final_residuals = BTreeMap::new();
        for column in table.residual_columns() {
            if let Ok(value) = table.last_value(&[column.as_str()]) {
                final_residuals.insert(column, value);
            }
        }

        Ok(Self {
            iterations: table.len(),
            coefficients: coefficients.clone(),
            average_window: window.max(1).min(cl.len().max(1)),
            mean_cl: tail_mean(&cl, window),
            mean_cd: tail_mean(&cd, window),
            mean_cm: cm.as_deref().map(|v| tail_mean(v, window)),
            final_residuals,
        })
    }

    pub fn summary_text(&self) -> String {
        let c = &self.coefficients;
        let mut text = String::new();
        let _ = writeln!(text, "aeroshape run summary");
        let _ = writeln!(text, "iterations      : {}", self.iterations);
        let _ = writeln!(text, "converged       : {}", c.converged);
        let _ = writeln!(text, "CL              : {:.6}", c.cl);
        let _ = writeln!(text, "CD              : {:.6}", c.cd);
        if let Some(cm) = c.cm {
            let _ = writeln!(text, "CMz             : {:.6}", cm);
        }
        let _ = writeln!(text, "L/D             : {:.4}", c.lift_to_drag);
        let _ = writeln!(
            text,
            "mean CL / CD    : {:.6} / {:.6} (last {} iterations)",
            self.mean_cl, self.mean_cd, self.average_window
        );
        for (column, value) in &self.final_residuals {
            let _ = writeln!(text, "{:<16}: {:.3}", column, value);
        }
        text
    }
}

fn iteration_axis(table: &HistoryTable) -> Vec<f64> {
    table
        .series(ITERATION_COLUMNS)
        .unwrap_or_else(|_| (0..table.len()).map(|i| i as f64).collect())
}

/// Coefficient histories (CL, CD and CMz when present).
pub fn coefficients_plot(table: &HistoryTable) -> LinePlot {
    let x = iteration_axis(table);
    let mut plot = LinePlot::new("Aerodynamic coefficients", "iteration", "coefficient");
    for (i, (name, aliases)) in [("CL", CL_COLUMNS), ("CD", CD_COLUMNS), ("CMz", CM_COLUMNS)]
        .into_iter()
        .enumerate()
    {
        if let Ok(values) = table.series(aliases) {
            let points = x.iter().copied().zip(values).collect();
            plot.add_series(Series::new(name, PALETTE[i], points));
        }
    }
    plot
}

/// Residual histories (log10 values as written by the solver).
pub fn residuals_plot(table: &HistoryTable) -> LinePlot {
    let x = iteration_axis(table);
    let mut plot = LinePlot::new("Residuals", "iteration", "log10 residual");
    for (i, column) in table.residual_columns().iter().enumerate() {
        if let Ok(values) = table.series(&[column.as_str()]) {
            let points = x.iter().copied().zip(values).collect();
            plot.add_series(Series::new(column, PALETTE[i % PALETTE.len()], points));
        }
    }
    plot
}

/// Write the report, text summary and both plots into `dir`.
pub async fn write_post_outputs(
    dir: &Path,
    table: &HistoryTable,
    coefficients: &AerodynamicCoefficients,
    window: usize,
) -> Result<PostOutputs> {
    let report = PostReport::from_history(table, coefficients, window)?;
    let outputs = PostOutputs {
        report: dir.join("post_report.json"),
        summary: dir.join("summary.txt"),
        coefficients_plot: dir.join("coefficients.svg"),
        residuals_plot: dir.join("residuals.svg"),
    };

    write_json(&outputs.report, &report).await?;
    for (path, content) in [
        (&outputs.summary, report.summary_text()),
        (&outputs.coefficients_plot, coefficients_plot(table).to_svg()),
        (&outputs.residuals_plot, residuals_plot(table).to_svg()),
    ] {
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("write {:?}", path))?;
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HISTORY: &str = "\"Inner_Iter\",\"rms[Rho]\",\"CL\",\"CD\"\n\
0,-2.0,0.30,0.050\n\
1,-4.0,0.40,0.040\n\
2,-6.5,0.42,0.035\n";

    fn coeffs() -> AerodynamicCoefficients {
        AerodynamicCoefficients {
            cl: 0.42,
            cd: 0.035,
            cm: None,
            lift_to_drag: 12.0,
            iterations: 3,
            converged: true,
            final_residual: Some(-6.5),
        }
    }

    #[test]
    fn test_post_report_means_over_window() {
        let table = HistoryTable::parse(HISTORY).unwrap();
        let report = PostReport::from_history(&table, &coeffs(), 2).unwrap();
        assert_eq!(report.iterations, 3);
        assert!((report.mean_cl - 0.41).abs() < 1e-12);
        assert!((report.mean_cd - 0.0375).abs() < 1e-12);
        assert_eq!(report.final_residuals["rms[Rho]"], -6.5);
        assert!(report.summary_text().contains("L/D             : 12.0000"));
    }

    #[test]
    fn test_window_larger_than_history() {
        let table = HistoryTable::parse(HISTORY).unwrap();
        let report = PostReport::from_history(&table, &coeffs(), 50).unwrap();
        assert_eq!(report.average_window, 3);
        assert!((report.mean_cl - (0.30 + 0.40 + 0.42) / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_write_post_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let table = HistoryTable::parse(HISTORY).unwrap();
        let outputs = write_post_outputs(dir.path(), &table, &coeffs(), 50)
            .await
            .unwrap();
        for path in [
            &outputs.report,
            &outputs.summary,
            &outputs.coefficients_plot,
            &outputs.residuals_plot,
        ] {
            assert!(path.is_file(), "{:?} missing", path);
        }
        let residuals = std::fs::read_to_string(&outputs.residuals_plot).unwrap();
        assert!(residuals.contains("rms[Rho]"));
    }
}
