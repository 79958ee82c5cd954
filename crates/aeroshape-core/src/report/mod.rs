//! Optimization reporting: history table, convergence plot and best-design
//! summary, plus single-run post-processing.
//!
//! Files are written with `tokio::fs` from inside the optimization loop.
//! Every write failure is logged as a warning through
//! [`crate::obs::emit_report_error`]; reporting never aborts a run.

pub mod history;
pub mod plot;
pub mod post;
pub mod summary;

pub use history::HistoryWriter;
pub use plot::{LinePlot, Series};
pub use post::{write_post_outputs, PostOutputs, PostReport};
pub use summary::{write_json, BestDesignReport};

use crate::config::{AppConfig, ObjectiveTerm};
use crate::fitness::Evaluation;
use crate::obs;
use crate::optimizer::{GenerationSummary, OptimizationResult, ProgressObserver};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Writes optimization artifacts into the results directory.
pub struct Reporter {
    results_dir: PathBuf,
    history: HistoryWriter,
    convergence_plot: PathBuf,
    snapshot_pattern: Option<String>,
    best_design: PathBuf,
    objectives: Vec<ObjectiveTerm>,
    generations: Vec<GenerationSummary>,
}

impl Reporter {
    pub fn new(config: &AppConfig, variables: Vec<String>) -> Self {
        let dir = config.paths.results_dir.clone();
        let report = &config.report;
        Self {
            history: HistoryWriter::new(dir.join(&report.history_file), variables),
            convergence_plot: dir.join(&report.convergence_plot),
            snapshot_pattern: report.plot_snapshot_pattern.clone(),
            best_design: dir.join(&report.best_design_file),
            objectives: config.optimizer.objectives.clone(),
            generations: Vec::new(),
            results_dir: dir,
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn best_design_path(&self) -> &Path {
        &self.best_design
    }

    /// Best, mean and best-so-far fitness per generation.
    pub fn convergence_plot(&self) -> LinePlot {
        let mut plot = LinePlot::new("Optimization convergence", "generation", "fitness");
        plot.add_series(Series::new(
            "best",
            "#d62728",
            self.generations
                .iter()
                .map(|g| (g.generation as f64, g.best_fitness))
                .collect(),
        ));
        plot.add_series(Series::new(
            "mean",
            "#1f77b4",
            self.generations
                .iter()
                .map(|g| (g.generation as f64, g.mean_fitness))
                .collect(),
        ));
        plot.add_series(Series::new(
            "best so far",
            "#2ca02c",
            self.generations
                .iter()
                .map(|g| (g.generation as f64, g.best_so_far))
                .collect(),
        ));
        plot
    }

    async fn write_plot(&self, generation: usize) -> Result<()> {
        tokio::fs::create_dir_all(&self.results_dir)
            .await
            .with_context(|| format!("create {:?}", self.results_dir))?;
        let svg = self.convergence_plot().to_svg();
        tokio::fs::write(&self.convergence_plot, &svg)
            .await
            .with_context(|| format!("write {:?}", self.convergence_plot))?;
        if let Some(pattern) = &self.snapshot_pattern {
            let name = pattern.replace("{generation}", &format!("{:03}", generation));
            let path = self.results_dir.join(name);
            tokio::fs::write(&path, &svg)
                .await
                .with_context(|| format!("write {:?}", path))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressObserver for Reporter {
    async fn on_generation(&mut self, summary: &GenerationSummary, evaluations: &[Evaluation]) {
        self.generations.push(summary.clone());
        if let Err(e) = self.history.append(evaluations).await {
            obs::emit_report_error("history", &format!("{:#}", e));
        }
        if let Err(e) = self.write_plot(summary.generation).await {
            obs::emit_report_error("convergence_plot", &format!("{:#}", e));
        }
    }

    async fn on_finish(&mut self, result: &OptimizationResult) {
        let report = BestDesignReport::new(&self.objectives, result);
        if let Err(e) = write_json(&self.best_design, &report).await {
            obs::emit_report_error("best_design", &format!("{:#}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{DesignSpace, DesignVariable};
    use crate::error::FailureKind;
    use crate::fitness::{Fitness, Outcome};

    fn failed_evaluation(generation: usize) -> Evaluation {
        let space = DesignSpace::new(vec![DesignVariable::new("length", 0.5, 2.0, None)]).unwrap();
        Evaluation {
            id: format!("g{:03}-i000-abcd1234", generation),
            generation,
            index: 0,
            vector: space.vector(vec![1.0]),
            outcome: Outcome::Failed {
                kind: FailureKind::Solver,
                reason: "su2_cfd timed out after 1 seconds".into(),
            },
            fitness: Fitness {
                score: -1e6,
                components: vec![],
            },
            elapsed_ms: 1000,
            cached: false,
        }
    }

    fn summary(generation: usize) -> GenerationSummary {
        GenerationSummary {
            generation,
            best_fitness: -1e6,
            mean_fitness: -1e6,
            best_evaluation_id: Some("g000-i000-abcd1234".into()),
            best_so_far: -1e6,
            evaluated: 1,
            failed: 1,
            cache_hits: 0,
        }
    }

    #[tokio::test]
    async fn test_reporter_writes_artifacts_per_generation() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "design_variables:\n  - {name: length, lower: 0.5, upper: 2.0}\n\
                    report:\n  plot_snapshot_pattern: \"convergence_{generation}.svg\"\n";
        let config = AppConfig::from_yaml_str(yaml, dir.path()).unwrap();
        let mut reporter = Reporter::new(&config, vec!["length".into()]);

        for generation in 0..2 {
            reporter
                .on_generation(&summary(generation), &[failed_evaluation(generation)])
                .await;
        }
        let result = OptimizationResult {
            best: Some(failed_evaluation(0)),
            generations_completed: 1,
            total_evaluations: 2,
            failed_evaluations: 2,
            cache_hits: 0,
            stopped_early: false,
            history: vec![summary(0), summary(1)],
        };
        reporter.on_finish(&result).await;

        let results = reporter.results_dir().to_path_buf();
        let history =
            std::fs::read_to_string(results.join(&config.report.history_file)).unwrap();
        assert_eq!(history.lines().count(), 3);
        assert!(results.join("convergence_000.svg").is_file());
        assert!(results.join("convergence_001.svg").is_file());
        assert!(results.join(&config.report.convergence_plot).is_file());
        assert!(reporter.best_design_path().is_file());
    }
}
