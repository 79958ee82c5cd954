//! Genetic optimizer runs against in-process analyses (no external tools).

use aeroshape_core::error::MeshError;
use aeroshape_core::{
    run_optimization_with, AeroAnalysis, AerodynamicCoefficients, AppConfig, DesignVector,
    FailureKind, Outcome, StageResult,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const BASE: &str = r#"
design_variables:
  - name: x
    lower: 0.0
    upper: 1.0
  - name: y
    lower: 0.0
    upper: 1.0
optimizer:
  population_size: 10
  generations: 5
  seed: 7
"#;

fn base_config(dir: &Path) -> AppConfig {
    AppConfig::from_yaml_str(BASE, dir).unwrap()
}

/// Every evaluation fails at the mesh stage.
#[derive(Default)]
struct FailingAnalysis {
    calls: AtomicUsize,
}

#[async_trait]
impl AeroAnalysis for FailingAnalysis {
    async fn analyze(
        &self,
        _vector: &DesignVector,
        _work_dir: &Path,
        _evaluation_id: &str,
    ) -> StageResult<AerodynamicCoefficients> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MeshError::EmptyMesh {
            path: PathBuf::from("mesh.su2"),
        }
        .into())
    }
}

/// Smooth drag bowl with its minimum at (0.3, 0.7).
#[derive(Default)]
struct BowlAnalysis {
    calls: AtomicUsize,
}

#[async_trait]
impl AeroAnalysis for BowlAnalysis {
    async fn analyze(
        &self,
        vector: &DesignVector,
        _work_dir: &Path,
        _evaluation_id: &str,
    ) -> StageResult<AerodynamicCoefficients> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let x = vector.get("x").unwrap_or(0.0);
        let y = vector.get("y").unwrap_or(0.0);
        let cl = 0.5;
        let cd = 0.02 + (x - 0.3).powi(2) + (y - 0.7).powi(2);
        Ok(AerodynamicCoefficients {
            cl,
            cd,
            cm: None,
            lift_to_drag: cl / cd,
            iterations: 100,
            converged: true,
            final_residual: Some(-8.0),
        })
    }
}

/// Test: a run where every evaluation fails still completes and reports the
/// penalty as the best fitness.
#[tokio::test]
async fn all_failing_population_reports_penalty() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(base_config(dir.path()));
    let analysis = Arc::new(FailingAnalysis::default());

    let result = run_optimization_with(config.clone(), analysis.clone(), None)
        .await
        .unwrap();

    let best = result.best.as_ref().expect("best record");
    assert_eq!(best.score(), -1.0e6);
    assert!(matches!(
        best.outcome,
        Outcome::Failed {
            kind: FailureKind::Mesh,
            ..
        }
    ));
    assert_eq!(result.generations_completed, 5);
    assert_eq!(result.history.len(), 6);
    // 10 initial plus 9 offspring per generation (one elite carried over).
    assert_eq!(result.total_evaluations, 55);
    assert_eq!(result.failed_evaluations, 55);
    assert_eq!(analysis.calls.load(Ordering::SeqCst), 55);

    let results = &config.paths.results_dir;
    let history = std::fs::read_to_string(results.join("history.csv")).unwrap();
    assert_eq!(history.lines().count(), 56);
    assert!(results.join("convergence.svg").is_file());

    let best_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(results.join("best_design.json")).unwrap())
            .unwrap();
    assert_eq!(best_json["best_fitness"], -1.0e6);
    assert_eq!(best_json["failed_evaluations"], 55);
}

/// Test: the best-so-far record never gets worse and the best design lies
/// within bounds.
#[tokio::test]
async fn best_so_far_is_monotone() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.optimizer.generations = 8;
    let config = Arc::new(config);

    let result = run_optimization_with(config.clone(), Arc::new(BowlAnalysis::default()), None)
        .await
        .unwrap();

    for pair in result.history.windows(2) {
        assert!(pair[1].best_so_far >= pair[0].best_so_far);
    }
    let best = result.best.unwrap();
    assert!(best.outcome.is_success());
    let space = config.design_space().unwrap();
    assert!(space.contains(&best.vector));
    assert!(best.score() >= result.history[0].best_fitness);
}

/// Test: the same seed reproduces the same best design.
#[tokio::test]
async fn seeded_runs_are_reproducible() {
    let mut bests = Vec::new();
    for _ in 0..2 {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(base_config(dir.path()));
        let result = run_optimization_with(config, Arc::new(BowlAnalysis::default()), Some(11))
            .await
            .unwrap();
        bests.push(result.best.unwrap().vector.to_values());
    }
    assert_eq!(bests[0], bests[1]);
}

/// Test: with variation disabled every offspring repeats an evaluated vector,
/// so the cache answers all of them.
#[tokio::test]
async fn cache_reuses_identical_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.optimizer.population_size = 6;
    config.optimizer.generations = 3;
    config.optimizer.crossover_rate = 0.0;
    config.optimizer.mutation_rate = 0.0;
    config.optimizer.cache_evaluations = true;
    let analysis = Arc::new(BowlAnalysis::default());

    let result = run_optimization_with(Arc::new(config), analysis.clone(), None)
        .await
        .unwrap();

    assert_eq!(analysis.calls.load(Ordering::SeqCst), 6);
    assert_eq!(result.total_evaluations, 6);
    assert_eq!(result.cache_hits, 15);
    assert!(result.history[1..].iter().all(|g| g.evaluated == 0));
}

/// Test: concurrent evaluation keeps results in population order.
#[tokio::test]
async fn parallel_evaluation_keeps_population_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.execution.max_parallel_evaluations = 4;
    config.optimizer.generations = 2;
    let config = Arc::new(config);

    let result = run_optimization_with(config.clone(), Arc::new(BowlAnalysis::default()), None)
        .await
        .unwrap();
    assert_eq!(result.total_evaluations, 10 + 2 * 9);

    let history =
        std::fs::read_to_string(config.paths.results_dir.join("history.csv")).unwrap();
    let ids: Vec<&str> = history
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(1).unwrap())
        .collect();
    for pair in ids.windows(2) {
        assert!(pair[0][..9] < pair[1][..9], "{} before {}", pair[0], pair[1]);
    }
    assert!(ids[0].starts_with("g000-i000-"));
}

/// Test: a flat objective stops early once the stall window is exhausted.
#[tokio::test]
async fn stall_terminates_early() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.optimizer.generations = 20;
    config.optimizer.stall_generations = Some(2);
    let config = Arc::new(config);

    let result = run_optimization_with(config, Arc::new(FailingAnalysis::default()), None)
        .await
        .unwrap();
    assert!(result.stopped_early);
    assert_eq!(result.generations_completed, 2);
}

/// Test: per-generation plot snapshots follow the configured pattern.
#[tokio::test]
async fn snapshot_plots_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.optimizer.generations = 2;
    config.report.plot_snapshot_pattern = Some("convergence_{generation}.svg".to_string());
    let config = Arc::new(config);

    run_optimization_with(config.clone(), Arc::new(BowlAnalysis::default()), None)
        .await
        .unwrap();
    for generation in ["000", "001", "002"] {
        let path = config
            .paths
            .results_dir
            .join(format!("convergence_{}.svg", generation));
        assert!(path.is_file(), "{:?} missing", path);
    }
}

/// Test: optimization refuses a configuration that does not run the solver.
#[tokio::test]
async fn optimization_requires_solver_execution() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.execution.run_solver = false;

    let err = run_optimization_with(Arc::new(config), Arc::new(BowlAnalysis::default()), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("run_solver"));
}
