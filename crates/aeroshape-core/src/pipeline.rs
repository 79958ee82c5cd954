//! Single-run and optimization entry points.

use crate::config::AppConfig;
use crate::design::DesignVector;
use crate::error::{ConfigError, RunError};
use crate::fitness::{AeroAnalysis, CfdPipeline, FitnessEvaluator, Objective, PreparedCase};
use crate::obs;
use crate::optimizer::{GeneticOptimizer, OptimizationResult};
use crate::report::{write_post_outputs, PostOutputs, Reporter};
use crate::solver::{AerodynamicCoefficients, HistoryTable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Instrument};
use uuid::Uuid;

/// Outcome of a single run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingleRunReport {
    pub run_id: String,
    pub work_dir: PathBuf,
    pub vector: DesignVector,
    pub case: PreparedCase,
    /// Present when the solver was executed.
    pub coefficients: Option<AerodynamicCoefficients>,
    pub post: Option<PostOutputs>,
}

fn short_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    uuid[..8].to_string()
}

/// Run the chain once for `vector` in `<results>/single-<id>`.
///
/// Stage errors are returned to the caller. With `render_only` (or
/// `execution.run_solver = false`) the solver configuration is written and
/// the solver is not started.
pub async fn run_single(
    config: Arc<AppConfig>,
    vector: DesignVector,
    render_only: bool,
) -> Result<SingleRunReport, RunError> {
    let pipeline = CfdPipeline::from_config(config.clone())?;
    let run_id = format!("single-{}", short_id());
    let span = obs::run_span(&run_id, "single");
    single_run(&config, &pipeline, run_id, vector, render_only)
        .instrument(span)
        .await
}

async fn single_run(
    config: &AppConfig,
    pipeline: &CfdPipeline,
    run_id: String,
    vector: DesignVector,
    render_only: bool,
) -> Result<SingleRunReport, RunError> {
    let work_dir = config.paths.results_dir.join(&run_id);
    info!(work_dir = %work_dir.display(), vector = %vector, "Starting single run");
    let mut case = pipeline.prepare(&vector, &work_dir, &run_id).await?;

    if render_only || !config.execution.run_solver {
        info!(config = %case.solver.config_path.display(), "Render-only run, solver not started");
        return Ok(SingleRunReport {
            run_id,
            work_dir,
            vector,
            case,
            coefficients: None,
            post: None,
        });
    }

    let coefficients = pipeline.solve(&mut case).await?;
    info!(
        cl = coefficients.cl,
        cd = coefficients.cd,
        lift_to_drag = coefficients.lift_to_drag,
        converged = coefficients.converged,
        "Single run finished"
    );

    let post = if config.execution.run_post {
        post_process(&case, &coefficients, config.report.post_average_window).await
    } else {
        None
    };

    Ok(SingleRunReport {
        run_id,
        work_dir,
        vector,
        case,
        coefficients: Some(coefficients),
        post,
    })
}

async fn post_process(
    case: &PreparedCase,
    coefficients: &AerodynamicCoefficients,
    window: usize,
) -> Option<PostOutputs> {
    let text = match tokio::fs::read_to_string(&case.solver.history_path).await {
        Ok(text) => text,
        Err(e) => {
            obs::emit_report_error("post_report", &e);
            return None;
        }
    };
    let table = match HistoryTable::parse(&text) {
        Ok(table) => table,
        Err(e) => {
            obs::emit_report_error("post_report", &e);
            return None;
        }
    };
    match write_post_outputs(&case.solver.case_dir, &table, coefficients, window).await {
        Ok(outputs) => Some(outputs),
        Err(e) => {
            obs::emit_report_error("post_report", &format!("{:#}", e));
            None
        }
    }
}

/// Run the genetic optimizer with the real tool chain.
pub async fn run_optimization(
    config: Arc<AppConfig>,
    seed: Option<u64>,
) -> Result<OptimizationResult, ConfigError> {
    let analysis: Arc<dyn AeroAnalysis> = Arc::new(CfdPipeline::from_config(config.clone())?);
    run_optimization_with(config, analysis, seed).await
}

/// Run the genetic optimizer with any analysis implementation.
pub async fn run_optimization_with(
    config: Arc<AppConfig>,
    analysis: Arc<dyn AeroAnalysis>,
    seed: Option<u64>,
) -> Result<OptimizationResult, ConfigError> {
    config.validate_for_optimization()?;
    let space = config.design_space()?;

    let evaluator = FitnessEvaluator::new(
        analysis,
        Objective::from_config(&config),
        config.evaluations_dir(),
    );
    let optimizer = GeneticOptimizer::new(
        space.clone(),
        config.optimizer.clone(),
        config.execution.max_parallel_evaluations,
        evaluator,
    )
    .with_seed(seed);
    let mut reporter = Reporter::new(&config, space.names());

    let run_id = format!("optimize-{}", short_id());
    let span = obs::run_span(&run_id, "optimize");
    let result = async {
        info!(
            population = config.optimizer.population_size,
            generations = config.optimizer.generations,
            variables = space.len(),
            results_dir = %config.paths.results_dir.display(),
            "Starting optimization"
        );
        optimizer.run(&mut reporter).await
    }
    .instrument(span)
    .await;
    info!(
        run_id = %run_id,
        generations = result.generations_completed,
        evaluations = result.total_evaluations,
        failed = result.failed_evaluations,
        best = result.best.as_ref().map(|e| e.score()).unwrap_or(f64::NAN),
        best_design = %reporter.best_design_path().display(),
        "Optimization finished"
    );
    Ok(result)
}
