//! Structured observability hooks for runs, generations and evaluations.
//!
//! This module provides:
//! - [`run_span`] and [`evaluation_span`] for instrumenting run and
//!   evaluation futures
//! - Emission functions for lifecycle events (evaluation start/finish/failure,
//!   generation completion, best-design improvement, report errors)

use tracing::{info, warn};

/// Span covering a single run (single-run or optimization mode).
pub fn run_span(run_id: &str, mode: &str) -> tracing::Span {
    tracing::info_span!("aeroshape.run", run_id = %run_id, mode = %mode)
}

/// Span covering one evaluation of a design vector.
pub fn evaluation_span(evaluation_id: &str, generation: usize) -> tracing::Span {
    tracing::info_span!(
        "aeroshape.evaluation",
        evaluation_id = %evaluation_id,
        generation = generation
    )
}

/// Emit event: evaluation started with its design vector.
pub fn emit_evaluation_started(evaluation_id: &str, inputs: &str) {
    info!(event = "evaluation.started", evaluation_id = %evaluation_id, inputs = %inputs);
}

/// Emit event: evaluation finished with coefficients and score.
pub fn emit_evaluation_finished(
    evaluation_id: &str,
    cl: f64,
    cd: f64,
    lift_to_drag: f64,
    score: f64,
    elapsed_ms: u64,
) {
    info!(
        event = "evaluation.finished",
        evaluation_id = %evaluation_id,
        cl = cl,
        cd = cd,
        lift_to_drag = lift_to_drag,
        score = score,
        elapsed_ms = elapsed_ms,
    );
}

/// Emit event: evaluation failed and was assigned the penalty fitness.
pub fn emit_evaluation_failed(evaluation_id: &str, kind: &str, reason: &str, elapsed_ms: u64) {
    warn!(
        event = "evaluation.failed",
        evaluation_id = %evaluation_id,
        kind = %kind,
        reason = %reason,
        elapsed_ms = elapsed_ms,
    );
}

/// Emit event: evaluation answered from the cache.
pub fn emit_evaluation_cached(evaluation_id: &str, digest: &str) {
    info!(event = "evaluation.cached", evaluation_id = %evaluation_id, digest = %digest);
}

/// Emit event: generation completed.
pub fn emit_generation_completed(
    generation: usize,
    best_fitness: f64,
    mean_fitness: f64,
    evaluated: usize,
    failed: usize,
) {
    info!(
        event = "generation.completed",
        generation = generation,
        best_fitness = best_fitness,
        mean_fitness = mean_fitness,
        evaluated = evaluated,
        failed = failed,
    );
}

/// Emit event: best-so-far record replaced.
pub fn emit_best_improved(evaluation_id: &str, score: f64) {
    info!(event = "best.improved", evaluation_id = %evaluation_id, score = score);
}

/// Emit event: a report artifact could not be written (warning level).
pub fn emit_report_error(artifact: &str, error: &dyn std::fmt::Display) {
    warn!(event = "report.error", artifact = %artifact, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_do_not_panic() {
        emit_evaluation_started("g000-i000-abcd1234", "length=1.0");
        emit_evaluation_finished("g000-i000-abcd1234", 0.42, 0.035, 12.0, 12.0, 15);
        emit_evaluation_failed("g000-i001-abcd1234", "mesh", "mesher exited", 3);
        emit_evaluation_cached("g001-i002-abcd1234", "deadbeef");
        emit_generation_completed(1, 12.0, 3.5, 10, 2);
        emit_best_improved("g000-i000-abcd1234", 12.0);
        emit_report_error("history.csv", &"disk full");
    }

    #[test]
    fn test_spans_can_be_entered() {
        let run = run_span("run-1", "optimize");
        let _entered = run.enter();
        let _evaluation = evaluation_span("g000-i000-abcd1234", 0).entered();
    }
}
