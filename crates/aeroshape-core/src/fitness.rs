//! Fitness evaluation: design vector -> aerodynamic result -> fitness.
//!
//! [`AeroAnalysis`] is the seam between the optimizer and the external tool
//! chain. [`CfdPipeline`] is the real implementation (geometry, mesh,
//! solver, parse). [`FitnessEvaluator`] wraps an analysis and turns every
//! stage error into an explicit [`Outcome::Failed`] carrying the penalty
//! fitness, so nothing propagates to the optimizer.

use crate::config::{AppConfig, ObjectiveKind, ObjectiveTerm};
use crate::design::DesignVector;
use crate::error::{FailureKind, StageResult};
use crate::geometry::{GeometryArtifact, GeometryGenerator};
use crate::mesh::{MeshArtifact, MeshGenerator};
use crate::obs;
use crate::solver::{parse_results, AerodynamicCoefficients, SolverInterface, SolverRun, SolverTemplate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Produces aerodynamic coefficients for a design vector.
#[async_trait]
pub trait AeroAnalysis: Send + Sync {
    /// Analyse `vector`, writing artifacts under `work_dir`.
    async fn analyze(
        &self,
        vector: &DesignVector,
        work_dir: &Path,
        evaluation_id: &str,
    ) -> StageResult<AerodynamicCoefficients>;
}

/// Artifacts of a geometry + mesh + rendered solver case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreparedCase {
    pub geometry: GeometryArtifact,
    pub mesh: MeshArtifact,
    pub solver: SolverRun,
}

/// The external tool chain: Gmsh geometry, Gmsh mesh, SU2 solve, parse.
pub struct CfdPipeline {
    config: Arc<AppConfig>,
    template: Arc<SolverTemplate>,
}

impl CfdPipeline {
    pub fn new(config: Arc<AppConfig>, template: Arc<SolverTemplate>) -> Self {
        Self { config, template }
    }

    /// Load the solver template from `config` and build the pipeline.
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, crate::error::ConfigError> {
        let template = Arc::new(SolverTemplate::load(&config)?);
        Ok(Self::new(config, template))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Build geometry and mesh, then render the solver configuration.
    /// Only the CAD kernel and the mesher are spawned.
    pub async fn prepare(
        &self,
        vector: &DesignVector,
        work_dir: &Path,
        evaluation_id: &str,
    ) -> StageResult<PreparedCase> {
        let geometry = GeometryGenerator::new(&self.config)
            .generate(vector, &work_dir.join("geometry"), evaluation_id)
            .await?;

        let mesh = MeshGenerator::new(&self.config.mesh, self.config.tools.gmsh.as_deref())
            .generate(&geometry, &work_dir.join("mesh"))
            .await?;

        let solver = SolverInterface::new(&self.config, &self.template)
            .prepare(&work_dir.join("solver"), &mesh, &geometry.metadata, vector)
            .await?;

        Ok(PreparedCase {
            geometry,
            mesh,
            solver,
        })
    }

    /// Run the solver of a prepared case and parse its outputs.
    pub async fn solve(&self, case: &mut PreparedCase) -> StageResult<AerodynamicCoefficients> {
        SolverInterface::new(&self.config, &self.template)
            .execute(&mut case.solver)
            .await?;
        let coefficients = parse_results(
            &case.solver.history_path,
            &case.solver.breakdown_path,
            &self.config.solver.convergence,
        )
        .await?;
        Ok(coefficients)
    }
}

#[async_trait]
impl AeroAnalysis for CfdPipeline {
    async fn analyze(
        &self,
        vector: &DesignVector,
        work_dir: &Path,
        evaluation_id: &str,
    ) -> StageResult<AerodynamicCoefficients> {
        let mut case = self.prepare(vector, work_dir, evaluation_id).await?;
        self.solve(&mut case).await
    }
}

/// Result of one evaluation: complete coefficients or an explicit failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        coefficients: AerodynamicCoefficients,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
}

impl Outcome {
    pub fn from_stage(result: StageResult<AerodynamicCoefficients>) -> Self {
        match result {
            Ok(coefficients) => Outcome::Success { coefficients },
            Err(err) => Outcome::Failed {
                kind: err.kind(),
                reason: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn coefficients(&self) -> Option<&AerodynamicCoefficients> {
        match self {
            Outcome::Success { coefficients } => Some(coefficients),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Failed { .. } => "failed",
        }
    }
}

/// Ranking score (always maximised) plus per-objective components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fitness {
    pub score: f64,
    pub components: Vec<f64>,
}

/// Weighted objective terms and the penalty for failed evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    terms: Vec<ObjectiveTerm>,
    penalty: f64,
}

impl Objective {
    pub fn new(terms: Vec<ObjectiveTerm>, penalty: f64) -> Self {
        Self { terms, penalty }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.optimizer.objectives.clone(),
            config.optimizer.penalty_fitness,
        )
    }

    pub fn terms(&self) -> &[ObjectiveTerm] {
        &self.terms
    }

    pub fn penalty(&self) -> Fitness {
        Fitness {
            score: self.penalty,
            components: vec![self.penalty; self.terms.len()],
        }
    }

    /// Score coefficients; non-finite scores fall back to the penalty.
    pub fn score(&self, coefficients: &AerodynamicCoefficients) -> Fitness {
        let components: Vec<f64> = self
            .terms
            .iter()
            .map(|term| term_value(term, coefficients))
            .collect();
        let score = self
            .terms
            .iter()
            .zip(&components)
            .map(|(term, value)| term.weight * value)
            .sum::<f64>();
        if score.is_finite() {
            Fitness { score, components }
        } else {
            self.penalty()
        }
    }

    pub fn fitness(&self, outcome: &Outcome) -> Fitness {
        match outcome {
            Outcome::Success { coefficients } => self.score(coefficients),
            Outcome::Failed { .. } => self.penalty(),
        }
    }
}

fn term_value(term: &ObjectiveTerm, c: &AerodynamicCoefficients) -> f64 {
    match term.kind {
        ObjectiveKind::MaximizeLiftToDrag => c.lift_to_drag,
        ObjectiveKind::MinimizeDrag => -c.cd,
        ObjectiveKind::TargetLift => {
            let target = term.target.unwrap_or(0.0);
            -(c.cl - target).powi(2)
        }
    }
}

/// One scored design vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub id: String,
    pub generation: usize,
    pub index: usize,
    pub vector: DesignVector,
    pub outcome: Outcome,
    pub fitness: Fitness,
    pub elapsed_ms: u64,
    /// Whether the outcome was reused from an earlier identical vector.
    #[serde(default)]
    pub cached: bool,
}

impl Evaluation {
    pub fn score(&self) -> f64 {
        self.fitness.score
    }

    /// Copy of this evaluation's outcome attributed to a new slot.
    pub fn reuse(&self, generation: usize, index: usize, vector: DesignVector) -> Self {
        Self {
            id: evaluation_id(generation, index),
            generation,
            index,
            vector,
            outcome: self.outcome.clone(),
            fitness: self.fitness.clone(),
            elapsed_ms: 0,
            cached: true,
        }
    }
}

/// `g<gen>-i<index>-<uuid8>`: unique per evaluation.
pub fn evaluation_id(generation: usize, index: usize) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("g{:03}-i{:03}-{}", generation, index, &uuid[..8])
}

/// Maps design vectors to evaluations, never failing.
pub struct FitnessEvaluator {
    analysis: Arc<dyn AeroAnalysis>,
    objective: Objective,
    evaluations_dir: PathBuf,
}

impl FitnessEvaluator {
    pub fn new(analysis: Arc<dyn AeroAnalysis>, objective: Objective, evaluations_dir: PathBuf) -> Self {
        Self {
            analysis,
            objective,
            evaluations_dir,
        }
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Evaluate `vector` in its own directory under the evaluations root.
    pub async fn evaluate(&self, generation: usize, index: usize, vector: DesignVector) -> Evaluation {
        let id = evaluation_id(generation, index);
        let work_dir = self.evaluations_dir.join(&id);
        let span = obs::evaluation_span(&id, generation);

        async {
            obs::emit_evaluation_started(&id, &vector.to_string());
            let start = Instant::now();
            let result = self.analysis.analyze(&vector, &work_dir, &id).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let outcome = Outcome::from_stage(result);
            let fitness = self.objective.fitness(&outcome);
            match &outcome {
                Outcome::Success { coefficients } => obs::emit_evaluation_finished(
                    &id,
                    coefficients.cl,
                    coefficients.cd,
                    coefficients.lift_to_drag,
                    fitness.score,
                    elapsed_ms,
                ),
                Outcome::Failed { kind, reason } => {
                    obs::emit_evaluation_failed(&id, kind.as_str(), reason, elapsed_ms)
                }
            }

            Evaluation {
                id: id.clone(),
                generation,
                index,
                vector,
                outcome,
                fitness,
                elapsed_ms,
                cached: false,
            }
        }
        .instrument(span)
        .await
    }
}
