//! aeroshape Core Library
//!
//! Geometry generation, meshing, SU2 solver orchestration and genetic
//! optimization of aerodynamic shapes. External programs (Gmsh, SU2) are
//! driven through `aeroshape-tools`.

pub mod config;
pub mod design;
pub mod error;
pub mod fitness;
pub mod geometry;
pub mod mesh;
pub mod obs;
pub mod optimizer;
pub mod pipeline;
pub mod report;
pub mod solver;
pub mod telemetry;

pub use config::{AppConfig, ObjectiveKind, ObjectiveTerm};
pub use design::{DesignEntry, DesignSpace, DesignVariable, DesignVector};
pub use error::{
    ConfigError, FailureKind, GeometryError, MeshError, ResultParseError, RunError, SolverError,
    StageError, StageResult,
};
pub use fitness::{
    AeroAnalysis, CfdPipeline, Evaluation, Fitness, FitnessEvaluator, Objective, Outcome,
    PreparedCase,
};
pub use geometry::{GeometryArtifact, GeometryGenerator, GeometryMetadata};
pub use mesh::{MeshArtifact, MeshGenerator, Su2MeshInfo};
pub use optimizer::{
    GenerationSummary, GeneticOptimizer, Individual, NoopObserver, OptimizationResult,
    ProgressObserver,
};
pub use pipeline::{run_optimization, run_optimization_with, run_single, SingleRunReport};
pub use report::{BestDesignReport, PostReport, Reporter};
pub use solver::{
    parse_results, AerodynamicCoefficients, FlowConditions, SolverInterface, SolverRun,
    SolverTemplate,
};
pub use telemetry::init_tracing;
