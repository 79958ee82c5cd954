//! Error taxonomy for the aeroshape workflow.
//!
//! - Stage errors ([`GeometryError`], [`MeshError`], [`SolverError`],
//!   [`ResultParseError`]) are grouped under [`StageError`]. During
//!   optimization they become penalty fitness; in a single run they are fatal.
//! - [`ConfigError`] is always fatal and raised before any tool runs.

use aeroshape_tools::ToolError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Errors raised while building the CAD geometry.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("missing geometry parameter: {name}")]
    MissingParameter { name: String },

    #[error("invalid geometry parameters: {0}")]
    InvalidParameters(String),

    #[error("CAD kernel invocation failed: {0}")]
    Tool(#[source] ToolError),

    #[error("CAD kernel exited with code {exit_code}: {diagnostic}")]
    KernelFailed { exit_code: i32, diagnostic: String },

    #[error("geometry file missing or empty: {}", .path.display())]
    MissingOutput { path: PathBuf },

    #[error("geometry i/o error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while generating the volume mesh.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("geometry file not found: {}", .path.display())]
    MissingGeometry { path: PathBuf },

    #[error("mesher invocation failed: {0}")]
    Tool(#[source] ToolError),

    #[error("mesher exited with code {exit_code}: {diagnostic}")]
    MesherFailed { exit_code: i32, diagnostic: String },

    #[error("mesh file not produced: {}", .path.display())]
    MissingOutput { path: PathBuf },

    #[error("mesh has no elements: {}", .path.display())]
    EmptyMesh { path: PathBuf },

    #[error("malformed SU2 mesh header in {}: {reason}", .path.display())]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("mesh i/o error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while configuring or running the CFD solver.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("mesh file not found: {}", .path.display())]
    MissingMesh { path: PathBuf },

    #[error("solver invocation failed: {0}")]
    Tool(#[source] ToolError),

    #[error("solver exited with code {exit_code}: {diagnostic}")]
    SolverFailed { exit_code: i32, diagnostic: String },

    #[error("solver i/o error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while reading coefficients from solver outputs.
#[derive(Debug, thiserror::Error)]
pub enum ResultParseError {
    #[error("history file not found: {}", .path.display())]
    MissingHistory { path: PathBuf },

    #[error("history file has no header row")]
    MissingHeader,

    #[error("history file has no data rows")]
    NoDataRows,

    #[error("history column not found: {column}")]
    MissingColumn { column: String },

    #[error("unparsable value {value:?} in column {column}")]
    InvalidNumber { column: String, value: String },

    #[error("force breakdown lacks CL/CD values: {}", .path.display())]
    BreakdownIncomplete { path: PathBuf },

    #[error("non-positive drag coefficient: {cd}")]
    NonPositiveDrag { cd: f64 },

    #[error("solver did not converge: final residual {residual} above threshold {threshold}")]
    NotConverged { residual: f64, threshold: f64 },

    #[error("residual column {column} absent, cannot confirm convergence")]
    ConvergenceUnknown { column: String },

    #[error("result i/o error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any failure of the geometry -> mesh -> solver -> parse chain.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("geometry stage failed: {0}")]
    Geometry(#[from] GeometryError),

    #[error("mesh stage failed: {0}")]
    Mesh(#[from] MeshError),

    #[error("solver stage failed: {0}")]
    Solver(#[from] SolverError),

    #[error("result parsing failed: {0}")]
    ResultParse(#[from] ResultParseError),
}

impl StageError {
    /// Serialisable tag identifying the failing stage.
    pub fn kind(&self) -> FailureKind {
        match self {
            StageError::Geometry(_) => FailureKind::Geometry,
            StageError::Mesh(_) => FailureKind::Mesh,
            StageError::Solver(_) => FailureKind::Solver,
            StageError::ResultParse(_) => FailureKind::ResultParse,
        }
    }
}

/// Stage at which an evaluation failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Geometry,
    Mesh,
    Solver,
    ResultParse,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Geometry => "geometry",
            FailureKind::Mesh => "mesh",
            FailureKind::Solver => "solver",
            FailureKind::ResultParse => "result_parse",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported configuration format: {} (expected .yaml, .yml or .json)", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid design variable {name}: {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("unknown placeholder {{{name}}} in solver template {template}")]
    UnknownPlaceholder { name: String, template: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type StageResult<T> = std::result::Result<T, StageError>;

/// Single-run failures: configuration problems or a failed stage.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stage(#[from] StageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_kind() {
        let err: StageError = GeometryError::MissingParameter {
            name: "length".to_string(),
        }
        .into();
        assert_eq!(err.kind(), FailureKind::Geometry);
        assert!(err.to_string().contains("missing geometry parameter: length"));

        let err: StageError = ResultParseError::NoDataRows.into();
        assert_eq!(err.kind(), FailureKind::ResultParse);
    }

    #[test]
    fn test_failure_kind_serde() {
        let json = serde_json::to_string(&FailureKind::ResultParse).unwrap();
        assert_eq!(json, "\"result_parse\"");
        assert_eq!(FailureKind::Mesh.to_string(), "mesh");
    }

    #[test]
    fn test_unknown_placeholder_message() {
        let err = ConfigError::UnknownPlaceholder {
            name: "mach".to_string(),
            template: "case.cfg".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unknown placeholder {mach} in solver template case.cfg"
        );
    }
}
