//! aeroshape tools - invocation of the external engineering executables
//!
//! Provides a small subprocess layer that:
//! - Runs the mesher (`gmsh`) and the CFD solver (`SU2_CFD`) as child processes
//! - Bounds every invocation with a wall-clock timeout
//! - Kills the child when the wait is abandoned (timeout or drop)
//! - Captures stdout/stderr and optionally persists them as a log file

pub mod error;
pub mod runner;
pub mod tool;

// Re-export key types
pub use error::ToolError;
pub use runner::{ToolOutput, ToolRunner};
pub use tool::{BuiltinTool, ToolCommand};
