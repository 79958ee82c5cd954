//! External tool definitions and invocation settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// External executables the workflow knows how to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinTool {
    /// Gmsh, used both as CAD kernel (OpenCASCADE factory) and mesher.
    Gmsh,

    /// SU2 single-zone CFD driver.
    Su2Cfd,
}

impl BuiltinTool {
    /// Get the tool name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::Gmsh => "gmsh",
            BuiltinTool::Su2Cfd => "su2_cfd",
        }
    }

    /// Executable looked up on `PATH` when no explicit path is configured.
    pub fn default_program(&self) -> &'static str {
        match self {
            BuiltinTool::Gmsh => "gmsh",
            BuiltinTool::Su2Cfd => "SU2_CFD",
        }
    }

    /// Build a command for this tool, using `program` when given.
    pub fn command(&self, program: Option<&Path>) -> ToolCommand {
        let program = program
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(self.default_program()));
        ToolCommand::new(self.name(), program)
    }
}

/// A single invocation of an external tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCommand {
    /// Human-readable tool name used in logs and errors.
    pub name: String,

    /// Executable to run.
    pub program: PathBuf,

    /// Command-line arguments.
    pub args: Vec<String>,

    /// Working directory for the child (inherits the parent's when `None`).
    pub working_dir: Option<PathBuf>,

    /// Timeout in seconds (0 = wait indefinitely).
    pub timeout_secs: u64,

    /// Where to persist captured stdout/stderr, if anywhere.
    pub log_file: Option<PathBuf>,
}

impl ToolCommand {
    /// Create a command with no arguments and no timeout.
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout_secs: 0,
            log_file: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the child inside `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Bound the invocation by `secs` seconds (0 disables the bound).
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Write captured output to `path` once the tool exits.
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Shell-like rendering for log lines.
    pub fn display_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}
