//! Solver case preparation and execution.

use crate::config::AppConfig;
use crate::design::DesignVector;
use crate::error::SolverError;
use crate::geometry::GeometryMetadata;
use crate::mesh::MeshArtifact;
use crate::solver::flow::FlowConditions;
use crate::solver::template::{format_number, SolverTemplate};
use aeroshape_tools::{BuiltinTool, ToolRunner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files of one solver case, retained on disk for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverRun {
    pub case_dir: PathBuf,
    pub config_path: PathBuf,
    pub mesh_path: PathBuf,
    pub log_path: PathBuf,
    pub history_path: PathBuf,
    pub breakdown_path: PathBuf,
    pub flow: FlowConditions,
    /// Whether the solver process was run.
    pub executed: bool,
}

/// Renders solver configurations and drives the solver executable.
pub struct SolverInterface<'a> {
    config: &'a AppConfig,
    template: &'a SolverTemplate,
}

impl<'a> SolverInterface<'a> {
    pub fn new(config: &'a AppConfig, template: &'a SolverTemplate) -> Self {
        Self { config, template }
    }

    /// Placeholder values for one case.
    pub fn placeholder_values(
        &self,
        mesh_filename: &str,
        flow: &FlowConditions,
        geometry: &GeometryMetadata,
        vector: &DesignVector,
    ) -> BTreeMap<String, String> {
        let solver = &self.config.solver;
        let mut values = BTreeMap::new();
        let mut put = |name: &str, value: String| {
            values.insert(name.to_string(), value);
        };

        put("mesh_filename", mesh_filename.to_string());
        put("mach_number", format_number(flow.mach_number));
        put("angle_of_attack", format_number(flow.angle_of_attack));
        put("reynolds_number", format_number(flow.reynolds_number));
        put("reference_length", format_number(geometry.reference_length));
        put("reference_area", format_number(geometry.reference_area));
        put("freestream_temperature", format_number(flow.temperature));
        put("freestream_pressure", format_number(flow.pressure));
        put("wall_marker", self.config.mesh.wall_marker.clone());
        put("farfield_marker", self.config.mesh.farfield_marker.clone());
        put("max_iterations", solver.max_iterations.to_string());
        put("conv_filename", conv_filename(&solver.history_filename));
        put("breakdown_filename", solver.breakdown_filename.clone());

        for entry in vector.entries() {
            values
                .entry(entry.name.clone())
                .or_insert_with(|| format_number(entry.value));
        }
        for (name, value) in &solver.extra_placeholders {
            values.insert(name.clone(), value.to_string());
        }
        values
    }

    /// Create the case directory, copy the mesh into it and write the
    /// rendered configuration. Spawns nothing.
    pub async fn prepare(
        &self,
        case_dir: &Path,
        mesh: &MeshArtifact,
        geometry: &GeometryMetadata,
        vector: &DesignVector,
    ) -> Result<SolverRun, SolverError> {
        let solver = &self.config.solver;
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| SolverError::Io { path, source }
        };

        if !mesh.mesh_path.is_file() {
            return Err(SolverError::MissingMesh {
                path: mesh.mesh_path.clone(),
            });
        }
        tokio::fs::create_dir_all(case_dir)
            .await
            .map_err(io_err(case_dir))?;

        let mesh_filename = mesh
            .mesh_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mesh.su2".to_string());
        let local_mesh = case_dir.join(&mesh_filename);
        if local_mesh != mesh.mesh_path {
            tokio::fs::copy(&mesh.mesh_path, &local_mesh)
                .await
                .map_err(io_err(&local_mesh))?;
        }

        let flow = FlowConditions::resolve(&solver.flow, vector, geometry.reference_length);
        let values = self.placeholder_values(&mesh_filename, &flow, geometry, vector);
        let rendered = self.template.render(&values);

        let config_path = case_dir.join(&solver.config_filename);
        tokio::fs::write(&config_path, rendered)
            .await
            .map_err(io_err(&config_path))?;

        debug!(
            config = %config_path.display(),
            mach = flow.mach_number,
            aoa = flow.angle_of_attack,
            "Solver configuration rendered"
        );

        Ok(SolverRun {
            case_dir: case_dir.to_path_buf(),
            config_path,
            mesh_path: local_mesh,
            log_path: case_dir.join("solver.log"),
            history_path: case_dir.join(&solver.history_filename),
            breakdown_path: case_dir.join(&solver.breakdown_filename),
            flow,
            executed: false,
        })
    }

    /// Run `<solver> <config> [extra args]` in the case directory and block
    /// until it exits or the timeout elapses.
    pub async fn execute(&self, run: &mut SolverRun) -> Result<(), SolverError> {
        let solver = &self.config.solver;
        let config_name = run
            .config_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| solver.config_filename.clone());

        let command = BuiltinTool::Su2Cfd
            .command(self.config.tools.su2_cfd.as_deref())
            .arg(config_name)
            .args(solver.extra_args.iter().cloned())
            .current_dir(&run.case_dir)
            .timeout_secs(solver.timeout_secs)
            .log_to(&run.log_path);

        info!(case_dir = %run.case_dir.display(), "Running solver");
        let output = ToolRunner::execute(&command)
            .await
            .map_err(SolverError::Tool)?;
        run.executed = true;

        if !output.passed() {
            return Err(SolverError::SolverFailed {
                exit_code: output.exit_code,
                diagnostic: output.tail(20),
            });
        }

        info!(
            case_dir = %run.case_dir.display(),
            duration_ms = output.duration_ms,
            "Solver finished"
        );
        Ok(())
    }
}

/// SU2 appends `.csv` to `CONV_FILENAME`, so the placeholder carries the stem.
pub fn conv_filename(history_filename: &str) -> String {
    history_filename
        .strip_suffix(".csv")
        .unwrap_or(history_filename)
        .to_string()
}
