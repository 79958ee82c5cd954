//! Application configuration.
//!
//! The configuration is a single YAML (`.yaml`/`.yml`) or JSON (`.json`)
//! document loaded once into an [`AppConfig`] and passed by reference to every
//! component. Relative paths resolve against the directory of the file.
//! [`AppConfig::load`] validates everything that can be checked without
//! running a tool, including the solver template placeholders.

use crate::design::{is_identifier, DesignSpace, DesignVariable};
use crate::error::ConfigError;
use crate::solver::template::SolverTemplate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Directory relative paths were resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    pub design_variables: Vec<DesignVariable>,

    #[serde(default)]
    pub geometry: GeometryConfig,

    #[serde(default)]
    pub mesh: MeshConfig,

    #[serde(default)]
    pub solver: SolverConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of every artifact written by a run.
    pub results_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
        }
    }
}

/// Shape family produced by the geometry generator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// Axisymmetric hollow nacelle.
    #[default]
    Fairing,
    /// Fuselage, main wing and horizontal tail.
    Uav,
}

/// Radial hole drilled through the fairing wall.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SamplingPort {
    /// Axial position of the port centre.
    pub position: f64,
    /// Port radius.
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeometryConfig {
    pub shape: ShapeKind,
    /// Values for shape parameters that are not design variables.
    pub defaults: BTreeMap<String, f64>,
    pub export_stl: bool,
    pub sampling_ports: Vec<SamplingPort>,
    pub timeout_secs: u64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            shape: ShapeKind::Fairing,
            defaults: BTreeMap::new(),
            export_stl: false,
            sampling_ports: Vec::new(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshConfig {
    pub min_size: f64,
    pub max_size: f64,
    /// Thickness of the refined near-wall region (0 disables refinement).
    pub boundary_layer_thickness: f64,
    pub boundary_layer_layers: u32,
    pub algorithm_3d: u32,
    pub element_order: u32,
    /// Far-field sphere radius as a multiple of the body's largest extent.
    pub farfield_scale: f64,
    pub wall_marker: String,
    pub farfield_marker: String,
    pub timeout_secs: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            min_size: 0.003,
            max_size: 0.008,
            boundary_layer_thickness: 0.0,
            boundary_layer_layers: 0,
            algorithm_3d: 1,
            element_order: 1,
            farfield_scale: 8.0,
            wall_marker: "WALL".to_string(),
            farfield_marker: "FARFIELD".to_string(),
            timeout_secs: 900,
        }
    }
}

/// Value substituted for a configured extra placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PlaceholderValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Template with `{name}` placeholders; the built-in Euler template when unset.
    pub template: Option<PathBuf>,
    pub config_filename: String,
    pub history_filename: String,
    pub breakdown_filename: String,
    pub extra_args: Vec<String>,
    pub timeout_secs: u64,
    pub max_iterations: u32,
    pub extra_placeholders: BTreeMap<String, PlaceholderValue>,
    pub flow: FlowConfig,
    pub convergence: ConvergenceConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            template: None,
            config_filename: "case.cfg".to_string(),
            history_filename: "history.csv".to_string(),
            breakdown_filename: "forces_breakdown.dat".to_string(),
            extra_args: Vec::new(),
            timeout_secs: 3600,
            max_iterations: 500,
            extra_placeholders: BTreeMap::new(),
            flow: FlowConfig::default(),
            convergence: ConvergenceConfig::default(),
        }
    }
}

/// Free-stream conditions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlowConfig {
    pub mach_number: Option<f64>,
    /// Free-stream velocity in m/s, used to derive the Mach number.
    pub velocity: Option<f64>,
    pub angle_of_attack: Option<f64>,
    /// Target cruise lift coefficient used to derive the angle of attack.
    pub cruise_lift_coefficient: Option<f64>,
    pub zero_lift_cl: f64,
    pub cl_alpha_per_deg: f64,
    pub gamma: f64,
    pub gas_constant: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub density: f64,
    pub viscosity: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            mach_number: None,
            velocity: None,
            angle_of_attack: None,
            cruise_lift_coefficient: None,
            zero_lift_cl: 0.2,
            cl_alpha_per_deg: 0.1,
            gamma: 1.4,
            gas_constant: 287.05,
            temperature: 288.15,
            pressure: 101_325.0,
            density: 1.225,
            viscosity: 1.81e-5,
        }
    }
}

/// What to do with a run whose final residual is above the threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnconvergedPolicy {
    /// Keep the coefficients, flag `converged = false`.
    #[default]
    Accept,
    /// Treat the run as a result-parse failure.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConvergenceConfig {
    pub residual_column: String,
    /// log10 residual level below which the run counts as converged.
    pub residual_threshold: f64,
    pub on_unconverged: UnconvergedPolicy,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            residual_column: "rms[Rho]".to_string(),
            residual_threshold: -6.0,
            on_unconverged: UnconvergedPolicy::Accept,
        }
    }
}

/// Objective term kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    MaximizeLiftToDrag,
    MinimizeDrag,
    TargetLift,
}

/// One weighted objective term.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectiveTerm {
    pub kind: ObjectiveKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Target lift coefficient for `target_lift`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

fn default_weight() -> f64 {
    1.0
}

impl ObjectiveTerm {
    pub fn new(kind: ObjectiveKind) -> Self {
        Self {
            kind,
            weight: 1.0,
            target: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    #[default]
    Tournament,
    Rank,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverKind {
    #[default]
    SinglePoint,
    Uniform,
    Blend,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundsPolicy {
    #[default]
    Clamp,
    Resample,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub generations: usize,
    pub elitism: usize,
    pub selection: SelectionKind,
    pub tournament_size: usize,
    pub crossover: CrossoverKind,
    pub crossover_rate: f64,
    /// BLX-alpha expansion factor for `blend` crossover.
    pub blend_alpha: f64,
    pub mutation_rate: f64,
    /// Mutation standard deviation as a fraction of each variable's range.
    pub mutation_sigma: f64,
    pub bounds_policy: BoundsPolicy,
    pub objectives: Vec<ObjectiveTerm>,
    pub penalty_fitness: f64,
    pub seed: Option<u64>,
    pub stall_generations: Option<usize>,
    pub stall_tolerance: f64,
    pub cache_evaluations: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 10,
            elitism: 1,
            selection: SelectionKind::Tournament,
            tournament_size: 3,
            crossover: CrossoverKind::SinglePoint,
            crossover_rate: 0.9,
            blend_alpha: 0.5,
            mutation_rate: 0.1,
            mutation_sigma: 0.1,
            bounds_policy: BoundsPolicy::Clamp,
            objectives: vec![ObjectiveTerm::new(ObjectiveKind::MaximizeLiftToDrag)],
            penalty_fitness: -1.0e6,
            seed: None,
            stall_generations: None,
            stall_tolerance: 1e-6,
            cache_evaluations: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Execute the solver; when false the configuration is rendered only.
    pub run_solver: bool,
    /// Post-process a single run (summary and plots).
    pub run_post: bool,
    pub max_parallel_evaluations: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            run_solver: true,
            run_post: false,
            max_parallel_evaluations: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub history_file: String,
    pub convergence_plot: String,
    /// Per-generation plot file name; must contain `{generation}`.
    pub plot_snapshot_pattern: Option<String>,
    pub best_design_file: String,
    /// Trailing iterations averaged by single-run post-processing.
    pub post_average_window: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            history_file: "history.csv".to_string(),
            convergence_plot: "convergence.svg".to_string(),
            plot_snapshot_pattern: None,
            best_design_file: "best_design.json".to_string(),
            post_average_window: 50,
        }
    }
}

/// Executable locations. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ToolsConfig {
    pub gmsh: Option<PathBuf>,
    pub su2_cfd: Option<PathBuf>,
}

impl AppConfig {
    /// Load, resolve and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let config: AppConfig = match ext.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
            Some("json") => serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        let config = config.resolved(&base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document, resolve paths against `base_dir` and validate.
    pub fn from_yaml_str(text: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: base_dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = config.resolved(base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Rebase relative paths onto `base_dir`.
    pub fn resolved(mut self, base_dir: &Path) -> Self {
        self.base_dir = base_dir.to_path_buf();
        self.paths.results_dir = resolve_path(base_dir, &self.paths.results_dir);
        if let Some(template) = &self.solver.template {
            self.solver.template = Some(resolve_path(base_dir, template));
        }
        self.tools.gmsh = self.tools.gmsh.take().map(|p| resolve_tool(base_dir, p));
        self.tools.su2_cfd = self.tools.su2_cfd.take().map(|p| resolve_tool(base_dir, p));
        self
    }

    /// The validated design space.
    pub fn design_space(&self) -> Result<DesignSpace, ConfigError> {
        DesignSpace::new(self.design_variables.clone())
    }

    /// Directory holding per-evaluation artifact directories.
    pub fn evaluations_dir(&self) -> PathBuf {
        self.paths.results_dir.join("evaluations")
    }

    /// Fail-fast validation of everything that does not need a tool run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.design_space()?;
        self.validate_geometry()?;
        self.validate_mesh()?;
        self.validate_solver()?;
        self.validate_optimizer()?;
        self.validate_report()?;
        SolverTemplate::load(self)?;
        Ok(())
    }

    /// Extra checks for optimization mode.
    pub fn validate_for_optimization(&self) -> Result<(), ConfigError> {
        if !self.execution.run_solver {
            return Err(ConfigError::Invalid(
                "optimization requires execution.run_solver = true".to_string(),
            ));
        }
        if self.design_variables.is_empty() {
            return Err(ConfigError::Invalid(
                "optimization requires at least one design variable".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_geometry(&self) -> Result<(), ConfigError> {
        require_timeout("geometry.timeout_secs", self.geometry.timeout_secs)
    }

    fn validate_mesh(&self) -> Result<(), ConfigError> {
        let mesh = &self.mesh;
        require_timeout("mesh.timeout_secs", mesh.timeout_secs)?;
        if !(mesh.min_size > 0.0 && mesh.max_size > 0.0) {
            return Err(ConfigError::Invalid(
                "mesh.min_size and mesh.max_size must be positive".to_string(),
            ));
        }
        if mesh.min_size > mesh.max_size {
            return Err(ConfigError::Invalid(format!(
                "mesh.min_size {} exceeds mesh.max_size {}",
                mesh.min_size, mesh.max_size
            )));
        }
        if mesh.farfield_scale <= 1.0 {
            return Err(ConfigError::Invalid(
                "mesh.farfield_scale must be greater than 1".to_string(),
            ));
        }
        if mesh.boundary_layer_thickness < 0.0 {
            return Err(ConfigError::Invalid(
                "mesh.boundary_layer_thickness must not be negative".to_string(),
            ));
        }
        if mesh.boundary_layer_thickness > 0.0 && mesh.boundary_layer_layers == 0 {
            return Err(ConfigError::Invalid(
                "mesh.boundary_layer_layers must be at least 1 when a thickness is set"
                    .to_string(),
            ));
        }
        if !(1..=2).contains(&mesh.element_order) {
            return Err(ConfigError::Invalid(
                "mesh.element_order must be 1 or 2".to_string(),
            ));
        }
        for marker in [&mesh.wall_marker, &mesh.farfield_marker] {
            if marker.is_empty() || marker.contains(char::is_whitespace) || marker.contains('"') {
                return Err(ConfigError::Invalid(format!(
                    "invalid boundary marker name {:?}",
                    marker
                )));
            }
        }
        if mesh.wall_marker == mesh.farfield_marker {
            return Err(ConfigError::Invalid(
                "wall and far-field markers must differ".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_solver(&self) -> Result<(), ConfigError> {
        let solver = &self.solver;
        require_timeout("solver.timeout_secs", solver.timeout_secs)?;
        for (key, name) in [
            ("solver.config_filename", &solver.config_filename),
            ("solver.history_filename", &solver.history_filename),
            ("solver.breakdown_filename", &solver.breakdown_filename),
        ] {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a plain file name, got {:?}",
                    key, name
                )));
            }
        }
        for name in solver.extra_placeholders.keys() {
            if !is_identifier(name) {
                return Err(ConfigError::Invalid(format!(
                    "extra placeholder {:?} is not an identifier",
                    name
                )));
            }
            if crate::solver::template::BUILTIN_PLACEHOLDERS.contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "extra placeholder {} shadows a built-in placeholder",
                    name
                )));
            }
        }
        let flow = &solver.flow;
        if let Some(mach) = flow.mach_number {
            if mach <= 0.0 {
                return Err(ConfigError::Invalid(
                    "solver.flow.mach_number must be positive".to_string(),
                ));
            }
        }
        if let Some(velocity) = flow.velocity {
            if velocity <= 0.0 {
                return Err(ConfigError::Invalid(
                    "solver.flow.velocity must be positive".to_string(),
                ));
            }
        }
        if flow.cl_alpha_per_deg == 0.0 {
            return Err(ConfigError::Invalid(
                "solver.flow.cl_alpha_per_deg must not be zero".to_string(),
            ));
        }
        if flow.gamma <= 1.0 || flow.gas_constant <= 0.0 || flow.temperature <= 0.0 {
            return Err(ConfigError::Invalid(
                "solver.flow gas properties must be physical (gamma > 1, R > 0, T > 0)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn validate_optimizer(&self) -> Result<(), ConfigError> {
        let opt = &self.optimizer;
        if opt.population_size < 2 {
            return Err(ConfigError::Invalid(
                "optimizer.population_size must be at least 2".to_string(),
            ));
        }
        if opt.elitism >= opt.population_size {
            return Err(ConfigError::Invalid(format!(
                "optimizer.elitism {} must be below population_size {}",
                opt.elitism, opt.population_size
            )));
        }
        if opt.tournament_size == 0 {
            return Err(ConfigError::Invalid(
                "optimizer.tournament_size must be at least 1".to_string(),
            ));
        }
        for (key, rate) in [
            ("crossover_rate", opt.crossover_rate),
            ("mutation_rate", opt.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::Invalid(format!(
                    "optimizer.{} must be within [0, 1], got {}",
                    key, rate
                )));
            }
        }
        if !(opt.mutation_sigma > 0.0) {
            return Err(ConfigError::Invalid(
                "optimizer.mutation_sigma must be positive".to_string(),
            ));
        }
        if opt.blend_alpha < 0.0 {
            return Err(ConfigError::Invalid(
                "optimizer.blend_alpha must not be negative".to_string(),
            ));
        }
        if opt.objectives.is_empty() {
            return Err(ConfigError::Invalid(
                "optimizer.objectives must name at least one objective".to_string(),
            ));
        }
        for term in &opt.objectives {
            if term.kind == ObjectiveKind::TargetLift && term.target.is_none() {
                return Err(ConfigError::Invalid(
                    "target_lift objective requires a target".to_string(),
                ));
            }
            if !term.weight.is_finite() || term.weight <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "objective weight must be positive, got {}",
                    term.weight
                )));
            }
        }
        if !opt.penalty_fitness.is_finite() {
            return Err(ConfigError::Invalid(
                "optimizer.penalty_fitness must be finite".to_string(),
            ));
        }
        if opt.stall_generations == Some(0) {
            return Err(ConfigError::Invalid(
                "optimizer.stall_generations must be at least 1 when set".to_string(),
            ));
        }
        if self.execution.max_parallel_evaluations == 0 {
            return Err(ConfigError::Invalid(
                "execution.max_parallel_evaluations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_report(&self) -> Result<(), ConfigError> {
        if let Some(pattern) = &self.report.plot_snapshot_pattern {
            if !pattern.contains("{generation}") {
                return Err(ConfigError::Invalid(format!(
                    "report.plot_snapshot_pattern {:?} must contain {{generation}}",
                    pattern
                )));
            }
        }
        Ok(())
    }
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Bare executable names stay as-is for `PATH` lookup.
fn resolve_tool(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.components().count() > 1 {
        resolve_path(base_dir, &path)
    } else {
        path
    }
}

/// Every external tool run must be bounded.
fn require_timeout(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid(format!(
            "{} must be at least 1 second",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
design_variables:
  - name: length
    lower: 0.8
    upper: 1.2
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::from_yaml_str(MINIMAL, Path::new("/work")).unwrap();
        assert_eq!(config.paths.results_dir, PathBuf::from("/work/results"));
        assert_eq!(config.geometry.shape, ShapeKind::Fairing);
        assert_eq!(config.mesh.farfield_scale, 8.0);
        assert_eq!(config.optimizer.penalty_fitness, -1.0e6);
        assert_eq!(
            config.optimizer.objectives,
            vec![ObjectiveTerm::new(ObjectiveKind::MaximizeLiftToDrag)]
        );
        assert!(config.execution.run_solver);
        assert_eq!(config.evaluations_dir(), PathBuf::from("/work/results/evaluations"));
    }

    #[test]
    fn test_tool_paths_resolution() {
        let yaml = format!(
            "{}tools:\n  gmsh: gmsh\n  su2_cfd: bin/SU2_CFD\n",
            MINIMAL
        );
        let config = AppConfig::from_yaml_str(&yaml, Path::new("/work")).unwrap();
        assert_eq!(config.tools.gmsh, Some(PathBuf::from("gmsh")));
        assert_eq!(config.tools.su2_cfd, Some(PathBuf::from("/work/bin/SU2_CFD")));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = format!("{}bogus: 1\n", MINIMAL);
        let err = AppConfig::from_yaml_str(&yaml, Path::new("/work")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_elitism_must_be_below_population() {
        let yaml = format!("{}optimizer:\n  population_size: 4\n  elitism: 4\n", MINIMAL);
        let err = AppConfig::from_yaml_str(&yaml, Path::new("/work")).unwrap_err();
        assert!(err.to_string().contains("elitism"));
    }

    #[test]
    fn test_target_lift_requires_target() {
        let yaml = format!("{}optimizer:\n  objectives:\n    - kind: target_lift\n", MINIMAL);
        let err = AppConfig::from_yaml_str(&yaml, Path::new("/work")).unwrap_err();
        assert!(err.to_string().contains("target"));
    }

    #[test]
    fn test_snapshot_pattern_requires_generation_token() {
        let yaml = format!("{}report:\n  plot_snapshot_pattern: plot.svg\n", MINIMAL);
        let err = AppConfig::from_yaml_str(&yaml, Path::new("/work")).unwrap_err();
        assert!(err.to_string().contains("{generation}"));
    }

    #[test]
    fn test_extra_placeholder_cannot_shadow_builtin() {
        let yaml = format!(
            "{}solver:\n  extra_placeholders:\n    mach_number: 0.5\n",
            MINIMAL
        );
        let err = AppConfig::from_yaml_str(&yaml, Path::new("/work")).unwrap_err();
        assert!(err.to_string().contains("shadows"));
    }

    #[test]
    fn test_optimization_requires_run_solver() {
        let yaml = format!("{}execution:\n  run_solver: false\n", MINIMAL);
        let config = AppConfig::from_yaml_str(&yaml, Path::new("/work")).unwrap();
        assert!(config.validate_for_optimization().is_err());
    }

    #[test]
    fn test_placeholder_value_untagged() {
        let yaml = format!(
            "{}solver:\n  extra_placeholders:\n    cfl: 5.0\n    turbulence: SA\n",
            MINIMAL
        );
        let config = AppConfig::from_yaml_str(&yaml, Path::new("/work")).unwrap();
        assert_eq!(
            config.solver.extra_placeholders.get("cfl"),
            Some(&PlaceholderValue::Number(5.0))
        );
        assert_eq!(
            config.solver.extra_placeholders.get("turbulence"),
            Some(&PlaceholderValue::Text("SA".to_string()))
        );
    }
}
