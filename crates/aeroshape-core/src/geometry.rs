//! Parametric geometry generation through Gmsh `.geo` scripts.
//!
//! The generator writes a script using the OpenCASCADE factory, runs
//! `gmsh <script> -parse_and_exit` in the output directory and checks that
//! the STEP file (and optionally the STL file) was produced.
//!
//! Two shape families are supported:
//! - `fairing`: spline-profiled hollow nacelle revolved about the X axis,
//!   with optional radial sampling ports
//! - `uav`: cylindrical fuselage, swept/tapered main wing and horizontal tail

use crate::config::{AppConfig, SamplingPort, ShapeKind};
use crate::design::DesignVector;
use crate::error::GeometryError;
use aeroshape_tools::{BuiltinTool, ToolRunner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const GEOMETRY_SCRIPT: &str = "geometry.geo";
pub const STEP_FILE: &str = "model.step";
pub const STL_FILE: &str = "model.stl";

/// Smallest inner radius left after subtracting the wall thickness.
const MIN_INNER_RADIUS: f64 = 1e-4;

/// Quantities derived from the shape parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeometryMetadata {
    pub characteristic_length: f64,
    pub reference_length: f64,
    pub reference_area: f64,
    /// Shape-specific values (aspect ratio, wing area, ...).
    #[serde(default)]
    pub extras: BTreeMap<String, f64>,
}

/// Files produced for one design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeometryArtifact {
    pub evaluation_id: String,
    pub script_path: PathBuf,
    pub step_path: PathBuf,
    pub stl_path: Option<PathBuf>,
    pub metadata: GeometryMetadata,
}

/// Axisymmetric fairing dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairingParams {
    pub length: f64,
    pub inlet_radius: f64,
    pub outlet_radius: f64,
    pub wall_thickness: f64,
}

impl FairingParams {
    /// Control points `(x, r)` of the outer profile spline.
    pub fn outer_profile(&self) -> [(f64, f64); 5] {
        let l = self.length;
        let r_in = self.inlet_radius;
        let r_out = self.outlet_radius;
        [
            (0.0, r_in),
            (0.15 * l, 0.95 * r_in),
            (0.45 * l, 0.55 * (r_in + r_out)),
            (0.75 * l, 1.05 * r_out),
            (l, r_out),
        ]
    }

    /// Outer profile with every radius reduced by the wall thickness.
    pub fn inner_profile(&self) -> [(f64, f64); 5] {
        self.outer_profile()
            .map(|(x, r)| (x, (r - self.wall_thickness).max(MIN_INNER_RADIUS)))
    }

    fn max_radius(&self) -> f64 {
        self.outer_profile()
            .iter()
            .fold(0.0_f64, |acc, &(_, r)| acc.max(r))
    }

    fn validate(&self, ports: &[SamplingPort]) -> Result<(), GeometryError> {
        let invalid = |msg: String| Err(GeometryError::InvalidParameters(msg));
        for (name, value) in [
            ("length", self.length),
            ("inlet_radius", self.inlet_radius),
            ("outlet_radius", self.outlet_radius),
            ("wall_thickness", self.wall_thickness),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{} must be positive, got {}", name, value));
            }
        }
        let min_radius = self.inlet_radius.min(self.outlet_radius);
        if self.wall_thickness >= min_radius {
            return invalid(format!(
                "wall_thickness {} must be smaller than the smallest radius {}",
                self.wall_thickness, min_radius
            ));
        }
        for port in ports {
            if !(port.radius > 0.0) {
                return invalid(format!("sampling port radius must be positive, got {}", port.radius));
            }
            if port.position - port.radius <= 0.0 || port.position + port.radius >= self.length {
                return invalid(format!(
                    "sampling port at {} (radius {}) lies outside the body length {}",
                    port.position, port.radius, self.length
                ));
            }
        }
        Ok(())
    }

    pub fn metadata(&self) -> GeometryMetadata {
        let mut extras = BTreeMap::new();
        extras.insert("max_radius".to_string(), self.max_radius());
        extras.insert("wall_thickness".to_string(), self.wall_thickness);
        GeometryMetadata {
            characteristic_length: self.length,
            reference_length: self.length,
            reference_area: std::f64::consts::PI * self.inlet_radius * self.inlet_radius,
            extras,
        }
    }
}

/// Fuselage, wing and tail dimensions. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UavParams {
    pub wing_span: f64,
    pub wing_root_chord: f64,
    pub wing_taper_ratio: f64,
    pub wing_sweep: f64,
    pub wing_dihedral: f64,
    pub tail_volume_coefficient: f64,
    pub fuselage_length: f64,
    pub fuselage_diameter: f64,
    /// Reference area used for tail sizing.
    pub reference_area: f64,
}

impl UavParams {
    pub fn tip_chord(&self) -> f64 {
        self.wing_root_chord * self.wing_taper_ratio
    }

    pub fn wing_area(&self) -> f64 {
        self.wing_span * (self.wing_root_chord + self.tip_chord()) / 2.0
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.wing_span * self.wing_span / self.wing_area()
    }

    pub fn mean_chord(&self) -> f64 {
        self.wing_area() / self.wing_span
    }

    pub fn tail_area(&self) -> f64 {
        self.tail_volume_coefficient * self.reference_area
    }

    /// Tail span for an aspect ratio of 4.
    pub fn tail_span(&self) -> f64 {
        (4.0 * self.tail_area()).sqrt()
    }

    fn validate(&self) -> Result<(), GeometryError> {
        let invalid = |msg: String| Err(GeometryError::InvalidParameters(msg));
        for (name, value) in [
            ("wing_span", self.wing_span),
            ("wing_root_chord", self.wing_root_chord),
            ("tail_volume_coefficient", self.tail_volume_coefficient),
            ("fuselage_length", self.fuselage_length),
            ("fuselage_diameter", self.fuselage_diameter),
            ("reference_area", self.reference_area),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{} must be positive, got {}", name, value));
            }
        }
        if !(self.wing_taper_ratio > 0.0 && self.wing_taper_ratio <= 1.0) {
            return invalid(format!(
                "wing_taper_ratio must be within (0, 1], got {}",
                self.wing_taper_ratio
            ));
        }
        if self.wing_sweep.abs() >= 75.0 {
            return invalid(format!("wing_sweep {} out of range", self.wing_sweep));
        }
        if self.wing_dihedral.abs() >= 45.0 {
            return invalid(format!("wing_dihedral {} out of range", self.wing_dihedral));
        }
        if self.fuselage_diameter >= self.fuselage_length {
            return invalid("fuselage_diameter must be smaller than fuselage_length".to_string());
        }
        if self.wing_root_chord >= 0.5 * self.fuselage_length {
            return invalid("wing_root_chord must fit on the forward half of the fuselage".to_string());
        }
        Ok(())
    }

    pub fn metadata(&self) -> GeometryMetadata {
        let mut extras = BTreeMap::new();
        extras.insert("wing_area".to_string(), self.wing_area());
        extras.insert("aspect_ratio".to_string(), self.aspect_ratio());
        extras.insert("tail_area".to_string(), self.tail_area());
        extras.insert("tail_span".to_string(), self.tail_span());
        GeometryMetadata {
            characteristic_length: self.wing_span.max(self.fuselage_length),
            reference_length: self.mean_chord(),
            reference_area: self.wing_area(),
            extras,
        }
    }
}

/// Builds geometry scripts and runs the CAD kernel.
pub struct GeometryGenerator<'a> {
    config: &'a AppConfig,
}

impl<'a> GeometryGenerator<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    fn param(&self, vector: &DesignVector, name: &str) -> Result<f64, GeometryError> {
        vector
            .get(name)
            .or_else(|| self.config.geometry.defaults.get(name).copied())
            .ok_or_else(|| GeometryError::MissingParameter {
                name: name.to_string(),
            })
    }

    pub fn fairing_params(&self, vector: &DesignVector) -> Result<FairingParams, GeometryError> {
        Ok(FairingParams {
            length: self.param(vector, "length")?,
            inlet_radius: self.param(vector, "inlet_radius")?,
            outlet_radius: self.param(vector, "outlet_radius")?,
            wall_thickness: self.param(vector, "wall_thickness")?,
        })
    }

    pub fn uav_params(&self, vector: &DesignVector) -> Result<UavParams, GeometryError> {
        Ok(UavParams {
            wing_span: self.param(vector, "wing_span")?,
            wing_root_chord: self.param(vector, "wing_root_chord")?,
            wing_taper_ratio: self.param(vector, "wing_taper_ratio")?,
            wing_sweep: self.param(vector, "wing_sweep")?,
            wing_dihedral: self.param(vector, "wing_dihedral")?,
            tail_volume_coefficient: self.param(vector, "tail_volume_coefficient")?,
            fuselage_length: self.param(vector, "fuselage_length")?,
            fuselage_diameter: self.param(vector, "fuselage_diameter")?,
            reference_area: self.param(vector, "reference_area")?,
        })
    }

    /// Script text and metadata for `vector`. Pure function of its inputs.
    pub fn build_script(
        &self,
        vector: &DesignVector,
    ) -> Result<(String, GeometryMetadata), GeometryError> {
        let export_stl = self.config.geometry.export_stl;
        match self.config.geometry.shape {
            ShapeKind::Fairing => {
                let params = self.fairing_params(vector)?;
                let ports = &self.config.geometry.sampling_ports;
                params.validate(ports)?;
                Ok((fairing_script(&params, ports, export_stl), params.metadata()))
            }
            ShapeKind::Uav => {
                let params = self.uav_params(vector)?;
                params.validate()?;
                Ok((uav_script(&params, export_stl), params.metadata()))
            }
        }
    }

    /// Write the script into `out_dir`, run the kernel and check its outputs.
    pub async fn generate(
        &self,
        vector: &DesignVector,
        out_dir: &Path,
        evaluation_id: &str,
    ) -> Result<GeometryArtifact, GeometryError> {
        let (script, metadata) = self.build_script(vector)?;

        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| GeometryError::Io {
                path: out_dir.to_path_buf(),
                source,
            })?;
        let script_path = out_dir.join(GEOMETRY_SCRIPT);
        tokio::fs::write(&script_path, script)
            .await
            .map_err(|source| GeometryError::Io {
                path: script_path.clone(),
                source,
            })?;

        let command = BuiltinTool::Gmsh
            .command(self.config.tools.gmsh.as_deref())
            .args([GEOMETRY_SCRIPT, "-parse_and_exit"])
            .current_dir(out_dir)
            .timeout_secs(self.config.geometry.timeout_secs)
            .log_to(out_dir.join("gmsh_geometry.log"));

        debug!(evaluation_id = %evaluation_id, script = %script_path.display(), "Building geometry");
        let output = ToolRunner::execute(&command)
            .await
            .map_err(GeometryError::Tool)?;
        if !output.passed() {
            return Err(GeometryError::KernelFailed {
                exit_code: output.exit_code,
                diagnostic: output.tail(20),
            });
        }

        let step_path = out_dir.join(STEP_FILE);
        ensure_non_empty(&step_path).await?;
        let stl_path = if self.config.geometry.export_stl {
            let path = out_dir.join(STL_FILE);
            ensure_non_empty(&path).await?;
            Some(path)
        } else {
            None
        };

        info!(
            evaluation_id = %evaluation_id,
            step = %step_path.display(),
            reference_area = metadata.reference_area,
            "Geometry generated"
        );

        Ok(GeometryArtifact {
            evaluation_id: evaluation_id.to_string(),
            script_path,
            step_path,
            stl_path,
            metadata,
        })
    }
}

async fn ensure_non_empty(path: &Path) -> Result<(), GeometryError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(GeometryError::MissingOutput {
            path: path.to_path_buf(),
        }),
    }
}

fn script_header(out: &mut String, title: &str) {
    let _ = writeln!(out, "// {}", title);
    out.push_str("SetFactory(\"OpenCASCADE\");\n");
    out.push_str("General.Terminal = 1;\n\n");
}

fn script_footer(out: &mut String, export_stl: bool) {
    let _ = writeln!(out, "Save \"{}\";", STEP_FILE);
    if export_stl {
        out.push_str("Mesh 2;\n");
        let _ = writeln!(out, "Save \"{}\";", STL_FILE);
    }
}

/// Closed half-profile (axis, spline, axis) revolved about X into `var`.
fn revolved_profile(out: &mut String, var: &str, first_tag: usize, profile: &[(f64, f64)]) {
    let last_x = profile.last().map(|p| p.0).unwrap_or(0.0);
    let axis_start = first_tag;
    let _ = writeln!(out, "Point({}) = {{0, 0, 0}};", axis_start);
    for (i, (x, r)) in profile.iter().enumerate() {
        let _ = writeln!(out, "Point({}) = {{{:?}, {:?}, 0}};", first_tag + 1 + i, x, r);
    }
    let profile_end = first_tag + profile.len();
    let axis_end = profile_end + 1;
    let _ = writeln!(out, "Point({}) = {{{:?}, 0, 0}};", axis_end, last_x);

    let spline_points: Vec<String> = (first_tag + 1..=profile_end).map(|t| t.to_string()).collect();
    let c = first_tag;
    let _ = writeln!(out, "Line({}) = {{{}, {}}};", c, axis_start, first_tag + 1);
    let _ = writeln!(out, "Spline({}) = {{{}}};", c + 1, spline_points.join(", "));
    let _ = writeln!(out, "Line({}) = {{{}, {}}};", c + 2, profile_end, axis_end);
    let _ = writeln!(out, "Line({}) = {{{}, {}}};", c + 3, axis_end, axis_start);
    let _ = writeln!(out, "Curve Loop({}) = {{{}, {}, {}, {}}};", c, c, c + 1, c + 2, c + 3);
    let _ = writeln!(out, "Plane Surface({}) = {{{}}};", c, c);
    let _ = writeln!(
        out,
        "{}[] = Extrude {{{{1, 0, 0}}, {{0, 0, 0}}, 2*Pi}} {{ Surface{{{}}}; }};",
        var, c
    );
}

/// Gmsh script for the fairing.
pub fn fairing_script(params: &FairingParams, ports: &[SamplingPort], export_stl: bool) -> String {
    let mut out = String::new();
    script_header(&mut out, "aeroshape fairing");

    out.push_str("// outer profile\n");
    revolved_profile(&mut out, "outer", 1, &params.outer_profile());
    out.push_str("\n// inner profile\n");
    revolved_profile(&mut out, "inner", 201, &params.inner_profile());

    out.push_str("\nbody() = BooleanDifference{ Volume{outer[1]}; Delete; }{ Volume{inner[1]}; Delete; };\n");

    if !ports.is_empty() {
        out.push_str("\n// sampling ports\n");
        let depth = 2.0 * params.max_radius();
        let mut tags = Vec::with_capacity(ports.len());
        for (i, port) in ports.iter().enumerate() {
            let tag = 1001 + i;
            let _ = writeln!(
                out,
                "Cylinder({}) = {{{:?}, 0, 0, 0, 0, {:?}, {:?}}};",
                tag, port.position, depth, port.radius
            );
            tags.push(tag.to_string());
        }
        let _ = writeln!(
            out,
            "body() = BooleanDifference{{ Volume{{body()}}; Delete; }}{{ Volume{{{}}}; Delete; }};",
            tags.join(", ")
        );
    }

    out.push('\n');
    script_footer(&mut out, export_stl);
    out
}

/// Planar wing panel from root to tip, extruded by `thickness` along Z.
#[allow(clippy::too_many_arguments)]
fn wing_panel(
    out: &mut String,
    var: &str,
    first_tag: usize,
    x_root: f64,
    root_chord: f64,
    tip_chord: f64,
    half_span: f64,
    sweep_deg: f64,
    dihedral_deg: f64,
    side: f64,
    thickness: f64,
) {
    let x_tip = x_root + half_span * sweep_deg.to_radians().tan();
    let z_tip = half_span * dihedral_deg.to_radians().tan();
    let y_tip = side * half_span;
    let p = first_tag;
    let _ = writeln!(out, "Point({}) = {{{:?}, 0, 0}};", p, x_root);
    let _ = writeln!(out, "Point({}) = {{{:?}, 0, 0}};", p + 1, x_root + root_chord);
    let _ = writeln!(out, "Point({}) = {{{:?}, {:?}, {:?}}};", p + 2, x_tip + tip_chord, y_tip, z_tip);
    let _ = writeln!(out, "Point({}) = {{{:?}, {:?}, {:?}}};", p + 3, x_tip, y_tip, z_tip);
    for i in 0..4 {
        let _ = writeln!(out, "Line({}) = {{{}, {}}};", p + i, p + i, p + (i + 1) % 4);
    }
    let _ = writeln!(out, "Curve Loop({}) = {{{}, {}, {}, {}}};", p, p, p + 1, p + 2, p + 3);
    let _ = writeln!(out, "Plane Surface({}) = {{{}}};", p, p);
    let _ = writeln!(
        out,
        "{}[] = Extrude {{0, 0, {:?}}} {{ Surface{{{}}}; }};",
        var, thickness, p
    );
}

/// Gmsh script for the UAV.
pub fn uav_script(params: &UavParams, export_stl: bool) -> String {
    let mut out = String::new();
    script_header(&mut out, "aeroshape uav");

    let radius = params.fuselage_diameter / 2.0;
    out.push_str("// fuselage\n");
    let _ = writeln!(
        out,
        "Cylinder(1) = {{0, 0, 0, {:?}, 0, 0, {:?}}};",
        params.fuselage_length, radius
    );

    let half_span = params.wing_span / 2.0;
    let x_wing = 0.3 * params.fuselage_length;
    let wing_thickness = 0.12 * params.mean_chord();
    out.push_str("\n// main wing\n");
    for (var, tag, side) in [("wing_r", 101, 1.0), ("wing_l", 201, -1.0)] {
        wing_panel(
            &mut out,
            var,
            tag,
            x_wing,
            params.wing_root_chord,
            params.tip_chord(),
            half_span,
            params.wing_sweep,
            params.wing_dihedral,
            side,
            wing_thickness,
        );
    }

    let tail_span = params.tail_span();
    let tail_chord = params.tail_area() / tail_span;
    let x_tail = params.fuselage_length - tail_chord;
    out.push_str("\n// horizontal tail\n");
    for (var, tag, side) in [("tail_r", 301, 1.0), ("tail_l", 401, -1.0)] {
        wing_panel(
            &mut out,
            var,
            tag,
            x_tail,
            tail_chord,
            tail_chord,
            tail_span / 2.0,
            0.0,
            0.0,
            side,
            0.12 * tail_chord,
        );
    }

    out.push_str(
        "\nbody() = BooleanUnion{ Volume{1}; Delete; }{ Volume{wing_r[1], wing_l[1], tail_r[1], tail_l[1]}; Delete; };\n\n",
    );
    script_footer(&mut out, export_stl);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fairing() -> FairingParams {
        FairingParams {
            length: 1.0,
            inlet_radius: 0.1,
            outlet_radius: 0.08,
            wall_thickness: 0.005,
        }
    }

    fn uav() -> UavParams {
        UavParams {
            wing_span: 2.0,
            wing_root_chord: 0.4,
            wing_taper_ratio: 0.5,
            wing_sweep: 5.0,
            wing_dihedral: 3.0,
            tail_volume_coefficient: 0.5,
            fuselage_length: 1.2,
            fuselage_diameter: 0.15,
            reference_area: 0.6,
        }
    }

    #[test]
    fn test_fairing_profile_points() {
        let profile = fairing().outer_profile();
        assert_eq!(profile[0], (0.0, 0.1));
        assert_eq!(profile[4], (1.0, 0.08));
        assert!((profile[2].1 - 0.55 * 0.18).abs() < 1e-12);
        let inner = fairing().inner_profile();
        assert!((inner[0].1 - 0.095).abs() < 1e-12);
    }

    #[test]
    fn test_inner_radius_floor() {
        let params = FairingParams {
            wall_thickness: 0.0999,
            ..fairing()
        };
        let inner = params.inner_profile();
        assert!(inner.iter().all(|&(_, r)| r >= MIN_INNER_RADIUS));
    }

    #[test]
    fn test_fairing_metadata() {
        let meta = fairing().metadata();
        assert_eq!(meta.reference_length, 1.0);
        assert!((meta.reference_area - std::f64::consts::PI * 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_fairing_validation() {
        let thick = FairingParams {
            wall_thickness: 0.2,
            ..fairing()
        };
        assert!(matches!(
            thick.validate(&[]),
            Err(GeometryError::InvalidParameters(_))
        ));

        let port_outside = SamplingPort {
            position: 0.99,
            radius: 0.02,
        };
        assert!(fairing().validate(&[port_outside]).is_err());

        let negative = FairingParams {
            length: -1.0,
            ..fairing()
        };
        assert!(negative.validate(&[]).is_err());
    }

    #[test]
    fn test_fairing_script_content() {
        let ports = [SamplingPort {
            position: 0.5,
            radius: 0.01,
        }];
        let script = fairing_script(&fairing(), &ports, true);
        assert!(script.contains("SetFactory(\"OpenCASCADE\");"));
        assert!(script.contains("Spline(2) = {2, 3, 4, 5, 6};"));
        assert!(script.contains("BooleanDifference{ Volume{outer[1]}; Delete; }"));
        assert!(script.contains("Cylinder(1001) = {0.5, 0, 0, 0, 0,"));
        assert!(script.contains("Save \"model.step\";"));
        assert!(script.contains("Save \"model.stl\";"));
    }

    #[test]
    fn test_script_is_deterministic() {
        let a = fairing_script(&fairing(), &[], false);
        let b = fairing_script(&fairing(), &[], false);
        assert_eq!(a, b);
        assert!(!a.contains("model.stl"));
    }

    #[test]
    fn test_uav_metadata() {
        let params = uav();
        let meta = params.metadata();
        // area = 2.0 * (0.4 + 0.2) / 2 = 0.6
        assert!((meta.reference_area - 0.6).abs() < 1e-12);
        assert!((meta.extras["aspect_ratio"] - 4.0 / 0.6).abs() < 1e-9);
        assert!((meta.reference_length - 0.3).abs() < 1e-12);
        assert_eq!(meta.characteristic_length, 2.0);
        // tail area = 0.5 * 0.6, tail span = sqrt(4 * 0.3)
        assert!((params.tail_span() - 1.2_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_uav_validation() {
        let bad_taper = UavParams {
            wing_taper_ratio: 1.5,
            ..uav()
        };
        assert!(bad_taper.validate().is_err());
        assert!(uav().validate().is_ok());
    }

    #[test]
    fn test_uav_script_content() {
        let script = uav_script(&uav(), false);
        assert!(script.contains("Cylinder(1) = {0, 0, 0, 1.2, 0, 0, 0.075};"));
        assert!(script.contains("wing_r[] = Extrude"));
        assert!(script.contains("BooleanUnion"));
    }
}
