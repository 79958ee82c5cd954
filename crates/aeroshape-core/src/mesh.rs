//! Volume mesh generation around a geometry artifact.
//!
//! The mesh script merges the STEP file, wraps the body in a far-field
//! sphere, subtracts the body, tags the wall / far-field / fluid physical
//! groups, optionally refines near the wall, meshes in 3-D and saves the
//! result in SU2 native format. Counts are read back from the SU2 header.

use crate::config::MeshConfig;
use crate::error::MeshError;
use crate::geometry::GeometryArtifact;
use aeroshape_tools::{BuiltinTool, ToolRunner};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info};

pub const MESH_SCRIPT: &str = "mesh.geo";
pub const MESH_FILE: &str = "mesh.su2";

/// Header counts of an SU2 mesh file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Su2MeshInfo {
    pub dimension: u32,
    pub elements: u64,
    pub points: u64,
    pub markers: Vec<String>,
}

impl Su2MeshInfo {
    /// Fold one line of an SU2 file into the counts.
    pub fn scan_line(&mut self, line: &str) -> Result<(), String> {
        let Some((key, value)) = line.split_once('=') else {
            return Ok(());
        };
        let value = value.split_whitespace().next().unwrap_or("");
        match key.trim() {
            "NDIME" => {
                self.dimension = value
                    .parse()
                    .map_err(|_| format!("bad NDIME value {:?}", value))?
            }
            "NELEM" => {
                self.elements = value
                    .parse()
                    .map_err(|_| format!("bad NELEM value {:?}", value))?
            }
            "NPOIN" => {
                self.points = value
                    .parse()
                    .map_err(|_| format!("bad NPOIN value {:?}", value))?
            }
            "MARKER_TAG" => self.markers.push(value.to_string()),
            _ => {}
        }
        Ok(())
    }

    /// Parse header counts from full file text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut info = Self::default();
        for line in text.lines() {
            info.scan_line(line)?;
        }
        Ok(info)
    }

    /// Stream a mesh file from disk.
    pub async fn read(path: &Path) -> Result<Self, MeshError> {
        let file = tokio::fs::File::open(path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                MeshError::MissingOutput {
                    path: path.to_path_buf(),
                }
            } else {
                MeshError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let mut lines = tokio::io::BufReader::new(file).lines();
        let mut info = Self::default();
        while let Some(line) = lines.next_line().await.map_err(|source| MeshError::Io {
            path: path.to_path_buf(),
            source,
        })? {
            info.scan_line(&line)
                .map_err(|reason| MeshError::InvalidHeader {
                    path: path.to_path_buf(),
                    reason,
                })?;
        }
        Ok(info)
    }
}

/// Mesh produced for one design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeshArtifact {
    pub script_path: PathBuf,
    pub mesh_path: PathBuf,
    pub info: Su2MeshInfo,
}

/// Gmsh script meshing the fluid domain around `step_path`.
pub fn mesh_script(step_path: &Path, mesh: &MeshConfig) -> String {
    let mut out = String::new();
    out.push_str("// aeroshape far-field mesh\n");
    out.push_str("SetFactory(\"OpenCASCADE\");\n");
    out.push_str("General.Terminal = 1;\n\n");

    let _ = writeln!(out, "Merge \"{}\";", step_path.display());
    out.push_str("body() = Volume{:};\n");
    out.push_str("bb() = BoundingBox Volume{body()};\n");
    out.push_str("cx = (bb(0) + bb(3)) / 2;\n");
    out.push_str("cy = (bb(1) + bb(4)) / 2;\n");
    out.push_str("cz = (bb(2) + bb(5)) / 2;\n");
    out.push_str("ext = Max(bb(3) - bb(0), Max(bb(4) - bb(1), bb(5) - bb(2)));\n");
    out.push_str("eps = 1e-6 * ext;\n\n");

    out.push_str("// far-field domain\n");
    out.push_str("ff = newv;\n");
    let _ = writeln!(out, "Sphere(ff) = {{cx, cy, cz, {:?} * ext}};", mesh.farfield_scale);
    out.push_str("fluid() = BooleanDifference{ Volume{ff}; Delete; }{ Volume{body()}; Delete; };\n\n");

    out.push_str("// boundary markers\n");
    out.push_str("wall() = Surface In BoundingBox{bb(0) - eps, bb(1) - eps, bb(2) - eps, bb(3) + eps, bb(4) + eps, bb(5) + eps};\n");
    out.push_str("far() = Abs(Boundary{ Volume{fluid()}; });\n");
    out.push_str("far() -= wall();\n");
    let _ = writeln!(out, "Physical Surface(\"{}\", 1) = wall();", mesh.wall_marker);
    let _ = writeln!(out, "Physical Surface(\"{}\", 2) = far();", mesh.farfield_marker);
    out.push_str("Physical Volume(\"FLUID\", 3) = fluid();\n\n");

    out.push_str("// sizing\n");
    let _ = writeln!(out, "Mesh.CharacteristicLengthMin = {:?};", mesh.min_size);
    let _ = writeln!(out, "Mesh.CharacteristicLengthMax = {:?};", mesh.max_size);
    let _ = writeln!(out, "Mesh.Algorithm3D = {};", mesh.algorithm_3d);
    let _ = writeln!(out, "Mesh.ElementOrder = {};", mesh.element_order);

    if mesh.boundary_layer_thickness > 0.0 && mesh.boundary_layer_layers > 0 {
        let first_cell = mesh.boundary_layer_thickness / f64::from(mesh.boundary_layer_layers);
        out.push_str("\n// near-wall refinement\n");
        out.push_str("Field[1] = Distance;\n");
        out.push_str("Field[1].SurfacesList = {wall()};\n");
        out.push_str("Field[2] = Threshold;\n");
        out.push_str("Field[2].InField = 1;\n");
        let _ = writeln!(out, "Field[2].SizeMin = {:?};", first_cell);
        let _ = writeln!(out, "Field[2].SizeMax = {:?};", mesh.max_size);
        let _ = writeln!(out, "Field[2].DistMin = {:?};", mesh.boundary_layer_thickness);
        let _ = writeln!(out, "Field[2].DistMax = {:?};", 4.0 * mesh.boundary_layer_thickness);
        out.push_str("Background Field = 2;\n");
    }

    out.push_str("\nMesh 3;\n");
    let _ = writeln!(out, "Save \"{}\";", MESH_FILE);
    out
}

/// Runs the mesher for geometry artifacts.
pub struct MeshGenerator<'a> {
    mesh: &'a MeshConfig,
    gmsh: Option<&'a Path>,
}

impl<'a> MeshGenerator<'a> {
    pub fn new(mesh: &'a MeshConfig, gmsh: Option<&'a Path>) -> Self {
        Self { mesh, gmsh }
    }

    /// Mesh the fluid domain around `geometry` into `out_dir/mesh.su2`.
    pub async fn generate(
        &self,
        geometry: &GeometryArtifact,
        out_dir: &Path,
    ) -> Result<MeshArtifact, MeshError> {
        if !geometry.step_path.is_file() {
            return Err(MeshError::MissingGeometry {
                path: geometry.step_path.clone(),
            });
        }

        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| MeshError::Io {
                path: out_dir.to_path_buf(),
                source,
            })?;

        let step_path = tokio::fs::canonicalize(&geometry.step_path)
            .await
            .unwrap_or_else(|_| geometry.step_path.clone());
        let script_path = out_dir.join(MESH_SCRIPT);
        tokio::fs::write(&script_path, mesh_script(&step_path, self.mesh))
            .await
            .map_err(|source| MeshError::Io {
                path: script_path.clone(),
                source,
            })?;

        let command = BuiltinTool::Gmsh
            .command(self.gmsh)
            .args([MESH_SCRIPT, "-parse_and_exit"])
            .current_dir(out_dir)
            .timeout_secs(self.mesh.timeout_secs)
            .log_to(out_dir.join("gmsh_mesh.log"));

        debug!(evaluation_id = %geometry.evaluation_id, script = %script_path.display(), "Meshing");
        let output = ToolRunner::execute(&command).await.map_err(MeshError::Tool)?;
        if !output.passed() {
            return Err(MeshError::MesherFailed {
                exit_code: output.exit_code,
                diagnostic: output.tail(20),
            });
        }

        let mesh_path = out_dir.join(MESH_FILE);
        let info = Su2MeshInfo::read(&mesh_path).await?;
        if info.elements == 0 || info.points == 0 {
            return Err(MeshError::EmptyMesh { path: mesh_path });
        }

        info!(
            evaluation_id = %geometry.evaluation_id,
            elements = info.elements,
            points = info.points,
            markers = ?info.markers,
            "Mesh generated"
        );

        Ok(MeshArtifact {
            script_path,
            mesh_path,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SU2_MESH: &str = "\
NDIME= 3
NELEM= 4
10 0 1 2 3 0
10 1 2 3 4 1
10 2 3 4 5 2
10 3 4 5 6 3
NPOIN= 7
0.0 0.0 0.0 0
1.0 0.0 0.0 1
NMARK= 2
MARKER_TAG= WALL
MARKER_ELEMS= 1
5 0 1 2
MARKER_TAG= FARFIELD
MARKER_ELEMS= 1
5 4 5 6
";

    #[test]
    fn test_parse_su2_header() {
        let info = Su2MeshInfo::parse(SU2_MESH).unwrap();
        assert_eq!(info.dimension, 3);
        assert_eq!(info.elements, 4);
        assert_eq!(info.points, 7);
        assert_eq!(info.markers, vec!["WALL".to_string(), "FARFIELD".to_string()]);
    }

    #[test]
    fn test_parse_bad_count() {
        let err = Su2MeshInfo::parse("NELEM= many\n").unwrap_err();
        assert!(err.contains("NELEM"));
    }

    #[test]
    fn test_mesh_script_content() {
        let config = MeshConfig {
            boundary_layer_thickness: 0.01,
            boundary_layer_layers: 5,
            ..MeshConfig::default()
        };
        let script = mesh_script(Path::new("/case/geometry/model.step"), &config);
        assert!(script.contains("Merge \"/case/geometry/model.step\";"));
        assert!(script.contains("Sphere(ff) = {cx, cy, cz, 8.0 * ext};"));
        assert!(script.contains("Physical Surface(\"WALL\", 1) = wall();"));
        assert!(script.contains("Physical Surface(\"FARFIELD\", 2) = far();"));
        assert!(script.contains("Physical Volume(\"FLUID\", 3) = fluid();"));
        assert!(script.contains("Mesh.CharacteristicLengthMin = 0.003;"));
        assert!(script.contains("Field[2].SizeMin = 0.002;"));
        assert!(script.contains("Save \"mesh.su2\";"));
    }

    #[test]
    fn test_mesh_script_is_pure() {
        let config = MeshConfig::default();
        let a = mesh_script(Path::new("model.step"), &config);
        let b = mesh_script(Path::new("model.step"), &config);
        assert_eq!(a, b);
        assert!(!a.contains("Background Field"));
    }

    #[tokio::test]
    async fn test_missing_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = GeometryArtifact {
            evaluation_id: "g000-i000-test".to_string(),
            script_path: dir.path().join("geometry.geo"),
            step_path: dir.path().join("model.step"),
            stl_path: None,
            metadata: crate::geometry::GeometryMetadata {
                characteristic_length: 1.0,
                reference_length: 1.0,
                reference_area: 1.0,
                extras: Default::default(),
            },
        };
        let config = MeshConfig::default();
        let err = MeshGenerator::new(&config, None)
            .generate(&geometry, &dir.path().join("mesh"))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::MissingGeometry { .. }));
    }
}
