//! Solver configuration templates with `{name}` placeholders.

use crate::config::{AppConfig, PlaceholderValue};
use crate::error::ConfigError;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Placeholders the workflow always provides.
pub const BUILTIN_PLACEHOLDERS: &[&str] = &[
    "mesh_filename",
    "mach_number",
    "angle_of_attack",
    "reynolds_number",
    "reference_length",
    "reference_area",
    "freestream_temperature",
    "freestream_pressure",
    "wall_marker",
    "farfield_marker",
    "max_iterations",
    "conv_filename",
    "breakdown_filename",
];

/// Compressible Euler case used when no template file is configured.
pub const BUILTIN_TEMPLATE: &str = r#"% aeroshape built-in SU2 configuration (compressible Euler)
SOLVER= EULER
MATH_PROBLEM= DIRECT
RESTART_SOL= NO
%
% Free-stream
MACH_NUMBER= {mach_number}
AOA= {angle_of_attack}
SIDESLIP_ANGLE= 0.0
FREESTREAM_PRESSURE= {freestream_pressure}
FREESTREAM_TEMPERATURE= {freestream_temperature}
REYNOLDS_NUMBER= {reynolds_number}
REYNOLDS_LENGTH= {reference_length}
%
% Reference values
REF_ORIGIN_MOMENT_X= 0.25
REF_ORIGIN_MOMENT_Y= 0.00
REF_ORIGIN_MOMENT_Z= 0.00
REF_LENGTH= {reference_length}
REF_AREA= {reference_area}
%
% Boundaries
MARKER_EULER= ( {wall_marker} )
MARKER_FAR= ( {farfield_marker} )
MARKER_PLOTTING= ( {wall_marker} )
MARKER_MONITORING= ( {wall_marker} )
%
% Numerics
NUM_METHOD_GRAD= WEIGHTED_LEAST_SQUARES
CFL_NUMBER= 5.0
CFL_ADAPT= YES
CFL_ADAPT_PARAM= ( 0.5, 1.5, 1.0, 50.0 )
CONV_NUM_METHOD_FLOW= JST
TIME_DISCRE_FLOW= EULER_IMPLICIT
LINEAR_SOLVER= FGMRES
LINEAR_SOLVER_PREC= ILU
LINEAR_SOLVER_ERROR= 1E-6
LINEAR_SOLVER_ITER= 5
ITER= {max_iterations}
CONV_FIELD= RMS_DENSITY
CONV_RESIDUAL_MINVAL= -8
CONV_STARTITER= 10
%
% Input / output
MESH_FILENAME= {mesh_filename}
MESH_FORMAT= SU2
TABULAR_FORMAT= CSV
CONV_FILENAME= {conv_filename}
BREAKDOWN_FILENAME= {breakdown_filename}
WRT_FORCES_BREAKDOWN= YES
SCREEN_OUTPUT= ( INNER_ITER, RMS_DENSITY, LIFT, DRAG )
HISTORY_OUTPUT= ( ITER, RMS_RES, AERO_COEFF )
OUTPUT_FILES= ( RESTART, SURFACE_CSV )
"#;

const PLACEHOLDER_PATTERN: &str = r"\{([A-Za-z_][A-Za-z0-9_]*)\}";

fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLACEHOLDER_PATTERN).ok())
        .as_ref()
}

/// Every `{identifier}` token in `text`.
pub fn scan_placeholders(text: &str) -> BTreeSet<String> {
    match placeholder_regex() {
        Some(re) => re
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .collect(),
        None => BTreeSet::new(),
    }
}

/// Shortest round-trip rendering that keeps a decimal point (`0.3`, `2.0`).
pub fn format_number(value: f64) -> String {
    format!("{:?}", value)
}

impl std::fmt::Display for PlaceholderValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaceholderValue::Number(v) => f.write_str(&format_number(*v)),
            PlaceholderValue::Text(s) => f.write_str(s),
        }
    }
}

/// A loaded and validated solver template.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverTemplate {
    text: String,
    source: String,
    placeholders: BTreeSet<String>,
}

impl SolverTemplate {
    /// Load the configured template (or the built-in one) and check that
    /// every placeholder can be supplied.
    pub fn load(config: &AppConfig) -> Result<Self, ConfigError> {
        let (text, source) = match &config.solver.template {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                (text, path.display().to_string())
            }
            None => (BUILTIN_TEMPLATE.to_string(), "<built-in>".to_string()),
        };

        let mut known: BTreeSet<String> =
            BUILTIN_PLACEHOLDERS.iter().map(|s| s.to_string()).collect();
        known.extend(config.solver.extra_placeholders.keys().cloned());
        known.extend(config.design_variables.iter().map(|v| v.name.clone()));

        Self::with_known(text, source, &known)
    }

    /// Build a template from text, rejecting placeholders outside `known`.
    pub fn with_known(
        text: String,
        source: String,
        known: &BTreeSet<String>,
    ) -> Result<Self, ConfigError> {
        let placeholders = scan_placeholders(&text);
        if let Some(unknown) = placeholders.iter().find(|p| !known.contains(*p)) {
            return Err(ConfigError::UnknownPlaceholder {
                name: unknown.clone(),
                template: source,
            });
        }
        Ok(Self {
            text,
            source,
            placeholders,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.placeholders
    }

    /// Replace every `{name}` with its value in a single pass over the
    /// template, so values are inserted verbatim. Placeholders missing from
    /// `values` are left untouched.
    pub fn render(&self, values: &BTreeMap<String, String>) -> String {
        let Some(re) = placeholder_regex() else {
            return self.text.clone();
        };
        re.replace_all(&self.text, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
    }
}
