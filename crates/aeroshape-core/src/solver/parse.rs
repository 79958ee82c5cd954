//! Parsing of SU2 history tables and force-breakdown reports.
//!
//! - [`HistoryTable`]: the per-iteration CSV written by the solver. Header
//!   cells may be quoted and padded (`"CL"     ,`).
//! - [`Breakdown`]: `Total CL:` / `CL = v` style lines of the forces report.
//! - [`parse_results`]: combine both into [`AerodynamicCoefficients`],
//!   applying the convergence policy.

use crate::config::{ConvergenceConfig, UnconvergedPolicy};
use crate::error::ResultParseError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

/// Column aliases for the lift coefficient.
pub const CL_COLUMNS: &[&str] = &["CL", "CLift"];
/// Column aliases for the drag coefficient.
pub const CD_COLUMNS: &[&str] = &["CD", "CDrag"];
/// Column aliases for the pitching moment coefficient.
pub const CM_COLUMNS: &[&str] = &["CMz", "CMoment"];

/// Aerodynamic coefficients of a completed solver run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AerodynamicCoefficients {
    pub cl: f64,
    pub cd: f64,
    pub cm: Option<f64>,
    pub lift_to_drag: f64,
    pub iterations: usize,
    pub converged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_residual: Option<f64>,
}

/// Parsed history CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn clean_cell(cell: &str) -> String {
    cell.trim().trim_matches('"').trim().to_string()
}

impl HistoryTable {
    /// Parse CSV text. Blank lines are skipped; the first non-blank line is
    /// the header.
    pub fn parse(text: &str) -> Result<Self, ResultParseError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next().ok_or(ResultParseError::MissingHeader)?;
        let headers: Vec<String> = header.split(',').map(clean_cell).collect();
        let rows = lines
            .map(|line| line.split(',').map(clean_cell).collect())
            .collect();
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column matching any alias.
    pub fn column_index(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.headers.iter().position(|h| h == alias))
    }

    /// Whole column as numbers.
    pub fn series(&self, aliases: &[&str]) -> Result<Vec<f64>, ResultParseError> {
        let index = self.require(aliases)?;
        self.rows
            .iter()
            .map(|row| self.number_at(row, index))
            .collect()
    }

    /// Value of the column in the final row.
    pub fn last_value(&self, aliases: &[&str]) -> Result<f64, ResultParseError> {
        let index = self.require(aliases)?;
        let row = self.rows.last().ok_or(ResultParseError::NoDataRows)?;
        self.number_at(row, index)
    }

    fn require(&self, aliases: &[&str]) -> Result<usize, ResultParseError> {
        self.column_index(aliases)
            .ok_or_else(|| ResultParseError::MissingColumn {
                column: aliases.join("|"),
            })
    }

    fn number_at(&self, row: &[String], index: usize) -> Result<f64, ResultParseError> {
        let column = self.headers[index].clone();
        let raw = row.get(index).ok_or_else(|| ResultParseError::InvalidNumber {
            column: column.clone(),
            value: String::new(),
        })?;
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ResultParseError::InvalidNumber {
                column,
                value: raw.clone(),
            })
    }

    /// Columns holding residuals (`rms[...]`), in file order.
    pub fn residual_columns(&self) -> Vec<String> {
        self.headers
            .iter()
            .filter(|h| h.starts_with("rms["))
            .cloned()
            .collect()
    }
}

/// Coefficients found in a force-breakdown report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Breakdown {
    pub cl: Option<f64>,
    pub cd: Option<f64>,
    pub cm: Option<f64>,
}

impl Breakdown {
    /// Scan report text. The first occurrence of each coefficient wins, which
    /// is the whole-body total in SU2's layout.
    pub fn parse(text: &str) -> Self {
        static RE: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(re) = RE
            .get_or_init(|| {
                Regex::new(r"^\s*(?:Total\s+)?(CL|CD|CMz)\s*[:=]\s*([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)")
                    .ok()
            })
            .as_ref()
        else {
            return Self::default();
        };

        let mut breakdown = Self::default();
        for line in text.lines() {
            let Some(caps) = re.captures(line) else {
                continue;
            };
            let Ok(value) = caps[2].parse::<f64>() else {
                continue;
            };
            let slot = match &caps[1] {
                "CL" => &mut breakdown.cl,
                "CD" => &mut breakdown.cd,
                _ => &mut breakdown.cm,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        breakdown
    }
}

/// Derive coefficients from history text and optional breakdown text.
pub fn coefficients_from_text(
    history: &str,
    breakdown: Option<(&str, &Path)>,
    convergence: &ConvergenceConfig,
) -> Result<AerodynamicCoefficients, ResultParseError> {
    let table = HistoryTable::parse(history)?;
    if table.is_empty() {
        return Err(ResultParseError::NoDataRows);
    }

    let mut cl = table.last_value(CL_COLUMNS)?;
    let mut cd = table.last_value(CD_COLUMNS)?;
    let mut cm = match table.column_index(CM_COLUMNS) {
        Some(_) => Some(table.last_value(CM_COLUMNS)?),
        None => None,
    };

    if let Some((text, path)) = breakdown {
        let parsed = Breakdown::parse(text);
        match (parsed.cl, parsed.cd) {
            (Some(b_cl), Some(b_cd)) => {
                cl = b_cl;
                cd = b_cd;
                if parsed.cm.is_some() {
                    cm = parsed.cm;
                }
            }
            _ => {
                return Err(ResultParseError::BreakdownIncomplete {
                    path: path.to_path_buf(),
                })
            }
        }
    }

    if cd <= 0.0 {
        return Err(ResultParseError::NonPositiveDrag { cd });
    }

    let (converged, final_residual) = check_convergence(&table, convergence)?;

    Ok(AerodynamicCoefficients {
        cl,
        cd,
        cm,
        lift_to_drag: cl / cd,
        iterations: table.len(),
        converged,
        final_residual,
    })
}

fn check_convergence(
    table: &HistoryTable,
    convergence: &ConvergenceConfig,
) -> Result<(bool, Option<f64>), ResultParseError> {
    let column = convergence.residual_column.as_str();
    if table.column_index(&[column]).is_none() {
        return match convergence.on_unconverged {
            UnconvergedPolicy::Accept => {
                warn!(column = %column, "Residual column absent; accepting run as converged");
                Ok((true, None))
            }
            UnconvergedPolicy::Reject => Err(ResultParseError::ConvergenceUnknown {
                column: column.to_string(),
            }),
        };
    }

    let residual = table.last_value(&[column])?;
    if residual <= convergence.residual_threshold {
        return Ok((true, Some(residual)));
    }

    match convergence.on_unconverged {
        UnconvergedPolicy::Accept => {
            warn!(
                residual = residual,
                threshold = convergence.residual_threshold,
                "Solver did not reach the residual threshold"
            );
            Ok((false, Some(residual)))
        }
        UnconvergedPolicy::Reject => Err(ResultParseError::NotConverged {
            residual,
            threshold: convergence.residual_threshold,
        }),
    }
}

/// Read the history file and, when present, the breakdown file.
pub async fn parse_results(
    history_path: &Path,
    breakdown_path: &Path,
    convergence: &ConvergenceConfig,
) -> Result<AerodynamicCoefficients, ResultParseError> {
    let history = match tokio::fs::read_to_string(history_path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ResultParseError::MissingHistory {
                path: history_path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(ResultParseError::Io {
                path: history_path.to_path_buf(),
                source,
            })
        }
    };

    let breakdown = match tokio::fs::read(breakdown_path).await {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(source) => {
            return Err(ResultParseError::Io {
                path: breakdown_path.to_path_buf(),
                source,
            })
        }
    };

    coefficients_from_text(
        &history,
        breakdown.as_deref().map(|text| (text, breakdown_path)),
        convergence,
    )
}
