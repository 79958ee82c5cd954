//! Append-only CSV log of every evaluation.

use crate::fitness::{Evaluation, Outcome};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

const FIXED_COLUMNS: [&str; 10] = [
    "generation",
    "evaluation_id",
    "status",
    "fitness",
    "cl",
    "cd",
    "cm",
    "lift_to_drag",
    "converged",
    "elapsed_ms",
];

/// Writes one row per evaluation. The header is written with the first row.
pub struct HistoryWriter {
    path: PathBuf,
    variables: Vec<String>,
    header_written: bool,
}

impl HistoryWriter {
    pub fn new(path: PathBuf, variables: Vec<String>) -> Self {
        Self {
            path,
            variables,
            header_written: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> String {
        let mut columns: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(self.variables.iter().cloned());
        columns.push("failure".to_string());
        columns.join(",")
    }

    pub fn row(&self, evaluation: &Evaluation) -> String {
        let mut fields = vec![
            evaluation.generation.to_string(),
            evaluation.id.clone(),
            evaluation.outcome.status().to_string(),
            evaluation.fitness.score.to_string(),
        ];
        match &evaluation.outcome {
            Outcome::Success { coefficients } => {
                fields.push(coefficients.cl.to_string());
                fields.push(coefficients.cd.to_string());
                fields.push(coefficients.cm.map(|cm| cm.to_string()).unwrap_or_default());
                fields.push(coefficients.lift_to_drag.to_string());
                fields.push(coefficients.converged.to_string());
            }
            Outcome::Failed { .. } => fields.extend(std::iter::repeat(String::new()).take(5)),
        }
        fields.push(evaluation.elapsed_ms.to_string());
        for name in &self.variables {
            fields.push(
                evaluation
                    .vector
                    .get(name)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        fields.push(match &evaluation.outcome {
            Outcome::Failed { kind, reason } => escape(&format!("{}: {}", kind, reason)),
            Outcome::Success { .. } => String::new(),
        });
        fields.join(",")
    }

    /// Append rows. The first call truncates any file left by an earlier
    /// run and writes the header.
    pub async fn append(&mut self, evaluations: &[Evaluation]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {:?}", parent))?;
        }
        let mut options = OpenOptions::new();
        if self.header_written {
            options.append(true);
        } else {
            options.write(true).create(true).truncate(true);
        }
        let mut file = options
            .open(&self.path)
            .await
            .with_context(|| format!("open {:?}", self.path))?;

        let mut content = String::new();
        if !self.header_written {
            content.push_str(&self.header());
            content.push('\n');
        }
        for evaluation in evaluations {
            content.push_str(&self.row(evaluation));
            content.push('\n');
        }
        file.write_all(content.as_bytes())
            .await
            .with_context(|| format!("write {:?}", self.path))?;
        file.flush()
            .await
            .with_context(|| format!("flush {:?}", self.path))?;
        self.header_written = true;
        Ok(())
    }
}

/// Quote a field when it contains a separator, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
