//! End-of-run summary (`best_design.json`).

use crate::config::ObjectiveTerm;
use crate::fitness::Evaluation;
use crate::optimizer::OptimizationResult;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Best design of an optimization run plus run totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BestDesignReport {
    pub timestamp: DateTime<Utc>,
    pub objectives: Vec<ObjectiveTerm>,
    pub best: Option<Evaluation>,
    pub best_fitness: Option<f64>,
    pub generations_completed: usize,
    pub total_evaluations: usize,
    pub failed_evaluations: usize,
    pub cache_hits: usize,
    pub stopped_early: bool,
}

impl BestDesignReport {
    pub fn new(objectives: &[ObjectiveTerm], result: &OptimizationResult) -> Self {
        Self {
            timestamp: Utc::now(),
            objectives: objectives.to_vec(),
            best: result.best.clone(),
            best_fitness: result.best.as_ref().map(|e| e.score()),
            generations_completed: result.generations_completed,
            total_evaluations: result.total_evaluations,
            failed_evaluations: result.failed_evaluations,
            cache_hits: result.cache_hits,
            stopped_early: result.stopped_early,
        }
    }
}

/// Write any serializable value as pretty JSON.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {:?}", parent))?;
    }
    let content = serde_json::to_string_pretty(value).context("serialize report")?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObjectiveKind;

    #[tokio::test]
    async fn test_best_design_report_without_best() {
        let result = OptimizationResult {
            best: None,
            generations_completed: 0,
            total_evaluations: 0,
            failed_evaluations: 0,
            cache_hits: 0,
            stopped_early: false,
            history: vec![],
        };
        let report =
            BestDesignReport::new(&[ObjectiveTerm::new(ObjectiveKind::MinimizeDrag)], &result);
        assert!(report.best_fitness.is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best_design.json");
        write_json(&path, &report).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["objectives"][0]["kind"], "minimize_drag");
        assert!(value["timestamp"].is_string());
    }
}
