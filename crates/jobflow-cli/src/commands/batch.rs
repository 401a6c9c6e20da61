//! `jobflow batch` — Run many jobs, a few at a time.

use serde::Serialize;

use jobflow_core::orchestration::{JobOrchestrator, JobOutcome, OutcomeStatus};

use super::{print_serialized, variant_or_default};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<JobOutcome>,
}

/// Read job URLs from a file: one per line, `#` starts a comment.
pub fn read_url_file(path: &str) -> Result<Vec<String>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read URL file '{}': {}", path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

pub async fn run(
    orchestrator: &JobOrchestrator,
    mut urls: Vec<String>,
    file: Option<&str>,
    variant: Option<&str>,
    parallel: Option<usize>,
) -> Result<BatchSummary, String> {
    if let Some(path) = file {
        urls.extend(read_url_file(path)?);
    }
    if urls.is_empty() {
        return Err("No job URLs given".to_string());
    }

    let parallel = parallel
        .unwrap_or(orchestrator.app_state().config.workflow.max_parallel)
        .max(1);
    let variant = variant_or_default(orchestrator, variant);
    let outcomes = orchestrator.batch_process(&urls, &variant, parallel).await;
    orchestrator.shutdown().await;

    let succeeded = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Success)
        .count();
    let summary = BatchSummary {
        total: outcomes.len(),
        succeeded,
        failed: outcomes.len() - succeeded,
        outcomes,
    };
    print_serialized(&summary)?;
    Ok(summary)
}
