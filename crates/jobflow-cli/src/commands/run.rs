//! `jobflow run` — Run one job through a workflow.

use jobflow_core::orchestration::{JobOrchestrator, JobOutcome, OutcomeStatus};

use super::{print_serialized, variant_or_default};

pub async fn run(
    orchestrator: &JobOrchestrator,
    url: &str,
    company: Option<&str>,
    role: Option<&str>,
    variant: Option<&str>,
    job_id: Option<&str>,
) -> Result<JobOutcome, String> {
    let variant = variant_or_default(orchestrator, variant);
    let outcome = match job_id {
        Some(id) => {
            orchestrator
                .process_job_with_id(id, url, company, role, &variant)
                .await
        }
        None => orchestrator.process_job(url, company, role, &variant).await,
    };
    orchestrator.shutdown().await;

    print_serialized(&outcome)?;

    match outcome.status {
        OutcomeStatus::Success => Ok(outcome),
        _ => Err(format!(
            "Job {} did not complete: {}",
            outcome.job_id,
            outcome.error.as_deref().unwrap_or("unknown error")
        )),
    }
}
