//! `jobflow status | list | metrics | clear` — Inspect stored workflow state.

use jobflow_core::models::{WorkflowMetrics, WorkflowState, WorkflowStatus};
use jobflow_core::orchestration::{JobOrchestrator, JobStatusSummary};
use jobflow_core::store::ListFilter;

use super::print_serialized;

pub async fn status(orchestrator: &JobOrchestrator, job_id: &str) -> Result<JobStatusSummary, String> {
    let summary = orchestrator
        .status(job_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Job {} not found", job_id))?;
    print_serialized(&summary)?;
    Ok(summary)
}

pub async fn list(
    orchestrator: &JobOrchestrator,
    status: Option<&str>,
    variant: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<Vec<WorkflowState>, String> {
    let status = status
        .map(|s| WorkflowStatus::from_str(s).ok_or_else(|| format!("Unknown status '{}'", s)))
        .transpose()?;
    let filter = ListFilter {
        status,
        workflow_type: variant.map(str::to_string),
        limit,
    };
    let states = orchestrator
        .engine()
        .list_states(&filter)
        .await
        .map_err(|e| e.to_string())?;

    if json {
        print_serialized(&states)?;
    } else {
        print_table(&states);
    }
    Ok(states)
}

pub async fn metrics(orchestrator: &JobOrchestrator, job_id: &str) -> Result<WorkflowMetrics, String> {
    let metrics = orchestrator
        .app_state()
        .state_manager
        .metrics(job_id)
        .await
        .map_err(|e| e.to_string())?;
    print_serialized(&metrics)?;
    Ok(metrics)
}

pub async fn clear(orchestrator: &JobOrchestrator, job_id: &str) -> Result<(), String> {
    let removed = orchestrator
        .engine()
        .clear_state(job_id)
        .await
        .map_err(|e| e.to_string())?;
    if removed {
        println!("Cleared state for job {}", job_id);
    } else {
        println!("No state stored for job {}", job_id);
    }
    Ok(())
}

fn print_table(states: &[WorkflowState]) {
    if states.is_empty() {
        println!("No workflows found.");
        return;
    }

    println!("┌──────────┬──────────────────┬──────────────────┬─────────────┬──────────────────┐");
    println!("│ Job      │ Company          │ Variant          │ Status      │ Updated          │");
    println!("├──────────┼──────────────────┼──────────────────┼─────────────┼──────────────────┤");
    for state in states {
        println!(
            "│ {:<8} │ {:<16} │ {:<16} │ {:<11} │ {:<16} │",
            truncate(&state.job_id, 8),
            truncate(&state.company, 16),
            truncate(&state.workflow_type, 16),
            state.status.as_str(),
            state.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
    println!("└──────────┴──────────────────┴──────────────────┴─────────────┴──────────────────┘");
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
