//! Job orchestration — the entry point callers use to run applications.
//!
//! `JobOrchestrator` owns the shared app state, fills in job context the
//! caller left out, and turns workflow results into flat outcome records.
//! It never fails a call: errors are reported inside the outcome.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agents::Agent;
use crate::config::AppConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{WorkflowState, WorkflowStatus};
use crate::state::{AppState, AppStateInner};
use crate::workflow::{JobContext, WorkflowEngine};

/// Role assumed when the caller does not give one.
pub const DEFAULT_ROLE: &str = "Product Manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    /// The workflow ran and ended FAILED.
    Failed,
    /// The workflow could not run (configuration, storage, ...).
    Error,
}

/// Summary of one `process_job` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    pub status: OutcomeStatus,
    pub processing_time_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positioning: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    fn from_state(state: &WorkflowState, started: Instant, error: Option<String>) -> Self {
        let status = if state.status == WorkflowStatus::Complete {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::Failed
        };
        Self {
            job_id: state.job_id.clone(),
            status,
            processing_time_secs: started.elapsed().as_secs_f64(),
            workflow_type: Some(state.workflow_type.clone()),
            company: Some(state.company.clone()),
            score: state
                .scoring_result
                .as_ref()
                .and_then(|s| s.get("total_score").cloned()),
            scoring: state.scoring_result.clone(),
            positioning: state.positioning_strategy.clone(),
            content: state.generated_content.clone(),
            qa: state.qa_result.clone(),
            error,
        }
    }

    fn error(job_id: &str, started: Instant, error: String) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: OutcomeStatus::Error,
            processing_time_secs: started.elapsed().as_secs_f64(),
            workflow_type: None,
            company: None,
            score: None,
            scoring: None,
            positioning: None,
            content: None,
            qa: None,
            error: Some(error),
        }
    }
}

/// Point-in-time view of a job for status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSummary {
    pub job_id: String,
    pub status: WorkflowStatus,
    pub company: String,
    pub role: String,
    pub workflow_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub score: Option<Value>,
    pub recommendation: Option<String>,
    pub errors: Vec<String>,
}

impl From<&WorkflowState> for JobStatusSummary {
    fn from(state: &WorkflowState) -> Self {
        let scoring = state.scoring_result.as_ref();
        Self {
            job_id: state.job_id.clone(),
            status: state.status,
            company: state.company.clone(),
            role: state.role.clone(),
            workflow_type: state.workflow_type.clone(),
            created_at: state.created_at,
            updated_at: state.updated_at,
            score: scoring.and_then(|s| s.get("total_score").cloned()),
            recommendation: scoring
                .and_then(|s| s.get("recommendation"))
                .and_then(|r| r.as_str())
                .map(str::to_string),
            errors: state.errors.clone(),
        }
    }
}

/// Result of a quick fit check: research and scoring only, nothing stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreOutcome {
    pub url: String,
    pub company: String,
    /// `total_score` from the scoring agent, 0 when it did not succeed.
    pub score: Value,
    pub breakdown: Value,
    pub recommendation: String,
    pub research_quality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoreOutcome {
    fn new(url: &str, company: String) -> Self {
        Self {
            url: url.to_string(),
            company,
            score: json!(0),
            breakdown: json!({}),
            recommendation: "Unable to score".to_string(),
            research_quality: "low".to_string(),
            error: None,
        }
    }
}

pub struct JobOrchestrator {
    state: AppState,
}

impl JobOrchestrator {
    pub fn new(config: AppConfig) -> CoreResult<Self> {
        Ok(Self::from_state(Arc::new(AppStateInner::new(config)?)))
    }

    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn app_state(&self) -> &AppState {
        &self.state
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.state.engine
    }

    pub fn register_agent(&self, name: &str, agent: Arc<dyn Agent>) {
        self.state.engine.register_agent(name, agent);
    }

    /// Run one job end to end. Missing company is derived from the URL.
    pub async fn process_job(
        &self,
        url: &str,
        company: Option<&str>,
        role: Option<&str>,
        variant: &str,
    ) -> JobOutcome {
        let job_id = new_job_id();
        self.process_job_with_id(&job_id, url, company, role, variant)
            .await
    }

    pub async fn process_job_with_id(
        &self,
        job_id: &str,
        url: &str,
        company: Option<&str>,
        role: Option<&str>,
        variant: &str,
    ) -> JobOutcome {
        let started = Instant::now();
        let company = company
            .map(str::to_string)
            .unwrap_or_else(|| extract_company_from_url(url));
        let role = role.unwrap_or(DEFAULT_ROLE);

        tracing::info!(
            job_id = %job_id,
            url = %url,
            company = %company,
            role = %role,
            workflow_type = %variant,
            "[JobOrchestrator] job_processing_started"
        );

        self.state.message_bus.start();

        let context = JobContext::new(job_id, url)
            .with_company(company)
            .with_role(role);
        let outcome = match self.state.engine.execute(variant, context).await {
            Ok(state) => JobOutcome::from_state(&state, started, None),
            // The stored record, if any, belongs to an earlier run.
            Err(e @ (CoreError::Conflict(_) | CoreError::BadRequest(_))) => {
                JobOutcome::error(job_id, started, e.to_string())
            }
            Err(e) => match self.state.engine.get_state(job_id).await {
                Ok(Some(state)) if state.status == WorkflowStatus::Failed => {
                    JobOutcome::from_state(&state, started, Some(e.to_string()))
                }
                _ => JobOutcome::error(job_id, started, e.to_string()),
            },
        };

        tracing::info!(
            job_id = %outcome.job_id,
            status = ?outcome.status,
            processing_time = outcome.processing_time_secs,
            "[JobOrchestrator] job_processing_complete"
        );
        outcome
    }

    /// Process `urls` in chunks of `parallel` concurrent workflows.
    pub async fn batch_process(
        &self,
        urls: &[String],
        variant: &str,
        parallel: usize,
    ) -> Vec<JobOutcome> {
        tracing::info!("[JobOrchestrator] Batch processing {} jobs", urls.len());

        let mut outcomes = Vec::with_capacity(urls.len());
        for chunk in urls.chunks(parallel.max(1)) {
            let runs = chunk
                .iter()
                .map(|url| self.process_job(url, None, None, variant));
            outcomes.extend(join_all(runs).await);
        }
        outcomes
    }

    /// Score a posting without running a workflow.
    ///
    /// Research and scoring run concurrently against the same job data.
    /// An agent that answers with a failure leaves the defaults in place;
    /// a missing agent or a raised error is reported in `error`.
    pub async fn score_job(&self, url: &str, description: Option<&str>) -> ScoreOutcome {
        let company = extract_company_from_url(url);
        let mut outcome = ScoreOutcome::new(url, company.clone());
        tracing::info!(url = %url, company = %company, "[JobOrchestrator] job_scoring_started");

        let engine = &self.state.engine;
        let research = engine.agent("research_agent");
        let scoring = engine.agent("scoring_agent");
        let (Some(research), Some(scoring)) = (research.clone(), scoring.clone()) else {
            let missing = if research.is_none() { "research_agent" } else { "scoring_agent" };
            outcome.error = Some(format!("Agent '{}' is not registered", missing));
            tracing::error!("[JobOrchestrator] Scoring failed: {} is not registered", missing);
            return outcome;
        };

        let input = json!({
            "job_data": {
                "job_id": new_job_id(),
                "url": url,
                "description": description.unwrap_or_default(),
                "company": company,
            }
        });
        let (research, scoring) =
            futures::join!(research.process(input.clone()), scoring.process(input));

        match (research, scoring) {
            (Ok(research), Ok(scoring)) => {
                if let Some(result) = scoring.result.as_ref().filter(|_| scoring.success) {
                    if let Some(score) = result.get("total_score") {
                        outcome.score = score.clone();
                    }
                    if let Some(breakdown) = result.get("category_breakdown") {
                        outcome.breakdown = breakdown.clone();
                    }
                    if let Some(recommendation) =
                        result.get("recommendation").and_then(Value::as_str)
                    {
                        outcome.recommendation = recommendation.to_string();
                    }
                }
                if let Some(quality) = research
                    .result
                    .as_ref()
                    .filter(|_| research.success)
                    .and_then(|r| r.get("research_quality"))
                    .and_then(Value::as_str)
                {
                    outcome.research_quality = quality.to_string();
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("[JobOrchestrator] Scoring failed: {}", e);
                outcome.error = Some(e);
            }
        }

        tracing::info!(
            url = %url,
            score = %outcome.score,
            "[JobOrchestrator] job_scoring_complete"
        );
        outcome
    }

    pub async fn status(&self, job_id: &str) -> CoreResult<Option<JobStatusSummary>> {
        let state = self.state.engine.get_state(job_id).await?;
        Ok(state.as_ref().map(JobStatusSummary::from))
    }

    pub async fn shutdown(&self) {
        self.state.message_bus.stop().await;
        tracing::info!("[JobOrchestrator] Shutdown complete");
    }
}

/// Short job id: the first 8 characters of a v4 uuid.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn board_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^https?://(?:[a-z0-9-]+\.)*greenhouse\.io/(?:embed/job_board\?for=)?([^/?#&]+)",
            r"(?i)^https?://(?:[a-z0-9-]+\.)*lever\.co/([^/?#]+)",
            r"(?i)^https?://([^./]+)\.wd\d+\.myworkdayjobs\.com",
        ]
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!("[JobOrchestrator] Invalid board pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
    })
}

/// Best-effort company name from an applicant-tracking-system URL.
pub fn extract_company_from_url(url: &str) -> String {
    let trimmed = url.trim();
    board_patterns()
        .iter()
        .find_map(|re| re.captures(trimmed).and_then(|caps| caps.get(1)))
        .map(|slug| title_case(slug.as_str()))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn title_case(slug: &str) -> String {
    slug.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
