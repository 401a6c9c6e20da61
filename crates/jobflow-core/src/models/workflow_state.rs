use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Execution status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Initiated,
    Researching,
    Scoring,
    Positioning,
    Generating,
    Reviewing,
    Complete,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::Researching => "RESEARCHING",
            Self::Scoring => "SCORING",
            Self::Positioning => "POSITIONING",
            Self::Generating => "GENERATING",
            Self::Reviewing => "REVIEWING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "INITIATED" => Some(Self::Initiated),
            "RESEARCHING" => Some(Self::Researching),
            "SCORING" => Some(Self::Scoring),
            "POSITIONING" => Some(Self::Positioning),
            "GENERATING" => Some(Self::Generating),
            "REVIEWING" => Some(Self::Reviewing),
            "COMPLETE" => Some(Self::Complete),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether a record in this status may move to `next`.
    ///
    /// Terminal states accept nothing; INITIATED is never re-entered once
    /// left. Re-applying the current status is a no-op and allowed.
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        if *self == next {
            return !self.is_terminal();
        }
        if self.is_terminal() {
            return false;
        }
        next != Self::Initiated
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage result slots on a workflow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageSlot {
    Research,
    Scoring,
    Positioning,
    Content,
    Review,
}

impl StageSlot {
    /// Key under which the slot's value is handed to downstream agents.
    pub fn input_key(&self) -> &'static str {
        match self {
            Self::Research => "research_data",
            Self::Scoring => "scoring_result",
            Self::Positioning => "positioning_strategy",
            Self::Content => "generated_content",
            Self::Review => "qa_result",
        }
    }
}

/// The authoritative record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub job_id: String,
    pub job_url: String,
    pub company: String,
    pub role: String,
    pub status: WorkflowStatus,
    pub workflow_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub research_data: Option<serde_json::Value>,
    #[serde(default)]
    pub scoring_result: Option<serde_json::Value>,
    #[serde(default)]
    pub positioning_strategy: Option<serde_json::Value>,
    #[serde(default)]
    pub generated_content: Option<serde_json::Value>,
    #[serde(default)]
    pub qa_result: Option<serde_json::Value>,
    #[serde(default)]
    pub metrics: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl WorkflowState {
    pub fn new(input: NewWorkflowState) -> Self {
        let now = Utc::now();
        Self {
            job_id: input.job_id,
            job_url: input.job_url,
            company: input.company,
            role: input.role,
            status: WorkflowStatus::Initiated,
            workflow_type: input.workflow_type,
            created_at: now,
            updated_at: now,
            research_data: None,
            scoring_result: None,
            positioning_strategy: None,
            generated_content: None,
            qa_result: None,
            metrics: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn slot(&self, slot: StageSlot) -> Option<&serde_json::Value> {
        match slot {
            StageSlot::Research => self.research_data.as_ref(),
            StageSlot::Scoring => self.scoring_result.as_ref(),
            StageSlot::Positioning => self.positioning_strategy.as_ref(),
            StageSlot::Content => self.generated_content.as_ref(),
            StageSlot::Review => self.qa_result.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: StageSlot) -> &mut Option<serde_json::Value> {
        match slot {
            StageSlot::Research => &mut self.research_data,
            StageSlot::Scoring => &mut self.scoring_result,
            StageSlot::Positioning => &mut self.positioning_strategy,
            StageSlot::Content => &mut self.generated_content,
            StageSlot::Review => &mut self.qa_result,
        }
    }

    /// Apply the non-status parts of an update. Status changes are checked
    /// and applied by the state store.
    pub(crate) fn apply_fields(&mut self, update: StateUpdate) {
        for (slot, value) in update.slots {
            *self.slot_mut(slot) = Some(value);
        }
        self.metrics.extend(update.metrics);
        self.errors.extend(update.errors);
    }
}

/// Input for creating a new workflow record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkflowState {
    pub job_id: String,
    pub job_url: String,
    pub company: String,
    pub role: String,
    pub workflow_type: String,
}

/// A partial update to a workflow record.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub status: Option<WorkflowStatus>,
    pub slots: Vec<(StageSlot, serde_json::Value)>,
    pub metrics: HashMap<String, serde_json::Value>,
    pub errors: Vec<String>,
}

impl StateUpdate {
    pub fn status(status: WorkflowStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_slot(mut self, slot: StageSlot, value: serde_json::Value) -> Self {
        self.slots.push((slot, value));
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }
}

/// Derived metrics for one workflow record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetrics {
    pub job_id: String,
    pub company: String,
    pub role: String,
    pub status: WorkflowStatus,
    pub workflow_type: String,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rubric_score: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_recommendation: Option<String>,
    pub error_count: usize,
    /// Metrics recorded on the workflow (step attempts, durations, agent metrics).
    #[serde(flatten)]
    pub recorded: HashMap<String, serde_json::Value>,
}

impl WorkflowMetrics {
    pub fn from_state(state: &WorkflowState) -> Self {
        let duration = state.updated_at - state.created_at;
        let (rubric_score, score_recommendation) = match &state.scoring_result {
            Some(scoring) => (
                Some(scoring.get("total_score").cloned().unwrap_or(serde_json::json!(0))),
                Some(
                    scoring
                        .get("recommendation")
                        .and_then(|r| r.as_str())
                        .unwrap_or_default()
                        .to_string(),
                ),
            ),
            None => (None, None),
        };

        Self {
            job_id: state.job_id.clone(),
            company: state.company.clone(),
            role: state.role.clone(),
            status: state.status,
            workflow_type: state.workflow_type.clone(),
            duration_seconds: duration.num_milliseconds() as f64 / 1000.0,
            rubric_score,
            score_recommendation,
            error_count: state.errors.len(),
            recorded: state.metrics.clone(),
        }
    }
}
