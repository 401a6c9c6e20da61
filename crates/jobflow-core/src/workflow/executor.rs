//! Workflow Engine — drives a variant's steps for one job.
//!
//! The engine:
//! 1. Resolves the variant (falling back to a seniority-based default)
//! 2. Checks every step's agent is registered
//! 3. Creates the job's workflow state
//! 4. Runs each step in declaration order over the message bus, with
//!    per-attempt timeouts and exponential backoff between attempts
//! 5. Records results, step metrics and the final status in the state store

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agents::{Agent, AgentResponse};
use crate::error::{CoreError, CoreResult};
use crate::events::{MessageBus, MessageFilter};
use crate::models::{
    AgentMessage, MessageKind, NewWorkflowState, StateUpdate, WorkflowState, WorkflowStatus,
};
use crate::store::{ListFilter, StateManager};
use crate::workflow::schema::{StepDefinition, WorkflowVariant};
use crate::workflow::steps::StepKind;

/// Bus name the engine sends from and receives replies on.
pub const ENGINE_NAME: &str = "workflow_engine";

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Job facts handed to every agent as `job_data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: String,
    pub url: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub role: String,
    /// Any additional caller-supplied fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = company.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}

/// Pick a built-in variant key from the role title.
///
/// Plain substring match on the lowercased title, so "SVP" and "EVP"
/// count as director level.
pub fn default_variant_for_role(role: &str) -> &'static str {
    const SENIORITY: [(&[&str], &str); 2] = [
        (&["director", "vp", "head"], "director_level"),
        (&["principal", "staff"], "principal_level"),
    ];
    let role = role.to_lowercase();
    SENIORITY
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| role.contains(k)))
        .map(|(_, variant)| *variant)
        .unwrap_or("senior_level")
}

enum Attempt {
    Succeeded(AgentResponse),
    /// Failure reply, or no reply within the timeout.
    Rejected(String),
}

struct StepOutcome {
    result: Value,
    attempts: u32,
    metrics: HashMap<String, Value>,
}

pub struct WorkflowEngine {
    bus: MessageBus,
    store: StateManager,
    variants: HashMap<String, WorkflowVariant>,
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
    backoff_base: Duration,
}

impl WorkflowEngine {
    pub fn new(
        bus: MessageBus,
        store: StateManager,
        variants: HashMap<String, WorkflowVariant>,
    ) -> Self {
        Self {
            bus,
            store,
            variants,
            agents: RwLock::new(HashMap::new()),
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Override the first backoff delay (doubled on every further retry).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn store(&self) -> &StateManager {
        &self.store
    }

    pub fn variant(&self, key: &str) -> Option<&WorkflowVariant> {
        self.variants.get(key)
    }

    pub fn variant_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.variants.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Register an agent with the engine and the bus.
    pub fn register_agent(&self, name: &str, agent: Arc<dyn Agent>) {
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), agent.clone());
        self.bus.register(name, agent);
        tracing::info!("[WorkflowEngine] Registered agent: {}", name);
    }

    /// The agent registered under `name`, for callers that invoke it
    /// directly instead of through a workflow.
    pub fn agent(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn has_agent(&self, name: &str) -> bool {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Resolve a requested variant, falling back to the role heuristic when
    /// the key is unknown.
    pub fn resolve_variant(&self, requested: &str, job: &JobContext) -> CoreResult<(String, &WorkflowVariant)> {
        if let Some(variant) = self.variants.get(requested) {
            return Ok((requested.to_string(), variant));
        }

        let fallback = default_variant_for_role(&job.role);
        match self.variants.get(fallback) {
            Some(variant) => {
                tracing::info!(
                    "[WorkflowEngine] Variant '{}' not found, using '{}' for role '{}'",
                    requested,
                    fallback,
                    job.role
                );
                Ok((fallback.to_string(), variant))
            }
            None => Err(CoreError::Config(format!(
                "Unknown workflow variant '{}' and default '{}' is not loaded",
                requested, fallback
            ))),
        }
    }

    /// Run a workflow for one job and return its final state.
    ///
    /// On failure the state is left in FAILED with the error appended and
    /// any completed step results kept; the error is returned.
    pub async fn execute(&self, variant: &str, job: JobContext) -> CoreResult<WorkflowState> {
        let (variant_key, variant) = self.resolve_variant(variant, &job)?;

        let missing: Vec<&str> = variant
            .agents()
            .into_iter()
            .filter(|agent| !self.has_agent(agent))
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::Config(format!(
                "Workflow '{}' uses unregistered agent(s): {}",
                variant_key,
                missing.join(", ")
            )));
        }

        let state = self
            .store
            .create(NewWorkflowState {
                job_id: job.job_id.clone(),
                job_url: job.url.clone(),
                company: job.company.clone(),
                role: job.role.clone(),
                workflow_type: variant_key.clone(),
            })
            .await?;

        tracing::info!(
            "[WorkflowEngine] Executing workflow '{}' for job {} ({})",
            variant.name,
            state.job_id,
            state.company
        );

        match self.run_steps(&variant_key, variant, &job).await {
            Ok(()) => {
                let state = self
                    .store
                    .update(&job.job_id, StateUpdate::status(WorkflowStatus::Complete))
                    .await?;
                tracing::info!("[WorkflowEngine] Workflow completed for job {}", job.job_id);
                Ok(state)
            }
            Err(e) => {
                tracing::error!("[WorkflowEngine] Workflow failed for job {}: {}", job.job_id, e);
                let update = StateUpdate::status(WorkflowStatus::Failed).with_error(e.to_string());
                if let Err(store_err) = self.store.update(&job.job_id, update).await {
                    tracing::error!(
                        "[WorkflowEngine] Could not record failure for job {}: {}",
                        job.job_id,
                        store_err
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn get_state(&self, job_id: &str) -> CoreResult<Option<WorkflowState>> {
        self.store.get(job_id).await
    }

    pub async fn list_states(&self, filter: &ListFilter) -> CoreResult<Vec<WorkflowState>> {
        self.store.list(filter).await
    }

    pub async fn clear_state(&self, job_id: &str) -> CoreResult<bool> {
        self.store.delete(job_id).await
    }

    // ─── Steps ──────────────────────────────────────────────────────────

    async fn run_steps(
        &self,
        variant_key: &str,
        variant: &WorkflowVariant,
        job: &JobContext,
    ) -> CoreResult<()> {
        let job_data = serde_json::to_value(job)?;
        let mut completed: HashMap<StepKind, Value> = HashMap::new();

        for step in &variant.steps {
            if let Some(dep) = step.depends_on.iter().find(|d| !completed.contains_key(d)) {
                return Err(CoreError::Config(format!(
                    "Step '{}' requires '{}', which has not completed",
                    step.name, dep
                )));
            }

            self.store
                .update(&job.job_id, StateUpdate::status(step.name.status()))
                .await?;

            tracing::info!("[WorkflowEngine] Executing step: {} ({})", step.name, job.job_id);
            let input = build_step_input(step.name, variant, &job_data, &completed);
            let started = Instant::now();
            let outcome = self.execute_step(&job.job_id, variant_key, step, input).await?;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let mut update = StateUpdate::default()
                .with_slot(step.name.slot(), outcome.result.clone())
                .with_metric(format!("{}.attempts", step.name), json!(outcome.attempts))
                .with_metric(format!("{}.duration_ms", step.name), json!(elapsed_ms));
            for (key, value) in outcome.metrics {
                update = update.with_metric(format!("{}.{}", step.name, key), value);
            }
            self.store.update(&job.job_id, update).await?;

            completed.insert(step.name, outcome.result);
        }

        Ok(())
    }

    /// Run one step with retry. A raised error from the final attempt is
    /// returned as is; a final failure reply or timeout becomes `StepFailed`.
    async fn execute_step(
        &self,
        job_id: &str,
        variant_key: &str,
        step: &StepDefinition,
        input: Value,
    ) -> CoreResult<StepOutcome> {
        let mut last_error = None;

        for attempt in 0..step.retry_count {
            match self.attempt_step(job_id, variant_key, step, &input, attempt).await {
                Ok(Attempt::Succeeded(response)) => {
                    return Ok(StepOutcome {
                        result: response.result.unwrap_or(Value::Null),
                        attempts: attempt + 1,
                        metrics: response.metrics,
                    });
                }
                Ok(Attempt::Rejected(reason)) => {
                    tracing::warn!(
                        "[WorkflowEngine] Step {} attempt {}/{} failed: {}",
                        step.name,
                        attempt + 1,
                        step.retry_count,
                        reason
                    );
                    last_error = None;
                }
                Err(e) => {
                    tracing::error!(
                        "[WorkflowEngine] Step {} attempt {}/{} error: {}",
                        step.name,
                        attempt + 1,
                        step.retry_count,
                        e
                    );
                    last_error = Some(e);
                }
            }

            if attempt + 1 < step.retry_count {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::StepFailed {
            step: step.name.to_string(),
            attempts: step.retry_count,
        }))
    }

    async fn attempt_step(
        &self,
        job_id: &str,
        variant_key: &str,
        step: &StepDefinition,
        input: &Value,
        attempt: u32,
    ) -> CoreResult<Attempt> {
        let request = AgentMessage::new(ENGINE_NAME, &step.agent, step.name.request_kind(), input.clone())
            .with_correlation_id(job_id)
            .with_metadata("step", json!(step.name.as_str()))
            .with_metadata("attempt", json!(attempt + 1))
            .with_metadata("workflow_type", json!(variant_key));

        // Subscribe before sending so a fast reply cannot be missed.
        let pending = self.bus.expect(
            ENGINE_NAME,
            MessageFilter::new()
                .correlation_id(job_id)
                .reply_to(request.id.clone()),
        );
        self.bus.send(request);

        let Some(reply) = pending.wait(step.timeout()).await else {
            return Ok(Attempt::Rejected(format!(
                "no reply from {} within {:?}",
                step.agent,
                step.timeout()
            )));
        };

        if reply.kind == MessageKind::Error {
            let message = reply
                .payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(CoreError::Agent {
                agent: step.agent.clone(),
                message,
            });
        }

        let response: AgentResponse = serde_json::from_value(reply.payload)?;
        if response.success {
            Ok(Attempt::Succeeded(response))
        } else if response.errors.is_empty() {
            Ok(Attempt::Rejected(format!("{} reported failure", step.agent)))
        } else {
            Ok(Attempt::Rejected(response.errors.join("; ")))
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Agent input: job data, variant settings, and the fixed set of prior
/// outputs the step consumes (null when that step did not run).
fn build_step_input(
    step: StepKind,
    variant: &WorkflowVariant,
    job_data: &Value,
    completed: &HashMap<StepKind, Value>,
) -> Value {
    let mut input = serde_json::Map::new();
    input.insert("job_data".to_string(), job_data.clone());
    input.insert(
        "workflow_config".to_string(),
        json!({
            "emphasis": variant.emphasis,
            "positioning_angle": variant.positioning_angle,
            "voice_blend": variant.voice_blend,
        }),
    );
    for prior in step.inputs() {
        let value = completed.get(prior).cloned().unwrap_or(Value::Null);
        input.insert(prior.slot().input_key().to_string(), value);
    }
    Value::Object(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::agent_fn;
    use crate::workflow::loader::VariantLoader;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> WorkflowEngine {
        let bus = MessageBus::new();
        bus.start();
        WorkflowEngine::new(
            bus,
            StateManager::new(dir.path()),
            VariantLoader::with_builtins().into_variants(),
        )
        .with_backoff_base(Duration::from_millis(5))
    }

    #[test]
    fn test_default_variant_heuristic() {
        assert_eq!(default_variant_for_role("Director of Product"), "director_level");
        assert_eq!(default_variant_for_role("VP, Engineering"), "director_level");
        assert_eq!(default_variant_for_role("Head of Growth"), "director_level");
        assert_eq!(default_variant_for_role("Staff Engineer"), "principal_level");
        assert_eq!(default_variant_for_role("Principal PM"), "principal_level");
        assert_eq!(default_variant_for_role("Senior Product Manager"), "senior_level");
        assert_eq!(default_variant_for_role("SVP, Product"), "director_level");
        assert_eq!(default_variant_for_role("EVP Operations"), "director_level");
        // Director keywords win over principal ones.
        assert_eq!(default_variant_for_role("Head of Staff Engineering"), "director_level");
        assert_eq!(default_variant_for_role("Staffing Coordinator"), "principal_level");
        assert_eq!(default_variant_for_role(""), "senior_level");
    }

    #[test]
    fn test_step_input_carries_fixed_prior_outputs() {
        let variant = VariantLoader::with_builtins()
            .get("director_level")
            .cloned()
            .unwrap();
        let mut completed = HashMap::new();
        completed.insert(StepKind::Research, json!({"industry": "fintech"}));

        let input = build_step_input(
            StepKind::Positioning,
            &variant,
            &json!({"job_id": "j1"}),
            &completed,
        );
        assert_eq!(input["job_data"]["job_id"], json!("j1"));
        assert_eq!(input["workflow_config"]["emphasis"], json!("management"));
        assert_eq!(input["workflow_config"]["voice_blend"]["analytical"], json!(50));
        assert_eq!(input["research_data"]["industry"], json!("fintech"));
        assert_eq!(input["scoring_result"], Value::Null);
        assert!(input.get("generated_content").is_none());
    }

    #[test]
    fn test_backoff_doubles() {
        let dir = TempDir::new().unwrap();
        let engine = WorkflowEngine::new(
            MessageBus::new(),
            StateManager::new(dir.path()),
            HashMap::new(),
        );
        assert_eq!(engine.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(engine.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(engine.backoff_delay(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_unregistered_agent_fails_before_state_exists() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.register_agent(
            "research_agent",
            agent_fn(|_| async { Ok(AgentResponse::ok(json!({}))) }),
        );

        let err = engine
            .execute("senior_level", JobContext::new("early", "https://example.com"))
            .await
            .unwrap_err();
        match err {
            CoreError::Config(msg) => assert!(msg.contains("scoring_agent")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(engine.get_state("early").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_agent_error_is_returned_after_retries() {
        let dir = TempDir::new().unwrap();
        let bus = MessageBus::new();
        bus.start();
        let mut variants = HashMap::new();
        variants.insert(
            "solo".to_string(),
            WorkflowVariant {
                name: "Solo".to_string(),
                description: String::new(),
                steps: vec![StepDefinition::new(StepKind::Research, "research_agent")
                    .with_retry_count(2)
                    .with_timeout(Duration::from_secs(2))],
                emphasis: "balanced".to_string(),
                positioning_angle: "general".to_string(),
                voice_blend: Default::default(),
            },
        );
        let engine = WorkflowEngine::new(bus, StateManager::new(dir.path()), variants)
            .with_backoff_base(Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        engine.register_agent(
            "research_agent",
            agent_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("search backend down".to_string()) }
            }),
        );

        let err = engine
            .execute("solo", JobContext::new("raise-1", "https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Agent { ref agent, .. } if agent == "research_agent"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let state = engine.get_state("raise-1").await.unwrap().unwrap();
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].contains("search backend down"));
    }

    #[tokio::test]
    async fn test_step_metrics_are_recorded() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        for name in ["research_agent", "scoring_agent", "positioning_agent", "content_agent"] {
            engine.register_agent(
                name,
                agent_fn(|_| async {
                    Ok(AgentResponse::ok(json!({"ok": true})).with_metric("tokens", json!(12)))
                }),
            );
        }

        let state = engine
            .execute(
                "principal_level",
                JobContext::new("metrics-1", "https://example.com").with_role("Staff Engineer"),
            )
            .await
            .unwrap();
        assert_eq!(state.status, WorkflowStatus::Complete);
        assert_eq!(state.workflow_type, "principal_level");
        assert_eq!(state.metrics.get("research.attempts"), Some(&json!(1)));
        assert!(state.metrics.contains_key("content_generation.duration_ms"));
        assert_eq!(state.metrics.get("scoring.tokens"), Some(&json!(12)));
        assert!(state.generated_content.is_some());
    }
}
