//! Agent contract — what every pipeline step collaborator must satisfy.
//!
//! Agents accept one JSON input and answer with an [`AgentResponse`]. A
//! returned `Err` is a raised failure: the bus converts it into an
//! error-kind envelope, while `Ok(AgentResponse { success: false, .. })` is a
//! regular failure reply. The engine retries both.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Standardized agent response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub metrics: HashMap<String, serde_json::Value>,
}

impl AgentResponse {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            errors: Vec::new(),
            metrics: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            errors: vec![error.into()],
            metrics: HashMap::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

/// A pipeline step collaborator.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn process(&self, input: serde_json::Value) -> Result<AgentResponse, String>;
}

/// Adapter turning an async closure into an [`Agent`].
pub struct FnAgent<F> {
    f: F,
}

impl<F> FnAgent<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Agent for FnAgent<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AgentResponse, String>> + Send + 'static,
{
    async fn process(&self, input: serde_json::Value) -> Result<AgentResponse, String> {
        (self.f)(input).await
    }
}

/// Wrap an async closure as a shareable agent handle.
pub fn agent_fn<F, Fut>(f: F) -> Arc<dyn Agent>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AgentResponse, String>> + Send + 'static,
{
    Arc::new(FnAgent::new(f))
}

/// Runtime statistics the bus keeps for each registered agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub tasks_processed: u64,
    pub tasks_successful: u64,
    pub tasks_failed: u64,
    pub total_processing_ms: u64,
}

impl AgentStats {
    pub fn record(&mut self, success: bool, elapsed: Duration) {
        self.tasks_processed += 1;
        if success {
            self.tasks_successful += 1;
        } else {
            self.tasks_failed += 1;
        }
        self.total_processing_ms += elapsed.as_millis() as u64;
    }

    /// Percentage of processed tasks that succeeded.
    pub fn success_rate(&self) -> f64 {
        self.tasks_successful as f64 / self.tasks_processed.max(1) as f64 * 100.0
    }

    pub fn avg_processing_ms(&self) -> f64 {
        self.total_processing_ms as f64 / self.tasks_processed.max(1) as f64
    }
}
