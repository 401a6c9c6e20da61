//! Offline pass-through agents.
//!
//! The research, scoring and writing agents are external services. The CLI
//! registers stand-ins for every agent a loaded variant names, so the
//! pipeline itself can be run and inspected without them. Each stand-in
//! answers with the job facts it was given, the prior outputs it saw and
//! its own `agents.<name>` config section.

use serde_json::{json, Value};

use jobflow_core::agents::{agent_fn, AgentResponse};
use jobflow_core::workflow::WorkflowEngine;
use jobflow_core::AppConfig;

pub fn register_offline_agents(engine: &WorkflowEngine, config: &AppConfig) {
    let mut names: Vec<String> = Vec::new();
    for key in engine.variant_keys() {
        if let Some(variant) = engine.variant(&key) {
            for agent in variant.agents() {
                if !names.iter().any(|n| n == agent) {
                    names.push(agent.to_string());
                }
            }
        }
    }

    for name in names {
        if engine.has_agent(&name) {
            continue;
        }
        let label = name.clone();
        let settings = config.agent_config(&name).cloned().unwrap_or(Value::Null);
        engine.register_agent(
            &name,
            agent_fn(move |input| {
                let label = label.clone();
                let settings = settings.clone();
                async move { Ok(pass_through(&label, &settings, &input)) }
            }),
        );
        tracing::debug!("[Offline] Registered pass-through agent: {}", name);
    }
}

fn pass_through(agent: &str, settings: &Value, input: &Value) -> AgentResponse {
    let received: Vec<&str> = input
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(k, v)| !v.is_null() && k.as_str() != "job_data" && k.as_str() != "workflow_config")
                .map(|(k, _)| k.as_str())
                .collect()
        })
        .unwrap_or_default();

    AgentResponse::ok(json!({
        "agent": agent,
        "offline": true,
        "company": input["job_data"]["company"],
        "role": input["job_data"]["role"],
        "emphasis": input["workflow_config"]["emphasis"],
        "received": received,
        "settings": settings,
    }))
    .with_metric("offline", json!(true))
}
