//! End-to-end scenarios for the bus, engine and state store working together.
//!
//! Each test builds its own bus, engine and temporary state directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::json;
use tempfile::TempDir;

use jobflow_core::agents::{agent_fn, AgentResponse};
use jobflow_core::events::MessageBus;
use jobflow_core::models::WorkflowStatus;
use jobflow_core::store::{ListFilter, StateManager};
use jobflow_core::workflow::{JobContext, StepDefinition, StepKind, WorkflowEngine, WorkflowVariant};
use jobflow_core::CoreError;

fn variant(steps: Vec<StepDefinition>) -> WorkflowVariant {
    WorkflowVariant {
        name: "Test Flow".to_string(),
        description: String::new(),
        steps,
        emphasis: "execution".to_string(),
        positioning_angle: "general".to_string(),
        voice_blend: Default::default(),
    }
}

/// research → scoring → positioning with the given scoring retry count.
fn three_step(scoring_retries: u32) -> WorkflowVariant {
    variant(vec![
        StepDefinition::new(StepKind::Research, "research_agent")
            .with_timeout(Duration::from_secs(2)),
        StepDefinition::new(StepKind::Scoring, "scoring_agent")
            .depends_on(&[StepKind::Research])
            .with_retry_count(scoring_retries)
            .with_timeout(Duration::from_secs(2)),
        StepDefinition::new(StepKind::Positioning, "positioning_agent")
            .depends_on(&[StepKind::Research, StepKind::Scoring])
            .with_timeout(Duration::from_secs(2)),
    ])
}

fn engine_with(dir: &TempDir, flow: WorkflowVariant, backoff: Duration) -> WorkflowEngine {
    let bus = MessageBus::new();
    bus.start();
    let mut variants = HashMap::new();
    variants.insert("test_flow".to_string(), flow);
    WorkflowEngine::new(bus, StateManager::new(dir.path()), variants).with_backoff_base(backoff)
}

fn echo_agent(label: &'static str) -> Arc<dyn jobflow_core::agents::Agent> {
    agent_fn(move |input| async move {
        Ok(AgentResponse::ok(json!({
            "from": label,
            "job_id": input["job_data"]["job_id"],
        })))
    })
}

fn job(id: &str) -> JobContext {
    JobContext::new(id, "https://boards.greenhouse.io/acme/jobs/1")
        .with_company("Acme")
        .with_role("Senior Product Manager")
}

#[tokio::test]
async fn test_scoring_recovers_on_third_attempt() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(&dir, three_step(3), Duration::from_millis(5));

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    engine.register_agent("research_agent", echo_agent("research"));
    engine.register_agent(
        "scoring_agent",
        agent_fn(move |_| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Ok(AgentResponse::failure(format!("rubric unavailable ({})", n)))
                } else {
                    Ok(AgentResponse::ok(json!({"total_score": 84, "recommendation": "apply"})))
                }
            }
        }),
    );
    engine.register_agent("positioning_agent", echo_agent("positioning"));

    let state = engine.execute("test_flow", job("abc123")).await.unwrap();

    assert_eq!(state.status, WorkflowStatus::Complete);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(state.research_data.as_ref().unwrap()["from"], json!("research"));
    assert_eq!(state.scoring_result.as_ref().unwrap()["total_score"], json!(84));
    assert_eq!(state.positioning_strategy.as_ref().unwrap()["from"], json!("positioning"));
    assert_eq!(state.metrics.get("scoring.attempts"), Some(&json!(3)));
    assert!(state.errors.is_empty());

    // The durable record matches what execute returned.
    let reloaded = StateManager::new(dir.path()).get("abc123").await.unwrap().unwrap();
    assert_eq!(reloaded, state);
}

#[tokio::test]
async fn test_scoring_exhausts_retries_and_fails_workflow() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(&dir, three_step(2), Duration::from_millis(5));

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    engine.register_agent("research_agent", echo_agent("research"));
    engine.register_agent(
        "scoring_agent",
        agent_fn(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(AgentResponse::failure("no rubric match"))
            }
        }),
    );
    engine.register_agent("positioning_agent", echo_agent("positioning"));

    let err = engine.execute("test_flow", job("fail-1")).await.unwrap_err();
    match err {
        CoreError::StepFailed { ref step, attempts } => {
            assert_eq!(step, "scoring");
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let state = engine.get_state("fail-1").await.unwrap().unwrap();
    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(state.errors.len(), 1);
    assert!(state.errors[0].contains("scoring"));
    assert!(state.research_data.is_some());
    assert!(state.scoring_result.is_none());
    assert!(state.positioning_strategy.is_none());
}

#[tokio::test]
async fn test_retry_bound_and_backoff_growth() {
    let dir = TempDir::new().unwrap();
    let flow = variant(vec![StepDefinition::new(StepKind::Research, "research_agent")
        .with_retry_count(3)
        .with_timeout(Duration::from_secs(2))]);
    let engine = engine_with(&dir, flow, Duration::from_millis(40));

    let seen: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    engine.register_agent(
        "research_agent",
        agent_fn(move |_| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(Instant::now());
                Ok(AgentResponse::failure("site unreachable"))
            }
        }),
    );

    let err = engine.execute("test_flow", job("retry-1")).await.unwrap_err();
    assert!(matches!(err, CoreError::StepFailed { attempts: 3, .. }));

    let times = seen.lock().unwrap().clone();
    assert_eq!(times.len(), 3);
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(first_gap >= Duration::from_millis(40));
    assert!(second_gap >= Duration::from_millis(80));
    assert!(second_gap >= first_gap);
}

#[tokio::test]
async fn test_status_advances_with_each_step() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(&dir, three_step(1), Duration::from_millis(5));
    let observed: Arc<Mutex<Vec<WorkflowStatus>>> = Arc::new(Mutex::new(Vec::new()));

    for name in ["research_agent", "scoring_agent", "positioning_agent"] {
        let store = engine.store().clone();
        let observed = observed.clone();
        engine.register_agent(
            name,
            agent_fn(move |input| {
                let store = store.clone();
                let observed = observed.clone();
                async move {
                    let job_id = input["job_data"]["job_id"].as_str().unwrap_or_default().to_string();
                    let state = store.get(&job_id).await.map_err(|e| e.to_string())?;
                    if let Some(state) = state {
                        observed.lock().unwrap().push(state.status);
                    }
                    Ok(AgentResponse::ok(json!({})))
                }
            }),
        );
    }

    let state = engine.execute("test_flow", job("mono-1")).await.unwrap();
    assert_eq!(state.status, WorkflowStatus::Complete);
    assert_eq!(
        *observed.lock().unwrap(),
        vec![
            WorkflowStatus::Researching,
            WorkflowStatus::Scoring,
            WorkflowStatus::Positioning,
        ]
    );
}

#[tokio::test]
async fn test_late_reply_does_not_satisfy_next_attempt() {
    let dir = TempDir::new().unwrap();
    let flow = variant(vec![StepDefinition::new(StepKind::Research, "research_agent")
        .with_retry_count(2)
        .with_timeout(Duration::from_millis(100))]);
    let engine = engine_with(&dir, flow, Duration::from_millis(1));

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    engine.register_agent(
        "research_agent",
        agent_fn(move |_| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                // First answer lands while the second attempt is waiting.
                let delay = if n == 1 { 150 } else { 400 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(AgentResponse::ok(json!({"attempt": n})))
            }
        }),
    );

    let err = engine.execute("test_flow", job("late-1")).await.unwrap_err();
    assert!(matches!(err, CoreError::StepFailed { attempts: 2, .. }));

    let state = engine.get_state("late-1").await.unwrap().unwrap();
    assert!(state.research_data.is_none());
}

#[tokio::test]
async fn test_unknown_variant_uses_role_default() {
    let dir = TempDir::new().unwrap();
    let bus = MessageBus::new();
    bus.start();
    let engine = WorkflowEngine::new(
        bus,
        StateManager::new(dir.path()),
        jobflow_core::workflow::VariantLoader::with_builtins().into_variants(),
    );
    for name in ["research_agent", "scoring_agent", "positioning_agent", "content_agent"] {
        engine.register_agent(name, echo_agent("any"));
    }

    let context = JobContext::new("vp-1", "https://jobs.lever.co/acme/1").with_role("VP of Product");
    let state = engine.execute("does_not_exist", context).await.unwrap();
    assert_eq!(state.workflow_type, "director_level");
    assert_eq!(state.status, WorkflowStatus::Complete);
}

#[tokio::test]
async fn test_duplicate_job_id_is_rejected_without_touching_state() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(&dir, three_step(1), Duration::from_millis(5));
    for name in ["research_agent", "scoring_agent", "positioning_agent"] {
        engine.register_agent(name, echo_agent(name_label(name)));
    }

    let first = engine.execute("test_flow", job("dup-1")).await.unwrap();
    let err = engine.execute("test_flow", job("dup-1")).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let state = engine.get_state("dup-1").await.unwrap().unwrap();
    assert_eq!(state, first);
}

fn name_label(name: &str) -> &'static str {
    match name {
        "research_agent" => "research",
        "scoring_agent" => "scoring",
        _ => "positioning",
    }
}

#[tokio::test]
async fn test_concurrent_jobs_keep_their_own_replies() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(&dir, three_step(1), Duration::from_millis(5));
    for name in ["research_agent", "scoring_agent", "positioning_agent"] {
        engine.register_agent(
            name,
            agent_fn(|input| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(AgentResponse::ok(json!({"job_id": input["job_data"]["job_id"]})))
            }),
        );
    }

    let ids = ["c-1", "c-2", "c-3", "c-4"];
    let runs = ids.iter().map(|id| engine.execute("test_flow", job(id)));
    let results = join_all(runs).await;

    for (id, result) in ids.iter().zip(results) {
        let state = result.unwrap();
        assert_eq!(state.status, WorkflowStatus::Complete);
        assert_eq!(state.research_data.unwrap()["job_id"], json!(id));
        assert_eq!(state.positioning_strategy.unwrap()["job_id"], json!(id));
    }

    let listed = engine.list_states(&ListFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 4);
}

#[tokio::test]
async fn test_independent_engines_share_nothing() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let engine_a = engine_with(&dir_a, three_step(1), Duration::from_millis(5));
    let engine_b = engine_with(&dir_b, three_step(1), Duration::from_millis(5));
    for name in ["research_agent", "scoring_agent", "positioning_agent"] {
        engine_a.register_agent(name, echo_agent("a"));
    }

    engine_a.execute("test_flow", job("shared-id")).await.unwrap();
    assert!(engine_b.get_state("shared-id").await.unwrap().is_none());
    assert!(!engine_b.has_agent("research_agent"));

    let err = engine_b.execute("test_flow", job("shared-id")).await.unwrap_err();
    assert!(matches!(err, CoreError::Config(_)));

    assert!(engine_a.clear_state("shared-id").await.unwrap());
    assert!(!engine_a.clear_state("shared-id").await.unwrap());
}
