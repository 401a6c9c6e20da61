//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses the
//! jobflow-core components through a `JobOrchestrator`.

pub mod batch;
pub mod health;
pub mod offline;
pub mod run;
pub mod score;
pub mod state;
pub mod workflow;

use std::path::{Path, PathBuf};

use jobflow_core::orchestration::JobOrchestrator;
use jobflow_core::AppConfig;

/// Build an orchestrator from configuration and register the offline agents.
///
/// `state_dir` overrides whatever the configuration says.
pub fn init_orchestrator(
    config_path: Option<&str>,
    state_dir: Option<&str>,
) -> Result<JobOrchestrator, String> {
    let mut config = AppConfig::load(config_path.map(Path::new)).map_err(|e| e.to_string())?;
    if let Some(dir) = state_dir {
        config.state_dir = PathBuf::from(dir);
    }

    let orchestrator = JobOrchestrator::new(config).map_err(|e| e.to_string())?;
    offline::register_offline_agents(orchestrator.engine(), &orchestrator.app_state().config);
    Ok(orchestrator)
}

/// The variant to run: the one asked for, else `workflow.default_variant`.
pub fn variant_or_default(orchestrator: &JobOrchestrator, variant: Option<&str>) -> String {
    variant
        .map(str::to_string)
        .unwrap_or_else(|| orchestrator.app_state().config.workflow.default_variant.clone())
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Serialize and pretty-print any value.
pub fn print_serialized<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let value = serde_json::to_value(value).map_err(|e| e.to_string())?;
    print_json(&value);
    Ok(())
}
