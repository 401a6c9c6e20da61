//! Shared application state: one bus, one state store, one engine.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{CoreError, CoreResult};
use crate::events::MessageBus;
use crate::store::StateManager;
use crate::workflow::{VariantLoader, WorkflowEngine};

pub struct AppStateInner {
    pub config: AppConfig,
    pub message_bus: MessageBus,
    pub state_manager: StateManager,
    pub engine: WorkflowEngine,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Wire the components from configuration.
    ///
    /// Variants come from the built-ins plus `workflow_dir`, if it exists.
    /// The bus is created stopped; call `message_bus.start()` from within a
    /// runtime before executing workflows.
    pub fn new(config: AppConfig) -> CoreResult<Self> {
        config.validate()?;

        let mut loader = VariantLoader::with_builtins();
        if config.workflow_dir.is_dir() {
            let dir = config.workflow_dir.to_string_lossy().to_string();
            loader.load_dir(&dir).map_err(CoreError::Config)?;
        } else {
            tracing::warn!(
                "[AppState] Workflow directory not found: {}, using built-in variants",
                config.workflow_dir.display()
            );
        }

        let message_bus = MessageBus::with_history_limit(config.history_limit);
        let state_manager = StateManager::new(&config.state_dir);
        let engine = WorkflowEngine::new(
            message_bus.clone(),
            state_manager.clone(),
            loader.into_variants(),
        )
        .with_backoff_base(Duration::from_millis(config.workflow.backoff_base_ms));

        Ok(Self {
            config,
            message_bus,
            state_manager,
            engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_loads_builtins_and_workflow_dir() {
        let dir = TempDir::new().unwrap();
        let workflows = dir.path().join("workflows");
        std::fs::create_dir_all(&workflows).unwrap();
        std::fs::write(
            workflows.join("research_only.yaml"),
            "name: Research Only\nsteps:\n  - name: research\n    agent: research_agent\n",
        )
        .unwrap();

        let config = AppConfig {
            state_dir: dir.path().join("state"),
            workflow_dir: workflows,
            ..Default::default()
        };
        let state = AppStateInner::new(config).unwrap();
        let keys = state.engine.variant_keys();
        assert!(keys.contains(&"research_only".to_string()));
        assert!(keys.contains(&"senior_level".to_string()));
    }

    #[test]
    fn test_invalid_workflow_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "name: [").unwrap();

        let config = AppConfig {
            workflow_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(AppStateInner::new(config), Err(CoreError::Config(_))));
    }
}
