//! Application configuration loaded from YAML.
//!
//! Lookup order:
//! 1. An explicit path (`--config` / `JOBFLOW_CONFIG`)
//! 2. `./config/config.yaml`
//! 3. `<config dir>/jobflow/config.yaml`
//! 4. Built-in defaults
//!
//! `JOBFLOW_STATE_DIR` overrides `state_dir` regardless of source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::events::DEFAULT_HISTORY_LIMIT;

pub const STATE_DIR_ENV: &str = "JOBFLOW_STATE_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_workflow_dir")]
    pub workflow_dir: PathBuf,

    /// Messages kept in the bus history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default)]
    pub workflow: WorkflowSettings,

    /// Free-form per-agent settings, keyed by agent name
    #[serde(default)]
    pub agents: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Variant used when the caller does not pick one; `auto` selects by role.
    #[serde(default = "default_variant")]
    pub default_variant: String,

    /// Concurrent workflows per batch chunk
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// First retry delay in milliseconds, doubled per further attempt
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_variant: default_variant(),
            max_parallel: default_max_parallel(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("data/state")
}

fn default_workflow_dir() -> PathBuf {
    PathBuf::from("config/workflows")
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_variant() -> String {
    "auto".to_string()
}

fn default_max_parallel() -> usize {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            workflow_dir: default_workflow_dir(),
            history_limit: default_history_limit(),
            workflow: WorkflowSettings::default(),
            agents: HashMap::new(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml(yaml: &str) -> CoreResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Resolve configuration using the standard lookup order.
    pub fn load(explicit: Option<&Path>) -> CoreResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::search_paths().into_iter().find(|p| p.is_file()) {
                Some(path) => {
                    tracing::info!("[AppConfig] Using {}", path.display());
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };

        if let Ok(dir) = std::env::var(STATE_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.state_dir = PathBuf::from(dir);
            }
        }
        Ok(config)
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config").join("config.yaml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("jobflow").join("config.yaml"));
        }
        paths
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.history_limit == 0 {
            return Err(CoreError::Config("history_limit must be at least 1".to_string()));
        }
        if self.workflow.max_parallel == 0 {
            return Err(CoreError::Config(
                "workflow.max_parallel must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn agent_config(&self, agent: &str) -> Option<&serde_json::Value> {
        self.agents.get(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.state_dir, PathBuf::from("data/state"));
        assert_eq!(config.workflow.default_variant, "auto");
        assert_eq!(config.workflow.max_parallel, 3);
        assert_eq!(config.workflow.backoff_base_ms, 1000);
        assert_eq!(config.history_limit, 1000);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
state_dir: /tmp/jobflow-state
workflow:
  max_parallel: 5
agents:
  scoring_agent:
    threshold: 70
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/tmp/jobflow-state"));
        assert_eq!(config.workflow.max_parallel, 5);
        assert_eq!(config.workflow.backoff_base_ms, 1000);
        assert_eq!(
            config.agent_config("scoring_agent").unwrap()["threshold"],
            serde_json::json!(70)
        );
    }

    #[test]
    fn test_rejects_zero_parallelism() {
        let err = AppConfig::from_yaml("workflow:\n  max_parallel: 0\n").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobflow.yaml");
        std::fs::write(&path, "history_limit: 50\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.history_limit, 50);

        let missing = AppConfig::load(Some(&dir.path().join("missing.yaml")));
        assert!(matches!(missing, Err(CoreError::Config(_))));
    }
}
