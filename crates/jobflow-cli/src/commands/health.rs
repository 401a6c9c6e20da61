//! `jobflow health` — Check configuration, workflow variants and storage.

use std::path::{Path, PathBuf};

use serde::Serialize;

use jobflow_core::config::STATE_DIR_ENV;
use jobflow_core::{AppConfig, AppStateInner};

/// Environment variables the CLI reads.
const ENV_VARS: [&str; 3] = ["JOBFLOW_CONFIG", STATE_DIR_ENV, "RUST_LOG"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    /// Usable, but probably not what was intended.
    Warning,
    Failed,
}

impl CheckStatus {
    fn icon(self) -> &'static str {
        match self {
            CheckStatus::Ok => "✅",
            CheckStatus::Warning => "⚠️",
            CheckStatus::Failed => "❌",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl HealthCheck {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checks: Vec<HealthCheck>,
    /// Variable name and value, `None` when unset
    pub env: Vec<(String, Option<String>)>,
}

impl HealthReport {
    /// Healthy unless some check failed; warnings do not count.
    pub fn is_healthy(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Failed)
    }

    pub fn check(&self, name: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Run every check without touching stored workflow records.
pub fn check(config_path: Option<&str>, state_dir: Option<&str>) -> HealthReport {
    let env = ENV_VARS
        .iter()
        .map(|var| (var.to_string(), std::env::var(var).ok()))
        .collect();
    let mut checks = Vec::new();

    let mut config = match AppConfig::load(config_path.map(Path::new)) {
        Ok(config) => {
            let source = config_path.unwrap_or("search path or built-in defaults");
            checks.push(HealthCheck::new("config", CheckStatus::Ok, format!("loaded from {}", source)));
            config
        }
        Err(e) => {
            checks.push(HealthCheck::new("config", CheckStatus::Failed, e.to_string()));
            return HealthReport { checks, env };
        }
    };
    if let Some(dir) = state_dir {
        config.state_dir = PathBuf::from(dir);
    }

    checks.push(if config.workflow_dir.is_dir() {
        HealthCheck::new(
            "workflow_dir",
            CheckStatus::Ok,
            config.workflow_dir.display().to_string(),
        )
    } else {
        HealthCheck::new(
            "workflow_dir",
            CheckStatus::Warning,
            format!("{} not found, built-in variants only", config.workflow_dir.display()),
        )
    });

    checks.push(check_state_dir(&config.state_dir));

    checks.push(
        match AppStateInner::new(config.clone()) {
            Ok(state) => {
                let keys = state.engine.variant_keys();
                HealthCheck::new(
                    "variants",
                    CheckStatus::Ok,
                    format!("{} loaded ({})", keys.len(), keys.join(", ")),
                )
            }
            Err(e) => HealthCheck::new("variants", CheckStatus::Failed, e.to_string()),
        },
    );

    let mut configured: Vec<&str> = config.agents.keys().map(String::as_str).collect();
    configured.sort_unstable();
    checks.push(HealthCheck::new(
        "agent_config",
        CheckStatus::Ok,
        if configured.is_empty() {
            "no agent sections".to_string()
        } else {
            configured.join(", ")
        },
    ));

    HealthReport { checks, env }
}

/// A missing state directory is created on first write, so it only warns.
fn check_state_dir(dir: &Path) -> HealthCheck {
    if !dir.exists() {
        return HealthCheck::new(
            "state_dir",
            CheckStatus::Warning,
            format!("{} does not exist yet", dir.display()),
        );
    }
    if !dir.is_dir() {
        return HealthCheck::new(
            "state_dir",
            CheckStatus::Failed,
            format!("{} is not a directory", dir.display()),
        );
    }

    let marker = dir.join(".jobflow-health");
    match std::fs::write(&marker, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&marker);
            HealthCheck::new("state_dir", CheckStatus::Ok, dir.display().to_string())
        }
        Err(e) => HealthCheck::new(
            "state_dir",
            CheckStatus::Failed,
            format!("{} is not writable: {}", dir.display(), e),
        ),
    }
}

pub fn run(config_path: Option<&str>, state_dir: Option<&str>) -> Result<HealthReport, String> {
    println!("🔍 Checking system health...\n");
    let report = check(config_path, state_dir);

    for check in &report.checks {
        println!("{} {}: {}", check.status.icon(), check.name, check.detail);
    }

    println!("\n🔑 Environment Variables:");
    for (var, value) in &report.env {
        match value {
            Some(value) => println!("✅ {}: {}", var, value),
            None => println!("⚠️ {}: Not set", var),
        }
    }

    if report.is_healthy() {
        println!("\n✅ System is healthy and ready!");
        Ok(report)
    } else {
        Err("Some components need attention. Check the failures above.".to_string())
    }
}
