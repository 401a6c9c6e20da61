//! YAML schema types for workflow variants.
//!
//! A variant YAML names an ordered step list plus presentation metadata:
//!
//! ```yaml
//! name: "Director Level"
//! description: "Leadership-focused application"
//! emphasis: management
//! positioning_angle: "organizational leverage"
//! voice_blend:
//!   analytical: 50
//!   conversational: 30
//!   direct: 20
//!
//! steps:
//!   - name: research
//!     agent: research_agent
//!     timeout_secs: 60
//!   - name: scoring
//!     agent: scoring_agent
//!     depends_on: [research]
//!     retry_count: 2
//! ```
//!
//! Steps must be listed so that every prerequisite comes earlier; the engine
//! runs them in a single pass.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::steps::StepKind;

/// A named step graph plus the metadata handed to every agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVariant {
    /// Display name
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Ordered steps; prerequisites must come first.
    pub steps: Vec<StepDefinition>,

    /// Content emphasis label (management, impact, execution, ...)
    #[serde(default = "default_emphasis")]
    pub emphasis: String,

    #[serde(default = "default_positioning_angle")]
    pub positioning_angle: String,

    /// Voice weighting, label → percentage.
    #[serde(default = "default_voice_blend")]
    pub voice_blend: BTreeMap<String, u32>,
}

fn default_emphasis() -> String {
    "balanced".to_string()
}

fn default_positioning_angle() -> String {
    "general".to_string()
}

pub fn default_voice_blend() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("analytical".to_string(), 50),
        ("conversational".to_string(), 30),
        ("direct".to_string(), 20),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: StepKind,

    /// Bus name of the agent that performs this step
    pub agent: String,

    #[serde(default)]
    pub depends_on: Vec<StepKind>,

    /// Accepted for compatibility; steps always run one after another.
    #[serde(default)]
    pub parallel: bool,

    /// Per-attempt reply timeout in seconds (default: 60)
    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_secs: f64,

    /// Total attempts, including the first (default: 1)
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

fn default_timeout() -> f64 {
    60.0
}

fn default_retry_count() -> u32 {
    1
}

impl StepDefinition {
    pub fn new(name: StepKind, agent: impl Into<String>) -> Self {
        Self {
            name,
            agent: agent.into(),
            depends_on: Vec::new(),
            parallel: false,
            timeout_secs: default_timeout(),
            retry_count: default_retry_count(),
        }
    }

    pub fn depends_on(mut self, steps: &[StepKind]) -> Self {
        self.depends_on = steps.to_vec();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::ZERO)
    }
}

impl WorkflowVariant {
    /// Parse a variant from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse workflow YAML: {}", e))
    }

    /// Load a variant from a file path.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read workflow file '{}': {}", path, e))?;
        Self::from_yaml(&content)
    }

    /// Check the step graph can be run in one pass.
    pub fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err(format!("Workflow '{}' has no steps", self.name));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.agent.trim().is_empty() {
                return Err(format!("Step '{}' has no agent", step.name));
            }
            if step.retry_count == 0 {
                return Err(format!("Step '{}' must allow at least one attempt", step.name));
            }
            if !(step.timeout_secs.is_finite() && step.timeout_secs > 0.0) {
                return Err(format!("Step '{}' needs a positive timeout", step.name));
            }
            for dep in &step.depends_on {
                if !seen.contains(dep) {
                    return Err(format!(
                        "Step '{}' depends on '{}', which is not an earlier step",
                        step.name, dep
                    ));
                }
            }
            if !seen.insert(step.name) {
                return Err(format!("Duplicate step '{}'", step.name));
            }
        }
        Ok(())
    }

    /// Agent names referenced by this variant, in step order.
    pub fn agents(&self) -> Vec<&str> {
        let mut agents: Vec<&str> = Vec::new();
        for step in &self.steps {
            if !agents.contains(&step.agent.as_str()) {
                agents.push(&step.agent);
            }
        }
        agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_variant() {
        let yaml = r#"
name: "Minimal"
steps:
  - name: research
    agent: research_agent
"#;
        let variant = WorkflowVariant::from_yaml(yaml).unwrap();
        assert_eq!(variant.steps.len(), 1);
        assert_eq!(variant.emphasis, "balanced");
        assert_eq!(variant.positioning_angle, "general");
        assert_eq!(variant.voice_blend.get("analytical"), Some(&50));
        assert_eq!(variant.steps[0].retry_count, 1);
        assert_eq!(variant.steps[0].timeout(), Duration::from_secs(60));
        assert!(variant.validate().is_ok());
    }

    #[test]
    fn test_parse_full_variant() {
        let yaml = r#"
name: "Principal Level"
description: "Technical depth"
emphasis: impact
positioning_angle: "technical leverage"
voice_blend:
  analytical: 70
  direct: 30
steps:
  - name: research
    agent: research_agent
    timeout: 0.5
  - name: scoring
    agent: scoring_agent
    depends_on: [research]
    retry_count: 3
    parallel: true
"#;
        let variant = WorkflowVariant::from_yaml(yaml).unwrap();
        assert_eq!(variant.emphasis, "impact");
        assert_eq!(variant.voice_blend.len(), 2);
        assert_eq!(variant.steps[0].timeout(), Duration::from_millis(500));
        assert_eq!(variant.steps[1].depends_on, vec![StepKind::Research]);
        assert!(variant.steps[1].parallel);
        assert_eq!(variant.agents(), vec!["research_agent", "scoring_agent"]);
        assert!(variant.validate().is_ok());
    }

    #[test]
    fn test_unknown_step_name_fails_to_parse() {
        let yaml = r#"
name: "Bad"
steps:
  - name: export
    agent: export_agent
"#;
        let err = WorkflowVariant::from_yaml(yaml).unwrap_err();
        assert!(err.contains("Failed to parse workflow YAML"));
    }

    #[test]
    fn test_validate_rejects_forward_dependency() {
        let variant = WorkflowVariant {
            name: "Unsorted".to_string(),
            description: String::new(),
            steps: vec![
                StepDefinition::new(StepKind::Scoring, "scoring_agent")
                    .depends_on(&[StepKind::Research]),
                StepDefinition::new(StepKind::Research, "research_agent"),
            ],
            emphasis: default_emphasis(),
            positioning_angle: default_positioning_angle(),
            voice_blend: default_voice_blend(),
        };
        let err = variant.validate().unwrap_err();
        assert!(err.contains("not an earlier step"));
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let mut variant = WorkflowVariant {
            name: "Limits".to_string(),
            description: String::new(),
            steps: vec![StepDefinition::new(StepKind::Research, "research_agent").with_retry_count(0)],
            emphasis: default_emphasis(),
            positioning_angle: default_positioning_angle(),
            voice_blend: default_voice_blend(),
        };
        assert!(variant.validate().unwrap_err().contains("at least one attempt"));

        variant.steps[0] = StepDefinition::new(StepKind::Research, "research_agent")
            .with_timeout(Duration::ZERO);
        assert!(variant.validate().unwrap_err().contains("positive timeout"));

        variant.steps = vec![
            StepDefinition::new(StepKind::Research, "research_agent"),
            StepDefinition::new(StepKind::Research, "research_agent"),
        ];
        assert!(variant.validate().unwrap_err().contains("Duplicate"));
    }
}
