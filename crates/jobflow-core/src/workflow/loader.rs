//! Loads workflow variants from a directory of YAML files.
//!
//! Each `*.yaml` / `*.yml` file holds one variant keyed by its file stem,
//! e.g. `config/workflows/director_level.yaml` → `director_level`. Files
//! override the built-in variants of the same key.

use std::collections::HashMap;
use std::path::Path;

use super::schema::{StepDefinition, WorkflowVariant};
use super::steps::StepKind;

pub struct VariantLoader {
    /// Loaded variants indexed by key
    pub variants: HashMap<String, WorkflowVariant>,
}

impl Default for VariantLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl VariantLoader {
    pub fn new() -> Self {
        Self {
            variants: HashMap::new(),
        }
    }

    /// A loader pre-populated with the built-in variants.
    pub fn with_builtins() -> Self {
        let mut loader = Self::new();
        for (key, variant) in Self::builtin_variants() {
            loader.variants.insert(key, variant);
        }
        loader
    }

    /// Load and validate every variant in `dir`. Returns how many were loaded.
    pub fn load_dir(&mut self, dir: &str) -> Result<usize, String> {
        let dir_path = Path::new(dir);
        if !dir_path.is_dir() {
            return Err(format!("Workflow directory '{}' does not exist", dir));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir_path)
            .map_err(|e| format!("Failed to read directory '{}': {}", dir, e))?
        {
            let entry = entry.map_err(|e| format!("Directory entry error: {}", e))?;
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if matches!(ext, "yaml" | "yml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut count = 0;
        for path in paths {
            let path_str = path.to_string_lossy().to_string();
            let variant = WorkflowVariant::from_file(&path_str)?;
            variant
                .validate()
                .map_err(|e| format!("Invalid workflow '{}': {}", path_str, e))?;

            let key = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| variant.name.clone());

            tracing::info!("[VariantLoader] Loaded workflow: {} ({})", key, variant.name);
            self.variants.insert(key, variant);
            count += 1;
        }

        Ok(count)
    }

    pub fn get(&self, key: &str) -> Option<&WorkflowVariant> {
        self.variants.get(key)
    }

    pub fn into_variants(self) -> HashMap<String, WorkflowVariant> {
        self.variants
    }

    /// Built-in variants (no files needed).
    pub fn builtin_variants() -> Vec<(String, WorkflowVariant)> {
        let build = |name: &str, description: &str, emphasis: &str, angle: &str| WorkflowVariant {
            name: name.to_string(),
            description: description.to_string(),
            steps: default_steps(),
            emphasis: emphasis.to_string(),
            positioning_angle: angle.to_string(),
            voice_blend: super::schema::default_voice_blend(),
        };

        vec![
            (
                "director_level".to_string(),
                build(
                    "Director Level",
                    "Leadership roles: team building, org design, strategy",
                    "management",
                    "organizational leverage",
                ),
            ),
            (
                "principal_level".to_string(),
                build(
                    "Principal Level",
                    "Senior individual contributor roles with broad technical scope",
                    "impact",
                    "technical leverage",
                ),
            ),
            (
                "senior_level".to_string(),
                build(
                    "Senior Level",
                    "Hands-on roles: delivery and execution",
                    "execution",
                    "shipping track record",
                ),
            ),
        ]
    }
}

fn default_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(StepKind::Research, "research_agent").with_retry_count(2),
        StepDefinition::new(StepKind::Scoring, "scoring_agent")
            .depends_on(&[StepKind::Research])
            .with_retry_count(2),
        StepDefinition::new(StepKind::Positioning, "positioning_agent")
            .depends_on(&[StepKind::Research, StepKind::Scoring])
            .with_retry_count(2),
        StepDefinition::new(StepKind::ContentGeneration, "content_agent")
            .depends_on(&[StepKind::Research, StepKind::Scoring, StepKind::Positioning])
            .with_retry_count(2),
    ]
}
