//! `jobflow workflow` — Inspect and validate workflow variants.

use jobflow_core::orchestration::JobOrchestrator;
use jobflow_core::workflow::WorkflowVariant;

/// Validate a variant YAML file without executing it.
pub fn validate(workflow_file: &str) -> Result<WorkflowVariant, String> {
    let variant = WorkflowVariant::from_file(workflow_file)?;
    variant.validate()?;

    println!("✅ Workflow '{}' is valid", variant.name);
    println!("   Emphasis: {}", variant.emphasis);
    println!("   Positioning: {}", variant.positioning_angle);
    println!("   Steps: {}", variant.steps.len());

    for (i, step) in variant.steps.iter().enumerate() {
        let deps: Vec<&str> = step.depends_on.iter().map(|d| d.as_str()).collect();
        println!(
            "   {}. {} (agent: {}, retries: {}, timeout: {}s, after: [{}])",
            i + 1,
            step.name,
            step.agent,
            step.retry_count,
            step.timeout_secs,
            deps.join(", ")
        );
    }

    Ok(variant)
}

/// List the variants the engine has loaded.
pub fn list(orchestrator: &JobOrchestrator) -> Result<(), String> {
    let engine = orchestrator.engine();
    let keys = engine.variant_keys();

    println!("┌──────────────────┬──────────────────────┬────────────┬───────┐");
    println!("│ Key              │ Name                 │ Emphasis   │ Steps │");
    println!("├──────────────────┼──────────────────────┼────────────┼───────┤");
    for key in &keys {
        if let Some(variant) = engine.variant(key) {
            println!(
                "│ {:<16} │ {:<20} │ {:<10} │ {:>5} │",
                key,
                variant.name,
                variant.emphasis,
                variant.steps.len()
            );
        }
    }
    println!("└──────────────────┴──────────────────────┴────────────┴───────┘");
    Ok(())
}
