//! `jobflow score` — Score a posting without running a workflow.

use jobflow_core::orchestration::{JobOrchestrator, ScoreOutcome};

pub async fn run(
    orchestrator: &JobOrchestrator,
    url: &str,
    description: Option<&str>,
) -> Result<ScoreOutcome, String> {
    println!("📊 Scoring job: {}", url);
    let outcome = orchestrator.score_job(url, description).await;

    if let Some(error) = &outcome.error {
        return Err(format!("Scoring failed: {}", error));
    }

    println!("\n📋 Company: {}", outcome.company);
    println!("🎯 Total Score: {}/100", outcome.score);
    println!("💡 Recommendation: {}", outcome.recommendation);
    println!("🔍 Research Quality: {}", outcome.research_quality);

    if let Some(breakdown) = outcome.breakdown.as_object().filter(|b| !b.is_empty()) {
        println!("\n📊 Category Breakdown:");
        for (category, score) in breakdown {
            match score.as_f64() {
                Some(score) => println!("  • {}: {:.1}", category, score),
                None => println!("  • {}: {}", category, score),
            }
        }
    }

    Ok(outcome)
}
