//! Runs one comprehensive critique of a bundled sample note and prints the JSON result.
//!
//! Usage: `case_probe [good|poor]` (default `good`). Set `AI_TEST_MODE=mock`
//! to run without a model endpoint.

use case_note_critic::analyze::prompts::sample_case_note;
use case_note_critic::{AppConfig, CaseAnalyzer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let kind = std::env::args().nth(1).unwrap_or_else(|| "good".to_string());
    let cfg = AppConfig::load()?;
    let analyzer = CaseAnalyzer::from_config(&cfg);

    let result = analyzer
        .analyze_comprehensive(sample_case_note(&kind), Some("case-probe"))
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.computed_total() != result.total_score {
        eprintln!(
            "note: reported total {} differs from sum of criteria {}",
            result.total_score,
            result.computed_total()
        );
    }
    Ok(())
}
