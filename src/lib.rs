// src/lib.rs
// Public library surface for the service binary, the probe bin and integration tests.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod keyed;
pub mod metrics;
pub mod rate_limit;
pub mod usage;

// Analysis pipeline (redaction, prompts, LLM gateway, parsing, orchestration)
pub mod analyze;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{CaseAnalyzer, ComprehensiveResult, Criterion, CriterionResult};
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::error::{AnalysisError, LlmTransportError};

use tracing::info;

/// Load configuration and build the full HTTP application.
pub async fn app() -> anyhow::Result<axum::Router> {
    let cfg = AppConfig::load()?;
    info!(
        provider = %cfg.llm.provider,
        model = %cfg.llm.model,
        enabled = cfg.llm.enabled,
        per_minute = cfg.limits.requests_per_minute,
        edge_per_minute = cfg.limits.edge_requests_per_minute,
        "case note critic configured"
    );
    Ok(router(AppState::from_config(&cfg)))
}
