// src/analyze/mod.rs
//! Case-analysis pipeline.
//!
//! Order for both entry points:
//! 1) reject empty input (no quota, no model call)
//! 2) identity quota check-and-reserve (when an identity is given)
//! 3) PII redaction
//! 4) prompt construction
//! 5) model call under a deadline (the only await point)
//! 6) usage accounting, only after a successful reply
//! 7) parse + validate into a typed result

pub mod llm;
pub mod parse;
pub mod prompts;
pub mod redact;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clock::SystemClock;
use crate::config::AppConfig;
use crate::error::{AnalysisError, LlmTransportError};
use crate::metrics;
use crate::rate_limit::{EdgeDecision, EdgeRateLimiter};
use crate::usage::{
    approximate_tokens, InMemoryUsageStore, UsageLedger, UsageReservation, UsageStats, UsageStatus,
};

pub use crate::analyze::llm::{build_generator, DynGenerator, MockGenerator, TextGenerator};
pub use crate::analyze::parse::{parse_comprehensive, parse_single};
pub use crate::analyze::prompts::{build_comprehensive_prompt, build_prompt, Criterion};
pub use crate::analyze::redact::redact;
pub use crate::analyze::types::{ComprehensiveResult, CriterionResult, CriterionScore};

pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(30);

const COMPREHENSIVE_MODE: &str = "comprehensive";

/// Short anonymized id for logs; raw case text is never logged.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Orchestrates one analysis per call. Cheap to share behind an `Arc`.
pub struct CaseAnalyzer {
    generator: DynGenerator,
    ledger: Arc<UsageLedger>,
    edge: Arc<EdgeRateLimiter>,
    llm_timeout: Duration,
}

impl CaseAnalyzer {
    pub fn new(generator: DynGenerator, ledger: Arc<UsageLedger>, edge: Arc<EdgeRateLimiter>) -> Self {
        Self {
            generator,
            ledger,
            edge,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
        }
    }

    /// Production wiring: configured gateway, in-memory ledger, wall clock.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let clock = Arc::new(SystemClock);
        let ledger = UsageLedger::new(
            Arc::new(InMemoryUsageStore::new()),
            clock.clone(),
            cfg.limits.usage_limits(),
        );
        let edge = EdgeRateLimiter::new(
            cfg.limits.edge_requests_per_minute,
            cfg.limits.edge_window(),
            clock,
        );
        Self::new(build_generator(&cfg.llm), Arc::new(ledger), Arc::new(edge))
            .with_llm_timeout(cfg.llm.timeout())
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn generator(&self) -> &dyn TextGenerator {
        self.generator.as_ref()
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Edge check for a caller address. Counts the request.
    pub fn admit_caller(&self, address: &str) -> Result<EdgeDecision, AnalysisError> {
        let decision = self.edge.check(address);
        if decision.limited {
            metrics::record_edge_limited();
            warn!(
                address,
                reset_in_ms = decision.reset_in_ms,
                "edge rate limit exceeded"
            );
            return Err(AnalysisError::RateLimit {
                message: "Too many requests. Please try again shortly.".to_string(),
                retry_after: Some(Duration::from_millis(decision.reset_in_ms)),
                daily_remaining: None,
                minute_remaining: None,
            });
        }
        Ok(decision)
    }

    pub async fn analyze_criterion(
        &self,
        case_text: &str,
        criterion: Criterion,
        identity: Option<&str>,
    ) -> Result<CriterionResult, AnalysisError> {
        let mode = criterion.key();
        metrics::record_request(mode);
        let result = async {
            let raw = self
                .complete(case_text, identity, mode, |note| build_prompt(criterion, note))
                .await?;
            parse_single(&raw, criterion)
        }
        .await;
        observe_failure(mode, result)
    }

    pub async fn analyze_comprehensive(
        &self,
        case_text: &str,
        identity: Option<&str>,
    ) -> Result<ComprehensiveResult, AnalysisError> {
        metrics::record_request(COMPREHENSIVE_MODE);
        let result = async {
            let raw = self
                .complete(case_text, identity, COMPREHENSIVE_MODE, build_comprehensive_prompt)
                .await?;
            parse_comprehensive(&raw)
        }
        .await;
        observe_failure(COMPREHENSIVE_MODE, result)
    }

    pub fn usage_status(&self, identity: &str) -> UsageStatus {
        self.ledger.status(identity)
    }

    pub fn usage_stats(&self, identity: &str) -> UsageStats {
        self.ledger.stats(identity)
    }

    /// Administrative hook: record `requests` synthetic requests.
    pub fn simulate_usage(&self, identity: &str, requests: u32) {
        self.ledger.simulate(identity, requests);
    }

    /// Administrative hook: forget everything about `identity`.
    pub fn clear_usage(&self, identity: &str) {
        self.ledger.clear(identity);
    }

    /// Steps 1-6; returns the raw model reply.
    async fn complete(
        &self,
        case_text: &str,
        identity: Option<&str>,
        mode: &'static str,
        build: impl FnOnce(&str) -> String,
    ) -> Result<String, AnalysisError> {
        if case_text.trim().is_empty() {
            return Err(AnalysisError::parsing(
                "Case note is required and must be non-empty",
            ));
        }

        let reservation = identity.map(|id| self.admit_identity(id)).transpose()?;

        let note = redact(case_text);
        let case_id = anon_hash(&note);
        let prompt = build(&note);
        debug!(%case_id, mode, prompt_chars = prompt.len(), "prompt built");

        let started = Instant::now();
        let reply = match tokio::time::timeout(self.llm_timeout, self.generator.generate(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(LlmTransportError::with_status(
                    format!(
                        "model call timed out after {} ms",
                        self.llm_timeout.as_millis()
                    ),
                    504,
                )
                .into())
            }
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::record_llm_latency(elapsed_ms);

        let tokens = approximate_tokens(&reply);
        match reservation {
            Some(slot) => {
                let identity = slot.identity().to_string();
                let rec = slot.commit(tokens);
                info!(
                    %case_id, mode, %identity, tokens,
                    total_requests = rec.total_requests,
                    total_tokens = rec.total_tokens,
                    elapsed_ms = elapsed_ms as u64,
                    "analysis reply received"
                );
            }
            None => info!(%case_id, mode, tokens, elapsed_ms = elapsed_ms as u64, "analysis reply received"),
        }
        Ok(reply)
    }

    fn admit_identity(&self, identity: &str) -> Result<UsageReservation<'_>, AnalysisError> {
        self.ledger.reserve(identity).map_err(|status| {
            metrics::record_usage_limited();
            warn!(
                identity,
                daily_remaining = status.daily_remaining,
                minute_remaining = status.minute_remaining,
                "usage limit exceeded"
            );
            AnalysisError::RateLimit {
                message: format!(
                    "Rate limit exceeded. Daily remaining: {}, Minute remaining: {}",
                    status.daily_remaining, status.minute_remaining
                ),
                retry_after: Some(status.retry_after(self.ledger.now())),
                daily_remaining: Some(status.daily_remaining),
                minute_remaining: Some(status.minute_remaining),
            }
        })
    }
}

fn observe_failure<T>(mode: &'static str, result: Result<T, AnalysisError>) -> Result<T, AnalysisError> {
    if let Err(e) = &result {
        metrics::record_failure(e.kind());
        warn!(mode, kind = e.kind(), error = %e, "analysis failed");
    }
    result
}
