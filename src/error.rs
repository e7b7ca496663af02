// src/error.rs
//! Typed failure kinds surfaced by the analysis core.
//!
//! Every failure is one of three kinds. The HTTP layer decides status codes;
//! the core only says which kind happened.

use std::time::Duration;

use thiserror::Error;

/// The external text-generation call could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LlmTransportError {
    pub message: String,
    /// HTTP-equivalent status reported by (or inferred for) the upstream service.
    pub status: Option<u16>,
}

impl LlmTransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Quota exhausted (identity ledger or edge limiter). Raised before any model call.
    #[error("{message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
        daily_remaining: Option<u32>,
        minute_remaining: Option<u32>,
    },

    #[error(transparent)]
    LlmTransport(#[from] LlmTransportError),

    /// Input or model output could not be reduced to the expected shape.
    #[error("{0}")]
    Parsing(String),
}

impl AnalysisError {
    pub fn parsing(message: impl Into<String>) -> Self {
        Self::Parsing(message.into())
    }

    /// Outward-facing name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimit { .. } => "RateLimitError",
            Self::LlmTransport(_) => "LLMTransportError",
            Self::Parsing(_) => "ParsingError",
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Anything unclassified becomes a transport failure carrying the original message.
impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        Self::LlmTransport(LlmTransportError::new(format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_use_outward_names() {
        let rl = AnalysisError::RateLimit {
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(3)),
            daily_remaining: Some(10),
            minute_remaining: Some(0),
        };
        assert_eq!(rl.kind(), "RateLimitError");
        assert_eq!(rl.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(AnalysisError::parsing("bad").kind(), "ParsingError");
        let tr: AnalysisError = LlmTransportError::with_status("down", 503).into();
        assert_eq!(tr.kind(), "LLMTransportError");
        assert_eq!(tr.to_string(), "down");
    }

    #[test]
    fn anyhow_errors_are_wrapped_as_transport() {
        let err: AnalysisError = anyhow::anyhow!("socket closed").context("calling model").into();
        match err {
            AnalysisError::LlmTransport(e) => {
                assert!(e.message.contains("calling model"));
                assert!(e.message.contains("socket closed"));
                assert_eq!(e.status, None);
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
