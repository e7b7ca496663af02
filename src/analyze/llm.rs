//! LLM gateway: provider abstraction over a text-in/text-out model call.
//!
//! * [`GeminiProvider`] talks to the Gemini `generateContent` REST endpoint.
//! * [`DisabledGenerator`] fails every call; used when the provider is switched off.
//! * [`MockGenerator`] is deterministic and counts calls; used in tests and `AI_TEST_MODE`.
//!
//! Every failure comes back as [`LlmTransportError`], with an HTTP-like status
//! when one is known.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ai::LlmConfig;
use crate::error::LlmTransportError;

/// Text-completion contract used by the orchestrator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmTransportError>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;

    fn model(&self) -> &str {
        ""
    }
}

pub type DynGenerator = Arc<dyn TextGenerator>;

/// Build a generator according to config and environment.
///
/// * `AI_TEST_MODE=mock` returns canned rubric responses.
/// * `AI_TEST_MODE=error` fails every call.
/// * `enabled == false`, an unknown provider or an unbuildable client yields a disabled generator.
pub fn build_generator(config: &LlmConfig) -> DynGenerator {
    match std::env::var("AI_TEST_MODE").as_deref() {
        Ok("mock") => return Arc::new(MockGenerator::rubric()),
        Ok("error") => {
            return Arc::new(MockGenerator::failing(LlmTransportError::with_status(
                "simulated provider error",
                502,
            )))
        }
        _ => {}
    }

    if !config.enabled {
        return Arc::new(DisabledGenerator);
    }

    match config.provider.as_str() {
        "gemini" => match GeminiProvider::from_config(config) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                warn!(error = ?e, "gemini provider unavailable, LLM calls will fail");
                Arc::new(DisabledGenerator)
            }
        },
        other => {
            warn!(provider = other, "unsupported LLM provider, LLM calls will fail");
            Arc::new(DisabledGenerator)
        }
    }
}

// ------------------------------------------------------------
// Gemini
// ------------------------------------------------------------

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_output_tokens: u32,
    temperature: Option<f32>,
}

impl GeminiProvider {
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("case-note-critic/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.timeout())
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<PartIn<'a>>,
}

#[derive(Serialize)]
struct PartIn<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartOut>,
}

#[derive(Deserialize)]
struct PartOut {
    text: Option<String>,
}

#[derive(Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl TextGenerator for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<String, LlmTransportError> {
        if self.api_key.is_empty() {
            return Err(LlmTransportError::new(
                "GOOGLE_API_KEY is not set; no usable model endpoint",
            ));
        }

        let req = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![PartIn { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
                temperature: self.temperature,
            },
        };

        let started = Instant::now();
        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| transport_error("model request failed", &e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| body.chars().take(300).collect());
            warn!(
                model = %self.model,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "model endpoint returned an error"
            );
            return Err(LlmTransportError::with_status(
                format!("model endpoint returned {status}: {detail}"),
                status.as_u16(),
            ));
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| transport_error("unreadable model response", &e))?;

        if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmTransportError::with_status(
                format!("prompt blocked by model: {reason}"),
                400,
            ));
        }

        let candidate = body.candidates.into_iter().next();
        let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
        let text: String = candidate
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            finish_reason = finish_reason.as_deref().unwrap_or("unknown"),
            "model call finished"
        );

        if text.trim().is_empty() {
            return Err(LlmTransportError::new(format!(
                "model returned no usable content (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn transport_error(what: &str, e: &reqwest::Error) -> LlmTransportError {
    let status = if e.is_timeout() {
        Some(504)
    } else {
        e.status().map(|s| s.as_u16())
    };
    LlmTransportError {
        message: format!("{what}: {e}"),
        status,
    }
}

// ------------------------------------------------------------
// Disabled
// ------------------------------------------------------------

pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmTransportError> {
        Err(LlmTransportError::with_status(
            "LLM provider is disabled",
            503,
        ))
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

// ------------------------------------------------------------
// Mock
// ------------------------------------------------------------

enum MockBehavior {
    Fixed(String),
    Failing(LlmTransportError),
    Scripted(Mutex<VecDeque<Result<String, LlmTransportError>>>),
    Rubric,
    Stalled(Duration),
}

/// Deterministic generator that remembers every prompt it received.
pub struct MockGenerator {
    behavior: MockBehavior,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    fn with(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `text`.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::with(MockBehavior::Fixed(text.into()))
    }

    pub fn failing(err: LlmTransportError) -> Self {
        Self::with(MockBehavior::Failing(err))
    }

    /// Answers in order; once exhausted, every call fails.
    pub fn scripted(replies: impl IntoIterator<Item = Result<String, LlmTransportError>>) -> Self {
        Self::with(MockBehavior::Scripted(Mutex::new(replies.into_iter().collect())))
    }

    /// Canned, fenced rubric JSON shaped after whichever prompt it receives.
    pub fn rubric() -> Self {
        Self::with(MockBehavior::Rubric)
    }

    /// Never answers within `delay`; exercises the orchestrator's deadline.
    pub fn stalled(delay: Duration) -> Self {
        Self::with(MockBehavior::Stalled(delay))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

const MOCK_SINGLE_REPLY: &str = r#"```json
{
  "score": 3,
  "feedback": "Mock critique: documentation is organized and relevant to the complaint.",
  "strengths": ["Structured sections", "Vital signs recorded"],
  "improvements": ["Document allergies explicitly"],
  "evidence": "Mock evidence drawn from the case note"
}
```"#;

const MOCK_COMPREHENSIVE_REPLY: &str = r#"```json
{
  "historyPhysical": {"score": 3, "feedback": "Mock: thorough history and exam."},
  "differential": {"score": 2, "feedback": "Mock: main diagnoses listed without prioritization."},
  "assessmentPlan": {"score": 3, "feedback": "Mock: evidence-based work-up ordered."},
  "followup": {"score": 2, "feedback": "Mock: follow-up documented but not scheduled."},
  "totalScore": 10,
  "overallFeedback": "Mock: solid note; prioritize the differential and schedule follow-up."
}
```"#;

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmTransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        match &self.behavior {
            MockBehavior::Fixed(text) => Ok(text.clone()),
            MockBehavior::Failing(err) => Err(err.clone()),
            MockBehavior::Scripted(queue) => queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(LlmTransportError::new("mock script exhausted"))),
            MockBehavior::Rubric => {
                if prompt.contains("\"totalScore\"") {
                    Ok(MOCK_COMPREHENSIVE_REPLY.to_string())
                } else {
                    Ok(MOCK_SINGLE_REPLY.to_string())
                }
            }
            MockBehavior::Stalled(delay) => {
                tokio::time::sleep(*delay).await;
                Err(LlmTransportError::new("mock stalled past its delay"))
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Connectivity probe
// ------------------------------------------------------------

const PROBE_PROMPT: &str = "Hello, this is a test message.";

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub success: bool,
    pub provider: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// One short round trip to the provider. Never fails; the outcome is in the report.
pub async fn probe(generator: &dyn TextGenerator) -> ProbeReport {
    let provider = generator.provider_name();
    match generator.generate(PROBE_PROMPT).await {
        Ok(text) => {
            info!(provider, "LLM probe succeeded");
            ProbeReport {
                success: true,
                provider,
                message: "Successfully connected to the LLM provider".to_string(),
                response: Some(text),
                error: None,
                status_code: None,
            }
        }
        Err(e) => {
            warn!(provider, error = %e, "LLM probe failed");
            ProbeReport {
                success: false,
                provider,
                message: "Failed to connect to the LLM provider".to_string(),
                response: None,
                error: Some(e.message),
                status_code: e.status,
            }
        }
    }
}
