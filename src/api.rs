//! HTTP surface around the analysis core.
//!
//! Handlers stay thin: they pull fields out of the request, call
//! [`CaseAnalyzer`], and map the three error kinds to status codes
//! (rate limit 429, parsing 400, transport 500).

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::analyze::llm::probe;
use crate::analyze::prompts::sample_case_note;
use crate::analyze::{CaseAnalyzer, Criterion};
use crate::config::AppConfig;
use crate::error::AnalysisError;
use crate::metrics::Metrics;
use crate::rate_limit::client_address;

const DEFAULT_IDENTITY: &str = "default";

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<CaseAnalyzer>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(analyzer: Arc<CaseAnalyzer>) -> Self {
        Self {
            analyzer,
            metrics: Metrics::init(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(Arc::new(CaseAnalyzer::from_config(cfg)))
    }
}

pub fn router(state: AppState) -> Router {
    let metrics = state.metrics.router();
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/analyze-case", get(sample_case).post(analyze_case))
        .route("/api/usage", get(usage_get).post(usage_post))
        .route("/api/test-llm", get(test_llm))
        .with_state(state)
        .merge(metrics)
        .layer(CorsLayer::very_permissive())
}

// ------------------------------------------------------------
// Error mapping
// ------------------------------------------------------------

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let mut body = json!({
            "success": false,
            "message": self.to_string(),
            "type": kind,
        });
        let status = match &self {
            AnalysisError::RateLimit {
                retry_after,
                daily_remaining,
                minute_remaining,
                ..
            } => {
                if let Some(after) = retry_after {
                    body["retryAfterMs"] = json!(after.as_millis() as u64);
                }
                if let Some(d) = daily_remaining {
                    body["dailyRemaining"] = json!(d);
                }
                if let Some(m) = minute_remaining {
                    body["minuteRemaining"] = json!(m);
                }
                StatusCode::TOO_MANY_REQUESTS
            }
            AnalysisError::Parsing(_) => StatusCode::BAD_REQUEST,
            AnalysisError::LlmTransport(e) => {
                if let Some(code) = e.status {
                    body["statusCode"] = json!(code);
                }
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut resp = (status, Json(body)).into_response();
        if let Some(after) = self.retry_after() {
            let secs = after.as_millis().div_ceil(1000).max(1);
            if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
                resp.headers_mut().insert(header::RETRY_AFTER, v);
            }
        }
        resp
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message.into() })),
    )
        .into_response()
}

/// Unreadable or mistyped JSON bodies get the same 400 envelope as other input errors.
fn rejected_body(rejection: JsonRejection) -> Response {
    bad_request(format!("Invalid request body: {}", rejection.body_text()))
}

/// A result that cannot be serialized is a server fault, never an empty success.
fn to_data<T: Serialize>(result: &T) -> Result<Value, AnalysisError> {
    serde_json::to_value(result)
        .context("serializing analysis result")
        .map_err(AnalysisError::from)
}

// ------------------------------------------------------------
// /api/analyze-case
// ------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeReq {
    #[serde(default)]
    case_note: Option<Value>,
    #[serde(default)]
    criterion: Option<String>,
    #[serde(default)]
    use_comprehensive: bool,
    #[serde(default)]
    user_id: Option<String>,
}

async fn analyze_case(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AnalyzeReq>, JsonRejection>,
) -> Response {
    let address = client_address(&headers);
    if let Err(e) = state.analyzer.admit_caller(&address) {
        return e.into_response();
    }
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(rejection),
    };

    let case_note = match body.case_note {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => return bad_request("Case note is required and must be a string"),
    };
    let identity = body.user_id.as_deref().filter(|s| !s.is_empty());

    let data = if body.use_comprehensive {
        state
            .analyzer
            .analyze_comprehensive(&case_note, identity)
            .await
            .and_then(|r| to_data(&r))
    } else if let Some(raw) = body.criterion.as_deref() {
        let criterion = match raw.parse::<Criterion>() {
            Ok(c) => c,
            Err(e) => return bad_request(e.to_string()),
        };
        state
            .analyzer
            .analyze_criterion(&case_note, criterion, identity)
            .await
            .and_then(|r| to_data(&r))
    } else {
        return bad_request("Either criterion or useComprehensive must be specified");
    };

    match data {
        Ok(data) => {
            info!(
                %address,
                use_comprehensive = body.use_comprehensive,
                criterion = body.criterion.as_deref().unwrap_or("all"),
                "analysis request served"
            );
            let mut out = json!({ "success": true, "data": data });
            if let Some(id) = identity {
                out["usage"] = json!(state.analyzer.usage_status(id));
            }
            Json(out).into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct SampleQuery {
    test: Option<String>,
}

async fn sample_case(Query(q): Query<SampleQuery>) -> Json<Value> {
    let kind = match q.test.as_deref() {
        Some("poor") => "poor",
        _ => "good",
    };
    let criteria: Vec<&str> = Criterion::ALL.iter().map(|c| c.key()).collect();
    Json(json!({
        "success": true,
        "message": format!("Sample {kind} case note for testing"),
        "caseNote": sample_case_note(kind),
        "instructions": {
            "comprehensive": r#"POST with {"caseNote": "...", "useComprehensive": true}"#,
            "singleCriterion": r#"POST with {"caseNote": "...", "criterion": "historyPhysical"}"#,
            "availableCriteria": criteria,
        }
    }))
}

// ------------------------------------------------------------
// /api/usage
// ------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageQuery {
    user_id: Option<String>,
}

fn usage_payload(state: &AppState, identity: &str) -> Value {
    let limits = state.analyzer.ledger().limits();
    json!({
        "stats": state.analyzer.usage_stats(identity),
        "rateLimit": state.analyzer.usage_status(identity),
        "limits": {
            "dailyLimit": limits.per_day(),
            "minuteLimit": limits.per_minute,
        }
    })
}

async fn usage_get(State(state): State<AppState>, Query(q): Query<UsageQuery>) -> Json<Value> {
    let identity = q.user_id.unwrap_or_else(|| DEFAULT_IDENTITY.to_string());
    Json(json!({ "success": true, "data": usage_payload(&state, &identity) }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageAction {
    action: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    requests: Option<u32>,
}

async fn usage_post(
    State(state): State<AppState>,
    body: Result<Json<UsageAction>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(rejection),
    };
    let identity = body
        .user_id
        .unwrap_or_else(|| DEFAULT_IDENTITY.to_string());
    let message = match body.action.as_str() {
        "simulate" => {
            let n = body.requests.unwrap_or(1);
            state.analyzer.simulate_usage(&identity, n);
            format!("Simulated {n} requests for user {identity}")
        }
        "clear" => {
            state.analyzer.clear_usage(&identity);
            format!("Cleared usage data for user {identity}")
        }
        _ => return bad_request(r#"Invalid action. Use "simulate" or "clear""#),
    };
    Json(json!({
        "success": true,
        "message": message,
        "data": usage_payload(&state, &identity),
    }))
    .into_response()
}

// ------------------------------------------------------------
// /api/test-llm
// ------------------------------------------------------------

async fn test_llm(State(state): State<AppState>) -> Response {
    let report = probe(state.analyzer.generator()).await;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report)).into_response()
}
