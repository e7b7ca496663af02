//! Turns model output into typed rubric results.
//!
//! The model is an untrusted text source. Every step either yields a fully
//! validated value or a `ParsingError`; only `strengths`, `improvements`,
//! `evidence`, `totalScore` and `overallFeedback` have defaults.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::analyze::prompts::Criterion;
use crate::analyze::types::{ComprehensiveResult, CriterionResult, CriterionScore};
use crate::error::AnalysisError;

const FENCE: &str = "```";

static RE_EMBEDDED_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*\s*(.*?)\s*```").expect("embedded fence regex")
});

/// Strip conversational wrapping and return the candidate JSON text.
///
/// 1. A reply wrapped in a fence (with or without a language tag) loses the markers.
/// 2. Otherwise the first fenced block embedded in prose is used.
/// 3. Otherwise, if the reply is not a bare object (prose before or after the
///    braces), the span from the first `{` to the last `}` is tried.
pub fn strip_wrapping(raw: &str) -> &str {
    let text = raw.trim();

    if let Some(rest) = text.strip_prefix(FENCE) {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || "_+-".contains(c));
        let rest = match rest.rfind(FENCE) {
            Some(end) => &rest[..end],
            None => rest,
        };
        return rest.trim();
    }

    if text.contains(FENCE) {
        if let Some(inner) = RE_EMBEDDED_FENCE.captures(text).and_then(|c| c.get(1)) {
            return inner.as_str();
        }
    }

    if !(text.starts_with('{') && text.ends_with('}')) {
        if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
            if start < end {
                return &text[start..=end];
            }
        }
    }

    text
}

pub fn parse_single(raw: &str, criterion: Criterion) -> Result<CriterionResult, AnalysisError> {
    let ctx = format!("Failed to parse AI response for {criterion}");
    let obj = parse_object(raw, &ctx)?;

    Ok(CriterionResult {
        score: score_field(&obj, &ctx)?,
        feedback: required_string(&obj, "feedback", &ctx)?,
        strengths: string_list(&obj, "strengths", &ctx)?,
        improvements: string_list(&obj, "improvements", &ctx)?,
        evidence: optional_string(&obj, "evidence", &ctx)?,
    })
}

pub fn parse_comprehensive(raw: &str) -> Result<ComprehensiveResult, AnalysisError> {
    let ctx = "Failed to parse comprehensive analysis response";
    let obj = parse_object(raw, ctx)?;

    let missing: Vec<&str> = Criterion::ALL
        .iter()
        .map(|c| c.key())
        .filter(|k| !obj.get(*k).is_some_and(Value::is_object))
        .collect();
    if !missing.is_empty() {
        return Err(AnalysisError::parsing(format!(
            "{ctx}: Invalid response structure: missing required criteria fields ({})",
            missing.join(", ")
        )));
    }

    let sub = |c: Criterion| -> Result<CriterionScore, AnalysisError> {
        let sub_ctx = format!("{ctx}: {}", c.key());
        let inner = obj
            .get(c.key())
            .and_then(Value::as_object)
            .ok_or_else(|| AnalysisError::parsing(format!("{sub_ctx}: expected an object")))?;
        Ok(CriterionScore {
            score: score_field(inner, &sub_ctx)?,
            feedback: required_string(inner, "feedback", &sub_ctx)?,
        })
    };

    let result = ComprehensiveResult {
        history_physical: sub(Criterion::HistoryPhysical)?,
        differential: sub(Criterion::Differential)?,
        assessment_plan: sub(Criterion::AssessmentPlan)?,
        followup: sub(Criterion::Followup)?,
        total_score: total_score(&obj, ctx)?,
        overall_feedback: optional_string(&obj, "overallFeedback", ctx)?,
    };

    let computed = result.computed_total();
    if result.total_score != computed {
        warn!(
            reported = result.total_score,
            computed, "model totalScore disagrees with sum of criterion scores"
        );
    }
    Ok(result)
}

fn parse_object(raw: &str, ctx: &str) -> Result<Map<String, Value>, AnalysisError> {
    let body = strip_wrapping(raw);
    if body.is_empty() {
        return Err(AnalysisError::parsing(format!("{ctx}: empty response")));
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AnalysisError::parsing(format!(
            "{ctx}: expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(AnalysisError::parsing(format!("{ctx}: {e}"))),
    }
}

fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn as_whole_number(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| {
        v.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 1e15)
            .map(|f| f as i64)
    })
}

fn score_field(obj: &Map<String, Value>, ctx: &str) -> Result<u8, AnalysisError> {
    let v = present(obj, "score")
        .ok_or_else(|| AnalysisError::parsing(format!("{ctx}: missing required field 'score'")))?;
    let n = as_whole_number(v).ok_or_else(|| {
        AnalysisError::parsing(format!("{ctx}: 'score' must be an integer, got {v}"))
    })?;
    if !(1..=3).contains(&n) {
        return Err(AnalysisError::parsing(format!(
            "{ctx}: score {n} is outside the rubric range 1-3"
        )));
    }
    Ok(n as u8)
}

fn total_score(obj: &Map<String, Value>, ctx: &str) -> Result<u32, AnalysisError> {
    let Some(v) = present(obj, "totalScore") else {
        return Ok(0);
    };
    as_whole_number(v)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            AnalysisError::parsing(format!(
                "{ctx}: 'totalScore' must be a non-negative integer, got {v}"
            ))
        })
}

fn required_string(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<String, AnalysisError> {
    match present(obj, key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(AnalysisError::parsing(format!(
            "{ctx}: '{key}' must be a string, got {}",
            json_kind(other)
        ))),
        None => Err(AnalysisError::parsing(format!(
            "{ctx}: missing required field '{key}'"
        ))),
    }
}

fn optional_string(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<String, AnalysisError> {
    match present(obj, key) {
        None => Ok(String::new()),
        Some(_) => required_string(obj, key, ctx),
    }
}

fn string_list(obj: &Map<String, Value>, key: &str, ctx: &str) -> Result<Vec<String>, AnalysisError> {
    match present(obj, key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    AnalysisError::parsing(format!(
                        "{ctx}: '{key}' must contain only strings, got {}",
                        json_kind(item)
                    ))
                })
            })
            .collect(),
        Some(other) => Err(AnalysisError::parsing(format!(
            "{ctx}: '{key}' must be an array, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
