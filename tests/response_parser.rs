// tests/response_parser.rs
//
// Model replies -> typed rubric results.
//
// Covered:
// - fenced / tagged / prose-wrapped replies
// - required fields, score range, list field types
// - comprehensive structure checks and totalScore handling

use case_note_critic::analyze::parse::{parse_comprehensive, parse_single, strip_wrapping};
use case_note_critic::analyze::Criterion;
use case_note_critic::AnalysisError;

const SINGLE: &str = r#"{
  "score": 3,
  "feedback": "Clear history.",
  "strengths": ["vitals", "allergies"],
  "improvements": ["social history"],
  "evidence": "BP recorded"
}"#;

const COMPREHENSIVE: &str = r#"{
  "historyPhysical": {"score": 3, "feedback": "good"},
  "differential": {"score": 2, "feedback": "ok"},
  "assessmentPlan": {"score": 3, "feedback": "solid"},
  "followup": {"score": 1, "feedback": "missing"},
  "totalScore": 9,
  "overallFeedback": "Schedule follow-up."
}"#;

fn parsing_message(err: AnalysisError) -> String {
    match err {
        AnalysisError::Parsing(msg) => msg,
        other => panic!("expected ParsingError, got {other:?}"),
    }
}

#[test]
fn fence_variants_all_parse_to_the_same_result() {
    let bare = parse_single(SINGLE, Criterion::HistoryPhysical).unwrap();
    let variants = [
        format!("```json\n{SINGLE}\n```"),
        format!("```\n{SINGLE}\n```"),
        format!("Here is my evaluation:\n```json\n{SINGLE}\n```\nLet me know."),
        format!("Sure! {SINGLE}"),
        format!("{SINGLE} Hope this helps!"),
        format!("{SINGLE}\n\nLet me know if you need more detail."),
        format!("  \n{SINGLE}\n  "),
    ];
    for v in &variants {
        assert_eq!(parse_single(v, Criterion::HistoryPhysical).unwrap(), bare, "input {v:?}");
    }
    assert_eq!(bare.score, 3);
    assert_eq!(bare.strengths, vec!["vitals", "allergies"]);
    assert_eq!(bare.evidence, "BP recorded");
}

#[test]
fn trailing_prose_after_the_object_is_ignored() {
    let r = parse_single(
        r#"{"score": 2, "feedback": "ok"} Hope this helps!"#,
        Criterion::Followup,
    )
    .unwrap();
    assert_eq!(r.score, 2);
    assert_eq!(r.feedback, "ok");
}

#[test]
fn strip_wrapping_leaves_plain_json_alone() {
    assert_eq!(strip_wrapping(r#"{"a": 1}"#), r#"{"a": 1}"#);
}

#[test]
fn optional_fields_default_when_absent_or_null() {
    let r = parse_single(
        r#"{"score": 2, "feedback": "fine", "strengths": null}"#,
        Criterion::Differential,
    )
    .unwrap();
    assert!(r.strengths.is_empty());
    assert!(r.improvements.is_empty());
    assert_eq!(r.evidence, "");
}

#[test]
fn out_of_range_scores_are_rejected() {
    for score in ["0", "4", "-1"] {
        let raw = format!(r#"{{"score": {score}, "feedback": "x"}}"#);
        let msg = parsing_message(parse_single(&raw, Criterion::Followup).unwrap_err());
        assert!(msg.contains("outside the rubric range"), "{score}: {msg}");
    }
}

#[test]
fn missing_or_mistyped_required_fields_are_rejected() {
    let msg = parsing_message(parse_single(r#"{"feedback": "x"}"#, Criterion::Followup).unwrap_err());
    assert!(msg.contains("Failed to parse AI response for followup"));
    assert!(msg.contains("'score'"));

    let msg = parsing_message(parse_single(r#"{"score": "3", "feedback": "x"}"#, Criterion::Followup).unwrap_err());
    assert!(msg.contains("must be an integer"));

    let msg = parsing_message(parse_single(r#"{"score": 3}"#, Criterion::Followup).unwrap_err());
    assert!(msg.contains("'feedback'"));

    let msg = parsing_message(
        parse_single(r#"{"score": 3, "feedback": "x", "strengths": "one"}"#, Criterion::Followup).unwrap_err(),
    );
    assert!(msg.contains("'strengths' must be an array"));

    let msg = parsing_message(
        parse_single(r#"{"score": 3, "feedback": "x", "improvements": [1]}"#, Criterion::Followup).unwrap_err(),
    );
    assert!(msg.contains("only strings"));
}

#[test]
fn non_json_and_non_object_replies_are_rejected() {
    for raw in ["I cannot evaluate this note.", "", "[1, 2, 3]", "```json\n```"] {
        let err = parse_single(raw, Criterion::AssessmentPlan).unwrap_err();
        assert_eq!(err.kind(), "ParsingError", "input {raw:?}");
    }
}

#[test]
fn comprehensive_reply_parses_and_keeps_reported_total() {
    let r = parse_comprehensive(&format!("```json\n{COMPREHENSIVE}\n```")).unwrap();
    assert_eq!(r.history_physical.score, 3);
    assert_eq!(r.differential.feedback, "ok");
    assert_eq!(r.followup.score, 1);
    assert_eq!(r.total_score, 9);
    assert_eq!(r.computed_total(), 9);
    assert_eq!(r.overall_feedback, "Schedule follow-up.");
    assert_eq!(r.criterion(Criterion::AssessmentPlan).feedback, "solid");
}

#[test]
fn comprehensive_mismatched_total_is_kept_as_reported() {
    let raw = COMPREHENSIVE.replace("\"totalScore\": 9", "\"totalScore\": 12");
    let r = parse_comprehensive(&raw).unwrap();
    assert_eq!(r.total_score, 12);
    assert_eq!(r.computed_total(), 9);
}

#[test]
fn comprehensive_missing_total_and_overall_default() {
    let raw = r#"{
      "historyPhysical": {"score": 1, "feedback": "a"},
      "differential": {"score": 1, "feedback": "b"},
      "assessmentPlan": {"score": 1, "feedback": "c"},
      "followup": {"score": 1, "feedback": "d"}
    }"#;
    let r = parse_comprehensive(raw).unwrap();
    assert_eq!(r.total_score, 0);
    assert_eq!(r.overall_feedback, "");
}

#[test]
fn comprehensive_missing_criteria_are_listed() {
    let raw = r#"{"historyPhysical": {"score": 3, "feedback": "a"}, "followup": "n/a", "totalScore": 3}"#;
    let msg = parsing_message(parse_comprehensive(raw).unwrap_err());
    assert!(msg.contains("missing required criteria fields"), "{msg}");
    assert!(msg.contains("differential"));
    assert!(msg.contains("assessmentPlan"));
    assert!(msg.contains("followup"));
    assert!(!msg.contains("historyPhysical"));
}

#[test]
fn comprehensive_sub_scores_are_validated() {
    let raw = COMPREHENSIVE.replace(r#""differential": {"score": 2, "feedback": "ok"}"#, r#""differential": {"score": 5, "feedback": "ok"}"#);
    let msg = parsing_message(parse_comprehensive(&raw).unwrap_err());
    assert!(msg.contains("differential"), "{msg}");
    assert!(msg.contains("outside the rubric range"));

    let raw = COMPREHENSIVE.replace(r#""followup": {"score": 1, "feedback": "missing"}"#, r#""followup": {"score": 1}"#);
    let msg = parsing_message(parse_comprehensive(&raw).unwrap_err());
    assert!(msg.contains("followup"));
    assert!(msg.contains("'feedback'"));
}
