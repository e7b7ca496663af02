//! Rubric prompts sent to the model.
//!
//! The scoring keys (3/2/1-point descriptions) are part of the contract with
//! the model: the parser assumes integer scores in 1..=3 because of them.
//! Change the wording only together with the parser.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CASE_NOTE_SLOT: &str = "{case_note}";

/// One of the four rubric dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Criterion {
    HistoryPhysical,
    Differential,
    AssessmentPlan,
    Followup,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid criterion '{0}'. Must be one of: historyPhysical, differential, assessmentPlan, followup")]
pub struct UnknownCriterion(pub String);

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::HistoryPhysical,
        Criterion::Differential,
        Criterion::AssessmentPlan,
        Criterion::Followup,
    ];

    /// Wire key, as used in requests and in the comprehensive response object.
    pub fn key(self) -> &'static str {
        match self {
            Criterion::HistoryPhysical => "historyPhysical",
            Criterion::Differential => "differential",
            Criterion::AssessmentPlan => "assessmentPlan",
            Criterion::Followup => "followup",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Criterion::HistoryPhysical => "History & Physical",
            Criterion::Differential => "Differential Diagnosis",
            Criterion::AssessmentPlan => "Assessment & Plan",
            Criterion::Followup => "Follow-up",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Criterion::HistoryPhysical => HISTORY_PHYSICAL_TEMPLATE,
            Criterion::Differential => DIFFERENTIAL_DIAGNOSIS_TEMPLATE,
            Criterion::AssessmentPlan => ASSESSMENT_TREATMENT_TEMPLATE,
            Criterion::Followup => FOLLOW_UP_TEMPLATE,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Criterion {
    type Err = UnknownCriterion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Criterion::ALL
            .into_iter()
            .find(|c| c.key() == s)
            .ok_or_else(|| UnknownCriterion(s.to_string()))
    }
}

/// Single-criterion prompt.
pub fn build_prompt(criterion: Criterion, case_text: &str) -> String {
    criterion.template().replacen(CASE_NOTE_SLOT, case_text, 1)
}

/// All four criteria plus total and overall feedback in one prompt.
pub fn build_comprehensive_prompt(case_text: &str) -> String {
    format!("\n{MEDICAL_ANALYSIS_SYSTEM_PROMPT}\n\nClinical case to analyze:\n{case_text}")
}

pub const MEDICAL_ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert medical educator tasked with evaluating clinical case documentation.
Analyze the provided clinical case text and score it based on these 4 criteria:

1. HISTORY & PHYSICAL EXAM (1-3 points):
   - 3 points: Well-organized, accurate, relevant to complaint
   - 2 points: Minor details missing but adequate for assessment
   - 1 point: Key diagnostic information missing

2. DIFFERENTIAL DIAGNOSIS (1-3 points):
   - 3 points: Well-developed, prioritized, clinically reasoned
   - 2 points: Lacks depth but includes main diagnoses
   - 1 point: Incomplete or incorrect differential

3. ASSESSMENT & TREATMENT PLAN (1-3 points):
   - 3 points: Evidence-based, appropriate, comprehensive
   - 2 points: Addresses chief complaint adequately
   - 1 point: Inappropriate or incomplete plan

4. FOLLOW-UP (1-3 points):
   - 3 points: Appropriate follow-up documented and scheduled
   - 2 points: Follow-up documented but not scheduled
   - 1 point: No appropriate follow-up documented

Return ONLY valid JSON in this exact format:
{
  "historyPhysical": {"score": X, "feedback": "specific feedback"},
  "differential": {"score": X, "feedback": "specific feedback"},
  "assessmentPlan": {"score": X, "feedback": "specific feedback"},
  "followup": {"score": X, "feedback": "specific feedback"},
  "totalScore": X,
  "overallFeedback": "comprehensive summary"
}"#;

const HISTORY_PHYSICAL_TEMPLATE: &str = r#"
Analyze the History & Physical Examination section of this medical case note:

**Case Note:**
{case_note}

**Instructions:**
Evaluate the quality and completeness of:
- Patient history taking (chief complaint, history of present illness, past medical history, medications, allergies, social history, family history, review of systems)
- Physical examination documentation (vital signs, systematic examination findings, relevant clinical signs)
- Documentation quality and organization

**Scoring Criteria (from PRD):**
- 3 points: Well-organized, accurate, relevant to complaint
- 2 points: Minor details missing but adequate for assessment
- 1 point: Key diagnostic information missing

**Response Format (JSON only):**
{
  "score": [1-3],
  "feedback": "Specific feedback on strengths and areas for improvement",
  "strengths": ["List of strong points"],
  "improvements": ["List of specific areas to improve"],
  "evidence": "Clinical evidence supporting the assessment"
}"#;

const DIFFERENTIAL_DIAGNOSIS_TEMPLATE: &str = r#"
Analyze the Differential Diagnosis section of this medical case note:

**Case Note:**
{case_note}

**Instructions:**
Evaluate the appropriateness and thoroughness of:
- Differential diagnoses considered
- Clinical reasoning and diagnostic process
- Use of evidence-based diagnostic criteria
- Consideration of red flags and serious conditions
- Appropriate use of diagnostic tests

**Scoring Criteria (from PRD):**
- 3 points: Well-developed, prioritized, clinically reasoned
- 2 points: Lacks depth but includes main diagnoses
- 1 point: Incomplete or incorrect differential

**Response Format (JSON only):**
{
  "score": [1-3],
  "feedback": "Specific feedback on diagnostic reasoning quality",
  "strengths": ["List of strong diagnostic reasoning points"],
  "improvements": ["List of specific diagnostic areas to improve"],
  "evidence": "Clinical evidence supporting the assessment"
}"#;

const ASSESSMENT_TREATMENT_TEMPLATE: &str = r#"
Analyze the Assessment & Treatment section of this medical case note:

**Case Note:**
{case_note}

**Instructions:**
Evaluate the quality of:
- Clinical assessment and diagnostic conclusions
- Treatment plan appropriateness and evidence base
- Medication selection and dosing
- Non-pharmacological interventions
- Patient education and counseling
- Risk-benefit analysis

**Scoring Criteria (from PRD):**
- 3 points: Evidence-based, appropriate, comprehensive
- 2 points: Addresses chief complaint adequately
- 1 point: Inappropriate or incomplete plan

**Response Format (JSON only):**
{
  "score": [1-3],
  "feedback": "Specific feedback on assessment and treatment quality",
  "strengths": ["List of strong treatment planning points"],
  "improvements": ["List of specific treatment areas to improve"],
  "evidence": "Clinical evidence supporting the assessment"
}"#;

const FOLLOW_UP_TEMPLATE: &str = r#"
Analyze the Follow-up section of this medical case note:

**Case Note:**
{case_note}

**Instructions:**
Evaluate the adequacy of:
- Follow-up scheduling and timing
- Monitoring parameters and indicators
- Patient instructions and education
- Warning signs and when to return
- Continuity of care planning
- Documentation of follow-up plan

**Scoring Criteria (from PRD):**
- 3 points: Appropriate follow-up documented and scheduled
- 2 points: Follow-up documented but not scheduled
- 1 point: No appropriate follow-up documented

**Response Format (JSON only):**
{
  "score": [1-3],
  "feedback": "Specific feedback on follow-up planning quality",
  "strengths": ["List of strong follow-up planning points"],
  "improvements": ["List of specific follow-up areas to improve"],
  "evidence": "Clinical evidence supporting the assessment"
}"#;

/// Well-documented chest pain note used for demos and smoke tests.
pub const SAMPLE_GOOD_CASE_NOTE: &str = r#"**Chief Complaint:** 45-year-old male presents with chest pain

**History of Present Illness:**
Patient reports 3-day history of substernal chest pressure, rated 7/10, radiating to left arm. Pain is worse with exertion and relieved with rest. No associated nausea, vomiting, or diaphoresis. Denies shortness of breath at rest.

**Past Medical History:** Hypertension, hyperlipidemia, smoking 1 pack/day x 20 years

**Medications:** Lisinopril 10mg daily, Atorvastatin 20mg daily

**Physical Examination:**
Vital signs: BP 150/90, HR 88, RR 16, O2 sat 98% RA
Cardiovascular: Regular rate and rhythm, no murmurs
Pulmonary: Clear to auscultation bilaterally
Extremities: No edema

**Assessment and Plan:**
1. Chest pain - likely musculoskeletal vs cardiac etiology
   - EKG, troponins, CXR ordered
   - Cardiology consultation if cardiac markers positive
   - Patient counseled on smoking cessation

**Follow-up:** Return if symptoms worsen, cardiology follow-up pending lab results"#;

/// Five short lines: no vitals, no differential.
pub const SAMPLE_POOR_CASE_NOTE: &str = r#"**Chief Complaint:** Patient has pain

**History:** Pain in chest for few days

**Exam:** Patient looks okay

**Plan:** Give pain medicine

**Follow-up:** Come back if needed"#;

/// Sample note by name (`good` | `poor`), defaulting to `good`.
pub fn sample_case_note(kind: &str) -> &'static str {
    match kind {
        "poor" => SAMPLE_POOR_CASE_NOTE,
        _ => SAMPLE_GOOD_CASE_NOTE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criterion_keys_round_trip_through_from_str() {
        for c in Criterion::ALL {
            assert_eq!(c.key().parse::<Criterion>().unwrap(), c);
            assert_eq!(serde_json::to_value(c).unwrap(), c.key());
        }
        let err = "physical".parse::<Criterion>().unwrap_err();
        assert_eq!(err, UnknownCriterion("physical".into()));
    }

    #[test]
    fn case_text_with_slot_marker_is_inserted_once() {
        let p = build_prompt(Criterion::Followup, "see {case_note} later");
        assert!(p.contains("see {case_note} later"));
        assert!(!p.contains("\n{case_note}\n"));
    }
}
