use serde::{Deserialize, Serialize};

use crate::analyze::prompts::Criterion;

/// Result of a single-criterion analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionResult {
    /// 1..=3
    pub score: u8,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub evidence: String,
}

/// One criterion inside a comprehensive result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: u8,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveResult {
    pub history_physical: CriterionScore,
    pub differential: CriterionScore,
    pub assessment_plan: CriterionScore,
    pub followup: CriterionScore,
    /// As reported by the model; see [`ComprehensiveResult::computed_total`].
    pub total_score: u32,
    pub overall_feedback: String,
}

impl ComprehensiveResult {
    pub fn criterion(&self, criterion: Criterion) -> &CriterionScore {
        match criterion {
            Criterion::HistoryPhysical => &self.history_physical,
            Criterion::Differential => &self.differential,
            Criterion::AssessmentPlan => &self.assessment_plan,
            Criterion::Followup => &self.followup,
        }
    }

    /// Sum of the four sub-scores.
    pub fn computed_total(&self) -> u32 {
        Criterion::ALL
            .iter()
            .map(|c| u32::from(self.criterion(*c).score))
            .sum()
    }
}
