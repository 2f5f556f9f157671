//! Score aggregation over verification outcomes.

use std::collections::BTreeMap;

use crate::model::{Category, Question, VerificationOutcome};
use crate::session::round2;

/// Category counts and per-topic failures of one graded attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreSummary {
    pub correct: u32,
    pub partial: u32,
    /// Includes unclassified outcomes.
    pub incorrect: u32,
    pub unclassified: u32,
    pub total: u32,
    pub grade: f64,
    pub failed_topics: BTreeMap<String, u32>,
}

/// Grade on a 0 to 10 scale, rounded to two decimals.
///
/// Returns 0.0 when `total` is zero.
pub fn compute_grade(correct: u32, partial: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let points = correct as f64 + 0.5 * partial as f64;
    round2(points / total as f64 * 10.0)
}

/// Aggregate outcomes into counts, grade, and per-topic failures.
pub fn aggregate(questions: &[Question], outcomes: &[VerificationOutcome]) -> ScoreSummary {
    let mut summary = ScoreSummary {
        total: outcomes.len() as u32,
        ..Default::default()
    };

    for outcome in outcomes {
        match outcome.category {
            Category::Correct => summary.correct += 1,
            Category::Partial => summary.partial += 1,
            Category::Incorrect => summary.incorrect += 1,
            Category::Unclassified => {
                summary.incorrect += 1;
                summary.unclassified += 1;
            }
        }
        if outcome.category != Category::Correct {
            if let Some(q) = questions.get(outcome.question_index) {
                *summary.failed_topics.entry(q.topic.clone()).or_insert(0) += 1;
            }
        }
    }

    if summary.unclassified > 0 {
        tracing::warn!(
            unclassified = summary.unclassified,
            "some answers could not be classified and were scored as incorrect"
        );
    }

    summary.grade = compute_grade(summary.correct, summary.partial, summary.total);
    summary
}
