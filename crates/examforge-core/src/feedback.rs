//! Feedback synthesis: short per-question explanations, the holistic
//! recommendation, and the feedback lines shown next to each answer.
//!
//! Every service call here has a literal fallback; feedback never blocks
//! grading.

use crate::engine::EngineConfig;
use crate::model::{Category, Question, QuestionKind, VerificationOutcome};
use crate::prompt;
use crate::traits::{complete_bounded, CompletionRequest, CompletionService};

pub const EXPLANATION_FALLBACK: &str = "(No se pudo generar explicación IA)";
pub const HOLISTIC_FALLBACK: &str = "(No se pudo generar feedback personalizado)";
pub const NO_FAILURES_FEEDBACK: &str =
    "¡Excelente! No se detectaron temas con errores frecuentes.";

/// A question the learner did not get fully right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedQuestion {
    pub statement: String,
    pub learner_answer: String,
    pub correct_answer: String,
}

/// Produces explanation texts through the completion service.
pub struct FeedbackSynthesizer<'a> {
    completion: &'a dyn CompletionService,
    config: &'a EngineConfig,
}

impl<'a> FeedbackSynthesizer<'a> {
    pub fn new(completion: &'a dyn CompletionService, config: &'a EngineConfig) -> Self {
        Self { completion, config }
    }

    /// Explain briefly why the correct answer is the right one.
    pub async fn explain(&self, question: &Question, answer: &str) -> String {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            system_prompt: prompt::EXPLAINER_SYSTEM.to_string(),
            prompt: prompt::explanation_prompt(
                &question.statement,
                answer,
                &question.correct_answer_text(),
            ),
            max_tokens: self.config.explanation_max_tokens,
            timeout: self.config.question_timeout,
        };
        match complete_bounded(self.completion, &request).await {
            Ok(c) if !c.content.trim().is_empty() => c.content.trim().to_string(),
            Ok(_) => {
                tracing::warn!("empty explanation from completion service");
                EXPLANATION_FALLBACK.to_string()
            }
            Err(e) => {
                tracing::warn!("explanation failed: {e}");
                EXPLANATION_FALLBACK.to_string()
            }
        }
    }

    /// One recommendation covering every failed question. Makes no call when
    /// nothing failed.
    pub async fn holistic(&self, failed: &[FailedQuestion]) -> String {
        if failed.is_empty() {
            return NO_FAILURES_FEEDBACK.to_string();
        }
        let request = CompletionRequest {
            model: self.config.model.clone(),
            system_prompt: prompt::TUTOR_SYSTEM.to_string(),
            prompt: prompt::holistic_prompt(failed),
            max_tokens: self.config.holistic_max_tokens,
            timeout: self.config.evaluation_timeout,
        };
        match complete_bounded(self.completion, &request).await {
            Ok(c) if !c.content.trim().is_empty() => c.content.trim().to_string(),
            Ok(_) => HOLISTIC_FALLBACK.to_string(),
            Err(e) => {
                tracing::warn!("holistic feedback failed: {e}");
                HOLISTIC_FALLBACK.to_string()
            }
        }
    }
}

/// Collect every non-correct answer, in question order.
pub fn failed_questions(
    questions: &[Question],
    answers: &[String],
    outcomes: &[VerificationOutcome],
) -> Vec<FailedQuestion> {
    outcomes
        .iter()
        .filter(|o| o.category != Category::Correct)
        .filter_map(|o| {
            let question = questions.get(o.question_index)?;
            Some(FailedQuestion {
                statement: question.statement.clone(),
                learner_answer: answers.get(o.question_index).cloned().unwrap_or_default(),
                correct_answer: question.correct_answer_text(),
            })
        })
        .collect()
}

/// The feedback line shown for one graded answer.
pub fn format_feedback(question: &Question, answer: &str, outcome: &VerificationOutcome) -> String {
    let why = &outcome.explanation;
    match (question.kind, outcome.category) {
        (QuestionKind::Open, Category::Correct) => format!("✔️ CORRECTA\n{why}"),
        (QuestionKind::Open, Category::Partial) => format!("⚠️ PARCIALMENTE CORRECTA\n{why}"),
        (QuestionKind::Open, Category::Incorrect) => format!("❌ INCORRECTA\n{why}"),
        (_, Category::Unclassified) => format!("⚠️ No se pudo clasificar la respuesta\n{why}"),
        (_, Category::Correct) => "✔️ CORRECTA".to_string(),
        (QuestionKind::Multiple, _) => {
            let key = question.correct_key;
            format!(
                "❌ INCORRECTA.\nTu respuesta fue '{answer}': \"{}\"\nLa correcta era '{key}': \"{}\"\nPor qué: {why}",
                question.option_text(answer).unwrap_or_default(),
                question.option_text(key.as_str()).unwrap_or_default(),
            )
        }
        (QuestionKind::TrueFalse, _) => format!(
            "❌ INCORRECTA. Tu respuesta fue '{answer}', la correcta era '{}'.\nPor qué: {why}",
            question.correct_key
        ),
        (QuestionKind::Math, _) => format!(
            "❌ INCORRECTA. La solución es: {}\nPor qué: {why}",
            question.correct_answer_text()
        ),
    }
}
