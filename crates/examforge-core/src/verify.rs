//! Answer verification.
//!
//! Each question kind has its own strategy: keyed questions compare the
//! learner's answer to the declared key, open questions are judged by the
//! completion service, and math exercises go through a chain of equivalence
//! checks against the math service with a local fallback. A failed service
//! call never aborts grading; it degrades to the worst-case-safe outcome.

use tracing::{debug, warn};

use crate::engine::EngineConfig;
use crate::feedback::FeedbackSynthesizer;
use crate::model::{Category, Pod, Question, QuestionKind, VerificationOutcome};
use crate::prompt;
use crate::traits::{
    complete_bounded, query_bounded, CompletionRequest, CompletionService, MathQuery, MathService,
};

/// Explanation recorded when the evaluator could not be reached.
pub const EVALUATION_FALLBACK: &str = "(No se pudo evaluar la respuesta)";

/// Ordered verdict rules. The first pattern found in the evaluator's text
/// (case-insensitive) decides the category, so the longer phrases come first.
pub const VERDICT_RULES: &[(&str, Category)] = &[
    ("parcialmente correcta", Category::Partial),
    ("incorrecta", Category::Incorrect),
    ("correcta", Category::Correct),
];

/// Classify a free-text verdict.
pub fn classify_verdict(text: &str) -> Category {
    let lower = text.to_lowercase();
    VERDICT_RULES
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Unclassified)
}

/// The check that established equivalence of a math answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquivalenceTier {
    /// The math service confirmed `answer = reference`.
    Direct,
    /// The math service confirmed `answer = rhs`, where `rhs` is the
    /// right-hand side of an equation reference.
    RightHandSide,
    /// Whitespace-free, lower-cased strings are equal.
    Normalized,
}

/// Remove all whitespace and lower-case.
pub fn normalize_math(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Right-hand side after the last `=`, if the text is an equation.
fn right_hand_side(reference: &str) -> Option<&str> {
    let (_, rhs) = reference.rsplit_once('=')?;
    let rhs = rhs.trim();
    (!rhs.is_empty()).then_some(rhs)
}

fn confirms_equality(pods: &[Pod]) -> bool {
    pods.iter().filter(|p| p.is_result()).any(|p| {
        p.text()
            .map(|t| t.to_lowercase().contains("true"))
            .unwrap_or(false)
    })
}

/// Runs the verification strategy matching each question's kind.
pub struct Verifier<'a> {
    completion: &'a dyn CompletionService,
    math: &'a dyn MathService,
    config: &'a EngineConfig,
}

impl<'a> Verifier<'a> {
    pub fn new(
        completion: &'a dyn CompletionService,
        math: &'a dyn MathService,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            completion,
            math,
            config,
        }
    }

    /// Verify the answer to question `index`.
    pub async fn verify(&self, index: usize, question: &Question, answer: &str) -> VerificationOutcome {
        let (category, explanation) = match question.kind {
            QuestionKind::Multiple | QuestionKind::TrueFalse => {
                self.verify_keyed(question, answer).await
            }
            QuestionKind::Open => self.evaluate_open(question, answer).await,
            QuestionKind::Math => self.verify_math(question, answer).await,
        };
        debug!(index, ?category, "verified answer");
        VerificationOutcome {
            question_index: index,
            category,
            explanation,
        }
    }

    async fn verify_keyed(&self, question: &Question, answer: &str) -> (Category, String) {
        if question.correct_key.matches(answer) {
            return (Category::Correct, String::new());
        }
        let explanation = self.synthesizer().explain(question, answer).await;
        (Category::Incorrect, explanation)
    }

    async fn evaluate_open(&self, question: &Question, answer: &str) -> (Category, String) {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            system_prompt: prompt::GRADER_SYSTEM.to_string(),
            prompt: prompt::evaluation_prompt(&question.statement, answer),
            max_tokens: self.config.evaluation_max_tokens,
            timeout: self.config.evaluation_timeout,
        };
        match complete_bounded(self.completion, &request).await {
            Ok(completion) => {
                let verdict = completion.content.trim().to_string();
                let category = classify_verdict(&verdict);
                if category == Category::Unclassified {
                    warn!("evaluator verdict could not be classified");
                }
                (category, verdict)
            }
            Err(e) => {
                warn!("open answer evaluation failed: {e}");
                (Category::Unclassified, EVALUATION_FALLBACK.to_string())
            }
        }
    }

    async fn verify_math(&self, question: &Question, answer: &str) -> (Category, String) {
        let reference = question
            .math
            .as_ref()
            .map(|m| m.reference_solution.as_str())
            .unwrap_or_default();
        match self.check_equivalence(answer, reference).await {
            Some(tier) => {
                debug!(?tier, "math answer accepted");
                (Category::Correct, String::new())
            }
            None => {
                let explanation = self.synthesizer().explain(question, answer).await;
                (Category::Incorrect, explanation)
            }
        }
    }

    /// Run the equivalence tiers in order, stopping at the first that holds.
    /// Blank inputs fail without any service call.
    pub async fn check_equivalence(&self, answer: &str, reference: &str) -> Option<EquivalenceTier> {
        let answer = answer.trim();
        let reference = reference.trim();
        if answer.is_empty() || reference.is_empty() {
            return None;
        }

        if self.service_confirms(answer, reference).await {
            return Some(EquivalenceTier::Direct);
        }
        if let Some(rhs) = right_hand_side(reference) {
            if self.service_confirms(answer, rhs).await {
                return Some(EquivalenceTier::RightHandSide);
            }
        }
        (normalize_math(answer) == normalize_math(reference)).then_some(EquivalenceTier::Normalized)
    }

    async fn service_confirms(&self, answer: &str, reference: &str) -> bool {
        let query = MathQuery::plaintext(
            format!("is ({answer}) = ({reference})"),
            self.config.question_timeout,
        );
        match query_bounded(self.math, &query).await {
            Ok(pods) => confirms_equality(&pods),
            Err(e) => {
                debug!("equivalence query failed: {e}");
                false
            }
        }
    }

    fn synthesizer(&self) -> FeedbackSynthesizer<'a> {
        FeedbackSynthesizer::new(self.completion, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::feedback::EXPLANATION_FALLBACK;
    use crate::model::{AnswerKey, MathExercise};
    use crate::testing::{pod, ScriptedCompletion, ScriptedMath};

    fn keyed(key: AnswerKey) -> Question {
        Question {
            statement: "Enunciado 1: ¿2+2?".into(),
            options: vec!["a) 3".into(), "b) 4".into()],
            correct_key: key,
            kind: QuestionKind::Multiple,
            topic: "Aritmética".into(),
            math: None,
        }
    }

    fn open() -> Question {
        Question {
            statement: "Enunciado 1: Explicá la fotosíntesis.".into(),
            options: vec![],
            correct_key: AnswerKey::Indefinido,
            kind: QuestionKind::Open,
            topic: "Biología".into(),
            math: None,
        }
    }

    fn math_question(reference: &str) -> Question {
        Question {
            statement: "Resolvé la ecuación".into(),
            options: vec![],
            correct_key: AnswerKey::Indefinido,
            kind: QuestionKind::Math,
            topic: "Ecuaciones".into(),
            math: Some(MathExercise {
                expression: "2x = 10".into(),
                image_ref: None,
                reference_solution: reference.into(),
                supporting_pods: vec![],
            }),
        }
    }

    #[test]
    fn verdict_rules_prefer_longest_phrase() {
        assert_eq!(
            classify_verdict("La respuesta es parcialmente correcta porque..."),
            Category::Partial
        );
        assert_eq!(classify_verdict("Respuesta INCORRECTA."), Category::Incorrect);
        assert_eq!(classify_verdict("Es correcta."), Category::Correct);
        assert_eq!(classify_verdict("No sé qué decir"), Category::Unclassified);
        assert_eq!(classify_verdict(""), Category::Unclassified);
    }

    #[test]
    fn normalization_strips_whitespace_and_case() {
        assert_eq!(normalize_math(" X = 5 \n"), "x=5");
        assert_eq!(normalize_math("Sin(x)"), normalize_math("sin( x )"));
    }

    #[test]
    fn rhs_uses_last_equals() {
        assert_eq!(right_hand_side("x = y = 3"), Some("3"));
        assert_eq!(right_hand_side("x ="), None);
        assert_eq!(right_hand_side("42"), None);
    }

    #[tokio::test]
    async fn correct_key_needs_no_explanation() {
        let completion = ScriptedCompletion::new(Ok("no usar"));
        let math = ScriptedMath::unreachable();
        let config = EngineConfig::default();
        let verifier = Verifier::new(&completion, &math, &config);
        let outcome = verifier.verify(0, &keyed(AnswerKey::B), " B ").await;
        assert_eq!(outcome.category, Category::Correct);
        assert!(outcome.explanation.is_empty());
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn mismatch_is_incorrect_even_when_explanation_fails() {
        let completion = ScriptedCompletion::new(Err(ProviderError::Timeout(30)));
        let math = ScriptedMath::unreachable();
        let config = EngineConfig::default();
        let verifier = Verifier::new(&completion, &math, &config);
        let outcome = verifier.verify(2, &keyed(AnswerKey::B), "x").await;
        assert_eq!(outcome.question_index, 2);
        assert_eq!(outcome.category, Category::Incorrect);
        assert_eq!(outcome.explanation, EXPLANATION_FALLBACK);
    }

    #[tokio::test]
    async fn open_answer_partial_verdict() {
        let completion =
            ScriptedCompletion::new(Ok("la respuesta es parcialmente correcta porque omite la luz"));
        let math = ScriptedMath::unreachable();
        let config = EngineConfig::default();
        let verifier = Verifier::new(&completion, &math, &config);
        let outcome = verifier.verify(0, &open(), "las plantas comen").await;
        assert_eq!(outcome.category, Category::Partial);
        assert!(outcome.explanation.contains("omite la luz"));

        let request = &completion.requests.lock().unwrap()[0];
        assert_eq!(request.timeout, config.evaluation_timeout);
        assert_eq!(request.max_tokens, config.evaluation_max_tokens);
    }

    #[tokio::test]
    async fn open_answer_service_failure_is_unclassified() {
        let completion = ScriptedCompletion::new(Err(ProviderError::ApiError {
            status: 500,
            message: "boom".into(),
        }));
        let math = ScriptedMath::unreachable();
        let config = EngineConfig::default();
        let verifier = Verifier::new(&completion, &math, &config);
        let outcome = verifier.verify(0, &open(), "algo").await;
        assert_eq!(outcome.category, Category::Unclassified);
        assert_eq!(outcome.explanation, EVALUATION_FALLBACK);
    }

    #[tokio::test]
    async fn direct_tier_short_circuits() {
        let completion = ScriptedCompletion::new(Ok("explicación"));
        let math = ScriptedMath::unreachable().on("is (5) = (5)", Ok(vec![pod("Result", "True")]));
        let config = EngineConfig::default();
        let verifier = Verifier::new(&completion, &math, &config);
        assert_eq!(
            verifier.check_equivalence("5", "5").await,
            Some(EquivalenceTier::Direct)
        );
        assert_eq!(math.calls(), 1);
    }

    #[tokio::test]
    async fn right_hand_side_tier() {
        let completion = ScriptedCompletion::new(Ok("explicación"));
        let math = ScriptedMath::unreachable()
            .on("is (5) = (x = 5)", Ok(vec![pod("Result", "False")]))
            .on("is (5) = (5)", Ok(vec![pod("Resultado", "true")]));
        let config = EngineConfig::default();
        let verifier = Verifier::new(&completion, &math, &config);
        assert_eq!(
            verifier.check_equivalence("5", "x = 5").await,
            Some(EquivalenceTier::RightHandSide)
        );
        assert_eq!(math.calls(), 2);
    }

    #[tokio::test]
    async fn normalized_tier_when_service_unreachable() {
        let completion = ScriptedCompletion::new(Ok("explicación"));
        let math = ScriptedMath::unreachable();
        let config = EngineConfig::default();
        let verifier = Verifier::new(&completion, &math, &config);

        assert_eq!(
            verifier.check_equivalence("x=5", "x = 5").await,
            Some(EquivalenceTier::Normalized)
        );
        assert_eq!(math.calls(), 2);

        let outcome = verifier.verify(0, &math_question("x = 5"), "X = 5").await;
        assert_eq!(outcome.category, Category::Correct);
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn blank_math_answer_is_incorrect_without_queries() {
        let completion = ScriptedCompletion::new(Ok("Hay que despejar x."));
        let math = ScriptedMath::unreachable();
        let config = EngineConfig::default();
        let verifier = Verifier::new(&completion, &math, &config);
        let outcome = verifier.verify(0, &math_question("x = 5"), "   ").await;
        assert_eq!(outcome.category, Category::Incorrect);
        assert_eq!(outcome.explanation, "Hay que despejar x.");
        assert_eq!(math.calls(), 0);
    }

    #[tokio::test]
    async fn wrong_math_answer_gets_explanation() {
        let completion = ScriptedCompletion::new(Ok("Dividí ambos lados por 2."));
        let math = ScriptedMath::unreachable().on("is", Ok(vec![pod("Result", "False")]));
        let config = EngineConfig::default();
        let verifier = Verifier::new(&completion, &math, &config);
        let outcome = verifier.verify(1, &math_question("x = 5"), "x = 4").await;
        assert_eq!(outcome.category, Category::Incorrect);
        assert_eq!(outcome.explanation, "Dividí ambos lados por 2.");
    }
}
