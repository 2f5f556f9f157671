//! Central exam engine.
//!
//! Generates attempts from exam parameters, records answers, and grades a
//! completed attempt: verification of every answer, score aggregation, and
//! feedback synthesis.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{GenerationError, ProviderError, StateError};
use crate::feedback::{self, FeedbackSynthesizer};
use crate::mathquery::{self, LookupError, MathLookup, MathOperation};
use crate::model::{
    AnswerKey, ExamParams, ExamResult, MathExercise, Pod, Question, QuestionKind, SourceMaterial,
    DEFAULT_TOPIC,
};
use crate::parser;
use crate::prompt;
use crate::scoring;
use crate::session::{Attempt, SessionState};
use crate::traits::{
    complete_bounded, query_bounded, Completion, CompletionRequest, CompletionService, MathQuery,
    MathService,
};
use crate::verify::Verifier;

/// Upper bound for the delay between generation retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Configuration for the exam engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model used for every completion.
    pub model: String,
    /// Bound on the whole-exam generation call.
    pub generation_timeout: Duration,
    /// Bound on question-level calls (explanations, math exercises, queries).
    pub question_timeout: Duration,
    /// Bound on open-answer evaluation and holistic feedback.
    pub evaluation_timeout: Duration,
    pub generation_max_tokens: u32,
    pub explanation_max_tokens: u32,
    pub evaluation_max_tokens: u32,
    pub holistic_max_tokens: u32,
    pub math_exercise_max_tokens: u32,
    pub translation_max_tokens: u32,
    /// Retries of the whole-exam generation call on transient errors.
    pub max_retries: u32,
    /// Initial delay between retries, doubled on every retry.
    pub retry_delay: Duration,
    /// Maximum answers verified concurrently while grading.
    pub grading_parallelism: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            generation_timeout: Duration::from_secs(60),
            question_timeout: Duration::from_secs(30),
            evaluation_timeout: Duration::from_secs(45),
            generation_max_tokens: 3000,
            explanation_max_tokens: 120,
            evaluation_max_tokens: 500,
            holistic_max_tokens: 200,
            math_exercise_max_tokens: 120,
            translation_max_tokens: 60,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            grading_parallelism: 4,
        }
    }
}

/// The exam engine.
pub struct ExamEngine {
    completion: Arc<dyn CompletionService>,
    math: Arc<dyn MathService>,
    config: EngineConfig,
}

impl ExamEngine {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        math: Arc<dyn MathService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            completion,
            math,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generate a fresh attempt.
    pub async fn generate(&self, params: &ExamParams) -> Result<Attempt, GenerationError> {
        if params.count == 0 {
            return Err(GenerationError::InvalidCount);
        }
        let questions = match params.format {
            QuestionKind::Math => self.generate_math(params).await?,
            _ => self.generate_exam(params).await?,
        };
        info!(
            format = %params.format,
            requested = params.count,
            generated = questions.len(),
            "exam generated"
        );
        let attempt = Attempt::new(questions, params.level.clone(), Utc::now())
            .ok_or(GenerationError::NoValidQuestions)?;
        Ok(attempt.with_title(params.title.clone()))
    }

    async fn generate_exam(&self, params: &ExamParams) -> Result<Vec<Question>, GenerationError> {
        let source = prompt::source_text(params.source.as_ref())?;
        let topic = match &params.source {
            Some(SourceMaterial::Topic { topic }) => topic.trim().to_string(),
            _ => DEFAULT_TOPIC.to_string(),
        };

        let request = CompletionRequest {
            model: self.config.model.clone(),
            system_prompt: prompt::EXAM_GENERATOR_SYSTEM.to_string(),
            prompt: prompt::exam_prompt(params, &source),
            max_tokens: self.config.generation_max_tokens,
            timeout: self.config.generation_timeout,
        };
        let completion = self.complete_with_retry(&request).await?;
        debug!(
            tokens = completion.usage.total_tokens,
            latency_ms = completion.latency_ms,
            "raw exam completion:\n{}",
            completion.content
        );

        let parsed =
            parser::parse_completion(&completion.content, params.format, params.option_count, &topic);
        if parsed.questions.is_empty() {
            warn!(
                blocks = parsed.blocks_found,
                "no valid questions in completion"
            );
            return Err(GenerationError::NoValidQuestions);
        }
        Ok(parsed.questions)
    }

    /// Whole-exam completion with exponential backoff. Permanent errors and
    /// timeouts are returned immediately.
    async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<Completion, ProviderError> {
        let mut delay = self.config.retry_delay;
        let mut retry = 0;
        loop {
            match complete_bounded(self.completion.as_ref(), request).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_permanent() || e.is_timeout() => return Err(e),
                Err(e) if retry >= self.config.max_retries => return Err(e),
                Err(e) => {
                    if let Some(ms) = e.retry_after_ms() {
                        delay = Duration::from_millis(ms);
                    }
                    retry += 1;
                    warn!("generation failed ({e}), retry {retry} in {delay:?}");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }

    async fn generate_math(&self, params: &ExamParams) -> Result<Vec<Question>, GenerationError> {
        let topics = params.all_math_topics();
        if topics.is_empty() {
            return Err(GenerationError::NoMathTopics);
        }

        let mut questions = Vec::new();
        for i in 0..params.count as usize {
            let topic = &topics[i % topics.len()];
            debug!("generating math exercise {}/{}", i + 1, params.count);
            match self.math_exercise(&params.level, topic).await {
                Some(question) => questions.push(question),
                None => warn!(topic = %topic, "discarding math exercise {}", i + 1),
            }
        }
        if questions.is_empty() {
            return Err(GenerationError::NoValidQuestions);
        }
        Ok(questions)
    }

    /// One math exercise, or `None` when it has no expression or no
    /// reference solution.
    async fn math_exercise(&self, level: &str, topic: &str) -> Option<Question> {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            system_prompt: prompt::MATH_GENERATOR_SYSTEM.to_string(),
            prompt: prompt::math_exercise_prompt(level, topic),
            max_tokens: self.config.math_exercise_max_tokens,
            timeout: self.config.question_timeout,
        };
        let text = match complete_bounded(self.completion.as_ref(), &request).await {
            Ok(c) => c.content,
            Err(e) => {
                warn!("math exercise generation failed: {e}");
                return None;
            }
        };
        let (statement, expression) = parser::split_exercise(&text);
        if expression.is_empty() {
            return None;
        }

        let query = MathQuery::with_images(expression.clone(), self.config.question_timeout);
        let pods = match query_bounded(self.math.as_ref(), &query).await {
            Ok(pods) => pods,
            Err(e) => {
                warn!("math service failed for '{expression}': {e}");
                return None;
            }
        };
        let reference_solution = pods
            .iter()
            .filter(|p| p.is_result())
            .filter_map(Pod::text)
            .last()?
            .to_string();
        let image_ref = pods
            .iter()
            .find(|p| p.is_input() && p.image_ref.is_some())
            .and_then(|p| p.image_ref.clone());
        let supporting_pods = pods
            .into_iter()
            .filter(|p| p.text().is_some() || p.image_ref.is_some())
            .collect();

        Some(Question {
            statement: if statement.is_empty() {
                expression.clone()
            } else {
                statement
            },
            options: Vec::new(),
            correct_key: AnswerKey::Indefinido,
            kind: QuestionKind::Math,
            topic: topic.to_string(),
            math: Some(MathExercise {
                expression,
                image_ref,
                reference_solution,
                supporting_pods,
            }),
        })
    }

    /// Record the answer for question `index`.
    pub fn submit_answer(
        &self,
        attempt: &mut Attempt,
        index: usize,
        answer: &str,
    ) -> Result<SessionState, StateError> {
        let state = attempt.submit(index, answer)?;
        debug!(attempt = %attempt.id, index, ?state, "answer recorded");
        Ok(state)
    }

    /// Restart the attempt with the same questions.
    pub fn reset(&self, attempt: &mut Attempt) {
        attempt.reset();
        info!(attempt = %attempt.id, "attempt restarted");
    }

    /// Grade a completed attempt.
    pub async fn grade(&self, attempt: &Attempt) -> Result<ExamResult, StateError> {
        self.grade_at(attempt, Utc::now()).await
    }

    /// Grade a completed attempt, measuring total time up to `now`.
    pub async fn grade_at(
        &self,
        attempt: &Attempt,
        now: DateTime<Utc>,
    ) -> Result<ExamResult, StateError> {
        if !attempt.is_complete() {
            return Err(StateError::Incomplete {
                answered: attempt.answered(),
                total: attempt.len(),
            });
        }

        let questions = attempt.questions();
        let answers = attempt.answers();
        let verifier = &Verifier::new(self.completion.as_ref(), self.math.as_ref(), &self.config);
        let outcomes: Vec<_> = stream::iter(questions.iter().zip(answers).enumerate())
            .map(move |(i, (question, answer))| verifier.verify(i, question, answer))
            .buffered(self.config.grading_parallelism.max(1))
            .collect()
            .await;

        let summary = scoring::aggregate(questions, &outcomes);
        let per_question_feedback = outcomes
            .iter()
            .map(|o| {
                let i = o.question_index;
                feedback::format_feedback(&questions[i], &answers[i], o)
            })
            .collect();
        let failed = feedback::failed_questions(questions, answers, &outcomes);
        let holistic_feedback = FeedbackSynthesizer::new(self.completion.as_ref(), &self.config)
            .holistic(&failed)
            .await;

        info!(
            attempt = %attempt.id,
            grade = summary.grade,
            correct = summary.correct,
            total = summary.total,
            "attempt graded"
        );

        Ok(ExamResult {
            attempt_id: attempt.id,
            correct_count: summary.correct,
            partial_count: summary.partial,
            incorrect_count: summary.incorrect,
            unclassified_count: summary.unclassified,
            total: summary.total,
            grade: summary.grade,
            outcomes,
            per_question_feedback,
            holistic_feedback,
            failed_topics: summary.failed_topics,
            per_question_seconds: attempt.per_question_seconds().to_vec(),
            total_elapsed_seconds: attempt.elapsed_seconds(now),
            graded_at: now,
        })
    }

    /// Free lookup against the math service.
    pub async fn lookup_math(
        &self,
        expression: &str,
        operation: Option<MathOperation>,
    ) -> Result<MathLookup, LookupError> {
        mathquery::lookup(
            self.completion.as_ref(),
            self.math.as_ref(),
            &self.config,
            expression,
            operation,
        )
        .await
    }
}
