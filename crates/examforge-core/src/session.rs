//! Exam attempt state.
//!
//! An [`Attempt`] is created once generation succeeds and is owned by a
//! single exam-taking session. Answers are recorded strictly in question
//! order, one per index; viewing never mutates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StateError;
use crate::model::{Question, QuestionKind, DEFAULT_TOPIC};

/// Where an attempt is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No exam has been generated.
    Empty,
    /// Questions are loaded and nothing has been answered.
    Populated,
    /// Answers `0..index` are recorded; `index` is next.
    Answering(usize),
    /// Every question is answered; ready for grading.
    Completed,
}

/// One learner's exam instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AttemptRecord")]
pub struct Attempt {
    pub id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    pub level: String,
    questions: Vec<Question>,
    answers: Vec<String>,
    per_question_seconds: Vec<f64>,
    started_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

/// Read-only view of one question, as shown to the learner.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView<'a> {
    pub index: usize,
    /// 1-based position for display.
    pub number: usize,
    pub total: usize,
    pub question: &'a Question,
    pub current_answer: &'a str,
}

/// Stored form of an [`Attempt`], checked before it becomes one.
#[derive(Deserialize)]
struct AttemptRecord {
    id: Uuid,
    #[serde(default)]
    title: Option<String>,
    level: String,
    questions: Vec<Question>,
    answers: Vec<String>,
    per_question_seconds: Vec<f64>,
    started_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl TryFrom<AttemptRecord> for Attempt {
    type Error = String;

    fn try_from(record: AttemptRecord) -> Result<Self, Self::Error> {
        if let Some(problem) = question_list_problem(&record.questions) {
            return Err(problem);
        }
        let len = record.questions.len();
        if record.answers.len() != len {
            return Err(format!("{} answers for {len} questions", record.answers.len()));
        }
        if record.per_question_seconds.len() > len {
            return Err(format!(
                "{} timings for {len} questions",
                record.per_question_seconds.len()
            ));
        }
        Ok(Self {
            id: record.id,
            title: record.title,
            level: record.level,
            questions: record.questions,
            answers: record.answers,
            per_question_seconds: record.per_question_seconds,
            started_at: record.started_at,
            last_activity_at: record.last_activity_at,
        })
    }
}

/// Why a question list cannot back an attempt, if it cannot.
fn question_list_problem(questions: &[Question]) -> Option<String> {
    if questions.is_empty() {
        return Some("attempt has no questions".to_string());
    }
    questions
        .iter()
        .position(|q| q.kind.is_keyed() && !q.correct_key.is_defined())
        .map(|index| format!("question {index} has no answer key"))
}

impl Attempt {
    /// Start an attempt at `now`. Returns `None` for an empty question list
    /// or one holding a keyed question without a key; neither can be graded.
    pub fn new(questions: Vec<Question>, level: impl Into<String>, now: DateTime<Utc>) -> Option<Self> {
        if question_list_problem(&questions).is_some() {
            return None;
        }
        let answers = vec![String::new(); questions.len()];
        Some(Self {
            id: Uuid::new_v4(),
            title: None,
            level: level.into(),
            questions,
            answers,
            per_question_seconds: Vec::new(),
            started_at: now,
            last_activity_at: now,
        })
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn per_question_seconds(&self) -> &[f64] {
        &self.per_question_seconds
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Number of recorded answers, which is also the next index to answer.
    pub fn answered(&self) -> usize {
        self.per_question_seconds.len()
    }

    pub fn is_complete(&self) -> bool {
        self.answered() == self.questions.len()
    }

    pub fn state(&self) -> SessionState {
        match self.answered() {
            0 => SessionState::Populated,
            n if n == self.questions.len() => SessionState::Completed,
            n => SessionState::Answering(n),
        }
    }

    /// Look at a question without changing anything.
    pub fn view(&self, index: usize) -> Result<QuestionView<'_>, StateError> {
        let question = self.questions.get(index).ok_or(StateError::IndexOutOfRange {
            index,
            len: self.questions.len(),
        })?;
        Ok(QuestionView {
            index,
            number: index + 1,
            total: self.questions.len(),
            question,
            current_answer: &self.answers[index],
        })
    }

    /// Record the answer for `index` at the current time.
    pub fn submit(&mut self, index: usize, answer: &str) -> Result<SessionState, StateError> {
        self.submit_at(index, answer, Utc::now())
    }

    /// Record the answer for `index` at `now`.
    ///
    /// Appends the time spent since the last activity, rounded to hundredths
    /// of a second. On error the attempt is unchanged.
    pub fn submit_at(
        &mut self,
        index: usize,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionState, StateError> {
        let len = self.questions.len();
        let expected = self.answered();
        if index >= len {
            return Err(StateError::IndexOutOfRange { index, len });
        }
        if expected == len {
            return Err(StateError::Completed);
        }
        if index < expected {
            return Err(StateError::AlreadyAnswered { index });
        }
        if index > expected {
            return Err(StateError::OutOfOrder { index, expected });
        }

        self.answers[index] = answer.trim().to_string();
        let spent = (now - self.last_activity_at).num_milliseconds().max(0) as f64 / 1000.0;
        self.per_question_seconds.push(round2(spent));
        self.last_activity_at = now;
        Ok(self.state())
    }

    /// Clear answers and timers, keeping the same questions.
    pub fn reset(&mut self) {
        self.reset_at(Utc::now());
    }

    pub fn reset_at(&mut self, now: DateTime<Utc>) {
        self.answers = vec![String::new(); self.questions.len()];
        self.per_question_seconds.clear();
        self.started_at = now;
        self.last_activity_at = now;
    }

    /// Seconds since the attempt started.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        round2((now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0)
    }

    /// The topic of the exam, taken from its first question.
    pub fn topic(&self) -> &str {
        self.questions.first().map_or(DEFAULT_TOPIC, |q| q.topic.as_str())
    }

    pub fn kind(&self) -> QuestionKind {
        self.questions.first().map_or(QuestionKind::Open, |q| q.kind)
    }
}

/// Holder for the attempt of one exam-taking session.
///
/// A new generation replaces the previous attempt; there is no explicit
/// cancellation.
#[derive(Debug, Default)]
pub struct ExamSession {
    attempt: Option<Attempt>,
}

impl ExamSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.attempt
            .as_ref()
            .map(Attempt::state)
            .unwrap_or(SessionState::Empty)
    }

    /// Install a freshly generated attempt, discarding any previous one.
    pub fn replace(&mut self, attempt: Attempt) -> Option<Attempt> {
        self.attempt.replace(attempt)
    }

    pub fn clear(&mut self) {
        self.attempt = None;
    }

    pub fn attempt(&self) -> Result<&Attempt, StateError> {
        self.attempt.as_ref().ok_or(StateError::NoAttempt)
    }

    pub fn attempt_mut(&mut self) -> Result<&mut Attempt, StateError> {
        self.attempt.as_mut().ok_or(StateError::NoAttempt)
    }
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
