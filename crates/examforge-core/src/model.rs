//! Core data model types for examforge.
//!
//! Questions and math exercises are produced by the parser and the engine and
//! are immutable once they enter an attempt. Outcomes and results are derived
//! during grading.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic recorded on questions generated from a document.
pub const DEFAULT_TOPIC: &str = "General";

/// The kind of question, forced from the requested exam format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Multiple,
    TrueFalse,
    Open,
    Math,
}

impl QuestionKind {
    /// Whether answers are graded by comparing against a declared key.
    pub fn is_keyed(self) -> bool {
        matches!(self, QuestionKind::Multiple | QuestionKind::TrueFalse)
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::Multiple => write!(f, "multiple"),
            QuestionKind::TrueFalse => write!(f, "true_false"),
            QuestionKind::Open => write!(f, "open"),
            QuestionKind::Math => write!(f, "math"),
        }
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "multiple" | "multiple-choice" | "multiple_choice" | "multiple choice" => {
                Ok(QuestionKind::Multiple)
            }
            "true_false" | "true-false" | "truefalse" | "vf" | "verdadero o falso" => {
                Ok(QuestionKind::TrueFalse)
            }
            "open" | "desarrollo" => Ok(QuestionKind::Open),
            "math" | "ejercicios matematicos" => Ok(QuestionKind::Math),
            other => Err(format!("unknown exam format: {other}")),
        }
    }
}

/// The declared correct answer of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerKey {
    A,
    B,
    C,
    D,
    E,
    Verdadero,
    Falso,
    Indefinido,
}

impl AnswerKey {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerKey::A => "a",
            AnswerKey::B => "b",
            AnswerKey::C => "c",
            AnswerKey::D => "d",
            AnswerKey::E => "e",
            AnswerKey::Verdadero => "verdadero",
            AnswerKey::Falso => "falso",
            AnswerKey::Indefinido => "indefinido",
        }
    }

    pub fn is_defined(self) -> bool {
        self != AnswerKey::Indefinido
    }

    /// The option letter, for multiple-choice keys.
    pub fn letter(self) -> Option<char> {
        match self {
            AnswerKey::A => Some('a'),
            AnswerKey::B => Some('b'),
            AnswerKey::C => Some('c'),
            AnswerKey::D => Some('d'),
            AnswerKey::E => Some('e'),
            _ => None,
        }
    }

    /// Whether a learner's answer selects this key. Surrounding whitespace
    /// and ASCII case are ignored.
    pub fn matches(self, answer: &str) -> bool {
        self.is_defined() && answer.trim().eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many options a multiple-choice question offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OptionCount {
    Three,
    #[default]
    Four,
    Five,
}

impl OptionCount {
    /// The option letters expected for this cardinality.
    pub fn letters(self) -> &'static [char] {
        match self {
            OptionCount::Three => &['a', 'b', 'c'],
            OptionCount::Four => &['a', 'b', 'c', 'd'],
            OptionCount::Five => &['a', 'b', 'c', 'd', 'e'],
        }
    }

    pub fn get(self) -> u8 {
        self.letters().len() as u8
    }
}

impl TryFrom<u8> for OptionCount {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            3 => Ok(OptionCount::Three),
            4 => Ok(OptionCount::Four),
            5 => Ok(OptionCount::Five),
            other => Err(format!("option count must be 3, 4 or 5, got {other}")),
        }
    }
}

impl From<OptionCount> for u8 {
    fn from(count: OptionCount) -> u8 {
        count.get()
    }
}

impl FromStr for OptionCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map_err(|_| format!("invalid option count: {s}"))?
            .try_into()
    }
}

/// A named result section returned by the math service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub title: String,
    #[serde(default)]
    pub plaintext: Option<String>,
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl Pod {
    /// Titles under which the math service reports a final answer.
    pub const RESULT_TITLES: [&'static str; 4] = ["result", "resultado", "solution", "solución"];

    pub fn is_result(&self) -> bool {
        let title = self.title.trim().to_lowercase();
        Self::RESULT_TITLES.contains(&title.as_str())
    }

    pub fn is_input(&self) -> bool {
        matches!(self.title.trim().to_lowercase().as_str(), "input" | "entrada")
    }

    /// Plaintext, if present and not blank.
    pub fn text(&self) -> Option<&str> {
        self.plaintext
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// The math-specific part of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathExercise {
    /// Symbolic form sent to the math service.
    pub expression: String,
    /// Rendered image of the expression, when the service provides one.
    #[serde(default)]
    pub image_ref: Option<String>,
    /// Authoritative value used for equivalence checking.
    pub reference_solution: String,
    #[serde(default)]
    pub supporting_pods: Vec<Pod>,
}

/// A single exam question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub statement: String,
    /// Option lines as generated, e.g. `"a) Paris"`. Empty for non-choice kinds.
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_key: AnswerKey,
    pub kind: QuestionKind,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub math: Option<MathExercise>,
}

impl Question {
    /// Text of the option labelled `letter`, without its `x)` prefix.
    pub fn option_text(&self, letter: &str) -> Option<&str> {
        let letter = letter.trim();
        if letter.len() != 1 || !letter.is_ascii() {
            return None;
        }
        let prefix = format!("{letter})");
        self.options.iter().find_map(|opt| {
            let trimmed = opt.trim();
            let head = trimmed.get(..prefix.len())?;
            head.eq_ignore_ascii_case(&prefix)
                .then(|| trimmed[prefix.len()..].trim())
        })
    }

    /// Human-readable correct answer, used in feedback.
    pub fn correct_answer_text(&self) -> String {
        match self.kind {
            QuestionKind::Multiple => match self.option_text(self.correct_key.as_str()) {
                Some(text) => format!("{}) {}", self.correct_key, text),
                None => self.correct_key.to_string(),
            },
            QuestionKind::TrueFalse => self.correct_key.to_string(),
            QuestionKind::Open => "(respuesta abierta)".to_string(),
            QuestionKind::Math => self
                .math
                .as_ref()
                .map(|m| m.reference_solution.clone())
                .unwrap_or_default(),
        }
    }
}

/// Where the exam content comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceMaterial {
    /// A free-text topic typed by the learner.
    Topic { topic: String },
    /// Plain text already decoded by the document extractor.
    Document { name: String, text: String },
}

/// Parameters for generating an exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamParams {
    pub format: QuestionKind,
    pub count: u32,
    /// Difficulty level, e.g. "secundario" or "universitario".
    pub level: String,
    #[serde(default)]
    pub source: Option<SourceMaterial>,
    #[serde(default)]
    pub option_count: OptionCount,
    /// Extra instructions for true/false and open formats.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Selected topics for math exercises.
    #[serde(default)]
    pub math_topics: Vec<String>,
    #[serde(default)]
    pub custom_math_topic: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl Default for ExamParams {
    fn default() -> Self {
        Self {
            format: QuestionKind::Multiple,
            count: 5,
            level: "secundario".to_string(),
            source: None,
            option_count: OptionCount::default(),
            instructions: None,
            math_topics: Vec::new(),
            custom_math_topic: None,
            title: None,
        }
    }
}

impl ExamParams {
    /// Math topics in selection order, custom topic last.
    pub fn all_math_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .math_topics
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if let Some(custom) = self.custom_math_topic.as_deref().map(str::trim) {
            if !custom.is_empty() {
                topics.push(custom.to_string());
            }
        }
        topics
    }
}

/// Grading category of one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Correct,
    Partial,
    Incorrect,
    /// The evaluator's verdict could not be read. Scored as incorrect.
    Unclassified,
}

impl Category {
    /// Points awarded toward the grade.
    pub fn credit(self) -> f64 {
        match self {
            Category::Correct => 1.0,
            Category::Partial => 0.5,
            Category::Incorrect | Category::Unclassified => 0.0,
        }
    }
}

/// The verified outcome of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub question_index: usize,
    pub category: Category,
    /// Explanation text: evaluator verdict, synthesized explanation, or empty
    /// for correct keyed answers.
    pub explanation: String,
}

/// The graded result of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub attempt_id: Uuid,
    pub correct_count: u32,
    pub partial_count: u32,
    /// Includes unclassified outcomes.
    pub incorrect_count: u32,
    pub unclassified_count: u32,
    pub total: u32,
    /// Grade on a 0 to 10 scale, rounded to two decimals.
    pub grade: f64,
    pub outcomes: Vec<VerificationOutcome>,
    pub per_question_feedback: Vec<String>,
    pub holistic_feedback: String,
    /// Non-correct answers per question topic.
    pub failed_topics: BTreeMap<String, u32>,
    pub per_question_seconds: Vec<f64>,
    pub total_elapsed_seconds: f64,
    pub graded_at: DateTime<Utc>,
}
