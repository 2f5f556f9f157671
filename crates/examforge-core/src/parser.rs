//! Completion parsing: segmentation into question blocks and normalization
//! of each block into a [`Question`].
//!
//! Every line is first tagged by [`classify_line`]; a small state machine then
//! groups tagged lines into blocks. Segmentation never drops text that belongs
//! to an opened block. Normalization is the correctness gate: blocks without a
//! verifiable key are discarded there.

use crate::model::{AnswerKey, OptionCount, Question, QuestionKind};

const STATEMENT_MARKER: &str = "enunciado";
const ANSWER_MARKER: &str = "respuesta";

/// What a single completion line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Opens a new question ("Enunciado 1: ...", optionally bold).
    StatementStart,
    /// An option line for the configured cardinality ("b) ...").
    Option(char),
    /// Declares the correct answer ("Respuesta: b").
    AnswerKey,
    Other,
}

/// Tag a single line. `options` selects which option letters are recognized.
pub fn classify_line(line: &str, options: OptionCount) -> LineKind {
    let bare = strip_decoration(line).to_lowercase();
    if bare.starts_with(STATEMENT_MARKER) {
        return LineKind::StatementStart;
    }
    if bare.starts_with(ANSWER_MARKER) {
        return LineKind::AnswerKey;
    }
    let trimmed = line.trim().to_lowercase();
    let mut chars = trimmed.chars();
    if let (Some(letter), Some(')')) = (chars.next(), chars.next()) {
        if options.letters().contains(&letter) {
            return LineKind::Option(letter);
        }
    }
    LineKind::Other
}

fn strip_decoration(line: &str) -> &str {
    line.trim().trim_start_matches('*').trim_start()
}

/// A contiguous span of completion text believed to hold one question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub lines: Vec<String>,
}

impl Block {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    /// Before the first statement, or after a block's answer key.
    Outside,
    /// Inside a block that has not seen its answer key yet.
    InQuestion,
}

/// Split a raw completion into question blocks.
///
/// A statement line closes the current block and opens a new one; an
/// answer-key line closes the open block. Blank lines are skipped and lines
/// outside any block are ignored. A trailing block without answer key is kept.
pub fn segment(raw: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    let mut state = SegmentState::Outside;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Option letters don't matter for segmentation.
        match (classify_line(line, OptionCount::Five), state) {
            (LineKind::StatementStart, _) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some(Block {
                    lines: vec![line.to_string()],
                });
                state = SegmentState::InQuestion;
            }
            (kind, SegmentState::InQuestion) => {
                if let Some(block) = current.as_mut() {
                    block.lines.push(line.to_string());
                }
                if kind == LineKind::AnswerKey {
                    state = SegmentState::Outside;
                }
            }
            (_, SegmentState::Outside) => {}
        }
    }

    if let Some(block) = current {
        blocks.push(block);
    }

    blocks
}

/// Why a block did not become a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    /// Keyed formats need a recognizable answer key.
    MissingKey { statement: String },
    Empty,
}

/// Normalize one block into a question of the forced `format`.
pub fn normalize(
    block: &Block,
    format: QuestionKind,
    options: OptionCount,
    topic: &str,
) -> Result<Question, Discard> {
    let first = block.lines.first().ok_or(Discard::Empty)?;
    let statement = block
        .lines
        .iter()
        .find(|l| classify_line(l, options) == LineKind::StatementStart)
        .unwrap_or(first)
        .trim()
        .to_string();
    if statement.is_empty() {
        return Err(Discard::Empty);
    }

    let mut option_lines = Vec::new();
    let mut correct_key = AnswerKey::Indefinido;
    for line in &block.lines {
        match classify_line(line, options) {
            LineKind::Option(_) => option_lines.push(line.trim().to_string()),
            LineKind::AnswerKey => {
                if let Some(key) = parse_key(line, format) {
                    correct_key = key;
                }
            }
            _ => {}
        }
    }

    if format.is_keyed() && !correct_key.is_defined() {
        return Err(Discard::MissingKey { statement });
    }

    Ok(Question {
        statement,
        options: if format == QuestionKind::Multiple {
            option_lines
        } else {
            Vec::new()
        },
        correct_key,
        kind: format,
        topic: topic.to_string(),
        math: None,
    })
}

/// Read the key from an answer-key line: the last colon-delimited token,
/// lower-cased, with decoration and a trailing period removed.
fn parse_key(line: &str, format: QuestionKind) -> Option<AnswerKey> {
    let token = line
        .rsplit(':')
        .next()?
        .trim()
        .trim_matches('*')
        .trim()
        .to_lowercase();
    let token = token.trim_end_matches('.');
    match (format, token) {
        (QuestionKind::TrueFalse, "verdadero") => Some(AnswerKey::Verdadero),
        (QuestionKind::TrueFalse, "falso") => Some(AnswerKey::Falso),
        (QuestionKind::Multiple, "a") => Some(AnswerKey::A),
        (QuestionKind::Multiple, "b") => Some(AnswerKey::B),
        (QuestionKind::Multiple, "c") => Some(AnswerKey::C),
        (QuestionKind::Multiple, "d") => Some(AnswerKey::D),
        (QuestionKind::Multiple, "e") => Some(AnswerKey::E),
        _ => None,
    }
}

/// Outcome of parsing a whole completion.
#[derive(Debug, Clone, Default)]
pub struct ParsedExam {
    pub questions: Vec<Question>,
    pub blocks_found: usize,
    pub discarded: Vec<Discard>,
}

/// Segment and normalize a completion. Discards are logged, not surfaced.
pub fn parse_completion(
    raw: &str,
    format: QuestionKind,
    options: OptionCount,
    topic: &str,
) -> ParsedExam {
    let blocks = segment(raw);
    tracing::debug!("found {} question blocks", blocks.len());

    let mut parsed = ParsedExam {
        blocks_found: blocks.len(),
        ..Default::default()
    };
    for block in &blocks {
        match normalize(block, format, options, topic) {
            Ok(question) => parsed.questions.push(question),
            Err(discard) => {
                if let Discard::MissingKey { statement } = &discard {
                    tracing::warn!(
                        "discarding question without answer key: {}",
                        preview(statement)
                    );
                }
                parsed.discarded.push(discard);
            }
        }
    }
    parsed
}

/// Split a generated math exercise into its statement and the first
/// bracketed expression. LaTeX inline delimiters are removed from the
/// expression. The expression is empty when no brackets are present.
pub fn split_exercise(text: &str) -> (String, String) {
    let text = text.trim();
    let Some(open) = text.find('[') else {
        return (text.to_string(), String::new());
    };
    let Some(len) = text[open + 1..].find(']') else {
        return (text.to_string(), String::new());
    };
    let inner = &text[open + 1..open + 1 + len];
    let expression = inner.replace("\\(", "").replace("\\)", "").trim().to_string();
    let statement = format!("{}{}", &text[..open], &text[open + len + 2..])
        .trim()
        .to_string();
    (statement, expression)
}

fn preview(s: &str) -> String {
    s.chars().take(50).collect()
}
