//! The `examforge take` command.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use examforge_core::engine::ExamEngine;
use examforge_core::error::{ExtractionError, GenerationError};
use examforge_core::model::{
    Category, ExamParams, ExamResult, OptionCount, QuestionKind, SourceMaterial,
};
use examforge_core::report::{JsonLinesStore, ResultStore};
use examforge_core::session::{Attempt, ExamSession, QuestionView};
use examforge_providers::load_config_from;

use super::{completion_service, math_service};

/// Typed on its own line, clears every answer and starts over.
pub const RESTART_COMMAND: &str = ":restart";

#[derive(Args, Debug)]
pub struct TakeArgs {
    /// Topic to build the exam from
    #[arg(long, conflicts_with = "document")]
    pub topic: Option<String>,

    /// Plain UTF-8 text file to build the exam from
    #[arg(long)]
    pub document: Option<PathBuf>,

    /// Exam format: multiple, true_false, open, math
    #[arg(long, default_value = "multiple")]
    pub format: QuestionKind,

    /// Number of questions
    #[arg(long, default_value = "5")]
    pub count: u32,

    /// Difficulty level
    #[arg(long, default_value = "secundario")]
    pub level: String,

    /// Options per multiple-choice question (3, 4 or 5)
    #[arg(long, default_value = "4")]
    pub options: OptionCount,

    /// Extra instructions for true/false and open exams
    #[arg(long)]
    pub instructions: Option<String>,

    /// Math topic (repeatable)
    #[arg(long = "math-topic")]
    pub math_topics: Vec<String>,

    /// Additional free-text math topic
    #[arg(long)]
    pub custom_math_topic: Option<String>,

    /// Exam title
    #[arg(long)]
    pub title: Option<String>,

    /// Read answers from a file, one per line, instead of the terminal
    #[arg(long)]
    pub answers: Option<PathBuf>,

    /// Completion provider (defaults to the configured one)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model (defaults to the configured one)
    #[arg(long)]
    pub model: Option<String>,

    /// Results file (defaults to the configured results path)
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Do not store the graded result
    #[arg(long)]
    pub no_store: bool,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl TakeArgs {
    /// Exam parameters for these arguments, reading the document if one
    /// was given.
    pub fn exam_params(&self) -> Result<ExamParams, GenerationError> {
        let source = match (&self.document, &self.topic) {
            (Some(path), _) => Some(read_document(path)?),
            (None, Some(topic)) => Some(SourceMaterial::Topic {
                topic: topic.clone(),
            }),
            (None, None) => None,
        };
        Ok(ExamParams {
            format: self.format,
            count: self.count,
            level: self.level.clone(),
            source,
            option_count: self.options,
            instructions: self.instructions.clone(),
            math_topics: self.math_topics.clone(),
            custom_math_topic: self.custom_math_topic.clone(),
            title: self.title.clone(),
        })
    }
}

/// Read a plain text document as exam source material.
pub fn read_document(path: &Path) -> Result<SourceMaterial, ExtractionError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let text = std::fs::read_to_string(path).map_err(|e| ExtractionError::Unreadable {
        name: name.clone(),
        reason: e.to_string(),
    })?;
    if text.trim().is_empty() {
        return Err(ExtractionError::Empty { name });
    }
    Ok(SourceMaterial::Document { name, text })
}

pub async fn execute(args: TakeArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    let params = args.exam_params()?;

    let completion = completion_service(&config, args.provider.as_deref(), true)?;
    let math = math_service(&config, params.format == QuestionKind::Math)?;
    let engine = ExamEngine::new(
        completion,
        math,
        config.engine_config(args.model.as_deref()),
    );

    eprintln!(
        "examforge v{} - Generating {} {} questions with {}",
        env!("CARGO_PKG_VERSION"),
        params.count,
        params.format,
        engine.config().model
    );
    let mut session = ExamSession::new();
    session.replace(engine.generate(&params).await?);

    let attempt = session.attempt_mut()?;
    if attempt.len() < params.count as usize {
        eprintln!(
            "Only {} of {} questions could be generated.",
            attempt.len(),
            params.count
        );
    }
    if let Some(title) = &attempt.title {
        println!("\n{title}");
    }
    println!(
        "\n{} questions. Type {RESTART_COMMAND} to start over.\n",
        attempt.len()
    );

    match &args.answers {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open answers file: {}", path.display()))?;
            answer_all(&engine, attempt, io::BufReader::new(file).lines())?;
        }
        None => answer_all(&engine, attempt, io::stdin().lock().lines())?,
    }

    let attempt = session.attempt()?;
    eprintln!("\nGrading...");
    let result = engine.grade(attempt).await?;
    print_result(attempt, &result);

    if !args.no_store {
        let path = args.results.unwrap_or(config.results_path);
        let store = JsonLinesStore::new(path);
        store.store(&result, attempt).await?;
        eprintln!("Result saved to: {}", store.path().display());
    }

    Ok(())
}

/// Answer questions in order from `input` until the attempt is complete.
pub fn answer_all(
    engine: &ExamEngine,
    attempt: &mut Attempt,
    mut input: impl Iterator<Item = io::Result<String>>,
) -> Result<()> {
    while !attempt.is_complete() {
        let index = attempt.answered();
        print_question(&attempt.view(index)?)?;

        let Some(line) = input.next().transpose()? else {
            anyhow::bail!(
                "input ended after {} of {} questions",
                attempt.answered(),
                attempt.len()
            );
        };
        if line.trim() == RESTART_COMMAND {
            engine.reset(attempt);
            println!("\nExam restarted.\n");
            continue;
        }
        engine.submit_answer(attempt, index, &line)?;
        println!();
    }
    Ok(())
}

fn print_question(view: &QuestionView<'_>) -> io::Result<()> {
    let question = view.question;
    let mut out = io::stdout().lock();
    writeln!(out, "Pregunta {} de {}", view.number, view.total)?;
    writeln!(out, "{}", question.statement)?;
    match question.kind {
        QuestionKind::Multiple => {
            for option in &question.options {
                writeln!(out, "  {option}")?;
            }
        }
        QuestionKind::TrueFalse => writeln!(out, "  (verdadero / falso)")?,
        QuestionKind::Open => {}
        QuestionKind::Math => {
            if let Some(math) = &question.math {
                writeln!(out, "  [{}]", math.expression)?;
                if let Some(image) = &math.image_ref {
                    writeln!(out, "  {image}")?;
                }
            }
        }
    }
    write!(out, "> ")?;
    out.flush()
}

fn print_result(attempt: &Attempt, result: &ExamResult) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["#", "Topic", "Result", "Time"]);
    for (outcome, seconds) in result.outcomes.iter().zip(&result.per_question_seconds) {
        let i = outcome.question_index;
        let label = match outcome.category {
            Category::Correct => "correct",
            Category::Partial => "partial",
            Category::Incorrect => "incorrect",
            Category::Unclassified => "unclassified",
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&attempt.questions()[i].topic),
            Cell::new(label),
            Cell::new(format!("{seconds:.2}s")),
        ]);
    }
    println!("\n{table}");

    println!(
        "\nGrade: {:.2} / 10  ({} correct, {} partial, {} incorrect of {}; {:.2}s)",
        result.grade,
        result.correct_count,
        result.partial_count,
        result.incorrect_count,
        result.total,
        result.total_elapsed_seconds
    );
    if result.unclassified_count > 0 {
        println!(
            "{} answers could not be classified and were scored as incorrect.",
            result.unclassified_count
        );
    }

    println!();
    for (i, feedback) in result.per_question_feedback.iter().enumerate() {
        println!("{}. {}\n", i + 1, feedback);
    }

    if !result.failed_topics.is_empty() {
        let topics: Vec<String> = result
            .failed_topics
            .iter()
            .map(|(topic, n)| format!("{topic} ({n})"))
            .collect();
        println!("Topics to review: {}", topics.join(", "));
    }
    println!("{}", result.holistic_feedback);
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn args() -> TakeArgs {
        TakeArgs {
            topic: Some("Fotosíntesis".into()),
            document: None,
            format: QuestionKind::TrueFalse,
            count: 3,
            level: "universitario".into(),
            options: OptionCount::Four,
            instructions: None,
            math_topics: Vec::new(),
            custom_math_topic: None,
            title: Some("Parcial".into()),
            answers: None,
            provider: None,
            model: None,
            results: None,
            no_store: false,
            config: None,
        }
    }

    #[test]
    fn params_from_topic() {
        let params = args().exam_params().unwrap();
        assert_eq!(params.format, QuestionKind::TrueFalse);
        assert_eq!(params.count, 3);
        assert_eq!(
            params.source,
            Some(SourceMaterial::Topic {
                topic: "Fotosíntesis".into()
            })
        );
        assert_eq!(params.title.as_deref(), Some("Parcial"));
    }

    #[test]
    fn params_from_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "La célula es la unidad básica de la vida.").unwrap();

        let mut args = args();
        args.topic = None;
        args.document = Some(file.path().to_path_buf());
        match args.exam_params().unwrap().source {
            Some(SourceMaterial::Document { text, .. }) => assert!(text.contains("célula")),
            other => panic!("expected a document, got {other:?}"),
        }
    }

    #[test]
    fn blank_document_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            read_document(file.path()),
            Err(ExtractionError::Empty { .. })
        ));
    }

    #[test]
    fn missing_document_is_unreadable() {
        assert!(matches!(
            read_document(Path::new("/nonexistent/apuntes.txt")),
            Err(ExtractionError::Unreadable { name, .. }) if name == "apuntes.txt"
        ));
    }
}
