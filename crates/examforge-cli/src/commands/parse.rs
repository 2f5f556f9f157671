//! The `examforge parse` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use examforge_core::model::{OptionCount, QuestionKind};
use examforge_core::parser::{parse_completion, Discard};

use super::preview;

pub fn execute(
    file: PathBuf,
    format: QuestionKind,
    options: OptionCount,
    topic: String,
    json: bool,
) -> Result<()> {
    anyhow::ensure!(
        format != QuestionKind::Math,
        "math exercises are generated one by one and have no exam text to parse"
    );
    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read completion: {}", file.display()))?;
    let parsed = parse_completion(&raw, format, options, &topic);

    if json {
        println!("{}", serde_json::to_string_pretty(&parsed.questions)?);
        return Ok(());
    }

    println!(
        "{}: {} blocks, {} questions, {} discarded",
        file.display(),
        parsed.blocks_found,
        parsed.questions.len(),
        parsed.discarded.len()
    );

    if !parsed.questions.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["#", "Statement", "Options", "Key"]);
        for (i, question) in parsed.questions.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(preview(&question.statement, 60)),
                Cell::new(question.options.len()),
                Cell::new(question.correct_key),
            ]);
        }
        println!("{table}");
    }

    for discard in &parsed.discarded {
        match discard {
            Discard::MissingKey { statement } => {
                println!("  - no answer key: {}", preview(statement, 60));
            }
            Discard::Empty => println!("  - empty block"),
        }
    }

    Ok(())
}
