//! The `examforge history` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use examforge_core::report::JsonLinesStore;
use examforge_providers::load_config_from;

pub fn execute(results: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let path = match results {
        Some(path) => path,
        None => load_config_from(config.as_deref())?.results_path,
    };
    let store = JsonLinesStore::new(path);
    let exams = store.load_all()?;

    if exams.is_empty() {
        println!("No stored results in {}", store.path().display());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Date", "Title", "Topic", "Format", "Level", "Grade", "Correct"]);
    for exam in &exams {
        table.add_row(vec![
            Cell::new(exam.stored_at.format("%Y-%m-%d %H:%M")),
            Cell::new(exam.title.as_deref().unwrap_or("-")),
            Cell::new(&exam.topic),
            Cell::new(exam.kind),
            Cell::new(&exam.level),
            Cell::new(format!("{:.2}", exam.result.grade)),
            Cell::new(format!("{}/{}", exam.result.correct_count, exam.result.total)),
        ]);
    }
    println!("{table}");
    println!("{} exams", exams.len());
    Ok(())
}
