//! Persistence of graded attempts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::model::{ExamResult, QuestionKind};
use crate::session::Attempt;

/// Receives every finished result together with its attempt.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn store(&self, result: &ExamResult, attempt: &Attempt) -> Result<()>;
}

/// One persisted exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredExam {
    pub stored_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    pub level: String,
    pub topic: String,
    pub kind: QuestionKind,
    pub result: ExamResult,
    pub attempt: Attempt,
}

impl StoredExam {
    pub fn new(result: &ExamResult, attempt: &Attempt) -> Self {
        Self {
            stored_at: Utc::now(),
            title: attempt.title.clone(),
            level: attempt.level.clone(),
            topic: attempt.topic().to_string(),
            kind: attempt.kind(),
            result: result.clone(),
            attempt: attempt.clone(),
        }
    }
}

/// Append-only store writing one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored exam, oldest first. A missing file is an empty store.
    pub fn load_all(&self) -> Result<Vec<StoredExam>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read results from {}", self.path.display()))?;
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("invalid result on line {} of {}", n + 1, self.path.display())
                })
            })
            .collect()
    }
}

#[async_trait]
impl ResultStore for JsonLinesStore {
    async fn store(&self, result: &ExamResult, attempt: &Attempt) -> Result<()> {
        let mut line = serde_json::to_string(&StoredExam::new(result, attempt))
            .context("failed to serialize result")?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to write result to {}", self.path.display()))?;
        file.flush().await?;
        tracing::info!(attempt = %attempt.id, path = %self.path.display(), "result stored");
        Ok(())
    }
}
