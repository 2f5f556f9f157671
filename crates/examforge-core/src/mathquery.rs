//! Free-form lookups against the math service.
//!
//! A lookup is either an expression with an explicit operation, which is
//! turned into a query by prefixing it, or a plain input. Long natural-language
//! phrases without an operation are first translated to a query by the
//! completion service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineConfig;
use crate::error::ProviderError;
use crate::model::Pod;
use crate::prompt;
use crate::traits::{
    complete_bounded, query_bounded, CompletionRequest, CompletionService, MathQuery, MathService,
};

/// Phrases with more words than this are translated before querying.
pub const TRANSLATION_WORD_THRESHOLD: usize = 4;

/// Operation applied to a lookup expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathOperation {
    Derivative,
    Integral,
    Solve,
    Limit,
    Simplify,
    Expand,
    Factor,
    Plot,
}

impl MathOperation {
    pub const ALL: [MathOperation; 8] = [
        MathOperation::Derivative,
        MathOperation::Integral,
        MathOperation::Solve,
        MathOperation::Limit,
        MathOperation::Simplify,
        MathOperation::Expand,
        MathOperation::Factor,
        MathOperation::Plot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MathOperation::Derivative => "derivative",
            MathOperation::Integral => "integral",
            MathOperation::Solve => "solve",
            MathOperation::Limit => "limit",
            MathOperation::Simplify => "simplify",
            MathOperation::Expand => "expand",
            MathOperation::Factor => "factor",
            MathOperation::Plot => "plot",
        }
    }

    /// Query prefix understood by the math service.
    pub fn prefix(self) -> &'static str {
        match self {
            MathOperation::Derivative => "derivative of",
            MathOperation::Integral => "integrate",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for MathOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MathOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == wanted)
            .ok_or_else(|| format!("unknown math operation: {s}"))
    }
}

/// Build the query for an expression and optional operation.
pub fn build_query(expression: &str, operation: Option<MathOperation>) -> String {
    let expression = expression.trim();
    match operation {
        Some(op) => format!("{} {expression}", op.prefix()),
        None => expression.to_string(),
    }
}

/// Whether a plain input reads like a phrase rather than an expression.
pub fn needs_translation(input: &str) -> bool {
    input.split_whitespace().count() > TRANSLATION_WORD_THRESHOLD
}

/// The first result-titled pod, else the first pod.
pub fn primary_pod(pods: &[Pod]) -> Option<&Pod> {
    pods.iter().find(|p| p.is_result()).or_else(|| pods.first())
}

/// Answer to a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathLookup {
    /// The query actually sent to the math service.
    pub query: String,
    pub primary: Pod,
    pub pods: Vec<Pod>,
}

/// Why a lookup produced no answer.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("an expression is required")]
    EmptyInput,

    #[error("no clear answer was found for '{0}'")]
    NoClearAnswer(String),

    #[error("math service failed: {0}")]
    Service(#[from] ProviderError),
}

/// Run a lookup. A failed translation falls back to the raw phrase.
pub async fn lookup(
    completion: &dyn CompletionService,
    math: &dyn MathService,
    config: &EngineConfig,
    expression: &str,
    operation: Option<MathOperation>,
) -> Result<MathLookup, LookupError> {
    if expression.trim().is_empty() {
        return Err(LookupError::EmptyInput);
    }

    let mut query = build_query(expression, operation);
    if operation.is_none() && needs_translation(expression) {
        if let Some(translated) = translate(completion, config, expression).await {
            query = translated;
        }
    }
    tracing::info!("math lookup: {query}");

    let request = MathQuery::with_images(query.clone(), config.question_timeout);
    let pods: Vec<Pod> = query_bounded(math, &request)
        .await?
        .into_iter()
        .filter(|p| p.text().is_some() || p.image_ref.is_some())
        .collect();
    let primary = primary_pod(&pods)
        .cloned()
        .ok_or_else(|| LookupError::NoClearAnswer(query.clone()))?;

    Ok(MathLookup {
        query,
        primary,
        pods,
    })
}

async fn translate(
    completion: &dyn CompletionService,
    config: &EngineConfig,
    phrase: &str,
) -> Option<String> {
    let request = CompletionRequest {
        model: config.model.clone(),
        system_prompt: prompt::TRANSLATOR_SYSTEM.to_string(),
        prompt: prompt::translation_prompt(phrase),
        max_tokens: config.translation_max_tokens,
        timeout: config.question_timeout,
    };
    match complete_bounded(completion, &request).await {
        Ok(c) if !c.content.trim().is_empty() => Some(c.content.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("could not translate phrase to a math query: {e}");
            None
        }
    }
}
