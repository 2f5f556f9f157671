//! Service trait definitions for the completion and math backends.
//!
//! These async traits are implemented by the `examforge-providers` crate.
//! Every call carries its own timeout and returns a typed `ProviderError`, so
//! the engine can decide per call site whether to fall back or give up.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::model::Pod;

// ---------------------------------------------------------------------------
// Completion service
// ---------------------------------------------------------------------------

/// Trait for generative text backends.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Human-readable provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Produce a free-text completion for a prompt.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;

    /// List known models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request for a text completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (e.g. "gpt-4o").
    pub model: String,
    /// System prompt describing the assistant's role.
    pub system_prompt: String,
    /// The user prompt.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Upper bound on the whole call.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

/// A finished completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    /// The raw response text. May be empty.
    pub content: String,
    /// Model that actually produced the response.
    pub model: String,
    pub usage: TokenUsage,
    pub latency_ms: u64,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub max_context: u32,
}

// ---------------------------------------------------------------------------
// Math service
// ---------------------------------------------------------------------------

/// Trait for symbolic math query backends.
#[async_trait]
pub trait MathService: Send + Sync {
    /// Human-readable service name (e.g. "wolfram").
    fn name(&self) -> &str;

    /// Run a query and return the result sections it produced.
    async fn query(&self, request: &MathQuery) -> Result<Vec<Pod>, ProviderError>;
}

/// Output formats the math service may render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodFormat {
    Plaintext,
    Image,
}

impl PodFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PodFormat::Plaintext => "plaintext",
            PodFormat::Image => "image",
        }
    }
}

/// A query for the math service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathQuery {
    /// Expression or natural-language query.
    pub input: String,
    pub formats: Vec<PodFormat>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl MathQuery {
    pub fn plaintext(input: impl Into<String>, timeout: Duration) -> Self {
        Self {
            input: input.into(),
            formats: vec![PodFormat::Plaintext],
            timeout,
        }
    }

    pub fn with_images(input: impl Into<String>, timeout: Duration) -> Self {
        Self {
            input: input.into(),
            formats: vec![PodFormat::Image, PodFormat::Plaintext],
            timeout,
        }
    }

    /// Comma-separated format list, as the query API expects it.
    pub fn format_param(&self) -> String {
        self.formats
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ---------------------------------------------------------------------------
// Bounded calls
// ---------------------------------------------------------------------------

/// Run a completion, giving up once `request.timeout` has elapsed even if the
/// implementation does not enforce it.
pub async fn complete_bounded(
    service: &dyn CompletionService,
    request: &CompletionRequest,
) -> Result<Completion, ProviderError> {
    match tokio::time::timeout(request.timeout, service.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(request.timeout.as_secs())),
    }
}

/// Run a math query bounded by `request.timeout`.
pub async fn query_bounded(
    service: &dyn MathService,
    request: &MathQuery,
) -> Result<Vec<Pod>, ProviderError> {
    match tokio::time::timeout(request.timeout, service.query(request)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(request.timeout.as_secs())),
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_param_joins_in_order() {
        let q = MathQuery::with_images("x^2", Duration::from_secs(30));
        assert_eq!(q.format_param(), "image,plaintext");
        let q = MathQuery::plaintext("x^2", Duration::from_secs(30));
        assert_eq!(q.format_param(), "plaintext");
    }

    #[test]
    fn completion_request_serializes_timeout_as_seconds() {
        let req = CompletionRequest {
            model: "gpt-4o".into(),
            system_prompt: "Sos un generador de exámenes".into(),
            prompt: "Generá 3 preguntas".into(),
            max_tokens: 3000,
            timeout: Duration::from_secs(60),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["timeout"], 60);
        let back: CompletionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.timeout, Duration::from_secs(60));
    }

    struct Stalled;

    #[async_trait]
    impl MathService for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn query(&self, _: &MathQuery) -> Result<Vec<Pod>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_query_times_out() {
        let request = MathQuery::plaintext("x", Duration::from_secs(30));
        let err = query_bounded(&Stalled, &request).await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout(30));
    }
}
