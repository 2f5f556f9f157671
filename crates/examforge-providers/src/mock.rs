//! Mock services for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use examforge_core::error::ProviderError;
use examforge_core::model::Pod;
use examforge_core::traits::{
    Completion, CompletionRequest, CompletionService, MathQuery, MathService, ModelInfo,
    TokenUsage,
};

/// A mock completion service for driving the engine without real API calls.
///
/// Replies are chosen by the first rule whose key occurs in the prompt.
pub struct MockCompletion {
    rules: Vec<(String, Result<String, ProviderError>)>,
    default_response: Result<String, ProviderError>,
    call_count: AtomicU32,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    /// Create a mock that always returns the same text.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            rules: Vec::new(),
            default_response: Ok(response.to_string()),
            call_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock whose every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            default_response: Err(error),
            ..Self::with_fixed_response("")
        }
    }

    /// Reply with `response` when the prompt contains `prompt_contains`.
    pub fn on(mut self, prompt_contains: &str, response: &str) -> Self {
        self.rules
            .push((prompt_contains.to_string(), Ok(response.to_string())));
        self
    }

    /// Fail with `error` when the prompt contains `prompt_contains`.
    pub fn fail_on(mut self, prompt_contains: &str, error: ProviderError) -> Self {
        self.rules.push((prompt_contains.to_string(), Err(error)));
        self
    }

    /// Get the number of calls made to this service.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let content = self
            .rules
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_response.clone())?;

        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32; // Rough estimate
        Ok(Completion {
            content,
            model: request.model.clone(),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}

/// A mock math service answering by input substring.
pub struct MockMath {
    rules: Vec<(String, Vec<Pod>)>,
    unmatched: Result<Vec<Pod>, ProviderError>,
    queries: Mutex<Vec<String>>,
}

impl MockMath {
    /// A service where every unmatched query fails as unreachable.
    pub fn unreachable() -> Self {
        Self {
            rules: Vec::new(),
            unmatched: Err(ProviderError::NetworkError("connection refused".into())),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A service where every unmatched query returns no pods.
    pub fn empty() -> Self {
        Self {
            unmatched: Ok(Vec::new()),
            ..Self::unreachable()
        }
    }

    /// Answer queries containing `input_contains` with `pods`.
    pub fn on(mut self, input_contains: &str, pods: Vec<Pod>) -> Self {
        self.rules.push((input_contains.to_string(), pods));
        self
    }

    /// Answer an equality check `is (answer) = (reference)` with a boolean result.
    pub fn on_equality(self, answer: &str, reference: &str, equal: bool) -> Self {
        let verdict = if equal { "True" } else { "False" };
        self.on(
            &format!("is ({answer}) = ({reference})"),
            vec![Pod {
                title: "Result".into(),
                plaintext: Some(verdict.into()),
                image_ref: None,
            }],
        )
    }

    /// Inputs received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MathService for MockMath {
    fn name(&self) -> &str {
        "mock"
    }

    async fn query(&self, request: &MathQuery) -> Result<Vec<Pod>, ProviderError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(request.input.clone());
        }
        match self
            .rules
            .iter()
            .find(|(key, _)| request.input.contains(key.as_str()))
        {
            Some((_, pods)) => Ok(pods.clone()),
            None => self.unmatched.clone(),
        }
    }
}
