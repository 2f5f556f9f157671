//! Scripted service doubles for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::Pod;
use crate::traits::{
    Completion, CompletionRequest, CompletionService, MathQuery, MathService, ModelInfo,
};

/// Answers completions by the first rule whose key occurs in the prompt.
pub struct ScriptedCompletion {
    rules: Vec<(String, Result<String, ProviderError>)>,
    fallback: Result<String, ProviderError>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(fallback: Result<&str, ProviderError>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.map(str::to_string),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, prompt_contains: &str, reply: Result<&str, ProviderError>) -> Self {
        self.rules
            .push((prompt_contains.to_string(), reply.map(str::to_string)));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .rules
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone())?;
        Ok(Completion {
            content: reply,
            model: request.model.clone(),
            ..Default::default()
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![]
    }
}

/// Answers math queries by the first rule whose key occurs in the input.
pub struct ScriptedMath {
    rules: Vec<(String, Result<Vec<Pod>, ProviderError>)>,
    fallback: Result<Vec<Pod>, ProviderError>,
    pub queries: Mutex<Vec<String>>,
}

impl ScriptedMath {
    pub fn unreachable() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Err(ProviderError::NetworkError("connection refused".into())),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, input_contains: &str, reply: Result<Vec<Pod>, ProviderError>) -> Self {
        self.rules.push((input_contains.to_string(), reply));
        self
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl MathService for ScriptedMath {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn query(&self, request: &MathQuery) -> Result<Vec<Pod>, ProviderError> {
        self.queries.lock().unwrap().push(request.input.clone());
        self.rules
            .iter()
            .find(|(key, _)| request.input.contains(key.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn pod(title: &str, plaintext: &str) -> Pod {
    Pod {
        title: title.to_string(),
        plaintext: Some(plaintext.to_string()),
        image_ref: None,
    }
}
