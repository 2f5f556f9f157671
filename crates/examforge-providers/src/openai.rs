//! OpenAI chat completions adapter.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use examforge_core::error::ProviderError;
use examforge_core::traits::{
    Completion, CompletionRequest, CompletionService, ModelInfo, TokenUsage,
};

use crate::http::{check_status, send_error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI-compatible API provider.
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    org_id: Option<String>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, base_url: Option<String>, org_id: Option<String>) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            org_id,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_completion_tokens: u32,
    messages: Vec<OpenAiMessage>,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
    model: String,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl CompletionService for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %request.model, max_tokens = request.max_tokens))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let start = Instant::now();

        let body = OpenAiRequest {
            model: request.model.clone(),
            max_completion_tokens: request.max_tokens,
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: request.system_prompt.clone(),
                },
                OpenAiMessage {
                    role: "user",
                    content: request.prompt.clone(),
                },
            ],
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .timeout(request.timeout);

        if let Some(org) = &self.org_id {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, request.timeout))?;
        let response = check_status(response, &request.model).await?;

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        tracing::debug!(latency_ms, chars = content.len(), "completion received");

        Ok(Completion {
            content,
            model: api_response.model,
            usage: TokenUsage {
                prompt_tokens: api_response.usage.prompt_tokens,
                completion_tokens: api_response.usage.completion_tokens,
                total_tokens: api_response.usage.total_tokens,
            },
            latency_ms,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "gpt-4o".into(),
                name: "GPT-4o".into(),
                provider: "openai".into(),
                max_context: 128_000,
            },
            ModelInfo {
                id: "gpt-4o-mini".into(),
                name: "GPT-4o Mini".into(),
                provider: "openai".into(),
                max_context: 128_000,
            },
            ModelInfo {
                id: "gpt-4.1".into(),
                name: "GPT-4.1".into(),
                provider: "openai".into(),
                max_context: 1_000_000,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest {
            model: model.into(),
            system_prompt: "Sos un generador de exámenes".into(),
            prompt: "Generá 2 preguntas".into(),
            max_tokens: 3000,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn successful_completion() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "choices": [{"message": {"content": "Enunciado 1: ...", "role": "assistant"}, "index": 0}],
            "model": "gpt-4o",
            "usage": {"prompt_tokens": 40, "completion_tokens": 15, "total_tokens": 55}
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "max_completion_tokens": 3000,
                "messages": [
                    {"role": "system", "content": "Sos un generador de exámenes"},
                    {"role": "user", "content": "Generá 2 preguntas"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("test-key", Some(server.uri()), None);
        let completion = provider.complete(&request("gpt-4o")).await.unwrap();
        assert_eq!(completion.content, "Enunciado 1: ...");
        assert_eq!(completion.usage.total_tokens, 55);
    }

    #[tokio::test]
    async fn null_content_is_empty() {
        let server = MockServer::start().await;
        let response_body = serde_json::json!({
            "choices": [{"message": {"content": null, "role": "assistant"}, "index": 0}],
            "model": "gpt-4o"
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", Some(server.uri()), None);
        let completion = provider.complete(&request("gpt-4o")).await.unwrap();
        assert!(completion.content.is_empty());
    }

    #[tokio::test]
    async fn error_statuses_are_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", Some(server.uri()), None);
        let req = request("gpt-4o");
        assert_eq!(
            provider.complete(&req).await.unwrap_err(),
            ProviderError::RateLimited {
                retry_after_ms: 7000
            }
        );
        assert!(provider.complete(&req).await.unwrap_err().is_permanent());
        assert!(matches!(
            provider.complete(&req).await.unwrap_err(),
            ProviderError::ApiError { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn huge_retry_after_saturates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", u64::MAX.to_string()),
            )
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", Some(server.uri()), None);
        assert_eq!(
            provider.complete(&request("gpt-4o")).await.unwrap_err(),
            ProviderError::RateLimited {
                retry_after_ms: u64::MAX
            }
        );
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", Some(server.uri()), None);
        let mut req = request("gpt-4o");
        req.timeout = Duration::from_millis(200);
        assert!(provider.complete(&req).await.unwrap_err().is_timeout());
    }
}
