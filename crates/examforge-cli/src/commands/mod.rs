pub mod history;
pub mod init;
pub mod list_models;
pub mod math;
pub mod parse;
pub mod take;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use examforge_core::error::ProviderError;
use examforge_core::model::Pod;
use examforge_core::traits::{
    Completion, CompletionRequest, CompletionService, MathQuery, MathService, ModelInfo,
};
use examforge_providers::{create_completion_service, create_math_service, ExamforgeConfig};

/// A service left out of the configuration. Every call fails as an
/// authentication error, which the engine recovers from per call.
struct Unconfigured(&'static str);

#[async_trait]
impl CompletionService for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
        Err(ProviderError::AuthenticationFailed(self.0.to_string()))
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}

#[async_trait]
impl MathService for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn query(&self, _request: &MathQuery) -> Result<Vec<Pod>, ProviderError> {
        Err(ProviderError::AuthenticationFailed(self.0.to_string()))
    }
}

/// Resolve the completion provider by name, or the configured default.
///
/// When `required` is false a missing provider is replaced by a stand-in
/// that fails every call.
pub(crate) fn completion_service(
    config: &ExamforgeConfig,
    provider: Option<&str>,
    required: bool,
) -> Result<Arc<dyn CompletionService>> {
    let name = provider.unwrap_or(&config.default_provider);
    match config.providers.get(name) {
        Some(pconfig) => create_completion_service(pconfig)
            .with_context(|| format!("failed to create provider '{name}'")),
        None if !required => {
            tracing::debug!("provider '{name}' not configured; translations are skipped");
            Ok(Arc::new(Unconfigured("no completion provider configured")))
        }
        None => anyhow::bail!(
            "provider '{name}' not found in config. Available: {:?}",
            config.providers.keys().collect::<Vec<_>>()
        ),
    }
}

/// Build the math service. Without an app id and when not `required`, math
/// answers are checked by text comparison only.
pub(crate) fn math_service(config: &ExamforgeConfig, required: bool) -> Result<Arc<dyn MathService>> {
    if !required && config.math.app_id.is_empty() {
        tracing::debug!("no math app id configured; equivalence checks use text comparison");
        return Ok(Arc::new(Unconfigured("no Wolfram|Alpha app id configured")));
    }
    create_math_service(&config.math)
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use examforge_providers::ProviderConfig;

    #[test]
    fn preview_cuts_on_characters() {
        assert_eq!(preview("¿Qué es?", 20), "¿Qué es?");
        assert_eq!(preview("ñandú veloz", 5), "ñandú…");
    }

    #[test]
    fn missing_provider_is_an_error_when_required() {
        let config = ExamforgeConfig::default();
        let err = completion_service(&config, Some("nope"), true)
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("provider 'nope' not found"));
    }

    #[tokio::test]
    async fn optional_services_fall_back_to_stand_ins() {
        let config = ExamforgeConfig::default();
        let completion = completion_service(&config, None, false).unwrap();
        let request = CompletionRequest {
            model: "gpt-4o".into(),
            system_prompt: String::new(),
            prompt: "hola".into(),
            max_tokens: 10,
            timeout: Duration::from_secs(1),
        };
        assert!(completion.complete(&request).await.unwrap_err().is_permanent());

        let math = math_service(&config, false).unwrap();
        let query = MathQuery::plaintext("1+1", Duration::from_secs(1));
        assert!(math.query(&query).await.is_err());
        assert!(math_service(&config, true).is_err());
    }

    #[test]
    fn configured_provider_is_built() {
        let mut config = ExamforgeConfig::default();
        config.providers.insert(
            "openai".into(),
            ProviderConfig::OpenAI {
                api_key: "sk-test".into(),
                base_url: None,
                org_id: None,
            },
        );
        let service = completion_service(&config, None, true).unwrap();
        assert_eq!(service.name(), "openai");
    }
}
