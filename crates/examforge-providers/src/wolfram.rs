//! Wolfram|Alpha full results API adapter.
//!
//! Queries `/v2/query` and turns the XML answer into [`Pod`]s, keeping the
//! plaintext and image of each pod's first subpod.

use std::time::Instant;

use async_trait::async_trait;
use tracing::instrument;

use examforge_core::error::ProviderError;
use examforge_core::model::Pod;
use examforge_core::traits::{MathQuery, MathService};

use crate::http::{check_status, send_error};

const DEFAULT_BASE_URL: &str = "https://api.wolframalpha.com";

/// Wolfram|Alpha query client.
pub struct WolframAlpha {
    app_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl WolframAlpha {
    pub fn new(app_id: &str, base_url: Option<String>) -> Self {
        Self {
            app_id: app_id.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }
}

/// Parse a `queryresult` document.
///
/// A result flagged `error="true"` becomes an error; an unsuccessful query
/// without pods is an empty list.
pub fn parse_pods(xml: &str) -> Result<Vec<Pod>, ProviderError> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| ProviderError::InvalidResponse(format!("invalid XML: {e}")))?;
    let root = doc.root_element();
    if !root.has_tag_name("queryresult") {
        return Err(ProviderError::InvalidResponse(format!(
            "unexpected root element <{}>",
            root.tag_name().name()
        )));
    }

    if root.attribute("error") == Some("true") {
        let message = root
            .descendants()
            .find(|n| n.has_tag_name("msg"))
            .and_then(|n| n.text())
            .unwrap_or("unknown error")
            .to_string();
        return Err(if message.to_lowercase().contains("appid") {
            ProviderError::AuthenticationFailed(message)
        } else {
            ProviderError::ApiError {
                status: 200,
                message,
            }
        });
    }

    let pods = root
        .descendants()
        .filter(|n| n.has_tag_name("pod"))
        .map(|pod| {
            let subpod = pod.children().find(|n| n.has_tag_name("subpod"));
            let plaintext = subpod
                .and_then(|s| s.children().find(|n| n.has_tag_name("plaintext")))
                .and_then(|n| n.text())
                .map(str::to_string);
            let image_ref = subpod
                .and_then(|s| s.children().find(|n| n.has_tag_name("img")))
                .and_then(|n| n.attribute("src"))
                .map(str::to_string);
            Pod {
                title: pod.attribute("title").unwrap_or_default().to_string(),
                plaintext,
                image_ref,
            }
        })
        .collect();
    Ok(pods)
}

#[async_trait]
impl MathService for WolframAlpha {
    fn name(&self) -> &str {
        "wolfram"
    }

    #[instrument(skip(self, request), fields(input = %request.input))]
    async fn query(&self, request: &MathQuery) -> Result<Vec<Pod>, ProviderError> {
        let start = Instant::now();
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v2/query", self.base_url),
            &[
                ("input", request.input.as_str()),
                ("appid", self.app_id.as_str()),
                ("format", request.format_param().as_str()),
            ],
        )
        .map_err(|e| ProviderError::NetworkError(format!("invalid service URL: {e}")))?;

        let response = self
            .client
            .get(url)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| send_error(e, request.timeout))?;
        let response = check_status(response, "").await?;
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let pods = parse_pods(&body)?;
        tracing::debug!(
            pods = pods.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "math query answered"
        );
        Ok(pods)
    }
}
