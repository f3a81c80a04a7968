//! AI chat and image generation upstream

use serde_json::{json, Value};
use url::Url;

use super::http_client::{ProviderError, ProxyClient, UpstreamReply};

#[derive(Clone)]
pub struct AiClient {
    client: ProxyClient,
    base_url: String,
    api_key: Option<String>,
}

impl AiClient {
    pub fn new(client: ProxyClient, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub async fn chat(&self, prompt: &str) -> UpstreamReply {
        self.call("chat", prompt, || {
            json!({
                "prompt": prompt,
                "reply": "The AI service is temporarily unavailable. Please try again later.",
            })
        })
        .await
    }

    pub async fn image(&self, prompt: &str) -> UpstreamReply {
        self.call("image", prompt, || {
            json!({
                "prompt": prompt,
                "image_url": null,
                "reply": "Image generation is temporarily unavailable. Please try again later.",
            })
        })
        .await
    }

    async fn call(&self, endpoint: &str, prompt: &str, fallback: impl FnOnce() -> Value) -> UpstreamReply {
        let url = match self.endpoint_url(endpoint, prompt) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Bad AI upstream URL, serving fallback");
                return UpstreamReply { body: fallback(), fallback: true };
            }
        };

        let auth = self.api_key.as_ref().map(|k| format!("Bearer {k}"));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("Authorization", value)])
            .unwrap_or_default();

        self.client.get_or_fallback(url.as_str(), &headers, fallback).await
    }

    fn endpoint_url(&self, endpoint: &str, prompt: &str) -> Result<Url, ProviderError> {
        Url::parse_with_params(&format!("{}/{}", self.base_url, endpoint), &[("prompt", prompt)])
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))
    }
}
