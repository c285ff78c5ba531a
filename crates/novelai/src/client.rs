//! HTTP client for the NovelAI image-generation endpoint.
//!
//! One [`NovelAiClient`] is shared for the whole process; the queue's serial
//! dispatch guarantees it never has more than one request in flight.

use std::time::Duration;

use async_trait::async_trait;
use atelier_core::Request;

use crate::payload::build_payload;
use crate::{BackendError, GeneratedImage, GenerationBackend};

/// Production generation endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://image.novelai.net/ai/generate-image";

/// Generation calls can legitimately take minutes under load; the upstream
/// returns 429 far earlier than this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Reqwest-backed [`GenerationBackend`] implementation.
#[derive(Debug)]
pub struct NovelAiClient {
    http: reqwest::Client,
    token: String,
    endpoint: String,
}

impl NovelAiClient {
    /// Build a client with the given bearer token and optional HTTP proxy.
    pub fn new(token: impl Into<String>, proxy: Option<&str>) -> Result<Self, BackendError> {
        let token = token.into();
        if token.is_empty() {
            return Err(BackendError::Config(
                "NovelAI token must not be empty".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| BackendError::Config(format!("Invalid proxy '{proxy_url}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self {
            http,
            token,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Point the client at a different endpoint (tests, self-hosted mirrors).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl GenerationBackend for NovelAiClient {
    async fn generate(&self, request: &Request) -> Result<GeneratedImage, BackendError> {
        let payload = build_payload(request);

        tracing::debug!(
            model = %request.model,
            seed = request.seed,
            sampler = request.sampler.wire_name(),
            "Submitting generation request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header("Referer", "https://novelai.net/")
            .header("Origin", "https://novelai.net")
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        tracing::info!(
            model = %request.model,
            seed = request.seed,
            size = bytes.len(),
            "Generation completed"
        );

        Ok(GeneratedImage {
            bytes: bytes.to_vec(),
            seed: request.seed,
            model: request.model.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_a_config_error() {
        let err = NovelAiClient::new("", None).unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
    }

    #[test]
    fn invalid_proxy_is_a_config_error() {
        let err = NovelAiClient::new("token", Some("::not a url::")).unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
    }

    #[test]
    fn endpoint_override() {
        let client = NovelAiClient::new("token", None)
            .unwrap()
            .with_endpoint("http://localhost:9999/generate");
        assert_eq!(client.endpoint, "http://localhost:9999/generate");
    }
}
