//! OpenAI-compatible chat-completions adapter.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect
//! (hosted OpenAI, llama.cpp servers, proxies). Maps HTTP status codes to
//! typed [`ProviderError`]s and never retries — backoff is the caller's
//! decision.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{ChatMessage, CompletionClient, CompletionConfig, CompletionResponse, ProviderError, TokenUsage};

/// Default request timeout, matching typical frontier-model latency ceilings.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Map a non-success HTTP status to a typed provider error.
fn map_status(status: u16, message: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(message),
        429 => ProviderError::RateLimited(message),
        408 => ProviderError::Timeout,
        400 | 404 | 422 => ProviderError::BadRequest(message),
        code => ProviderError::Api { status: code, message },
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = json!({
            "model": config.model,
            "messages": messages,
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), message));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| ProviderError::Api {
            status: status.as_u16(),
            message: format!("invalid response body: {e}"),
        })?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let usage = TokenUsage {
            prompt_tokens: payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: payload["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(CompletionResponse { text, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(map_status(401, String::new()), ProviderError::Auth(_)));
        assert!(matches!(map_status(403, String::new()), ProviderError::Auth(_)));
        assert!(matches!(map_status(429, String::new()), ProviderError::RateLimited(_)));
        assert!(matches!(map_status(408, String::new()), ProviderError::Timeout));
        assert!(matches!(map_status(400, String::new()), ProviderError::BadRequest(_)));
        assert!(matches!(
            map_status(500, String::new()),
            ProviderError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn url_join_tolerates_trailing_slash() {
        let client = OpenAiClient::new("http://localhost:8080/v1/", "key").unwrap();
        assert_eq!(client.completions_url(), "http://localhost:8080/v1/chat/completions");
    }
}
