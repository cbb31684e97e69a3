//! LLM completion boundary.
//!
//! The core depends only on [`CompletionClient`]; concrete transports live
//! behind it. Provider failures are typed so callers can distinguish
//! retriable conditions (rate limit, timeout, connection) from terminal
//! ones (auth, bad request) — the retry policy itself belongs to the
//! adapter's caller, not to this crate.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors from a completion provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("provider error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl ProviderError {
    /// Whether a caller-side retry could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimited(_) | Self::Connection(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Auth(_) | Self::BadRequest(_) => false,
        }
    }
}

/// Message role in a chat completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-request completion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A successful completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// Black-box async completion function. Implementations must tolerate
/// concurrent invocation — Stage 3 fans out one call per configured model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;
}

/// Shared handle to a completion client.
pub type SharedCompletionClient = Arc<dyn CompletionClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_timeout_are_retriable() {
        assert!(ProviderError::RateLimited("429".into()).is_retriable());
        assert!(ProviderError::Timeout.is_retriable());
        assert!(ProviderError::Connection("reset".into()).is_retriable());
    }

    #[test]
    fn auth_and_bad_request_are_terminal() {
        assert!(!ProviderError::Auth("bad key".into()).is_retriable());
        assert!(!ProviderError::BadRequest("unknown model".into()).is_retriable());
    }

    #[test]
    fn server_errors_are_retriable_client_errors_are_not() {
        let server = ProviderError::Api {
            status: 503,
            message: "overloaded".into(),
        };
        let client = ProviderError::Api {
            status: 418,
            message: "teapot".into(),
        };
        assert!(server.is_retriable());
        assert!(!client.is_retriable());
    }
}
