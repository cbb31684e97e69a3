//! Shared test helpers: a scripted completion client with per-model
//! canned responses, so no test touches the network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use adjudication::{
    ChatMessage, CompletionClient, CompletionConfig, CompletionResponse, ProviderError,
    SharedCompletionClient, TokenUsage,
};
use async_trait::async_trait;

pub struct ScriptedClient {
    responses: HashMap<String, Result<String, ProviderError>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
        }
    }

    /// Script a successful response for a model.
    pub fn respond(mut self, model: &str, text: &str) -> Self {
        self.responses.insert(model.to_string(), Ok(text.to_string()));
        self
    }

    /// Script a provider failure for a model.
    pub fn fail(mut self, model: &str, error: ProviderError) -> Self {
        self.responses.insert(model.to_string(), Err(error));
        self
    }

    pub fn shared(self) -> SharedCompletionClient {
        Arc::new(self)
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        match self.responses.get(&config.model) {
            Some(Ok(text)) => Ok(CompletionResponse {
                text: text.clone(),
                usage: TokenUsage::default(),
            }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ProviderError::BadRequest(format!(
                "no scripted response for model {}",
                config.model
            ))),
        }
    }
}

/// A Stage 2 judgment response with the given score/compliance/drift/uncertainty.
pub fn semantic_json(score: f64, ac_compliance: bool, drift: f64, uncertainty: f64) -> String {
    format!(
        r#"{{"score": {score}, "goal_alignment": 0.9, "drift_score": {drift},
            "uncertainty": {uncertainty}, "ac_compliance": {ac_compliance},
            "reasoning": "scripted judgment"}}"#
    )
}

/// A Stage 3 ballot response.
pub fn vote_json(approved: bool, reasoning: &str) -> String {
    format!(r#"{{"approved": {approved}, "confidence": 0.8, "reasoning": "{reasoning}"}}"#)
}
