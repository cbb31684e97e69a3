//! Stage 2 — single-model semantic judgment.
//!
//! One structured prompt, one completion, one parsed [`SemanticResult`].
//! Provider failures and unparsable responses propagate as errors; the
//! pipeline never substitutes a default verdict for this stage.

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};
use crate::extract::{self, ExtractError};
use crate::pipeline::EvaluationContext;
use crate::provider::{ChatMessage, CompletionConfig, SharedCompletionClient};

/// Stage 2 judgment. The four numeric fields are unit-interval scores,
/// validated on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticResult {
    pub score: f64,
    pub goal_alignment: f64,
    pub drift_score: f64,
    pub uncertainty: f64,
    pub ac_compliance: bool,
    pub reasoning: String,
}

impl SemanticResult {
    pub fn new(
        score: f64,
        goal_alignment: f64,
        drift_score: f64,
        uncertainty: f64,
        ac_compliance: bool,
        reasoning: impl Into<String>,
    ) -> EvalResult<Self> {
        for (name, value) in [
            ("score", score),
            ("goal_alignment", goal_alignment),
            ("drift_score", drift_score),
            ("uncertainty", uncertainty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EvalError::Validation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        Ok(Self {
            score,
            goal_alignment,
            drift_score,
            uncertainty,
            ac_compliance,
            reasoning: reasoning.into(),
        })
    }
}

/// Model parameters for the Stage 2 call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5.2".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

/// The Stage 2 evaluator.
pub struct SemanticEvaluator {
    client: SharedCompletionClient,
    config: SemanticConfig,
}

impl SemanticEvaluator {
    pub fn new(client: SharedCompletionClient, config: SemanticConfig) -> Self {
        Self { client, config }
    }

    /// Score the artifact against its acceptance criterion.
    pub async fn evaluate(&self, context: &EvaluationContext) -> EvalResult<SemanticResult> {
        let messages = build_messages(context);
        let completion = CompletionConfig {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self.client.complete(&messages, &completion).await?;
        let result = parse_semantic_response(&response.text)?;
        tracing::debug!(
            execution_id = %context.execution_id,
            score = result.score,
            ac_compliance = result.ac_compliance,
            uncertainty = result.uncertainty,
            "semantic judgment parsed"
        );
        Ok(result)
    }
}

fn build_messages(context: &EvaluationContext) -> Vec<ChatMessage> {
    let system = "You are a strict software artifact judge. Evaluate whether the \
                  artifact satisfies its acceptance criterion. Respond with a single \
                  JSON object and no other text.";

    let mut user = String::new();
    user.push_str(&format!(
        "## Acceptance criterion\n\n{}\n\n",
        context.current_ac
    ));
    if !context.goal.is_empty() {
        user.push_str(&format!("## Goal\n\n{}\n\n", context.goal));
    }
    if !context.constraints.is_empty() {
        user.push_str("## Constraints\n\n");
        for constraint in &context.constraints {
            user.push_str(&format!("- {constraint}\n"));
        }
        user.push('\n');
    }
    user.push_str(&format!(
        "## Artifact\n\n```{}\n{}\n```\n\n",
        context.artifact_type, context.artifact
    ));
    user.push_str(
        "Respond with JSON: {\"score\": <0..1>, \"goal_alignment\": <0..1>, \
         \"drift_score\": <0..1>, \"uncertainty\": <0..1>, \"ac_compliance\": \
         <true|false>, \"reasoning\": \"<short explanation>\"}",
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Parse a model response into a [`SemanticResult`].
///
/// Numeric fields outside [0, 1] are clamped; missing required fields are a
/// parse failure.
pub(crate) fn parse_semantic_response(text: &str) -> Result<SemanticResult, ExtractError> {
    let value = extract::extract_json(text)?;

    let mut missing = Vec::new();
    let mut required_f64 = |field: &str| match extract::optional_f64(&value, field) {
        Some(v) => extract::clamp_unit(v),
        None => {
            missing.push(field.to_string());
            0.0
        }
    };

    let score = required_f64("score");
    let goal_alignment = required_f64("goal_alignment");
    let drift_score = required_f64("drift_score");
    let uncertainty = required_f64("uncertainty");

    let ac_compliance = match extract::optional_bool(&value, "ac_compliance") {
        Some(v) => v,
        None => {
            missing.push("ac_compliance".to_string());
            false
        }
    };

    if !missing.is_empty() {
        return Err(ExtractError::MissingFields(missing));
    }

    let reasoning = extract::optional_str(&value, "reasoning")
        .unwrap_or_default()
        .to_string();

    Ok(SemanticResult {
        score,
        goal_alignment,
        drift_score,
        uncertainty,
        ac_compliance,
        reasoning,
    })
}
