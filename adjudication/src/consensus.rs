//! Stage 3 — quorum-based multi-model consensus.
//!
//! One ballot per configured model, issued concurrently. A failed or
//! unparsable ballot is dropped from the tally; the evaluation only fails
//! when fewer ballots arrive than the quorum (a strict majority of the
//! configured panel). Partial provider outages therefore degrade to a
//! smaller tally running the same algorithm.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};
use crate::extract::{self, ExtractError};
use crate::pipeline::EvaluationContext;
use crate::provider::{ChatMessage, CompletionConfig, SharedCompletionClient};

/// Deliberation stance assigned to a ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteRole {
    Advocate,
    Devil,
    Judge,
}

impl VoteRole {
    fn cycle(index: usize) -> Self {
        match index % 3 {
            0 => Self::Advocate,
            1 => Self::Devil,
            _ => Self::Judge,
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::Advocate => "Look first for what the artifact gets right, then decide.",
            Self::Devil => "Hunt for defects and unmet requirements, then decide.",
            Self::Judge => "Weigh strengths and defects impartially, then decide.",
        }
    }
}

impl std::fmt::Display for VoteRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advocate => write!(f, "advocate"),
            Self::Devil => write!(f, "devil"),
            Self::Judge => write!(f, "judge"),
        }
    }
}

/// One model's ballot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub model: String,
    pub approved: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub role: Option<VoteRole>,
}

impl Vote {
    pub fn new(
        model: impl Into<String>,
        approved: bool,
        confidence: f64,
        reasoning: impl Into<String>,
        role: Option<VoteRole>,
    ) -> EvalResult<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(EvalError::Validation(format!(
                "confidence must be within [0, 1], got {confidence}"
            )));
        }
        Ok(Self {
            model: model.into(),
            approved,
            confidence,
            reasoning: reasoning.into(),
            role,
        })
    }
}

/// Stage 3 aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub approved: bool,
    pub votes: Vec<Vote>,
    pub majority_ratio: f64,
    pub disagreements: Vec<String>,
}

/// Panel configuration: at least three distinct model identifiers and the
/// approval threshold on the majority ratio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub models: Vec<String>,
    pub majority_threshold: f64,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            models: vec![
                "claude-opus-4-5".to_string(),
                "gpt-5.2".to_string(),
                "gemini-3-pro".to_string(),
            ],
            majority_threshold: 0.66,
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> EvalResult<()> {
        let distinct: HashSet<&String> = self.models.iter().collect();
        if distinct.len() < 3 {
            return Err(EvalError::Validation(format!(
                "consensus requires at least 3 distinct models, got {}",
                distinct.len()
            )));
        }
        if !(self.majority_threshold > 0.0 && self.majority_threshold <= 1.0) {
            return Err(EvalError::Validation(format!(
                "majority threshold must be in (0, 1], got {}",
                self.majority_threshold
            )));
        }
        Ok(())
    }

    /// Strict majority of the configured panel size.
    pub fn min_quorum(&self) -> usize {
        self.models.len() / 2 + 1
    }
}

/// The Stage 3 evaluator.
pub struct ConsensusEvaluator {
    client: SharedCompletionClient,
    config: ConsensusConfig,
}

impl ConsensusEvaluator {
    pub fn new(client: SharedCompletionClient, config: ConsensusConfig) -> EvalResult<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    /// Collect one ballot per configured model, concurrently, and tally.
    pub async fn evaluate(
        &self,
        context: &EvaluationContext,
        trigger_reason: &str,
    ) -> EvalResult<ConsensusResult> {
        let mut calls = Vec::with_capacity(self.config.models.len());
        for (index, model) in self.config.models.iter().enumerate() {
            let role = VoteRole::cycle(index);
            let messages = build_messages(context, trigger_reason, role);
            let completion = CompletionConfig {
                model: model.clone(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            };
            let client = Arc::clone(&self.client);
            let model = model.clone();
            calls.push(async move {
                let outcome = client.complete(&messages, &completion).await;
                (model, role, outcome)
            });
        }

        let outcomes = futures::future::join_all(calls).await;

        let mut votes = Vec::new();
        for (model, role, outcome) in outcomes {
            match outcome {
                Ok(response) => match parse_vote(&model, role, &response.text) {
                    Ok(vote) => votes.push(vote),
                    Err(e) => {
                        tracing::warn!(model = %model, error = %e, "ballot dropped: unparsable response");
                    }
                },
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "ballot dropped: model call failed");
                }
            }
        }

        let need = self.config.min_quorum();
        if votes.len() < need {
            return Err(EvalError::QuorumNotMet {
                got: votes.len(),
                need,
            });
        }

        let result = tally(votes, self.config.majority_threshold);
        tracing::info!(
            execution_id = %context.execution_id,
            votes = result.votes.len(),
            ratio = result.majority_ratio,
            approved = result.approved,
            "consensus vote finished"
        );
        Ok(result)
    }
}

/// Tally collected ballots. The denominator is the number of ballots
/// actually received, not the configured panel size.
fn tally(votes: Vec<Vote>, majority_threshold: f64) -> ConsensusResult {
    let approving = votes.iter().filter(|v| v.approved).count();
    let majority_ratio = approving as f64 / votes.len() as f64;
    let approved = majority_ratio >= majority_threshold;
    let disagreements = votes
        .iter()
        .filter(|v| v.approved != approved)
        .map(|v| v.reasoning.clone())
        .collect();

    ConsensusResult {
        approved,
        votes,
        majority_ratio,
        disagreements,
    }
}

fn build_messages(
    context: &EvaluationContext,
    trigger_reason: &str,
    role: VoteRole,
) -> Vec<ChatMessage> {
    let system = format!(
        "You are one voter on an artifact review panel. {} This review was \
         convened because: {trigger_reason}. Respond with a single JSON object \
         and no other text.",
        role.instruction()
    );

    let mut user = String::new();
    user.push_str(&format!(
        "## Acceptance criterion\n\n{}\n\n",
        context.current_ac
    ));
    if !context.goal.is_empty() {
        user.push_str(&format!("## Goal\n\n{}\n\n", context.goal));
    }
    user.push_str(&format!(
        "## Artifact\n\n```{}\n{}\n```\n\n",
        context.artifact_type, context.artifact
    ));
    user.push_str(
        "Respond with JSON: {\"approved\": <true|false>, \"confidence\": <0..1>, \
         \"reasoning\": \"<short explanation>\"}",
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Parse one ballot. `approved` is required; `confidence` defaults to 0.5
/// and is clamped; `reasoning` defaults to empty.
pub(crate) fn parse_vote(model: &str, role: VoteRole, text: &str) -> Result<Vote, ExtractError> {
    let value = extract::extract_json(text)?;

    let approved = extract::optional_bool(&value, "approved")
        .ok_or_else(|| ExtractError::MissingFields(vec!["approved".to_string()]))?;
    let confidence = extract::optional_f64(&value, "confidence")
        .map(extract::clamp_unit)
        .unwrap_or(0.5);
    let reasoning = extract::optional_str(&value, "reasoning")
        .unwrap_or_default()
        .to_string();

    Ok(Vote {
        model: model.to_string(),
        approved,
        confidence,
        reasoning,
        role: Some(role),
    })
}
