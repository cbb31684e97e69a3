//! Error taxonomy for the adjudication core.
//!
//! Validation errors are caller bugs and never retried. Provider errors
//! carry their own retriable/terminal split. Parse errors are terminal for
//! the evaluation stages (the Atomicity Checker instead falls back to its
//! heuristic). Quorum failure is the one evaluation-level error Stage 3 can
//! produce on partial provider outage.

use thiserror::Error;

use crate::extract::ExtractError;
use crate::provider::ProviderError;

/// Unified error type for evaluation operations.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Malformed input: out-of-range scores, empty work descriptions,
    /// invalid configuration values.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An LLM call could not complete. Never substituted with a default
    /// verdict — the stage fails instead.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An LLM responded with text that does not contain the expected JSON.
    #[error("response parse failed: {0}")]
    Parse(#[from] ExtractError),

    /// Fewer ballots were collected than the consensus quorum requires.
    #[error("not enough votes: got {got}, need {need}")]
    QuorumNotMet { got: usize, need: usize },
}

impl EvalError {
    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retriable(),
            Self::QuorumNotMet { .. } => true,
            Self::Validation(_) | Self::Parse(_) => false,
        }
    }
}

/// Result alias used throughout the crate.
pub type EvalResult<T> = Result<T, EvalError>;
