//! Adjudication — multi-stage evaluation and escalation for artifacts
//! produced by autonomous agents.
//!
//! This crate decides whether an artifact satisfies its acceptance
//! criterion, and — under repeated failure — whether to retry, escalate to
//! a costlier model tier, or declare stagnation:
//!
//! - **Stage 1** ([`mechanical`]): zero-cost external checks (lint, build,
//!   test, static analysis, coverage), aggregated fail-fast.
//! - **Stage 2** ([`semantic`]): a single LLM judgment scoring the artifact
//!   against its acceptance criterion.
//! - **Stage 3** ([`consensus`]): quorum voting across a panel of models,
//!   run only when the [`trigger`] rule matrix demands it.
//! - [`pipeline`] sequences the stages with short-circuit semantics and an
//!   ordered audit trail of events.
//! - [`escalation`] tracks consecutive failures per task pattern and routes
//!   between the Frugal, Standard, and Frontier tiers.
//! - [`atomicity`] decides whether a unit of work is small enough to
//!   execute directly, with a deterministic fallback when LLMs are down.
//!
//! LLM transport sits behind [`provider::CompletionClient`]; the event
//! store behind [`events::EventSink`]. Both are external collaborators.

pub mod atomicity;
pub mod config;
pub mod consensus;
pub mod error;
pub mod escalation;
pub mod events;
pub mod extract;
pub mod mechanical;
pub mod pipeline;
pub mod provider;
pub mod semantic;
pub mod subprocess;
pub mod trigger;

// Re-export the primary surface.
pub use atomicity::{AtomicityChecker, AtomicityConfig, AtomicityMethod, AtomicityResult};
pub use config::AdjudicationConfig;
pub use consensus::{ConsensusConfig, ConsensusEvaluator, ConsensusResult, Vote, VoteRole};
pub use error::{EvalError, EvalResult};
pub use events::{EventRecord, EventSink, MemorySink, NullSink};
pub use escalation::{
    EscalationConfig, EscalationDecision, EscalationManager, FailureTracker, Tier,
};
pub use mechanical::{
    CheckResult, CheckType, MechanicalConfig, MechanicalResult, MechanicalVerifier,
};
pub use pipeline::{
    EvaluationContext, EvaluationPipeline, EvaluationResult, PipelineConfig,
    STAGE2_ACCEPTANCE_FLOOR,
};
pub use provider::{
    ChatMessage, CompletionClient, CompletionConfig, CompletionResponse, OpenAiClient,
    ProviderError, SharedCompletionClient, TokenUsage,
};
pub use semantic::{SemanticConfig, SemanticEvaluator, SemanticResult};
pub use trigger::{ConsensusTrigger, TriggerConfig, TriggerContext, TriggerResult, TriggerType};
