//! Escalation Manager — per-pattern failure tracking and tier routing.
//!
//! Tracks consecutive failures per task pattern and decides, at the
//! configured threshold, whether to escalate to the next model tier or to
//! declare stagnation at the top tier. Trackers are created lazily on
//! first failure and live only inside the manager's table — callers hold
//! the manager, never a tracker. Single-threaded cooperative callers only;
//! a multi-worker deployment would need per-key locking or sharding.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::events::{names, EventRecord, EventSink, NullSink};

/// Model cost/capability bands. Escalation is strictly upward:
/// Frugal → Standard → Frontier, then stagnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Frugal,
    Standard,
    Frontier,
}

impl Tier {
    /// The next tier up, or `None` at the top.
    pub fn next(&self) -> Option<Tier> {
        match self {
            Self::Frugal => Some(Self::Standard),
            Self::Standard => Some(Self::Frontier),
            Self::Frontier => None,
        }
    }

    pub fn all() -> [Tier; 3] {
        [Self::Frugal, Self::Standard, Self::Frontier]
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frugal => write!(f, "frugal"),
            Self::Standard => write!(f, "standard"),
            Self::Frontier => write!(f, "frontier"),
        }
    }
}

/// Per-pattern failure state. The only mutable, long-lived entity in the
/// core, owned exclusively by the [`EscalationManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureTracker {
    pub consecutive_failures: u32,
    pub current_tier: Tier,
    pub last_failure_time: DateTime<Utc>,
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub should_escalate: bool,
    pub target_tier: Option<Tier>,
    pub is_stagnation: bool,
    /// Failure count after this call, so callers can observe the trend.
    pub consecutive_failures: u32,
    pub reason: String,
}

/// Escalation thresholds and tier economics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Consecutive failures at one tier before escalating.
    pub failure_threshold: u32,
    /// Relative cost per tier, keyed by tier name.
    pub cost_multipliers: HashMap<Tier, f64>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
            cost_multipliers: HashMap::from([
                (Tier::Frugal, 1.0),
                (Tier::Standard, 5.0),
                (Tier::Frontier, 25.0),
            ]),
        }
    }
}

impl EscalationConfig {
    pub fn cost_multiplier(&self, tier: Tier) -> f64 {
        self.cost_multipliers.get(&tier).copied().unwrap_or(1.0)
    }
}

/// The escalation state machine over all task patterns.
pub struct EscalationManager {
    config: EscalationConfig,
    trackers: HashMap<String, FailureTracker>,
    sink: Arc<dyn EventSink>,
}

impl EscalationManager {
    pub fn new(config: EscalationConfig) -> Self {
        Self::with_sink(config, Arc::new(NullSink))
    }

    pub fn with_sink(config: EscalationConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            trackers: HashMap::new(),
            sink,
        }
    }

    /// Record a failure for `pattern_id` at `current_tier`.
    ///
    /// At the threshold: escalate to the next tier with a clean slate
    /// (count reset to 0), or signal stagnation at Frontier. Below it:
    /// report the running count.
    pub fn record_failure(&mut self, pattern_id: &str, current_tier: Tier) -> EscalationDecision {
        let tracker = self
            .trackers
            .entry(pattern_id.to_string())
            .or_insert_with(|| FailureTracker {
                consecutive_failures: 0,
                current_tier,
                last_failure_time: Utc::now(),
            });

        // The caller owns tier truth between escalations.
        tracker.current_tier = current_tier;
        tracker.consecutive_failures += 1;
        tracker.last_failure_time = Utc::now();

        if tracker.consecutive_failures < self.config.failure_threshold {
            return EscalationDecision {
                should_escalate: false,
                target_tier: None,
                is_stagnation: false,
                consecutive_failures: tracker.consecutive_failures,
                reason: format!(
                    "{} of {} failures at {current_tier}",
                    tracker.consecutive_failures, self.config.failure_threshold
                ),
            };
        }

        match current_tier.next() {
            Some(next) => {
                let failures = tracker.consecutive_failures;
                // Escalation forgives past failures at the new tier.
                tracker.consecutive_failures = 0;
                tracker.current_tier = next;

                self.sink.append(EventRecord::new(
                    names::TIER_UPGRADED,
                    "task_pattern",
                    pattern_id,
                    json!({
                        "from_tier": current_tier,
                        "to_tier": next,
                        "failures": failures,
                    }),
                ));
                tracing::info!(pattern_id, from = %current_tier, to = %next, "tier escalation");

                EscalationDecision {
                    should_escalate: true,
                    target_tier: Some(next),
                    is_stagnation: false,
                    consecutive_failures: 0,
                    reason: format!(
                        "{failures} consecutive failures at {current_tier}, escalating to {next}"
                    ),
                }
            }
            None => {
                self.sink.append(EventRecord::new(
                    names::STAGNATION_DETECTED,
                    "task_pattern",
                    pattern_id,
                    json!({
                        "tier": current_tier,
                        "failures": tracker.consecutive_failures,
                    }),
                ));
                tracing::warn!(
                    pattern_id,
                    failures = tracker.consecutive_failures,
                    "stagnation at top tier"
                );

                EscalationDecision {
                    should_escalate: false,
                    target_tier: None,
                    is_stagnation: true,
                    consecutive_failures: tracker.consecutive_failures,
                    reason: format!(
                        "{} consecutive failures at {current_tier} with no higher tier; \
                         a different strategy is needed",
                        tracker.consecutive_failures
                    ),
                }
            }
        }
    }

    /// Record a success: the failure count resets, the tier is preserved.
    /// Downgrade on sustained success is deliberately not implemented.
    pub fn record_success(&mut self, pattern_id: &str) {
        if let Some(tracker) = self.trackers.get_mut(pattern_id) {
            tracker.consecutive_failures = 0;
        }
    }

    /// Current tracker state for a pattern, if any failures were recorded.
    pub fn tracker(&self, pattern_id: &str) -> Option<&FailureTracker> {
        self.trackers.get(pattern_id)
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }
}
