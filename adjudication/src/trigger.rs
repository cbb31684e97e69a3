//! Consensus Trigger — fixed-priority rule matrix.
//!
//! Six rules evaluated in declaration order; the first match wins, so
//! earlier rules shadow later ones when several conditions hold at once.
//! The ordering is a contract, hence the explicit rule slice rather than
//! scattered conditionals.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::semantic::SemanticResult;

/// Why a consensus round is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    SeedModification,
    OntologyEvolution,
    GoalInterpretation,
    SeedDriftAlert,
    Stage2Uncertainty,
    LateralThinkingAdoption,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SeedModification => write!(f, "seed_modification"),
            Self::OntologyEvolution => write!(f, "ontology_evolution"),
            Self::GoalInterpretation => write!(f, "goal_interpretation"),
            Self::SeedDriftAlert => write!(f, "seed_drift_alert"),
            Self::Stage2Uncertainty => write!(f, "stage2_uncertainty"),
            Self::LateralThinkingAdoption => write!(f, "lateral_thinking_adoption"),
        }
    }
}

/// Contextual flags feeding the rule matrix. The embedded Stage 2 result,
/// when present, takes precedence over the raw drift/uncertainty floats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerContext {
    pub seed_modified: bool,
    pub ontology_changed: bool,
    pub goal_reinterpreted: bool,
    pub drift_score: f64,
    pub uncertainty_score: f64,
    pub lateral_thinking_adopted: bool,
    pub semantic_result: Option<SemanticResult>,
}

impl TriggerContext {
    pub fn with_semantic(mut self, result: SemanticResult) -> Self {
        self.semantic_result = Some(result);
        self
    }

    fn effective_drift(&self) -> f64 {
        self.semantic_result
            .as_ref()
            .map(|s| s.drift_score)
            .unwrap_or(self.drift_score)
    }

    fn effective_uncertainty(&self) -> f64 {
        self.semantic_result
            .as_ref()
            .map(|s| s.uncertainty)
            .unwrap_or(self.uncertainty_score)
    }
}

/// Rule matrix outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResult {
    pub should_trigger: bool,
    pub trigger_type: Option<TriggerType>,
    pub reason: String,
    #[serde(default)]
    pub details: HashMap<String, Value>,
}

impl TriggerResult {
    fn fired(
        trigger_type: TriggerType,
        reason: impl Into<String>,
        details: HashMap<String, Value>,
    ) -> Self {
        Self {
            should_trigger: true,
            trigger_type: Some(trigger_type),
            reason: reason.into(),
            details,
        }
    }

    fn none() -> Self {
        Self {
            should_trigger: false,
            trigger_type: None,
            reason: "no trigger condition matched".to_string(),
            details: HashMap::new(),
        }
    }
}

/// Thresholds for the drift and uncertainty rules. Equality does not
/// trigger — comparison is strict `>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub drift_threshold: f64,
    pub uncertainty_threshold: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 0.3,
            uncertainty_threshold: 0.3,
        }
    }
}

struct Rule {
    name: &'static str,
    eval: fn(&TriggerContext, &TriggerConfig) -> Option<TriggerResult>,
}

/// Priority order: 1 seed modification, 2 ontology evolution, 3 goal
/// reinterpretation, 4 drift, 5 uncertainty, 6 lateral thinking.
const RULES: &[Rule] = &[
    Rule {
        name: "seed_modified",
        eval: |ctx, _| {
            ctx.seed_modified.then(|| {
                TriggerResult::fired(
                    TriggerType::SeedModification,
                    "seed was modified during execution",
                    HashMap::new(),
                )
            })
        },
    },
    Rule {
        name: "ontology_changed",
        eval: |ctx, _| {
            ctx.ontology_changed.then(|| {
                TriggerResult::fired(
                    TriggerType::OntologyEvolution,
                    "domain ontology changed during execution",
                    HashMap::new(),
                )
            })
        },
    },
    Rule {
        name: "goal_reinterpreted",
        eval: |ctx, _| {
            ctx.goal_reinterpreted.then(|| {
                TriggerResult::fired(
                    TriggerType::GoalInterpretation,
                    "goal was reinterpreted during execution",
                    HashMap::new(),
                )
            })
        },
    },
    Rule {
        name: "drift_above_threshold",
        eval: |ctx, cfg| {
            let drift = ctx.effective_drift();
            (drift > cfg.drift_threshold).then(|| {
                TriggerResult::fired(
                    TriggerType::SeedDriftAlert,
                    format!(
                        "drift score {drift:.4} exceeds threshold {:.4}",
                        cfg.drift_threshold
                    ),
                    HashMap::from([
                        ("drift_score".to_string(), json!(drift)),
                        ("threshold".to_string(), json!(cfg.drift_threshold)),
                    ]),
                )
            })
        },
    },
    Rule {
        name: "uncertainty_above_threshold",
        eval: |ctx, cfg| {
            let uncertainty = ctx.effective_uncertainty();
            (uncertainty > cfg.uncertainty_threshold).then(|| {
                TriggerResult::fired(
                    TriggerType::Stage2Uncertainty,
                    format!(
                        "uncertainty {uncertainty:.4} exceeds threshold {:.4}",
                        cfg.uncertainty_threshold
                    ),
                    HashMap::from([
                        ("uncertainty_score".to_string(), json!(uncertainty)),
                        ("threshold".to_string(), json!(cfg.uncertainty_threshold)),
                    ]),
                )
            })
        },
    },
    Rule {
        name: "lateral_thinking_adopted",
        eval: |ctx, _| {
            ctx.lateral_thinking_adopted.then(|| {
                TriggerResult::fired(
                    TriggerType::LateralThinkingAdoption,
                    "a lateral-thinking strategy was adopted",
                    HashMap::new(),
                )
            })
        },
    },
];

/// The stateless rule evaluator.
pub struct ConsensusTrigger {
    config: TriggerConfig,
}

impl ConsensusTrigger {
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }

    /// Walk the rules in priority order and return the first match.
    pub fn evaluate(&self, context: &TriggerContext) -> TriggerResult {
        for rule in RULES {
            if let Some(result) = (rule.eval)(context, &self.config) {
                tracing::info!(rule = rule.name, reason = %result.reason, "consensus trigger fired");
                return result;
            }
        }
        TriggerResult::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> ConsensusTrigger {
        ConsensusTrigger::new(TriggerConfig::default())
    }

    fn semantic(drift: f64, uncertainty: f64) -> SemanticResult {
        SemanticResult::new(0.9, 0.9, drift, uncertainty, true, "").unwrap()
    }

    #[test]
    fn no_flags_means_no_trigger() {
        let result = trigger().evaluate(&TriggerContext::default());
        assert!(!result.should_trigger);
        assert_eq!(result.trigger_type, None);
    }

    #[test]
    fn seed_modification_wins_over_ontology_change() {
        let context = TriggerContext {
            seed_modified: true,
            ontology_changed: true,
            ..Default::default()
        };
        let result = trigger().evaluate(&context);
        assert_eq!(result.trigger_type, Some(TriggerType::SeedModification));
    }

    #[test]
    fn ontology_wins_over_goal_reinterpretation() {
        let context = TriggerContext {
            ontology_changed: true,
            goal_reinterpreted: true,
            ..Default::default()
        };
        let result = trigger().evaluate(&context);
        assert_eq!(result.trigger_type, Some(TriggerType::OntologyEvolution));
    }

    #[test]
    fn drift_exactly_at_threshold_does_not_trigger() {
        let context = TriggerContext {
            drift_score: 0.3,
            ..Default::default()
        };
        assert!(!trigger().evaluate(&context).should_trigger);
    }

    #[test]
    fn drift_just_above_threshold_triggers() {
        let context = TriggerContext {
            drift_score: 0.30000001,
            ..Default::default()
        };
        let result = trigger().evaluate(&context);
        assert_eq!(result.trigger_type, Some(TriggerType::SeedDriftAlert));
        assert!(result.details.contains_key("drift_score"));
    }

    #[test]
    fn embedded_semantic_result_overrides_context_drift() {
        // Context says no drift, Stage 2 says plenty.
        let context = TriggerContext {
            drift_score: 0.0,
            ..Default::default()
        }
        .with_semantic(semantic(0.5, 0.0));
        let result = trigger().evaluate(&context);
        assert_eq!(result.trigger_type, Some(TriggerType::SeedDriftAlert));

        // And the other way around: Stage 2 low drift masks a high context value.
        let context = TriggerContext {
            drift_score: 0.9,
            ..Default::default()
        }
        .with_semantic(semantic(0.1, 0.0));
        assert!(!trigger().evaluate(&context).should_trigger);
    }

    #[test]
    fn drift_wins_over_uncertainty() {
        let context = TriggerContext {
            drift_score: 0.5,
            uncertainty_score: 0.9,
            ..Default::default()
        };
        let result = trigger().evaluate(&context);
        assert_eq!(result.trigger_type, Some(TriggerType::SeedDriftAlert));
    }

    #[test]
    fn uncertainty_triggers_when_drift_is_low() {
        let context = TriggerContext {
            uncertainty_score: 0.4,
            ..Default::default()
        };
        let result = trigger().evaluate(&context);
        assert_eq!(result.trigger_type, Some(TriggerType::Stage2Uncertainty));
    }

    #[test]
    fn lateral_thinking_is_the_lowest_priority() {
        let context = TriggerContext {
            lateral_thinking_adopted: true,
            ..Default::default()
        };
        let result = trigger().evaluate(&context);
        assert_eq!(result.trigger_type, Some(TriggerType::LateralThinkingAdoption));

        let context = TriggerContext {
            lateral_thinking_adopted: true,
            uncertainty_score: 0.4,
            ..Default::default()
        };
        let result = trigger().evaluate(&context);
        assert_eq!(result.trigger_type, Some(TriggerType::Stage2Uncertainty));
    }

    #[test]
    fn custom_thresholds_are_respected() {
        let trigger = ConsensusTrigger::new(TriggerConfig {
            drift_threshold: 0.8,
            uncertainty_threshold: 0.8,
        });
        let context = TriggerContext {
            drift_score: 0.5,
            uncertainty_score: 0.5,
            ..Default::default()
        };
        assert!(!trigger.evaluate(&context).should_trigger);
    }
}
