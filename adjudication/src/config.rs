//! Aggregate configuration surface.
//!
//! Each component owns its config struct; this module bundles them,
//! supplies a TOML loader, and validates cross-cutting invariants. The
//! defaults are the contract values: coverage 0.7, drift/uncertainty 0.3,
//! majority 0.66, failure threshold 2, atomicity 0.7/3/300.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::atomicity::AtomicityConfig;
use crate::consensus::ConsensusConfig;
use crate::error::{EvalError, EvalResult};
use crate::escalation::EscalationConfig;
use crate::mechanical::MechanicalConfig;
use crate::pipeline::PipelineConfig;
use crate::semantic::SemanticConfig;
use crate::trigger::TriggerConfig;

/// Everything the adjudication core reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjudicationConfig {
    pub mechanical: MechanicalConfig,
    pub semantic: SemanticConfig,
    pub trigger: TriggerConfig,
    pub consensus: ConsensusConfig,
    pub pipeline: PipelineConfig,
    pub escalation: EscalationConfig,
    pub atomicity: AtomicityConfig,
}

impl AdjudicationConfig {
    /// Load and validate a TOML config file.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges across all components.
    pub fn validate(&self) -> EvalResult<()> {
        self.consensus.validate()?;

        if !(0.0..=1.0).contains(&self.mechanical.coverage_threshold) {
            return Err(EvalError::Validation(format!(
                "coverage threshold must be within [0, 1], got {}",
                self.mechanical.coverage_threshold
            )));
        }
        for (name, value) in [
            ("drift threshold", self.trigger.drift_threshold),
            ("uncertainty threshold", self.trigger.uncertainty_threshold),
            ("max complexity", self.atomicity.max_complexity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EvalError::Validation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.escalation.failure_threshold == 0 {
            return Err(EvalError::Validation(
                "escalation failure threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
