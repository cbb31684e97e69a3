//! Evaluation Pipeline — Stage 1 → Stage 2 → (Stage 3) with short-circuits.
//!
//! Stage 1 failure ends the evaluation before Stage 2 starts. A Stage 2
//! compliance failure is terminal — consensus cannot overturn it. When a
//! trigger fires and Stage 3 runs, the consensus verdict alone decides
//! final approval. Every transition lands in one ordered audit trail,
//! closed by a synthetic pipeline-completed record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::consensus::{ConsensusEvaluator, ConsensusResult};
use crate::error::EvalResult;
use crate::events::{names, EventRecord, EventSink, NullSink};
use crate::mechanical::{CheckType, MechanicalResult, MechanicalVerifier};
use crate::semantic::{SemanticEvaluator, SemanticResult};
use crate::trigger::{ConsensusTrigger, TriggerContext};

/// Acceptance floor on the Stage 2 score when no consensus round runs.
///
/// A literal contract value, deliberately distinct from any configurable
/// satisfaction threshold elsewhere in the system.
pub const STAGE2_ACCEPTANCE_FLOOR: f64 = 0.8;

/// Input to one evaluation. Constructed once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub execution_id: String,
    pub seed_id: String,
    pub current_ac: String,
    pub artifact: String,
    pub artifact_type: String,
    pub goal: String,
    pub constraints: Vec<String>,
}

impl EvaluationContext {
    pub fn new(
        execution_id: impl Into<String>,
        seed_id: impl Into<String>,
        current_ac: impl Into<String>,
        artifact: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            seed_id: seed_id.into(),
            current_ac: current_ac.into(),
            artifact: artifact.into(),
            artifact_type: "code".to_string(),
            goal: String::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_artifact_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = artifact_type.into();
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Output of one evaluation, with the full audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub execution_id: String,
    pub stage1_result: Option<MechanicalResult>,
    pub stage2_result: Option<SemanticResult>,
    pub stage3_result: Option<ConsensusResult>,
    pub final_approved: bool,
    pub events: Vec<EventRecord>,
}

impl EvaluationResult {
    fn empty(execution_id: &str) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            stage1_result: None,
            stage2_result: None,
            stage3_result: None,
            final_approved: false,
            events: Vec::new(),
        }
    }

    /// Highest stage that produced a result: 0 through 3.
    pub fn highest_stage_completed(&self) -> u8 {
        if self.stage3_result.is_some() {
            3
        } else if self.stage2_result.is_some() {
            2
        } else if self.stage1_result.is_some() {
            1
        } else {
            0
        }
    }

    /// The first failing stage in 1 → 2 → 3 order, or `None` when approved.
    pub fn failure_reason(&self) -> Option<String> {
        if self.final_approved {
            return None;
        }

        if let Some(stage1) = &self.stage1_result {
            if !stage1.passed {
                let failed: Vec<String> = stage1
                    .checks
                    .iter()
                    .filter(|c| !c.passed)
                    .map(|c| c.check_type.to_string())
                    .collect();
                return Some(format!(
                    "stage1 mechanical checks failed: {}",
                    failed.join(", ")
                ));
            }
        }

        if let Some(stage2) = &self.stage2_result {
            if !stage2.ac_compliance {
                return Some(
                    "stage2 semantic judgment: acceptance criterion not met".to_string(),
                );
            }
            if self.stage3_result.is_none() && stage2.score < STAGE2_ACCEPTANCE_FLOOR {
                return Some(format!(
                    "stage2 score {:.2} below acceptance floor {STAGE2_ACCEPTANCE_FLOOR}",
                    stage2.score
                ));
            }
        }

        if let Some(stage3) = &self.stage3_result {
            if !stage3.approved {
                return Some(format!(
                    "stage3 consensus rejected: majority ratio {:.2}",
                    stage3.majority_ratio
                ));
            }
        }

        Some("evaluation not approved".to_string())
    }
}

/// Which stages run, and which mechanical checks Stage 1 executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub stage1_enabled: bool,
    pub stage2_enabled: bool,
    pub stage3_enabled: bool,
    pub stage1_checks: Vec<CheckType>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage1_enabled: true,
            stage2_enabled: true,
            stage3_enabled: true,
            stage1_checks: CheckType::all().to_vec(),
        }
    }
}

/// The three-stage evaluation pipeline.
pub struct EvaluationPipeline {
    config: PipelineConfig,
    mechanical: MechanicalVerifier,
    semantic: SemanticEvaluator,
    trigger: ConsensusTrigger,
    consensus: ConsensusEvaluator,
    sink: Arc<dyn EventSink>,
}

impl EvaluationPipeline {
    pub fn new(
        config: PipelineConfig,
        mechanical: MechanicalVerifier,
        semantic: SemanticEvaluator,
        trigger: ConsensusTrigger,
        consensus: ConsensusEvaluator,
    ) -> Self {
        Self {
            config,
            mechanical,
            semantic,
            trigger,
            consensus,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the enabled stages in order and produce the final verdict.
    ///
    /// Provider and parse errors from Stage 2/3 propagate — the pipeline
    /// never converts them into a default verdict.
    pub async fn evaluate(
        &self,
        context: &EvaluationContext,
        trigger_context: Option<TriggerContext>,
    ) -> EvalResult<EvaluationResult> {
        let mut trail = EventTrail::new(Arc::clone(&self.sink), &context.execution_id);
        let mut result = EvaluationResult::empty(&context.execution_id);

        // Stage 1: mechanical checks, fail-fast.
        if self.config.stage1_enabled {
            trail.record(
                names::STAGE1_STARTED,
                json!({ "checks": self.config.stage1_checks }),
            );
            let stage1 = self
                .mechanical
                .verify(&context.execution_id, &self.config.stage1_checks)
                .await;
            trail.record(
                names::STAGE1_COMPLETED,
                json!({
                    "passed": stage1.passed,
                    "coverage_score": stage1.coverage_score,
                }),
            );

            let passed = stage1.passed;
            result.stage1_result = Some(stage1);
            if !passed {
                return Ok(self.finalize(result, trail));
            }
        }

        // Stage 2: semantic judgment.
        let mut trigger_ctx = trigger_context.unwrap_or_default();
        if self.config.stage2_enabled {
            trail.record(names::STAGE2_STARTED, json!({}));
            let stage2 = self.semantic.evaluate(context).await?;
            trail.record(
                names::STAGE2_COMPLETED,
                json!({
                    "score": stage2.score,
                    "ac_compliance": stage2.ac_compliance,
                    "drift_score": stage2.drift_score,
                    "uncertainty": stage2.uncertainty,
                }),
            );

            trigger_ctx.semantic_result = Some(stage2.clone());
            let compliant = stage2.ac_compliance;
            result.stage2_result = Some(stage2);

            // Compliance failure is terminal; consensus cannot overturn it.
            if !compliant {
                return Ok(self.finalize(result, trail));
            }
        }

        // Stage 3 gate: the trigger rule matrix.
        let trigger_result = self.trigger.evaluate(&trigger_ctx);
        if trigger_result.should_trigger {
            trail.record(
                names::CONSENSUS_TRIGGERED,
                json!({
                    "trigger_type": trigger_result.trigger_type,
                    "reason": trigger_result.reason,
                    "details": trigger_result.details,
                }),
            );
        }

        if self.config.stage3_enabled && trigger_result.should_trigger {
            trail.record(
                names::STAGE3_STARTED,
                json!({ "trigger_type": trigger_result.trigger_type }),
            );
            let stage3 = self
                .consensus
                .evaluate(context, &trigger_result.reason)
                .await?;
            trail.record(
                names::STAGE3_COMPLETED,
                json!({
                    "approved": stage3.approved,
                    "majority_ratio": stage3.majority_ratio,
                    "votes": stage3.votes.len(),
                }),
            );

            // Consensus is now the sole determinant of approval.
            result.final_approved = stage3.approved;
            result.stage3_result = Some(stage3);
            return Ok(self.finalize(result, trail));
        }

        // No consensus round: Stage 2 verdict against the acceptance floor,
        // or pass-through when Stage 2 is disabled.
        result.final_approved = match &result.stage2_result {
            Some(stage2) => stage2.ac_compliance && stage2.score >= STAGE2_ACCEPTANCE_FLOOR,
            None => true,
        };
        Ok(self.finalize(result, trail))
    }

    fn finalize(&self, mut result: EvaluationResult, mut trail: EventTrail) -> EvaluationResult {
        let failure_reason = result.failure_reason();
        trail.record(
            names::PIPELINE_COMPLETED,
            json!({
                "final_approved": result.final_approved,
                "highest_stage_completed": result.highest_stage_completed(),
                "failure_reason": failure_reason,
            }),
        );
        tracing::info!(
            execution_id = %result.execution_id,
            final_approved = result.final_approved,
            highest_stage = result.highest_stage_completed(),
            "evaluation pipeline completed"
        );
        result.events = trail.into_records();
        result
    }
}

/// Appends each record to the external sink and mirrors it into the
/// result's audit trail.
struct EventTrail {
    sink: Arc<dyn EventSink>,
    aggregate_id: String,
    records: Vec<EventRecord>,
}

impl EventTrail {
    fn new(sink: Arc<dyn EventSink>, aggregate_id: &str) -> Self {
        Self {
            sink,
            aggregate_id: aggregate_id.to_string(),
            records: Vec::new(),
        }
    }

    fn record(&mut self, event_type: &str, data: serde_json::Value) {
        let record = EventRecord::new(event_type, "evaluation", self.aggregate_id.clone(), data);
        self.sink.append(record.clone());
        self.records.push(record);
    }

    fn into_records(self) -> Vec<EventRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanical::CheckResult;
    use std::collections::HashMap;

    fn check(check_type: CheckType, passed: bool) -> CheckResult {
        CheckResult {
            check_type,
            passed,
            message: String::new(),
            details: HashMap::new(),
        }
    }

    fn semantic(score: f64, ac_compliance: bool) -> SemanticResult {
        SemanticResult::new(score, 0.9, 0.1, 0.1, ac_compliance, "").unwrap()
    }

    #[test]
    fn context_builder_defaults() {
        let context = EvaluationContext::new("e", "s", "ac", "artifact");
        assert_eq!(context.artifact_type, "code");
        assert_eq!(context.goal, "");
        assert!(context.constraints.is_empty());
    }

    #[test]
    fn highest_stage_derivation() {
        let mut result = EvaluationResult::empty("e");
        assert_eq!(result.highest_stage_completed(), 0);

        result.stage1_result = Some(MechanicalResult::aggregate(vec![], None, 0.7));
        assert_eq!(result.highest_stage_completed(), 1);

        result.stage2_result = Some(semantic(0.9, true));
        assert_eq!(result.highest_stage_completed(), 2);
    }

    #[test]
    fn failure_reason_reports_first_failing_stage() {
        let mut result = EvaluationResult::empty("e");
        result.stage1_result = Some(MechanicalResult::aggregate(
            vec![check(CheckType::Lint, false), check(CheckType::Build, false)],
            None,
            0.7,
        ));
        let reason = result.failure_reason().unwrap();
        assert!(reason.contains("stage1"));
        assert!(reason.contains("lint, build"));
    }

    #[test]
    fn failure_reason_for_noncompliance() {
        let mut result = EvaluationResult::empty("e");
        result.stage1_result = Some(MechanicalResult::aggregate(
            vec![check(CheckType::Lint, true)],
            None,
            0.7,
        ));
        result.stage2_result = Some(semantic(0.9, false));
        let reason = result.failure_reason().unwrap();
        assert!(reason.contains("acceptance criterion not met"));
    }

    #[test]
    fn failure_reason_for_score_below_floor() {
        let mut result = EvaluationResult::empty("e");
        result.stage2_result = Some(semantic(0.75, true));
        let reason = result.failure_reason().unwrap();
        assert!(reason.contains("below acceptance floor"));
    }

    #[test]
    fn failure_reason_none_when_approved() {
        let mut result = EvaluationResult::empty("e");
        result.final_approved = true;
        assert_eq!(result.failure_reason(), None);
    }

    #[test]
    fn acceptance_floor_is_literal() {
        assert_eq!(STAGE2_ACCEPTANCE_FLOOR, 0.8);
    }
}
