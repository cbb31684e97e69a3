//! Audit event records and the append-only sink boundary.
//!
//! The core only produces events; the real store (event-sourced log with
//! replay) is an external collaborator behind [`EventSink`]. Appends never
//! fail the producing operation.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type strings, `domain.noun.past_tense_verb`.
pub mod names {
    pub const STAGE1_STARTED: &str = "evaluation.stage1.started";
    pub const STAGE1_COMPLETED: &str = "evaluation.stage1.completed";
    pub const STAGE2_STARTED: &str = "evaluation.stage2.started";
    pub const STAGE2_COMPLETED: &str = "evaluation.stage2.completed";
    pub const STAGE3_STARTED: &str = "evaluation.stage3.started";
    pub const STAGE3_COMPLETED: &str = "evaluation.stage3.completed";
    pub const CONSENSUS_TRIGGERED: &str = "evaluation.consensus.triggered";
    pub const PIPELINE_COMPLETED: &str = "evaluation.pipeline.completed";
    pub const ATOMICITY_CHECKED: &str = "ac.atomicity.checked";
    pub const TIER_UPGRADED: &str = "escalation.tier.upgraded";
    pub const STAGNATION_DETECTED: &str = "escalation.stagnation.detected";
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub data: Value,
    pub recorded_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(
        event_type: impl Into<String>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            data,
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only ordered log boundary. Implementations must not fail the
/// caller; drop or buffer internally instead.
pub trait EventSink: Send + Sync {
    fn append(&self, record: EventRecord);
}

/// Sink that discards every record.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn append(&self, _record: EventRecord) {}
}

/// In-memory sink for tests and replay inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<EventRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records appended so far, in order.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventSink for MemorySink {
    fn append(&self, record: EventRecord) {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_sink_preserves_order() {
        let sink = MemorySink::new();
        sink.append(EventRecord::new(names::STAGE1_STARTED, "evaluation", "exec-1", json!({})));
        sink.append(EventRecord::new(names::STAGE1_COMPLETED, "evaluation", "exec-1", json!({"passed": true})));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, names::STAGE1_STARTED);
        assert_eq!(records[1].event_type, names::STAGE1_COMPLETED);
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = EventRecord::new(names::TIER_UPGRADED, "task_pattern", "pat-9", json!({"to_tier": "standard"}));
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: EventRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn event_names_follow_convention() {
        for name in [
            names::STAGE1_STARTED,
            names::CONSENSUS_TRIGGERED,
            names::PIPELINE_COMPLETED,
            names::ATOMICITY_CHECKED,
            names::TIER_UPGRADED,
            names::STAGNATION_DETECTED,
        ] {
            assert_eq!(name.split('.').count(), 3, "dot-separated triple: {name}");
        }
    }
}
