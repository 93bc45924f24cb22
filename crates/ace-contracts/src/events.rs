//! Events emitted by mutating pipeline operations.
//!
//! Operations return the events they want announced instead of delivering
//! them inline, so a failed notification can never undo a successful write.
//! Delivery is the job of an `EventDispatcher` in `ace-core`.

use serde::{Deserialize, Serialize};

use crate::agent::TraceId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A new trace was persisted by capture.
    TraceCaptured {
        agent: String,
        trace_id: TraceId,
        executions: usize,
    },
    /// A satisfaction record was attached to a trace by a user.
    SatisfactionRecorded { trace_id: TraceId, score: u8 },
    /// A satisfaction record was copied down the delegation graph.
    SatisfactionPropagated {
        from: TraceId,
        updated: usize,
    },
    /// Reflection wrote a delta file.
    DeltasWritten {
        agent: String,
        path: String,
        count: usize,
    },
    /// Curation saved a new playbook state.
    PlaybookUpdated {
        agent: String,
        version: String,
        active_bullets: usize,
    },
    /// Enough traces have accumulated for a reflection batch.
    ReflectionDue { agent: String, pending_traces: usize },
    /// New deltas are waiting for curation.
    CurationDue { agent: String },
}

impl PipelineEvent {
    /// Short machine name of the event, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::TraceCaptured { .. } => "trace_captured",
            PipelineEvent::SatisfactionRecorded { .. } => "satisfaction_recorded",
            PipelineEvent::SatisfactionPropagated { .. } => "satisfaction_propagated",
            PipelineEvent::DeltasWritten { .. } => "deltas_written",
            PipelineEvent::PlaybookUpdated { .. } => "playbook_updated",
            PipelineEvent::ReflectionDue { .. } => "reflection_due",
            PipelineEvent::CurationDue { .. } => "curation_due",
        }
    }
}
