//! Capability and store traits for the ACE pipeline.
//!
//! The pipeline talks to the outside world only through these seams:
//!
//! - `AgentExecutor`: runs the agent being observed (opaque, may fail)
//! - `EmbeddingService`: turns text into a vector
//! - `InsightExtractor`: turns a reflection prompt into free text
//! - `WorkspaceProbe`: snapshots version-control status
//! - `TraceStore`, `DeltaStore`, `PlaybookStore`: the durable stores the
//!   three stages communicate through
//! - `EventDispatcher`: delivers outbox events
//!
//! None of the capability calls are retried by the pipeline; retries belong
//! to the caller.

use std::path::{Path, PathBuf};

use ace_contracts::{
    agent::{AgentIdentity, TraceId},
    delta::DeltaFile,
    error::AceResult,
    events::PipelineEvent,
    playbook::{CurationReport, Playbook},
    trace::ExecutionTrace,
};
use serde::{Deserialize, Serialize};

use crate::snapshot::VcsSnapshot;

/// Extra context handed to the agent alongside the request text.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Caller-supplied priority or roadmap context, passed through untouched.
    pub priority_context: Option<String>,
    /// Rendered playbook the agent should consult.
    pub playbook_context: String,
    /// Id of the trace this run belongs to.
    pub trace_id: Option<TraceId>,
}

/// What an agent returned from one run.
///
/// Only `output` is mandatory. The optional fields are copied verbatim into
/// the trace's `InternalObservation` when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: serde_json::Value,
    #[serde(default)]
    pub reasoning: Option<Vec<String>>,
    #[serde(default)]
    pub decisions: Option<Vec<String>>,
    #[serde(default)]
    pub tool_calls: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub bullets_used: Option<Vec<String>>,
    #[serde(default)]
    pub bullets_ignored: Option<Vec<String>>,
    /// Tokens or another resource-usage counter.
    #[serde(default)]
    pub resource_usage: Option<u64>,
}

impl AgentResponse {
    /// A response carrying only an output value.
    pub fn from_output(output: serde_json::Value) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }
}

/// The agent under observation.
///
/// Implementations are untrusted: any error they return is recorded as a
/// failed execution and never reaches the capture caller.
pub trait AgentExecutor: Send + Sync {
    fn send(&self, request: &str, options: &ExecutionOptions) -> AceResult<AgentResponse>;
}

/// Text-to-vector capability.
///
/// Must return the same vector for identical input; curation caches by
/// exact text. A missing credential is `AceError::CapabilityUnavailable`.
pub trait EmbeddingService: Send + Sync {
    fn embed(&self, text: &str) -> AceResult<Vec<f32>>;

    /// Identifier of the model producing the vectors.
    fn model(&self) -> &str;
}

/// Natural-language reasoning capability used by reflection.
///
/// Receives the full prompt (serialized traces plus playbook snapshot) and
/// returns free text expected to contain a structured list of deltas.
pub trait InsightExtractor: Send + Sync {
    fn extract(&self, prompt: &str) -> AceResult<String>;
}

/// Reads the version-control status of the working tree.
pub trait WorkspaceProbe: Send + Sync {
    fn snapshot(&self) -> AceResult<VcsSnapshot>;
}

/// Durable, append-only store of execution traces partitioned by day.
pub trait TraceStore: Send + Sync {
    /// Persist a trace, overwriting an earlier version with the same id.
    fn write(&self, trace: &ExecutionTrace) -> AceResult<PathBuf>;

    /// Load one trace. `date_hint` (`YYYY-MM-DD`) narrows the search; every
    /// partition is scanned when the hint misses.
    fn read(&self, trace_id: &TraceId, date_hint: Option<&str>) -> AceResult<ExecutionTrace>;

    /// All traces, optionally restricted to one day and/or one agent,
    /// oldest first.
    fn list(&self, date: Option<&str>, agent: Option<&str>) -> AceResult<Vec<ExecutionTrace>>;

    /// Traces created within the last `hours` hours, oldest first.
    fn since(&self, hours: u32, agent: Option<&str>) -> AceResult<Vec<ExecutionTrace>>;

    /// The `n` most recent traces, newest first.
    fn latest(&self, n: usize, agent: Option<&str>) -> AceResult<Vec<ExecutionTrace>>;

    /// Remove every day partition older than `older_than_days`. Returns the
    /// number of traces removed.
    fn purge(&self, older_than_days: u32) -> AceResult<usize>;
}

/// Durable store of reflection output awaiting curation.
pub trait DeltaStore: Send + Sync {
    fn write(&self, file: &DeltaFile) -> AceResult<PathBuf>;

    /// Unconsumed delta files for `agent`, oldest first.
    fn pending(&self, agent: &str) -> AceResult<Vec<PathBuf>>;

    fn read(&self, path: &Path) -> AceResult<DeltaFile>;

    /// Move a consumed file out of the pending set.
    fn archive(&self, path: &Path) -> AceResult<PathBuf>;
}

/// Durable store of one playbook per agent.
pub trait PlaybookStore: Send + Sync {
    /// Load the agent's playbook. Never fails: a missing or unreadable
    /// playbook yields a fresh empty one.
    fn load(&self, agent: &AgentIdentity) -> Playbook;

    /// Atomically replace the stored playbook.
    fn save(&self, playbook: &Playbook) -> AceResult<PathBuf>;

    fn exists(&self, agent: &str) -> bool;

    /// Human-readable rendering, active bullets only.
    fn render_markdown(&self, playbook: &Playbook) -> String;

    /// Persist a curation session report next to the playbook.
    fn write_report(&self, report: &CurationReport) -> AceResult<PathBuf>;
}

/// Delivers outbox events. Failures are logged by the caller, never
/// propagated into the operation that produced the event.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: &PipelineEvent) -> AceResult<()>;
}
