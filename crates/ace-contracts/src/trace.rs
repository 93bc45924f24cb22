//! Execution traces: what the capture stage records for one request.
//!
//! An `ExecutionTrace` is written once by capture and mutated at most once
//! afterwards (attaching or propagating a satisfaction record). `Execution`
//! values inside it are never modified after they are recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    agent::{AgentIdentity, TraceId},
    error::{AceError, AceResult},
};

/// One user-facing request to one agent, with 1–2 concrete runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub trace_id: TraceId,
    pub created_at: DateTime<Utc>,
    pub agent: AgentIdentity,
    /// The request text exactly as the caller supplied it.
    pub request: String,
    /// Rendered playbook in force when the request was captured.
    pub playbook_snapshot: String,
    /// Ordered runs, sequence 1 first. Never empty.
    pub executions: Vec<Execution>,
    #[serde(default)]
    pub comparative: Option<ComparativeObservations>,
    /// Why only one execution ran, when that is the case.
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub user_satisfaction: Option<UserSatisfaction>,
    /// Routing path from the top-level caller down to this agent.
    ///
    /// Always ends with this trace's own agent and id.
    #[serde(default)]
    pub delegation_chain: Vec<DelegationHop>,
    #[serde(default)]
    pub parent_trace_id: Option<TraceId>,
}

impl ExecutionTrace {
    /// The first execution, which is the one whose result the caller saw.
    pub fn primary(&self) -> Option<&Execution> {
        self.executions.first()
    }

    /// Calendar day (`YYYY-MM-DD`, UTC) this trace is partitioned under.
    pub fn partition_date(&self) -> String {
        self.created_at.format("%Y-%m-%d").to_string()
    }

    /// Check the structural invariants of a trace.
    pub fn validate(&self) -> AceResult<()> {
        if self.executions.is_empty() || self.executions.len() > 2 {
            return Err(AceError::validation(format!(
                "trace '{}' must hold 1 or 2 executions, found {}",
                self.trace_id,
                self.executions.len()
            )));
        }
        match self.delegation_chain.last() {
            Some(hop) if hop.trace_id == self.trace_id && hop.agent == self.agent.name => Ok(()),
            _ => Err(AceError::validation(format!(
                "delegation chain of trace '{}' must end with its own agent and id",
                self.trace_id
            ))),
        }
    }
}

/// One step in the delegation path that routed a request to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationHop {
    pub agent: String,
    pub trace_id: TraceId,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

/// One concrete run of the agent within a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// 1 or 2.
    pub sequence: u8,
    pub external: ExternalObservation,
    pub internal: InternalObservation,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub errors: Vec<String>,
    pub duration_secs: f64,
    #[serde(default)]
    pub resource_usage: u64,
    /// Truncated textual form of what the agent returned.
    #[serde(default)]
    pub output_preview: String,
}

/// Side effects visible from outside the agent: the working tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalObservation {
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub files_deleted: Vec<String>,
    /// One-line version-control change summary.
    #[serde(default)]
    pub vcs_summary: String,
}

impl ExternalObservation {
    /// Every path touched by the run, in created/modified/deleted order.
    pub fn changed_paths(&self) -> impl Iterator<Item = &String> {
        self.files_created
            .iter()
            .chain(self.files_modified.iter())
            .chain(self.files_deleted.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.files_created.is_empty()
            && self.files_modified.is_empty()
            && self.files_deleted.is_empty()
    }
}

/// What the agent exposed about its own reasoning, copied verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalObservation {
    #[serde(default)]
    pub reasoning_steps: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub tool_calls: Vec<serde_json::Value>,
    /// Playbook bullet ids the agent reported using.
    #[serde(default)]
    pub bullets_used: Vec<String>,
    /// Playbook bullet ids the agent reported ignoring.
    #[serde(default)]
    pub bullets_ignored: Vec<String>,
}

/// Whether two runs of the same request ended the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    SameOutcome,
    DifferentOutcomes,
}

/// Derived comparison of the two runs of a dual execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativeObservations {
    pub consistency: Consistency,
    pub strategy_variance: String,
    pub effectiveness_comparison: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// A user's 1–5 judgement of a trace, attachable after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSatisfaction {
    pub score: u8,
    #[serde(default)]
    pub positive_feedback: Option<String>,
    #[serde(default)]
    pub improvement_areas: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Set when the record was copied down from a delegating trace.
    #[serde(default)]
    pub propagated_from: Option<TraceId>,
}

impl UserSatisfaction {
    pub fn new(score: u8) -> Self {
        Self {
            score,
            positive_feedback: None,
            improvement_areas: None,
            timestamp: Utc::now(),
            propagated_from: None,
        }
    }

    /// Reject scores outside 1..=5.
    pub fn validate(&self) -> AceResult<()> {
        if (1..=5).contains(&self.score) {
            Ok(())
        } else {
            Err(AceError::validation(format!(
                "satisfaction score must be between 1 and 5, got {}",
                self.score
            )))
        }
    }

    /// Build a record from an untyped payload such as a hook or HTTP body.
    ///
    /// `score` is mandatory; `timestamp` defaults to now.
    pub fn from_payload(payload: &serde_json::Value) -> AceResult<Self> {
        let score = payload
            .get("score")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| AceError::validation("satisfaction payload is missing an integer 'score'"))?;
        if !(1..=5).contains(&score) {
            return Err(AceError::validation(format!(
                "satisfaction score must be between 1 and 5, got {score}"
            )));
        }

        let text = |key: &str| {
            payload
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        let timestamp = match payload.get("timestamp").and_then(serde_json::Value::as_str) {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| AceError::validation(format!("invalid satisfaction timestamp '{raw}': {e}")))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        Ok(Self {
            score: score as u8,
            positive_feedback: text("positive_feedback"),
            improvement_areas: text("improvement_areas"),
            timestamp,
            propagated_from: None,
        })
    }
}
