//! The capture stage: dual-execution observation of one agent request.
//!
//! Every call to `execute_with_trace` follows the same order:
//!
//!   Mint id → Snapshot → [AgentExecutor::send] → Snapshot → Diff
//!     → Skip policy → (second run) → Compare → Persist
//!
//! The caller always receives the first run's result. A second run exists
//! only to produce learning signal and is never surfaced. Agent failures are
//! recorded in the trace as failed executions; they are never returned as
//! errors.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use ace_contracts::{
    agent::{AgentIdentity, TraceId},
    error::{AceError, AceResult},
    events::PipelineEvent,
    trace::{
        ComparativeObservations, Consistency, DelegationHop, Execution, ExecutionStatus,
        ExecutionTrace, InternalObservation, UserSatisfaction,
    },
};

use crate::{
    clock::{Clock, SystemClock},
    snapshot::{diff_snapshots, VcsSnapshot},
    trace_id::mint_trace_id,
    traits::{AgentExecutor, ExecutionOptions, PlaybookStore, TraceStore, WorkspaceProbe},
};

/// Runs at or above this duration are not duplicated.
pub const DEFAULT_DUPLICATE_THRESHOLD: Duration = Duration::from_secs(30);

const OUTPUT_PREVIEW_CHARS: usize = 500;

/// Knobs that decide how much of a request gets recorded and duplicated.
#[derive(Debug, Clone)]
pub struct CapturePolicy {
    /// When false, requests pass straight through to the agent unrecorded.
    pub enabled: bool,
    pub duplicate_threshold: Duration,
    /// Directories this agent exclusively owns. A first run that touches any
    /// of them is never repeated.
    pub owned_directories: Vec<String>,
    pub auto_reflect: bool,
    pub reflection_batch_size: usize,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            owned_directories: Vec::new(),
            auto_reflect: false,
            reflection_batch_size: 10,
        }
    }
}

/// One inbound request and its routing context.
#[derive(Debug, Clone, Default)]
pub struct CaptureRequest {
    pub request: String,
    pub priority_context: Option<String>,
    pub parent_trace_id: Option<TraceId>,
    /// Chain received from the delegating agent, if any.
    pub delegation_chain: Option<Vec<DelegationHop>>,
}

impl CaptureRequest {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Self::default()
        }
    }

    pub fn with_priority_context(mut self, context: impl Into<String>) -> Self {
        self.priority_context = Some(context.into());
        self
    }

    pub fn with_parent(mut self, parent: TraceId, chain: Vec<DelegationHop>) -> Self {
        self.parent_trace_id = Some(parent);
        self.delegation_chain = Some(chain);
        self
    }
}

/// What the caller gets back from a captured request.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// The first run's output; `None` when it failed.
    pub agent_result: Option<serde_json::Value>,
    pub status: ExecutionStatus,
    /// Id of the persisted trace; `None` when capture is disabled or the
    /// trace could not be written.
    pub trace_id: Option<TraceId>,
    pub duration_secs: f64,
    pub errors: Vec<String>,
    pub events: Vec<PipelineEvent>,
}

/// Wraps one agent and records a trace for every request sent through it.
pub struct Generator {
    agent: AgentIdentity,
    executor: Box<dyn AgentExecutor>,
    probe: Box<dyn WorkspaceProbe>,
    traces: Arc<dyn TraceStore>,
    playbooks: Arc<dyn PlaybookStore>,
    clock: Box<dyn Clock>,
    policy: CapturePolicy,
}

impl Generator {
    pub fn new(
        agent: AgentIdentity,
        executor: Box<dyn AgentExecutor>,
        probe: Box<dyn WorkspaceProbe>,
        traces: Arc<dyn TraceStore>,
        playbooks: Arc<dyn PlaybookStore>,
        policy: CapturePolicy,
    ) -> Self {
        Self {
            agent,
            executor,
            probe,
            traces,
            playbooks,
            clock: Box::new(SystemClock::new()),
            policy,
        }
    }

    /// Replace the duration source.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn agent(&self) -> &AgentIdentity {
        &self.agent
    }

    /// Run one request through the agent and record it.
    ///
    /// # Errors
    ///
    /// Only a `parent_trace_id` that does not resolve is an error
    /// (`AceError::Validation`), and it is raised before the agent runs.
    /// Agent failures come back as `status: Failure` with their messages in
    /// `errors`.
    pub fn execute_with_trace(&self, request: CaptureRequest) -> AceResult<CaptureOutcome> {
        if !self.policy.enabled {
            return Ok(self.execute_unrecorded(&request));
        }

        if let Some(parent) = &request.parent_trace_id {
            match self.traces.read(parent, parent.date_hint().as_deref()) {
                Ok(_) => {}
                Err(AceError::NotFound { .. }) => {
                    return Err(AceError::validation(format!(
                        "parent trace '{parent}' does not exist"
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        // ── Identity and routing ─────────────────────────────────────────────
        let (trace_id, created_at) = mint_trace_id();
        let mut delegation_chain = request.delegation_chain.clone().unwrap_or_default();
        delegation_chain.push(DelegationHop {
            agent: self.agent.name.clone(),
            trace_id: trace_id.clone(),
            timestamp: created_at,
        });

        let playbook = self.playbooks.load(&self.agent);
        let playbook_snapshot = self.playbooks.render_markdown(&playbook);
        let options = ExecutionOptions {
            priority_context: request.priority_context.clone(),
            playbook_context: playbook_snapshot.clone(),
            trace_id: Some(trace_id.clone()),
        };

        debug!(
            agent = %self.agent.name,
            trace_id = %trace_id,
            parent = ?request.parent_trace_id,
            "capture starting"
        );

        // ── First execution: the one the caller sees ─────────────────────────
        let (first, agent_result) = self.run_once(1, &request.request, &options);

        // ── Second execution, unless the skip policy says otherwise ─────────
        let mut executions = vec![first];
        let mut comparative = None;
        let skip_reason = self.skip_reason(&executions[0]);
        match &skip_reason {
            Some(reason) => {
                info!(trace_id = %trace_id, %reason, "skipping second execution");
            }
            None => {
                let (second, _) = self.run_once(2, &request.request, &options);
                comparative = Some(compare_executions(&executions[0], &second));
                executions.push(second);
            }
        }

        let first = &executions[0];
        let outcome_status = first.status;
        let duration_secs = first.duration_secs;
        let errors = first.errors.clone();

        let trace = ExecutionTrace {
            trace_id: trace_id.clone(),
            created_at,
            agent: self.agent.clone(),
            request: request.request.clone(),
            playbook_snapshot,
            executions,
            comparative,
            skip_reason,
            user_satisfaction: None,
            delegation_chain,
            parent_trace_id: request.parent_trace_id.clone(),
        };

        // ── Persist ──────────────────────────────────────────────────────────
        let mut events = Vec::new();
        let persisted_id = match self.traces.write(&trace) {
            Ok(path) => {
                info!(
                    agent = %self.agent.name,
                    trace_id = %trace_id,
                    executions = trace.executions.len(),
                    path = %path.display(),
                    "trace captured"
                );
                events.push(PipelineEvent::TraceCaptured {
                    agent: self.agent.name.clone(),
                    trace_id: trace_id.clone(),
                    executions: trace.executions.len(),
                });
                if let Some(due) = self.reflection_due(&trace) {
                    events.push(due);
                }
                Some(trace_id)
            }
            Err(e) => {
                warn!(trace_id = %trace_id, error = %e, "trace could not be persisted");
                None
            }
        };

        Ok(CaptureOutcome {
            agent_result,
            status: outcome_status,
            trace_id: persisted_id,
            duration_secs,
            errors,
            events,
        })
    }

    /// Attach a user's satisfaction record to an existing trace.
    ///
    /// # Errors
    ///
    /// `Validation` for an out-of-range score (checked before anything is
    /// read), `NotFound` when the trace does not exist.
    pub fn attach_satisfaction(
        &self,
        trace_id: &TraceId,
        satisfaction: UserSatisfaction,
    ) -> AceResult<Vec<PipelineEvent>> {
        satisfaction.validate()?;

        let mut trace = self.traces.read(trace_id, trace_id.date_hint().as_deref())?;
        let score = satisfaction.score;
        trace.user_satisfaction = Some(satisfaction);
        self.traces.write(&trace)?;

        info!(trace_id = %trace_id, score, "satisfaction attached");
        Ok(vec![PipelineEvent::SatisfactionRecorded {
            trace_id: trace_id.clone(),
            score,
        }])
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn execute_unrecorded(&self, request: &CaptureRequest) -> CaptureOutcome {
        let options = ExecutionOptions {
            priority_context: request.priority_context.clone(),
            ..ExecutionOptions::default()
        };
        let started = self.clock.now();
        let result = self.executor.send(&request.request, &options);
        let duration_secs = self.clock.now().saturating_sub(started).as_secs_f64();
        match result {
            Ok(response) => CaptureOutcome {
                agent_result: Some(response.output),
                status: ExecutionStatus::Success,
                trace_id: None,
                duration_secs,
                errors: Vec::new(),
                events: Vec::new(),
            },
            Err(e) => CaptureOutcome {
                agent_result: None,
                status: ExecutionStatus::Failure,
                trace_id: None,
                duration_secs,
                errors: vec![e.to_string()],
                events: Vec::new(),
            },
        }
    }

    /// One observed run: snapshot, invoke, snapshot, diff.
    fn run_once(
        &self,
        sequence: u8,
        request: &str,
        options: &ExecutionOptions,
    ) -> (Execution, Option<serde_json::Value>) {
        let before = self.take_snapshot();
        let started = self.clock.now();
        let result = self.executor.send(request, options);
        let duration_secs = self.clock.now().saturating_sub(started).as_secs_f64();
        let after = self.take_snapshot();
        let external = diff_snapshots(&before, &after);

        match result {
            Ok(response) => {
                debug!(sequence, duration_secs, "execution succeeded");
                let execution = Execution {
                    sequence,
                    external,
                    internal: InternalObservation {
                        reasoning_steps: response.reasoning.clone().unwrap_or_default(),
                        decisions: response.decisions.clone().unwrap_or_default(),
                        tool_calls: response.tool_calls.clone().unwrap_or_default(),
                        bullets_used: response.bullets_used.clone().unwrap_or_default(),
                        bullets_ignored: response.bullets_ignored.clone().unwrap_or_default(),
                    },
                    status: ExecutionStatus::Success,
                    errors: Vec::new(),
                    duration_secs,
                    resource_usage: response.resource_usage.unwrap_or(0),
                    output_preview: preview(&response.output),
                };
                (execution, Some(response.output))
            }
            Err(e) => {
                warn!(sequence, error = %e, "agent execution failed");
                let execution = Execution {
                    sequence,
                    external,
                    internal: InternalObservation::default(),
                    status: ExecutionStatus::Failure,
                    errors: vec![e.to_string()],
                    duration_secs,
                    resource_usage: 0,
                    output_preview: String::new(),
                };
                (execution, None)
            }
        }
    }

    fn take_snapshot(&self) -> VcsSnapshot {
        self.probe.snapshot().unwrap_or_else(|e| {
            warn!(error = %e, "workspace snapshot failed; treating as clean");
            VcsSnapshot::default()
        })
    }

    /// Why the first run must not be repeated, if it must not.
    fn skip_reason(&self, first: &Execution) -> Option<String> {
        let threshold = self.policy.duplicate_threshold;
        if first.duration_secs >= threshold.as_secs_f64() {
            return Some(format!(
                "First execution took {:.1}s, exceeding the {}s threshold for duplicate execution",
                first.duration_secs,
                threshold.as_secs()
            ));
        }

        let owned: Vec<&String> = first
            .external
            .changed_paths()
            .filter(|path| {
                self.policy
                    .owned_directories
                    .iter()
                    .any(|dir| path_within(path, dir))
            })
            .collect();
        if !owned.is_empty() {
            let listed = owned
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Some(format!(
                "Files in owned directories were modified ({listed}); a second execution would disturb completed work"
            ));
        }

        None
    }

    fn reflection_due(&self, trace: &ExecutionTrace) -> Option<PipelineEvent> {
        let batch = self.policy.reflection_batch_size;
        if !self.policy.auto_reflect || batch == 0 {
            return None;
        }
        let date = trace.partition_date();
        match self.traces.list(Some(&date), Some(&self.agent.name)) {
            Ok(traces) if !traces.is_empty() && traces.len() % batch == 0 => {
                Some(PipelineEvent::ReflectionDue {
                    agent: self.agent.name.clone(),
                    pending_traces: traces.len(),
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "could not count traces for auto-reflection");
                None
            }
        }
    }
}

/// True when `path` equals `dir` or lies beneath it.
///
/// Leading `./` and trailing `/` are ignored; matching is by whole path
/// segment, so `api` does not own `apis/x`.
pub fn path_within(path: &str, dir: &str) -> bool {
    let path = path.trim_start_matches("./");
    let dir = dir.trim_start_matches("./").trim_end_matches('/');
    if dir.is_empty() {
        return false;
    }
    path == dir
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Compare two runs of the same request.
pub fn compare_executions(first: &Execution, second: &Execution) -> ComparativeObservations {
    let consistency = if first.status == second.status {
        Consistency::SameOutcome
    } else {
        Consistency::DifferentOutcomes
    };

    let strategy_variance = if first.internal.tool_calls.len() == second.internal.tool_calls.len()
        && first.internal.decisions == second.internal.decisions
    {
        format!(
            "Both executions followed the same strategy ({} tool calls)",
            first.internal.tool_calls.len()
        )
    } else {
        format!(
            "Strategies diverged: execution 1 made {} tool calls and {} decisions, execution 2 made {} and {}",
            first.internal.tool_calls.len(),
            first.internal.decisions.len(),
            second.internal.tool_calls.len(),
            second.internal.decisions.len()
        )
    };

    let effectiveness_comparison = if (first.duration_secs - second.duration_secs).abs() < 0.05 {
        format!("Both executions took about {:.1}s", first.duration_secs)
    } else if first.duration_secs < second.duration_secs {
        format!(
            "Execution 1 was faster ({:.1}s vs {:.1}s)",
            first.duration_secs, second.duration_secs
        )
    } else {
        format!(
            "Execution 2 was faster ({:.1}s vs {:.1}s)",
            second.duration_secs, first.duration_secs
        )
    };

    let mut patterns = Vec::new();
    match (first.status, second.status) {
        (ExecutionStatus::Failure, ExecutionStatus::Failure) => {
            patterns.push("Both executions hit errors".to_string());
        }
        (ExecutionStatus::Success, ExecutionStatus::Success) => {
            patterns.push("Consistent success across both executions".to_string());
        }
        _ => patterns.push("Outcome is not deterministic for this request".to_string()),
    }
    if first.external != second.external {
        patterns.push("Executions touched different files".to_string());
    }

    ComparativeObservations {
        consistency,
        strategy_variance,
        effectiveness_comparison,
        patterns,
    }
}

fn preview(output: &serde_json::Value) -> String {
    let text = match output {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.chars().take(OUTPUT_PREVIEW_CHARS).collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────
