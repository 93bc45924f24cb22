//! In-memory `TraceStore`.
//!
//! Holds traces in a `BTreeMap` behind a `Mutex`. Nothing survives the
//! process; useful for tests and for hosts that only need the learning
//! stages to run against one session's traces.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Mutex,
};

use chrono::{Duration, Utc};

use ace_contracts::{
    agent::TraceId,
    error::{AceError, AceResult},
    trace::ExecutionTrace,
};
use ace_core::traits::TraceStore;

#[derive(Default)]
pub struct InMemoryTraceStore {
    traces: Mutex<BTreeMap<TraceId, ExecutionTrace>>,
}

impl InMemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.traces.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self, keep: impl Fn(&ExecutionTrace) -> bool) -> AceResult<Vec<ExecutionTrace>> {
        let traces = self.traces.lock().map_err(poisoned)?;
        let mut selected: Vec<ExecutionTrace> = traces.values().filter(|t| keep(t)).cloned().collect();
        selected.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.trace_id.cmp(&b.trace_id))
        });
        Ok(selected)
    }
}

fn poisoned<T>(_: T) -> AceError {
    AceError::storage("trace store lock poisoned")
}

fn agent_matches(trace: &ExecutionTrace, agent: Option<&str>) -> bool {
    agent.map_or(true, |name| trace.agent.name == name)
}

impl TraceStore for InMemoryTraceStore {
    fn write(&self, trace: &ExecutionTrace) -> AceResult<PathBuf> {
        trace.validate()?;
        let mut traces = self.traces.lock().map_err(poisoned)?;
        traces.insert(trace.trace_id.clone(), trace.clone());
        Ok(PathBuf::from(format!("memory://{}/{}", trace.partition_date(), trace.trace_id)))
    }

    fn read(&self, trace_id: &TraceId, _date_hint: Option<&str>) -> AceResult<ExecutionTrace> {
        let traces = self.traces.lock().map_err(poisoned)?;
        traces
            .get(trace_id)
            .cloned()
            .ok_or_else(|| AceError::not_found("trace", trace_id.as_str()))
    }

    fn list(&self, date: Option<&str>, agent: Option<&str>) -> AceResult<Vec<ExecutionTrace>> {
        self.snapshot(|t| {
            date.map_or(true, |d| t.partition_date() == d) && agent_matches(t, agent)
        })
    }

    fn since(&self, hours: u32, agent: Option<&str>) -> AceResult<Vec<ExecutionTrace>> {
        let cutoff = Utc::now() - Duration::hours(i64::from(hours));
        self.snapshot(|t| t.created_at >= cutoff && agent_matches(t, agent))
    }

    fn latest(&self, n: usize, agent: Option<&str>) -> AceResult<Vec<ExecutionTrace>> {
        let mut traces = self.snapshot(|t| agent_matches(t, agent))?;
        traces.reverse();
        traces.truncate(n);
        Ok(traces)
    }

    fn purge(&self, older_than_days: u32) -> AceResult<usize> {
        let cutoff = (Utc::now() - Duration::days(i64::from(older_than_days))).date_naive();
        let mut traces = self.traces.lock().map_err(poisoned)?;
        let before = traces.len();
        traces.retain(|_, t| t.created_at.date_naive() >= cutoff);
        Ok(before - traces.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use ace_contracts::{
        agent::{AgentIdentity, TraceId},
        error::ErrorKind,
        trace::{DelegationHop, Execution, ExecutionStatus, ExecutionTrace, ExternalObservation, InternalObservation},
    };
    use ace_core::{trace_id::format_trace_id, traits::TraceStore};

    use super::InMemoryTraceStore;

    fn trace(agent: &str, age: Duration) -> ExecutionTrace {
        let created_at = Utc::now() - age;
        let trace_id = format_trace_id(&created_at);
        ExecutionTrace {
            trace_id: trace_id.clone(),
            created_at,
            agent: AgentIdentity::named(agent),
            request: "fix flaky test".to_string(),
            playbook_snapshot: String::new(),
            executions: vec![Execution {
                sequence: 1,
                external: ExternalObservation::default(),
                internal: InternalObservation::default(),
                status: ExecutionStatus::Failure,
                errors: vec!["timeout".to_string()],
                duration_secs: 31.0,
                resource_usage: 0,
                output_preview: String::new(),
            }],
            comparative: None,
            skip_reason: Some("slow".to_string()),
            user_satisfaction: None,
            delegation_chain: vec![DelegationHop {
                agent: agent.to_string(),
                trace_id,
                timestamp: created_at,
            }],
            parent_trace_id: None,
        }
    }

    #[test]
    fn queries_mirror_the_file_store() {
        let store = InMemoryTraceStore::new();
        let old = trace("test-engineer", Duration::days(45));
        let recent = trace("test-engineer", Duration::hours(3));
        let other = trace("docs-writer", Duration::hours(1));
        for t in [&old, &recent, &other] {
            store.write(t).unwrap();
        }

        assert_eq!(store.list(None, Some("test-engineer")).unwrap().len(), 2);
        assert_eq!(store.since(24, None).unwrap().len(), 2);
        assert_eq!(store.latest(1, None).unwrap()[0].trace_id, other.trace_id);
        assert_eq!(
            store.read(&recent.trace_id, None).unwrap().request,
            "fix flaky test"
        );
        assert_eq!(
            store.read(&TraceId::new("trace_nope"), None).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        assert_eq!(store.purge(30).unwrap(), 1);
        assert_eq!(store.len(), 2);
    }
}
