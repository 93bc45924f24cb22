//! File-backed `TraceStore`.
//!
//! Layout: `<root>/<YYYY-MM-DD>/<agent slug>/<trace id>.json`, with a
//! rendered `<trace id>.md` twin beside each document. The day directory
//! comes from the trace's own timestamp, so listing one day or purging old
//! days never touches the rest of the store.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use ace_contracts::{
    agent::{slugify, TraceId},
    error::{AceError, AceResult},
    trace::ExecutionTrace,
};
use ace_core::traits::TraceStore;

use crate::{
    atomic::{io_error, read_json, write_atomic, write_json},
    render::render_trace_markdown,
};

const PARTITION_FORMAT: &str = "%Y-%m-%d";

pub struct FsTraceStore {
    root: PathBuf,
}

impl FsTraceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn trace_path(&self, trace: &ExecutionTrace) -> PathBuf {
        self.root
            .join(trace.partition_date())
            .join(trace.agent.slug())
            .join(format!("{}.json", trace.trace_id))
    }

    /// Day partitions present on disk, oldest first.
    fn partitions(&self) -> AceResult<Vec<(NaiveDate, PathBuf)>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| io_error("list", &self.root, e))?;
        let mut partitions: Vec<(NaiveDate, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                NaiveDate::parse_from_str(&name, PARTITION_FORMAT)
                    .ok()
                    .map(|date| (date, entry.path()))
            })
            .collect();
        partitions.sort();
        Ok(partitions)
    }

    /// Trace documents inside one day partition, optionally for one agent.
    fn documents(partition: &Path, agent: Option<&str>) -> Vec<PathBuf> {
        let agent_dirs: Vec<PathBuf> = match agent {
            Some(name) => vec![partition.join(slugify(name))],
            None => fs::read_dir(partition)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .map(|e| e.path())
                        .filter(|p| p.is_dir())
                        .collect()
                })
                .unwrap_or_default(),
        };

        agent_dirs
            .iter()
            .filter_map(|dir| fs::read_dir(dir).ok())
            .flat_map(|entries| entries.filter_map(Result::ok).map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    fn load_partition(partition: &Path, agent: Option<&str>) -> Vec<ExecutionTrace> {
        Self::documents(partition, agent)
            .into_iter()
            .filter_map(|path| match read_json::<ExecutionTrace>(&path) {
                Ok(trace) => Some(trace),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable trace");
                    None
                }
            })
            .filter(|trace| agent.map_or(true, |name| trace.agent.name == name))
            .collect()
    }

    fn find_in_partition(partition: &Path, trace_id: &TraceId) -> Option<PathBuf> {
        let file_name = format!("{trace_id}.json");
        fs::read_dir(partition)
            .ok()?
            .filter_map(Result::ok)
            .map(|entry| entry.path().join(&file_name))
            .find(|candidate| candidate.is_file())
    }
}

fn sort_oldest_first(traces: &mut [ExecutionTrace]) {
    traces.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.trace_id.cmp(&b.trace_id))
    });
}

impl TraceStore for FsTraceStore {
    fn write(&self, trace: &ExecutionTrace) -> AceResult<PathBuf> {
        trace.validate()?;
        let path = self.trace_path(trace);
        write_json(&path, trace)?;

        let markdown_path = path.with_extension("md");
        if let Err(e) = write_atomic(&markdown_path, render_trace_markdown(trace).as_bytes()) {
            warn!(trace_id = %trace.trace_id, error = %e, "trace markdown not written");
        }

        debug!(trace_id = %trace.trace_id, path = %path.display(), "trace written");
        Ok(path)
    }

    fn read(&self, trace_id: &TraceId, date_hint: Option<&str>) -> AceResult<ExecutionTrace> {
        let mut hinted: Vec<String> = date_hint.map(str::to_string).into_iter().collect();
        if let Some(own) = trace_id.date_hint() {
            if !hinted.contains(&own) {
                hinted.push(own);
            }
        }

        for date in &hinted {
            if let Some(path) = Self::find_in_partition(&self.root.join(date), trace_id) {
                return read_json(&path);
            }
        }

        for (_, partition) in self.partitions()? {
            if let Some(path) = Self::find_in_partition(&partition, trace_id) {
                return read_json(&path);
            }
        }

        Err(AceError::not_found("trace", trace_id.as_str()))
    }

    fn list(&self, date: Option<&str>, agent: Option<&str>) -> AceResult<Vec<ExecutionTrace>> {
        let partitions: Vec<PathBuf> = match date {
            Some(day) => vec![self.root.join(day)],
            None => self.partitions()?.into_iter().map(|(_, p)| p).collect(),
        };
        let mut traces: Vec<ExecutionTrace> = partitions
            .iter()
            .flat_map(|p| Self::load_partition(p, agent))
            .collect();
        sort_oldest_first(&mut traces);
        Ok(traces)
    }

    fn since(&self, hours: u32, agent: Option<&str>) -> AceResult<Vec<ExecutionTrace>> {
        let cutoff = Utc::now() - Duration::hours(i64::from(hours));
        let first_day = cutoff.date_naive();
        let mut traces: Vec<ExecutionTrace> = self
            .partitions()?
            .into_iter()
            .filter(|(day, _)| *day >= first_day)
            .flat_map(|(_, p)| Self::load_partition(&p, agent))
            .filter(|trace| trace.created_at >= cutoff)
            .collect();
        sort_oldest_first(&mut traces);
        Ok(traces)
    }

    fn latest(&self, n: usize, agent: Option<&str>) -> AceResult<Vec<ExecutionTrace>> {
        let mut traces = Vec::new();
        // Walk partitions newest first and stop as soon as enough are found.
        for (_, partition) in self.partitions()?.into_iter().rev() {
            let mut day = Self::load_partition(&partition, agent);
            sort_oldest_first(&mut day);
            traces.extend(day.into_iter().rev());
            if traces.len() >= n {
                break;
            }
        }
        traces.truncate(n);
        Ok(traces)
    }

    fn purge(&self, older_than_days: u32) -> AceResult<usize> {
        let cutoff = (Utc::now() - Duration::days(i64::from(older_than_days))).date_naive();
        let mut removed = 0;
        for (day, partition) in self.partitions()? {
            if day >= cutoff {
                continue;
            }
            removed += Self::documents(&partition, None).len();
            fs::remove_dir_all(&partition).map_err(|e| io_error("remove", &partition, e))?;
            info!(partition = %day, "trace partition purged");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;

    use ace_contracts::{
        agent::{AgentIdentity, TraceId},
        error::ErrorKind,
        trace::{DelegationHop, Execution, ExecutionStatus, ExecutionTrace, ExternalObservation, InternalObservation},
    };
    use ace_core::{trace_id::format_trace_id, traits::TraceStore};

    use super::FsTraceStore;

    fn trace_at(agent: &str, created_at: DateTime<Utc>) -> ExecutionTrace {
        let trace_id = format_trace_id(&created_at);
        ExecutionTrace {
            trace_id: trace_id.clone(),
            created_at,
            agent: AgentIdentity::named(agent),
            request: "summarize the changelog".to_string(),
            playbook_snapshot: "no existing playbook".to_string(),
            executions: vec![Execution {
                sequence: 1,
                external: ExternalObservation::default(),
                internal: InternalObservation::default(),
                status: ExecutionStatus::Success,
                errors: vec![],
                duration_secs: 1.2,
                resource_usage: 10,
                output_preview: "done".to_string(),
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

    fn hours_ago(hours: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(hours)
    }

    #[test]
    fn write_creates_json_and_markdown_under_day_partition() {
        let dir = TempDir::new().unwrap();
        let store = FsTraceStore::new(dir.path());
        let created = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let trace = trace_at("docs-writer", created);

        let path = store.write(&trace).unwrap();

        assert!(path.starts_with(dir.path().join("2025-03-14").join("docs-writer")));
        assert!(path.is_file());
        assert!(path.with_extension("md").is_file());
        let back = store.read(&trace.trace_id, None).unwrap();
        assert_eq!(back, trace);
    }

    #[test]
    fn markdown_failure_does_not_fail_the_write() {
        let dir = TempDir::new().unwrap();
        let store = FsTraceStore::new(dir.path());
        let created = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let trace = trace_at("docs-writer", created);
        let blocked = dir
            .path()
            .join("2025-03-14")
            .join("docs-writer")
            .join(format!("{}.md", trace.trace_id));
        std::fs::create_dir_all(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "occupied").unwrap();

        let path = store.write(&trace).unwrap();

        assert!(path.is_file());
        assert!(blocked.is_dir());
        assert_eq!(store.read(&trace.trace_id, Some("2025-03-14")).unwrap(), trace);
    }

    #[test]
    fn read_falls_back_to_scanning_when_hint_is_wrong() {
        let dir = TempDir::new().unwrap();
        let store = FsTraceStore::new(dir.path());
        let trace = trace_at("docs-writer", hours_ago(1));
        store.write(&trace).unwrap();

        let back = store.read(&trace.trace_id, Some("1999-01-01")).unwrap();
        assert_eq!(back.trace_id, trace.trace_id);
    }

    #[test]
    fn read_missing_trace_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsTraceStore::new(dir.path());
        let err = store
            .read(&TraceId::new("trace_20240101_000000_000000"), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn invalid_trace_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FsTraceStore::new(dir.path());
        let mut trace = trace_at("docs-writer", hours_ago(1));
        trace.executions.clear();

        let err = store.write(&trace).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn list_since_and_latest_filter_and_order() {
        let dir = TempDir::new().unwrap();
        let store = FsTraceStore::new(dir.path());
        let old = trace_at("docs-writer", hours_ago(72));
        let recent = trace_at("docs-writer", hours_ago(2));
        let newest = trace_at("docs-writer", hours_ago(1));
        let other = trace_at("test-engineer", hours_ago(1) + chrono::Duration::seconds(5));
        for t in [&old, &recent, &newest, &other] {
            store.write(t).unwrap();
        }

        let all = store.list(None, Some("docs-writer")).unwrap();
        let ids: Vec<&TraceId> = all.iter().map(|t| &t.trace_id).collect();
        assert_eq!(ids, vec![&old.trace_id, &recent.trace_id, &newest.trace_id]);

        let day = store
            .list(Some(&other.partition_date()), Some("test-engineer"))
            .unwrap();
        assert_eq!(day.len(), 1);

        let since = store.since(24, Some("docs-writer")).unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].trace_id, recent.trace_id);

        let latest = store.latest(2, None).unwrap();
        assert_eq!(latest[0].trace_id, other.trace_id);
        assert_eq!(latest[1].trace_id, newest.trace_id);
    }

    #[test]
    fn purge_removes_only_old_partitions() {
        let dir = TempDir::new().unwrap();
        let store = FsTraceStore::new(dir.path());
        let ancient = trace_at("docs-writer", Utc::now() - chrono::Duration::days(40));
        let fresh = trace_at("docs-writer", hours_ago(1));
        store.write(&ancient).unwrap();
        store.write(&fresh).unwrap();

        let removed = store.purge(30).unwrap();

        assert_eq!(removed, 1);
        assert!(!dir.path().join(ancient.partition_date()).exists());
        assert_eq!(store.list(None, None).unwrap().len(), 1);
    }
}
