//! The reflection stage.
//!
//! A `Reflector` turns a batch of one agent's traces into candidate deltas:
//!
//!   Select traces → Render playbook → [InsightExtractor::extract]
//!     → Parse (strict, then lenient) → Fill defaults
//!     → Add satisfaction deltas → Write delta file
//!
//! It also owns satisfaction propagation down delegation chains, since the
//! propagated records are what the satisfaction path later reads.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::Arc,
};

use tracing::{debug, info, warn};

use ace_config::AceConfig;
use ace_contracts::{
    agent::{AgentIdentity, TraceId},
    delta::{DeltaFile, DeltaItem},
    error::{AceError, AceResult},
    events::PipelineEvent,
    trace::{ExecutionTrace, UserSatisfaction},
};
use ace_core::traits::{DeltaStore, InsightExtractor, PlaybookStore, TraceStore};

use crate::{
    defaults::{finalize, raw_analysis_delta},
    parse::{ParsedResponse, ResponseParser},
    prompt::build_prompt,
    satisfaction::satisfaction_deltas,
};

/// Which traces a reflection run looks at. Exactly one form is allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceSelector {
    Ids(Vec<TraceId>),
    /// Traces from the last N hours.
    Hours(u32),
    /// The N most recent traces.
    Latest(usize),
}

impl TraceSelector {
    /// Build a selector from optional inputs.
    ///
    /// Returns `AceError::Validation` unless exactly one is supplied.
    pub fn from_options(
        ids: Option<Vec<TraceId>>,
        hours: Option<u32>,
        latest: Option<usize>,
    ) -> AceResult<Self> {
        match (ids, hours, latest) {
            (Some(ids), None, None) => Ok(TraceSelector::Ids(ids)),
            (None, Some(hours), None) => Ok(TraceSelector::Hours(hours)),
            (None, None, Some(n)) => Ok(TraceSelector::Latest(n)),
            (None, None, None) => Err(AceError::validation(
                "a trace selector is required: trace ids, hours, or latest",
            )),
            _ => Err(AceError::validation(
                "trace selectors are mutually exclusive: pass only one of trace ids, hours, or latest",
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReflectorSettings {
    /// Emit `CurationDue` after every delta file written.
    pub auto_curate: bool,
}

impl ReflectorSettings {
    pub fn from_config(config: &AceConfig) -> Self {
        Self {
            auto_curate: config.auto_curate,
        }
    }
}

/// Result of a full reflection run.
#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    pub trace_ids: Vec<TraceId>,
    pub deltas: Vec<DeltaItem>,
    /// Where the delta file went; `None` when there was nothing to write.
    pub delta_file: Option<PathBuf>,
    pub events: Vec<PipelineEvent>,
}

/// Result of pushing a satisfaction record down the delegation graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Propagation {
    pub updated: usize,
    pub events: Vec<PipelineEvent>,
}

pub struct Reflector {
    agent: AgentIdentity,
    traces: Arc<dyn TraceStore>,
    deltas: Arc<dyn DeltaStore>,
    playbooks: Arc<dyn PlaybookStore>,
    extractor: Box<dyn InsightExtractor>,
    parser: ResponseParser,
    settings: ReflectorSettings,
}

impl Reflector {
    pub fn new(
        agent: AgentIdentity,
        traces: Arc<dyn TraceStore>,
        deltas: Arc<dyn DeltaStore>,
        playbooks: Arc<dyn PlaybookStore>,
        extractor: Box<dyn InsightExtractor>,
        settings: ReflectorSettings,
    ) -> AceResult<Self> {
        Ok(Self {
            agent,
            traces,
            deltas,
            playbooks,
            extractor,
            parser: ResponseParser::new()?,
            settings,
        })
    }

    /// Extract candidate deltas from the selected traces.
    ///
    /// An empty selection returns no deltas without calling the extractor.
    /// Extractor errors (missing credential, failed call) propagate; a
    /// malformed response does not.
    pub fn analyze_traces(&self, selector: &TraceSelector) -> AceResult<Vec<DeltaItem>> {
        let traces = self.select(selector)?;
        self.analyze(&traces)
    }

    /// Analyze, add satisfaction deltas, and write the delta file.
    pub fn run(&self, selector: &TraceSelector) -> AceResult<ReflectionOutcome> {
        let traces = self.select(selector)?;
        let trace_ids: Vec<TraceId> = traces.iter().map(|t| t.trace_id.clone()).collect();

        let mut deltas = self.analyze(&traces)?;
        deltas.extend(satisfaction_deltas(&traces));

        if deltas.is_empty() {
            info!(agent = %self.agent.name, traces = traces.len(), "reflection produced no deltas");
            return Ok(ReflectionOutcome {
                trace_ids,
                deltas,
                delta_file: None,
                events: Vec::new(),
            });
        }

        let file = DeltaFile::new(&self.agent.name, trace_ids.clone(), deltas);
        let path = self.deltas.write(&file)?;
        info!(
            agent = %self.agent.name,
            traces = trace_ids.len(),
            deltas = file.deltas.len(),
            path = %path.display(),
            "delta file written"
        );

        let mut events = vec![PipelineEvent::DeltasWritten {
            agent: self.agent.name.clone(),
            path: path.display().to_string(),
            count: file.deltas.len(),
        }];
        if self.settings.auto_curate {
            events.push(PipelineEvent::CurationDue {
                agent: self.agent.name.clone(),
            });
        }

        Ok(ReflectionOutcome {
            trace_ids,
            deltas: file.deltas,
            delta_file: Some(path),
            events,
        })
    }

    /// Copy a trace's satisfaction record onto its descendants.
    ///
    /// Returns the number of traces updated.
    pub fn propagate_satisfaction(&self, trace_id: &TraceId) -> AceResult<usize> {
        self.propagate_with_events(trace_id).map(|p| p.updated)
    }

    /// As `propagate_satisfaction`, also returning the outbox events.
    ///
    /// Each child that has no record of its own receives a copy of its
    /// parent's record tagged with `propagated_from = parent`. The walk
    /// continues into every child, including those that kept their own
    /// record, which they in turn pass down.
    pub fn propagate_with_events(&self, trace_id: &TraceId) -> AceResult<Propagation> {
        let root = self.traces.read(trace_id, trace_id.date_hint().as_deref())?;
        if root.user_satisfaction.is_none() {
            return Err(AceError::validation(format!(
                "trace '{trace_id}' has no satisfaction record to propagate"
            )));
        }

        let all = self.traces.list(None, None)?;
        let mut children: HashMap<TraceId, Vec<TraceId>> = HashMap::new();
        let mut by_id: HashMap<TraceId, ExecutionTrace> = HashMap::new();
        for trace in all {
            if let Some(parent) = &trace.parent_trace_id {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(trace.trace_id.clone());
            }
            by_id.insert(trace.trace_id.clone(), trace);
        }
        by_id.insert(root.trace_id.clone(), root);

        let mut updated = 0;
        let mut visited: HashSet<TraceId> = HashSet::from([trace_id.clone()]);
        let mut stack: Vec<TraceId> = vec![trace_id.clone()];

        while let Some(parent_id) = stack.pop() {
            let Some(record) = by_id
                .get(&parent_id)
                .and_then(|t| t.user_satisfaction.clone())
            else {
                continue;
            };

            for child_id in children.get(&parent_id).cloned().unwrap_or_default() {
                if !visited.insert(child_id.clone()) {
                    warn!(trace_id = %child_id, "delegation cycle detected; trace already visited");
                    continue;
                }
                if let Some(child) = by_id.get_mut(&child_id) {
                    if child.user_satisfaction.is_none() {
                        child.user_satisfaction = Some(UserSatisfaction {
                            propagated_from: Some(parent_id.clone()),
                            ..record.clone()
                        });
                        self.traces.write(child)?;
                        updated += 1;
                        debug!(from = %parent_id, to = %child_id, "satisfaction propagated");
                    }
                }
                stack.push(child_id);
            }
        }

        info!(trace_id = %trace_id, updated, "satisfaction propagation finished");
        let events = if updated > 0 {
            vec![PipelineEvent::SatisfactionPropagated {
                from: trace_id.clone(),
                updated,
            }]
        } else {
            Vec::new()
        };
        Ok(Propagation { updated, events })
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn select(&self, selector: &TraceSelector) -> AceResult<Vec<ExecutionTrace>> {
        let agent = self.agent.name.as_str();
        let traces = match selector {
            TraceSelector::Ids(ids) => {
                let mut found = Vec::new();
                for id in ids {
                    match self.traces.read(id, id.date_hint().as_deref()) {
                        Ok(trace) if trace.agent.name == agent => found.push(trace),
                        Ok(trace) => {
                            warn!(trace_id = %id, owner = %trace.agent.name, "trace belongs to another agent; skipped");
                        }
                        Err(AceError::NotFound { .. }) => {
                            warn!(trace_id = %id, "trace not found; skipped");
                        }
                        Err(e) => return Err(e),
                    }
                }
                found
            }
            TraceSelector::Hours(hours) => self.traces.since(*hours, Some(agent))?,
            TraceSelector::Latest(n) => self.traces.latest(*n, Some(agent))?,
        };
        debug!(agent, selected = traces.len(), ?selector, "traces selected");
        Ok(traces)
    }

    fn analyze(&self, traces: &[ExecutionTrace]) -> AceResult<Vec<DeltaItem>> {
        if traces.is_empty() {
            return Ok(Vec::new());
        }

        let playbook = self.playbooks.load(&self.agent);
        let snapshot = self.playbooks.render_markdown(&playbook);
        let prompt = build_prompt(&self.agent, traces, &snapshot);

        debug!(agent = %self.agent.name, traces = traces.len(), prompt_chars = prompt.len(), "requesting insights");
        let response = self.extractor.extract(&prompt)?;

        let deltas = match self.parser.parse(&response) {
            ParsedResponse::Structured(raw) => raw.into_iter().map(finalize).collect(),
            ParsedResponse::Unstructured(raw) => {
                let ids: Vec<TraceId> = traces.iter().map(|t| t.trace_id.clone()).collect();
                vec![raw_analysis_delta(raw, &ids)]
            }
        };
        info!(agent = %self.agent.name, deltas = deltas.len(), "insights extracted");
        Ok(deltas)
    }
}
