//! Shared plumbing for the `run-reflection`, `run-curation` and
//! `show-status` binaries.
//!
//! Each binary is a thin clap wrapper around one function here. Capabilities
//! are passed in as factories so a command that has nothing to do never asks
//! for an API key.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ace_config::AceConfig;
use ace_contracts::{
    agent::AgentIdentity,
    error::{AceError, AceResult},
    playbook::Playbook,
};
use ace_core::{
    dispatch_all,
    traits::{DeltaStore, EmbeddingService, InsightExtractor, PlaybookStore, TraceStore},
    LoggingDispatcher,
};
use ace_curate::{CurationOutcome, Curator, CuratorSettings};
use ace_reflect::{ReflectionOutcome, Reflector, ReflectorSettings, TraceSelector};
use ace_store::{FsDeltaStore, FsPlaybookStore, FsTraceStore};

const HISTORY_SHOWN: usize = 10;

/// Install the fmt subscriber. `RUST_LOG` wins; otherwise `warn`, or
/// `debug` with `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .compact()
        .init();
}

/// The three file stores rooted where the configuration says.
pub struct Stores {
    pub traces: Arc<FsTraceStore>,
    pub deltas: Arc<FsDeltaStore>,
    pub playbooks: Arc<FsPlaybookStore>,
}

impl Stores {
    pub fn open(config: &AceConfig) -> Self {
        Self {
            traces: Arc::new(FsTraceStore::new(&config.trace_dir)),
            deltas: Arc::new(FsDeltaStore::new(&config.delta_dir)),
            playbooks: Arc::new(FsPlaybookStore::new(&config.playbook_dir)),
        }
    }
}

// ── run-reflection ────────────────────────────────────────────────────────────

/// Reflect over the agent's traces from the last `hours` hours.
///
/// Returns `Ok(None)` when there are no traces to look at. With `output`,
/// the deltas are also written there as a JSON array.
pub fn reflect(
    config: &AceConfig,
    stores: &Stores,
    agent: &str,
    hours: u32,
    output: Option<&Path>,
    extractor: impl FnOnce() -> AceResult<Box<dyn InsightExtractor>>,
) -> AceResult<Option<ReflectionOutcome>> {
    let traces = stores.traces.since(hours, Some(agent))?;
    if traces.is_empty() {
        return Ok(None);
    }
    info!(agent, hours, traces = traces.len(), "starting reflection");

    let reflector = Reflector::new(
        AgentIdentity::named(agent),
        stores.traces.clone(),
        stores.deltas.clone(),
        stores.playbooks.clone(),
        extractor()?,
        ReflectorSettings::from_config(config),
    )?;
    let outcome = reflector.run(&TraceSelector::Hours(hours))?;

    if let Some(path) = output {
        ace_store::atomic::write_json(path, &outcome.deltas)?;
    }
    dispatch_all(&LoggingDispatcher, &outcome.events);

    if config.retention_days > 0 {
        match stores.traces.purge(config.retention_days) {
            Ok(0) => {}
            Ok(removed) => info!(removed, days = config.retention_days, "old traces purged"),
            Err(e) => warn!(error = %e, "trace retention purge failed"),
        }
    }
    Ok(Some(outcome))
}

pub fn describe_reflection(agent: &str, outcome: &ReflectionOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Reflection for {agent}");
    let _ = writeln!(out, "  traces analyzed: {}", outcome.trace_ids.len());
    let _ = writeln!(out, "  deltas produced: {}", outcome.deltas.len());
    for delta in &outcome.deltas {
        let _ = writeln!(
            out,
            "    [{}] p{} c{:.2} {}",
            delta.insight_type, delta.priority, delta.confidence, delta.title
        );
    }
    match &outcome.delta_file {
        Some(path) => {
            let _ = writeln!(out, "  delta file: {}", path.display());
        }
        None => {
            let _ = writeln!(out, "  delta file: (none written)");
        }
    }
    out
}

// ── run-curation ──────────────────────────────────────────────────────────────

/// Fold delta files into the agent's playbook.
///
/// With no `inputs`, every pending file is consumed. Returns `Ok(None)`
/// when there is nothing to curate.
pub fn curate(
    config: &AceConfig,
    stores: &Stores,
    agent: &str,
    inputs: Vec<PathBuf>,
    max_deltas: Option<usize>,
    embedder: impl FnOnce() -> AceResult<Box<dyn EmbeddingService>>,
) -> AceResult<Option<CurationOutcome>> {
    let explicit = !inputs.is_empty();
    if explicit {
        if let Some(missing) = inputs.iter().find(|p| !p.is_file()) {
            return Err(AceError::not_found("delta file", missing.display().to_string()));
        }
    } else if stores.deltas.pending(agent)?.is_empty() {
        return Ok(None);
    }

    let settings = CuratorSettings {
        max_deltas,
        ..CuratorSettings::from_config(config)
    };
    let mut curator = Curator::new(
        AgentIdentity::named(agent),
        stores.deltas.clone(),
        stores.playbooks.clone(),
        embedder()?,
        settings,
    );
    let outcome = curator.consolidate_deltas(explicit.then_some(inputs))?;
    dispatch_all(&LoggingDispatcher, &outcome.events);
    Ok(Some(outcome))
}

pub fn describe_curation(outcome: &CurationOutcome) -> String {
    let report = &outcome.report;
    let mut out = String::new();
    let _ = writeln!(out, "Curation for {} (playbook v{})", report.agent, report.playbook_version);
    let _ = writeln!(out, "  delta files:  {}", report.delta_files.len());
    if !report.skipped_files.is_empty() {
        let _ = writeln!(out, "  skipped:      {}", report.skipped_files.join(", "));
    }
    let _ = writeln!(out, "  deltas:       {}", report.deltas_processed);
    let _ = writeln!(
        out,
        "  added {} / merged {} / pruned {}",
        report.added, report.merged, report.pruned
    );
    let _ = writeln!(out, "  active bullets: {}", report.active_bullets);
    let _ = writeln!(out, "  playbook: {}", outcome.playbook_path.display());
    let _ = writeln!(out, "  report:   {}", outcome.report_path.display());
    out
}

// ── show-status ───────────────────────────────────────────────────────────────

/// Human-readable playbook status, or `None` if the agent has no playbook.
pub fn status(stores: &Stores, agent: &str, detailed: bool) -> Option<String> {
    if !stores.playbooks.exists(agent) {
        return None;
    }
    let playbook = stores.playbooks.load(&AgentIdentity::named(agent));
    let mut out = summary(&playbook);
    if detailed {
        let _ = writeln!(out, "\n{}", stores.playbooks.render_markdown(&playbook));
        let _ = writeln!(out, "Recent changes:");
        if playbook.history.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for change in playbook.history.iter().rev().take(HISTORY_SHOWN) {
            let _ = writeln!(
                out,
                "  {} v{}: {}",
                change.timestamp.format("%Y-%m-%d %H:%M"),
                change.version,
                change.summary
            );
        }
    }
    Some(out)
}

fn summary(playbook: &Playbook) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Playbook for {}", playbook.agent.name);
    let _ = writeln!(out, "  version:        {}", playbook.version);
    let _ = writeln!(out, "  last updated:   {}", playbook.last_updated.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "  active bullets: {}", playbook.active_count());
    let _ = writeln!(out, "  deprecated:     {}", playbook.deprecated_count());
    let _ = writeln!(out, "  effectiveness:  {:.2}", playbook.effectiveness_score);
    for (category, bullets) in &playbook.categories {
        let active = bullets.iter().filter(|b| b.is_active()).count();
        if active > 0 {
            let _ = writeln!(out, "    {category}: {active}");
        }
    }
    if let Some(health) = &playbook.health {
        let _ = writeln!(
            out,
            "  health: avg helpful {:.2}, effectiveness {:.2}, coverage {:.0}%",
            health.avg_helpful_count,
            health.effectiveness_ratio,
            health.coverage_score * 100.0
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;

    use ace_contracts::{
        agent::TraceId,
        delta::{DeltaFile, DeltaItem, Evidence, InsightType, SuggestedAction},
        trace::{
            DelegationHop, Execution, ExecutionStatus, ExecutionTrace, ExternalObservation,
            InternalObservation,
        },
    };
    use ace_core::trace_id::mint_trace_id;

    use super::*;

    // ── Fixtures ──────────────────────────────────────────────────────────────

    struct CannedExtractor(String);

    impl InsightExtractor for CannedExtractor {
        fn extract(&self, _prompt: &str) -> AceResult<String> {
            Ok(self.0.clone())
        }
    }

    struct FlatEmbedder;

    impl EmbeddingService for FlatEmbedder {
        fn embed(&self, text: &str) -> AceResult<Vec<f32>> {
            Ok(vec![1.0, text.len() as f32 / 1000.0])
        }

        fn model(&self) -> &str {
            "flat"
        }
    }

    fn setup() -> (TempDir, AceConfig, Stores) {
        let dir = TempDir::new().unwrap();
        let config = AceConfig {
            trace_dir: dir.path().join("traces"),
            delta_dir: dir.path().join("deltas"),
            playbook_dir: dir.path().join("playbooks"),
            min_helpful_count: 0,
            ..AceConfig::default()
        };
        let stores = Stores::open(&config);
        (dir, config, stores)
    }

    fn trace(agent: &str) -> ExecutionTrace {
        let (trace_id, created_at) = mint_trace_id();
        ExecutionTrace {
            trace_id: trace_id.clone(),
            created_at,
            agent: AgentIdentity::named(agent),
            request: "Document the API".to_string(),
            playbook_snapshot: "no existing playbook".to_string(),
            executions: vec![Execution {
                sequence: 1,
                external: ExternalObservation::default(),
                internal: InternalObservation::default(),
                status: ExecutionStatus::Success,
                errors: vec![],
                duration_secs: 1.5,
                resource_usage: 300,
                output_preview: "done".to_string(),
            }],
            comparative: None,
            skip_reason: None,
            user_satisfaction: None,
            delegation_chain: vec![DelegationHop {
                agent: agent.to_string(),
                trace_id,
                timestamp: created_at,
            }],
            parent_trace_id: None,
        }
    }

    fn delta(title: &str) -> DeltaItem {
        DeltaItem {
            id: format!("delta-{title}"),
            insight_type: InsightType::BestPractice,
            title: title.to_string(),
            description: "seen twice".to_string(),
            recommendation: "Write the migration first".to_string(),
            evidence: vec![Evidence {
                trace_id: TraceId::new("trace_a"),
                execution: 1,
                example: String::new(),
            }],
            applicability: String::new(),
            priority: 3,
            confidence: 0.8,
            action: SuggestedAction::AddNew,
        }
    }

    // ── run-reflection ────────────────────────────────────────────────────────

    #[test]
    fn reflection_without_traces_never_builds_an_extractor() {
        let (_dir, config, stores) = setup();
        let called = Mutex::new(false);

        let outcome = reflect(&config, &stores, "docs-writer", 24, None, || {
            *called.lock().unwrap() = true;
            Err(AceError::validation("should not be built"))
        })
        .unwrap();

        assert!(outcome.is_none());
        assert!(!*called.lock().unwrap());
    }

    #[test]
    fn reflection_writes_delta_file_and_output_copy() {
        let (dir, config, stores) = setup();
        stores.traces.write(&trace("docs-writer")).unwrap();
        let output = dir.path().join("reports").join("out.json");
        let response = r#"```json
[{"insight_type": "best_practice", "title": "Link examples", "description": "Examples helped",
  "recommendation": "Link runnable examples", "evidence": [], "priority": 3, "confidence": 0.7}]
```"#;

        let outcome = reflect(&config, &stores, "docs-writer", 24, Some(&output), || {
            Ok(Box::new(CannedExtractor(response.to_string())) as Box<dyn InsightExtractor>)
        })
        .unwrap()
        .unwrap();

        assert_eq!(outcome.deltas.len(), 1);
        assert!(outcome.delta_file.as_ref().unwrap().is_file());
        let copied: Vec<DeltaItem> = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(copied[0].title, "Link examples");
        let leftovers: Vec<_> = std::fs::read_dir(output.parent().unwrap()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
        assert!(describe_reflection("docs-writer", &outcome).contains("deltas produced: 1"));
    }

    // ── run-curation ──────────────────────────────────────────────────────────

    #[test]
    fn curation_without_delta_files_is_none() {
        let (_dir, config, stores) = setup();
        let outcome = curate(&config, &stores, "docs-writer", vec![], None, || {
            Err(AceError::validation("should not be built"))
        })
        .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn curation_consumes_pending_files_then_status_reports() {
        let (_dir, config, stores) = setup();
        assert!(status(&stores, "docs-writer", false).is_none());
        stores
            .deltas
            .write(&DeltaFile::new("docs-writer", vec![TraceId::new("trace_a")], vec![delta("Migrations")]))
            .unwrap();

        let outcome = curate(&config, &stores, "docs-writer", vec![], None, || {
            Ok(Box::new(FlatEmbedder) as Box<dyn EmbeddingService>)
        })
        .unwrap()
        .unwrap();

        assert_eq!(outcome.report.added, 1);
        assert!(stores.deltas.pending("docs-writer").unwrap().is_empty());
        assert!(describe_curation(&outcome).contains("added 1 / merged 0 / pruned 0"));

        let brief = status(&stores, "docs-writer", false).unwrap();
        assert!(brief.contains("version:        1.0.1"));
        assert!(brief.contains("active bullets: 1"));
        assert!(!brief.contains("Recent changes"));

        let detailed = status(&stores, "docs-writer", true).unwrap();
        assert!(detailed.contains("Write the migration first"));
        assert!(detailed.contains("Recent changes"));
    }

    #[test]
    fn missing_input_file_is_not_found() {
        let (dir, config, stores) = setup();
        let err = curate(
            &config,
            &stores,
            "docs-writer",
            vec![dir.path().join("nope.json")],
            None,
            || Ok(Box::new(FlatEmbedder) as Box<dyn EmbeddingService>),
        )
        .unwrap_err();
        assert!(matches!(err, AceError::NotFound { .. }));
    }
}
