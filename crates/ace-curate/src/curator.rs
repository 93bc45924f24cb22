//! The curation stage.
//!
//! One `consolidate_deltas` call is one curation session:
//!
//!   Discover/read delta files → Load playbook
//!     → for each delta: embed → match within category → merge | insert
//!     → Prune → Health → Version/history → Save → Report → Archive
//!
//! Delta files are archived only after the playbook has been saved, so a
//! crash mid-session leaves them pending for the next run.

use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ace_config::AceConfig;
use ace_contracts::{
    agent::AgentIdentity,
    delta::{DeltaFile, DeltaItem, SuggestedAction},
    error::AceResult,
    events::PipelineEvent,
    playbook::{CurationReport, Playbook, PlaybookBullet, PlaybookChange},
};
use ace_core::traits::{DeltaStore, EmbeddingService, PlaybookStore};

use crate::{
    cache::EmbeddingCache,
    health::compute_health,
    prune::{prune, PruneSettings},
    similarity::cosine_similarity,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CuratorSettings {
    /// A delta merges only when similarity is strictly above this.
    pub similarity_threshold: f64,
    pub pruning_rate: f64,
    pub min_helpful_count: u32,
    pub max_bullets: usize,
    /// Cap on deltas consumed per session.
    pub max_deltas: Option<usize>,
}

impl Default for CuratorSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            pruning_rate: 0.10,
            min_helpful_count: 2,
            max_bullets: 150,
            max_deltas: None,
        }
    }
}

impl CuratorSettings {
    pub fn from_config(config: &AceConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            pruning_rate: config.pruning_rate,
            min_helpful_count: config.min_helpful_count,
            max_bullets: config.max_bullets,
            max_deltas: None,
        }
    }

    fn prune_settings(&self) -> PruneSettings {
        PruneSettings {
            min_helpful_count: self.min_helpful_count,
            max_bullets: self.max_bullets,
            pruning_rate: self.pruning_rate,
        }
    }
}

/// What happened to one delta.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaDisposition {
    Merged { bullet_id: String, similarity: f64 },
    Inserted { bullet_id: String },
    /// A `mark_harmful` delta with nothing to mark.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct CurationOutcome {
    pub playbook: Playbook,
    pub report: CurationReport,
    pub playbook_path: PathBuf,
    pub report_path: PathBuf,
    pub archived: Vec<PathBuf>,
    pub events: Vec<PipelineEvent>,
}

pub struct Curator {
    agent: AgentIdentity,
    deltas: Arc<dyn DeltaStore>,
    playbooks: Arc<dyn PlaybookStore>,
    embedder: Box<dyn EmbeddingService>,
    cache: EmbeddingCache,
    settings: CuratorSettings,
}

impl Curator {
    pub fn new(
        agent: AgentIdentity,
        deltas: Arc<dyn DeltaStore>,
        playbooks: Arc<dyn PlaybookStore>,
        embedder: Box<dyn EmbeddingService>,
        settings: CuratorSettings,
    ) -> Self {
        Self {
            agent,
            deltas,
            playbooks,
            embedder,
            cache: EmbeddingCache::new(),
            settings,
        }
    }

    /// Replace the embedding cache, e.g. with one shared across curators.
    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Run one curation session.
    ///
    /// With `delta_files = None` every pending file for the agent is
    /// consumed and archived afterwards. Explicitly listed files are read
    /// but left where they are.
    ///
    /// # Errors
    ///
    /// Embedding failures and store write failures propagate. A delta file
    /// that cannot be read is skipped with a warning.
    pub fn consolidate_deltas(&mut self, delta_files: Option<Vec<PathBuf>>) -> AceResult<CurationOutcome> {
        let discovered = delta_files.is_none();
        let paths = match delta_files {
            Some(paths) => paths,
            None => self.deltas.pending(&self.agent.name)?,
        };

        // ── Step 1: Read delta files ─────────────────────────────────────────
        let mut files: Vec<(PathBuf, DeltaFile)> = Vec::new();
        let mut skipped_files = Vec::new();
        for path in paths {
            match self.deltas.read(&path) {
                Ok(file) => files.push((path, file)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable delta file");
                    skipped_files.push(path.display().to_string());
                }
            }
        }
        let (consumed, batch) = self.take_batch(files);

        // ── Step 2: Merge or insert each delta ───────────────────────────────
        let mut playbook = self.playbooks.load(&self.agent);
        let (mut added, mut merged) = (0, 0);
        for delta in &batch {
            match self.apply_delta(&mut playbook, delta)? {
                DeltaDisposition::Merged { bullet_id, similarity } => {
                    debug!(delta = %delta.id, bullet = %bullet_id, similarity, "delta merged");
                    merged += 1;
                }
                DeltaDisposition::Inserted { bullet_id } => {
                    debug!(delta = %delta.id, bullet = %bullet_id, "delta inserted");
                    added += 1;
                }
                DeltaDisposition::Skipped => {
                    debug!(delta = %delta.id, "harmful mark matched no bullet; skipped");
                }
            }
        }

        // ── Step 3: Prune ────────────────────────────────────────────────────
        let pruned = prune(&mut playbook, self.settings.prune_settings()).total();

        // ── Step 4: Health, version, history ─────────────────────────────────
        let health = compute_health(&playbook, added, merged, pruned);
        let now = Utc::now();
        playbook.total_bullets = health.total_bullets;
        playbook.effectiveness_score = health.effectiveness_ratio;
        playbook.last_updated = now;
        if added + merged + pruned > 0 {
            playbook.bump_version();
            playbook.history.push(PlaybookChange {
                timestamp: now,
                version: playbook.version.clone(),
                added,
                merged,
                pruned,
                summary: format!(
                    "{} deltas from {} files: {added} added, {merged} merged, {pruned} pruned",
                    batch.len(),
                    consumed.len()
                ),
            });
        }
        update_statistics(&mut playbook, batch.len());
        playbook.health = Some(health.clone());

        // ── Step 5: Persist ──────────────────────────────────────────────────
        let playbook_path = self.playbooks.save(&playbook)?;
        let report = CurationReport {
            agent: self.agent.name.clone(),
            timestamp: now,
            playbook_version: playbook.version.clone(),
            delta_files: consumed.iter().map(|p| p.display().to_string()).collect(),
            skipped_files,
            deltas_processed: batch.len(),
            added,
            merged,
            pruned,
            active_bullets: playbook.active_count(),
            health,
        };
        let report_path = self.playbooks.write_report(&report)?;

        // ── Step 6: Archive consumed files ───────────────────────────────────
        let mut archived = Vec::new();
        if discovered {
            for path in &consumed {
                match self.deltas.archive(path) {
                    Ok(target) => archived.push(target),
                    Err(e) => warn!(path = %path.display(), error = %e, "delta file not archived"),
                }
            }
        }

        info!(
            agent = %self.agent.name,
            version = %playbook.version,
            added,
            merged,
            pruned,
            active = playbook.active_count(),
            "curation session complete"
        );

        let events = vec![PipelineEvent::PlaybookUpdated {
            agent: self.agent.name.clone(),
            version: playbook.version.clone(),
            active_bullets: playbook.active_count(),
        }];

        Ok(CurationOutcome {
            playbook,
            report,
            playbook_path,
            report_path,
            archived,
            events,
        })
    }

    /// Match `delta` against its category and merge or insert it.
    pub fn apply_delta(&mut self, playbook: &mut Playbook, delta: &DeltaItem) -> AceResult<DeltaDisposition> {
        let query = self.cache.get_or_compute(&delta.match_text(), self.embedder.as_ref())?;

        let category = playbook.category_mut(delta.insight_type);
        let mut best: Option<(usize, f64)> = None;
        for (index, bullet) in category.iter_mut().enumerate() {
            if !bullet.is_active() {
                continue;
            }
            let vector = match &bullet.embedding {
                Some(vector) => vector.clone(),
                None => {
                    let vector = self.cache.get_or_compute(&bullet.content, self.embedder.as_ref())?;
                    bullet.embedding = Some(vector.clone());
                    vector
                }
            };
            let similarity = cosine_similarity(&query, &vector);
            if similarity > self.settings.similarity_threshold
                && best.map_or(true, |(_, top)| similarity > top)
            {
                best = Some((index, similarity));
            }
        }

        if let Some((index, similarity)) = best {
            let bullet = &mut category[index];
            merge_into(bullet, delta);
            return Ok(DeltaDisposition::Merged {
                bullet_id: bullet.id.clone(),
                similarity,
            });
        }

        if delta.action == SuggestedAction::MarkHarmful {
            return Ok(DeltaDisposition::Skipped);
        }

        let content = if delta.recommendation.trim().is_empty() {
            delta.description.clone()
        } else {
            delta.recommendation.clone()
        };
        let embedding = self.cache.get_or_compute(&content, self.embedder.as_ref())?;
        let bullet = new_bullet(delta, content, embedding);
        let bullet_id = bullet.id.clone();
        playbook.category_mut(delta.insight_type).push(bullet);
        Ok(DeltaDisposition::Inserted { bullet_id })
    }

    /// Flatten files into one delta batch, honouring `max_deltas`.
    ///
    /// Files are taken whole while they fit under the cap. A first file that
    /// alone exceeds the cap is truncated and counts as consumed.
    fn take_batch(&self, files: Vec<(PathBuf, DeltaFile)>) -> (Vec<PathBuf>, Vec<DeltaItem>) {
        let mut consumed = Vec::new();
        let mut batch: Vec<DeltaItem> = Vec::new();
        for (path, file) in files {
            if let Some(cap) = self.settings.max_deltas {
                if batch.len() + file.deltas.len() > cap {
                    if consumed.is_empty() {
                        let dropped = file.deltas.len().saturating_sub(cap);
                        warn!(path = %path.display(), cap, dropped, "delta file exceeds max_deltas; truncated");
                        batch.extend(file.deltas.into_iter().take(cap));
                        consumed.push(path);
                    } else {
                        debug!(path = %path.display(), cap, "max_deltas reached; file left pending");
                    }
                    break;
                }
            }
            batch.extend(file.deltas);
            consumed.push(path);
        }
        (consumed, batch)
    }
}

/// Fold a matching delta into an existing bullet.
///
/// Confidence becomes the running mean `(old * (n - 1) + new) / n`, where n
/// is helpful + harmful after this delta is counted. Only supporting deltas
/// can raise the bullet's priority.
pub fn merge_into(bullet: &mut PlaybookBullet, delta: &DeltaItem) {
    if delta.action == SuggestedAction::MarkHarmful {
        bullet.harmful_count += 1;
    } else {
        bullet.helpful_count += 1;
        bullet.priority = bullet.priority.max(delta.priority);
    }
    let n = f64::from(bullet.helpful_count + bullet.harmful_count);
    bullet.confidence = ((bullet.confidence * (n - 1.0) + delta.confidence) / n).clamp(0.0, 1.0);
    for trace_id in delta.evidence_trace_ids() {
        if !bullet.evidence.contains(&trace_id) {
            bullet.evidence.push(trace_id);
        }
    }
    if bullet.applicability.is_empty() && !delta.applicability.is_empty() {
        bullet.applicability = delta.applicability.clone();
    }
    bullet.last_updated = Utc::now();
}

fn new_bullet(delta: &DeltaItem, content: String, embedding: Vec<f32>) -> PlaybookBullet {
    let hex = Uuid::new_v4().simple().to_string();
    let now = Utc::now();
    PlaybookBullet {
        id: format!("{}-{}", delta.insight_type.short_code(), &hex[..8]),
        bullet_type: delta.insight_type,
        content,
        helpful_count: 1,
        harmful_count: 0,
        confidence: delta.confidence,
        priority: delta.priority,
        created_at: now,
        last_updated: now,
        evidence: delta.evidence_trace_ids(),
        applicability: delta.applicability.clone(),
        tags: vec![delta.insight_type.as_str().to_string()],
        embedding: Some(embedding),
        deprecated: false,
        deprecation_reason: None,
    }
}

fn update_statistics(playbook: &mut Playbook, processed: usize) {
    let previous = playbook
        .statistics
        .get("total_deltas_processed")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    let sessions = playbook
        .statistics
        .get("curation_sessions")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    let deprecated = playbook.deprecated_count();
    playbook
        .statistics
        .insert("total_deltas_processed".to_string(), (previous + processed as u64).into());
    playbook
        .statistics
        .insert("curation_sessions".to_string(), (sessions + 1).into());
    playbook
        .statistics
        .insert("deprecated_bullets".to_string(), deprecated.into());
}
