//! The per-agent knowledge base and its health metrics.
//!
//! Bullets are created, merged, or deprecated by curation but never removed:
//! a deprecated bullet stays in the playbook as an audit trail and is simply
//! excluded from matching and rendering.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    agent::{AgentIdentity, TraceId},
    delta::InsightType,
};

/// Version assigned to a playbook that has never been curated.
pub const INITIAL_VERSION: &str = "1.0.0";

/// One persisted knowledge-base entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookBullet {
    pub id: String,
    #[serde(rename = "type")]
    pub bullet_type: InsightType,
    pub content: String,
    pub helpful_count: u32,
    pub harmful_count: u32,
    pub confidence: f64,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Traces that support this bullet, deduplicated.
    #[serde(default)]
    pub evidence: Vec<TraceId>,
    #[serde(default)]
    pub applicability: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Cached embedding of `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub deprecation_reason: Option<String>,
}

impl PlaybookBullet {
    pub fn is_active(&self) -> bool {
        !self.deprecated
    }

    /// helpful / (helpful + harmful), or 0.5 before any interaction.
    pub fn effectiveness(&self) -> f64 {
        let total = self.helpful_count + self.harmful_count;
        if total == 0 {
            0.5
        } else {
            f64::from(self.helpful_count) / f64::from(total)
        }
    }

    /// Retention score used when the playbook is over its size limit.
    pub fn score(&self) -> f64 {
        self.effectiveness() * self.confidence * f64::from(self.priority)
    }

    /// Flag the bullet as deprecated. The bullet itself is kept.
    pub fn deprecate(&mut self, reason: impl Into<String>) {
        self.deprecated = true;
        self.deprecation_reason = Some(reason.into());
        self.last_updated = Utc::now();
    }
}

/// Snapshot of playbook quality after a curation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub total_bullets: usize,
    pub avg_helpful_count: f64,
    /// helpful / (helpful + harmful) over all active bullets.
    pub effectiveness_ratio: f64,
    pub added_this_session: usize,
    pub updated_this_session: usize,
    pub pruned_this_session: usize,
    /// Fraction of `InsightType::EXPECTED` categories with an active bullet.
    pub coverage_score: f64,
    pub computed_at: DateTime<Utc>,
}

/// One entry in a playbook's change history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookChange {
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub added: usize,
    pub merged: usize,
    pub pruned: usize,
    pub summary: String,
}

/// The versioned, categorized knowledge base of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub version: String,
    pub agent: AgentIdentity,
    pub last_updated: DateTime<Utc>,
    /// Number of active bullets.
    pub total_bullets: usize,
    pub effectiveness_score: f64,
    /// Category name (an insight type) to bullets.
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<PlaybookBullet>>,
    #[serde(default)]
    pub statistics: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub health: Option<HealthMetrics>,
    #[serde(default)]
    pub history: Vec<PlaybookChange>,
}

impl Playbook {
    /// A fresh playbook with no bullets.
    pub fn empty(agent: AgentIdentity) -> Self {
        Self {
            version: INITIAL_VERSION.to_string(),
            agent,
            last_updated: Utc::now(),
            total_bullets: 0,
            effectiveness_score: 0.0,
            categories: BTreeMap::new(),
            statistics: BTreeMap::new(),
            health: None,
            history: Vec::new(),
        }
    }

    pub fn active_bullets(&self) -> impl Iterator<Item = &PlaybookBullet> {
        self.categories.values().flatten().filter(|b| b.is_active())
    }

    pub fn active_bullets_mut(&mut self) -> impl Iterator<Item = &mut PlaybookBullet> {
        self.categories
            .values_mut()
            .flatten()
            .filter(|b| b.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active_bullets().count()
    }

    pub fn deprecated_count(&self) -> usize {
        self.categories
            .values()
            .flatten()
            .filter(|b| b.deprecated)
            .count()
    }

    pub fn bullet(&self, id: &str) -> Option<&PlaybookBullet> {
        self.categories.values().flatten().find(|b| b.id == id)
    }

    /// The bullets of one category, created empty if absent.
    pub fn category_mut(&mut self, category: InsightType) -> &mut Vec<PlaybookBullet> {
        self.categories
            .entry(category.as_str().to_string())
            .or_default()
    }

    /// Bump the patch component of the version (`1.0.4` → `1.0.5`).
    ///
    /// Versions that do not end in a number get `.1` appended.
    pub fn bump_version(&mut self) {
        let next = match self.version.rsplit_once('.') {
            Some((head, tail)) => match tail.parse::<u64>() {
                Ok(n) => format!("{head}.{}", n + 1),
                Err(_) => format!("{}.1", self.version),
            },
            None => format!("{}.1", self.version),
        };
        self.version = next;
    }
}

/// Summary of one curation session, written next to the playbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationReport {
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    pub playbook_version: String,
    /// Delta files consumed, in processing order.
    pub delta_files: Vec<String>,
    /// Delta files that could not be parsed and were skipped.
    #[serde(default)]
    pub skipped_files: Vec<String>,
    pub deltas_processed: usize,
    pub added: usize,
    pub merged: usize,
    pub pruned: usize,
    pub active_bullets: usize,
    pub health: HealthMetrics,
}
