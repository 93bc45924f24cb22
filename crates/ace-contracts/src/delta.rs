//! Candidate insights produced by reflection.
//!
//! A `DeltaItem` is not yet knowledge: curation decides whether it merges
//! into an existing playbook bullet, becomes a new one, or is pruned.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::TraceId;

/// The closed vocabulary of insight kinds.
///
/// Insight types double as playbook category names. Strings that do not
/// name a known kind deserialize to `RawAnalysis` instead of creating an
/// orphan category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InsightType {
    SuccessPattern,
    FailureMode,
    Optimization,
    BestPractice,
    ToolUsage,
    DomainConcept,
    RawAnalysis,
}

impl InsightType {
    /// Categories a healthy playbook is expected to cover.
    pub const EXPECTED: [InsightType; 6] = [
        InsightType::SuccessPattern,
        InsightType::FailureMode,
        InsightType::Optimization,
        InsightType::BestPractice,
        InsightType::ToolUsage,
        InsightType::DomainConcept,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::SuccessPattern => "success_pattern",
            InsightType::FailureMode => "failure_mode",
            InsightType::Optimization => "optimization",
            InsightType::BestPractice => "best_practice",
            InsightType::ToolUsage => "tool_usage",
            InsightType::DomainConcept => "domain_concept",
            InsightType::RawAnalysis => "raw_analysis",
        }
    }

    /// Short prefix used in bullet ids.
    pub fn short_code(&self) -> &'static str {
        match self {
            InsightType::SuccessPattern => "sp",
            InsightType::FailureMode => "fm",
            InsightType::Optimization => "op",
            InsightType::BestPractice => "bp",
            InsightType::ToolUsage => "tu",
            InsightType::DomainConcept => "dc",
            InsightType::RawAnalysis => "ra",
        }
    }

    /// Parse leniently: case, spaces and hyphens are ignored.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "success_pattern" | "success" => InsightType::SuccessPattern,
            "failure_mode" | "failure" | "failure_pattern" => InsightType::FailureMode,
            "optimization" | "optimisation" => InsightType::Optimization,
            "best_practice" => InsightType::BestPractice,
            "tool_usage" | "tool_use" => InsightType::ToolUsage,
            "domain_concept" | "domain_knowledge" => InsightType::DomainConcept,
            _ => InsightType::RawAnalysis,
        }
    }
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for InsightType {
    fn from(value: String) -> Self {
        InsightType::parse(&value)
    }
}

impl From<InsightType> for String {
    fn from(value: InsightType) -> Self {
        value.as_str().to_string()
    }
}

/// What reflection suggests curation should do with an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SuggestedAction {
    AddNew,
    UpdateExisting,
    MarkHarmful,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedAction::AddNew => "add_new",
            SuggestedAction::UpdateExisting => "update_existing",
            SuggestedAction::MarkHarmful => "mark_harmful",
        }
    }
}

impl From<String> for SuggestedAction {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "update_existing" | "update" => SuggestedAction::UpdateExisting,
            "mark_harmful" | "harmful" => SuggestedAction::MarkHarmful,
            _ => SuggestedAction::AddNew,
        }
    }
}

impl From<SuggestedAction> for String {
    fn from(value: SuggestedAction) -> Self {
        value.as_str().to_string()
    }
}

/// A pointer from an insight back to the run that shows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub trace_id: TraceId,
    /// Execution sequence number within the trace (1 or 2).
    pub execution: u8,
    pub example: String,
}

/// One candidate insight with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaItem {
    pub id: String,
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub applicability: String,
    /// 1 (low) to 5 (critical).
    pub priority: u8,
    /// In [0, 1].
    pub confidence: f64,
    pub action: SuggestedAction,
}

impl DeltaItem {
    /// Text the curator embeds to look for an existing matching bullet.
    pub fn match_text(&self) -> String {
        format!("{}: {}", self.title, self.description)
    }

    /// Distinct trace ids cited as evidence, in first-seen order.
    pub fn evidence_trace_ids(&self) -> Vec<TraceId> {
        let mut ids: Vec<TraceId> = Vec::new();
        for item in &self.evidence {
            if !ids.contains(&item.trace_id) {
                ids.push(item.trace_id.clone());
            }
        }
        ids
    }
}

/// Header of a persisted delta file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaMetadata {
    pub agent: String,
    pub trace_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub trace_ids: Vec<TraceId>,
}

/// Counts by type/priority and mean confidence of a delta batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<u8, usize>,
    pub mean_confidence: f64,
}

impl DeltaSummary {
    pub fn from_deltas(deltas: &[DeltaItem]) -> Self {
        let mut summary = DeltaSummary {
            total: deltas.len(),
            ..DeltaSummary::default()
        };
        for delta in deltas {
            *summary
                .by_type
                .entry(delta.insight_type.as_str().to_string())
                .or_insert(0) += 1;
            *summary.by_priority.entry(delta.priority).or_insert(0) += 1;
        }
        if !deltas.is_empty() {
            summary.mean_confidence =
                deltas.iter().map(|d| d.confidence).sum::<f64>() / deltas.len() as f64;
        }
        summary
    }
}

/// One reflection run's output, as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaFile {
    pub metadata: DeltaMetadata,
    pub deltas: Vec<DeltaItem>,
    pub summary: DeltaSummary,
}

impl DeltaFile {
    pub fn new(agent: &str, trace_ids: Vec<TraceId>, deltas: Vec<DeltaItem>) -> Self {
        let summary = DeltaSummary::from_deltas(&deltas);
        Self {
            metadata: DeltaMetadata {
                agent: agent.to_string(),
                trace_count: trace_ids.len(),
                created_at: Utc::now(),
                trace_ids,
            },
            deltas,
            summary,
        }
    }
}
