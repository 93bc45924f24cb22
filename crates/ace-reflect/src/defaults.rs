//! Turning validated response items into `DeltaItem`s.
//!
//! Items that arrive without a priority or confidence get one derived from
//! their insight type and the amount of evidence behind them. Confidence is
//! assigned first because the optimization priority rule depends on it.

use uuid::Uuid;

use ace_contracts::{
    agent::TraceId,
    delta::{DeltaItem, Evidence, InsightType, SuggestedAction},
};

use crate::parse::{RawAnalysis, RawDelta, RawEvidence};

pub const FALLBACK_PRIORITY: u8 = 3;
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Confidence implied by how many evidence entries support an insight.
pub fn default_confidence(evidence_count: usize) -> f64 {
    match evidence_count {
        0 => 0.4,
        1 => 0.6,
        2 => 0.75,
        _ => 0.9,
    }
}

/// Priority implied by insight type, evidence volume, and confidence.
pub fn default_priority(insight_type: InsightType, evidence_count: usize, confidence: f64) -> u8 {
    match insight_type {
        InsightType::FailureMode => 5,
        InsightType::SuccessPattern if evidence_count >= 2 => 4,
        InsightType::Optimization if confidence >= 0.8 => 4,
        InsightType::BestPractice | InsightType::ToolUsage => 3,
        InsightType::DomainConcept => 2,
        _ => 3,
    }
}

pub fn new_delta_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("delta-{}", &hex[..8])
}

/// Build a `DeltaItem`, filling placeholder priority and confidence.
pub fn finalize(raw: RawDelta) -> DeltaItem {
    let insight_type = raw
        .insight_type
        .as_deref()
        .map(InsightType::parse)
        .unwrap_or(InsightType::RawAnalysis);

    let evidence: Vec<Evidence> = raw
        .evidence
        .unwrap_or_default()
        .into_iter()
        .map(|item| match item {
            RawEvidence::TraceId(id) => Evidence {
                trace_id: TraceId::new(id.trim()),
                execution: 1,
                example: String::new(),
            },
            RawEvidence::Detailed {
                trace_id,
                execution,
                example,
            } => Evidence {
                trace_id: TraceId::new(trace_id.trim()),
                execution: execution.unwrap_or(1),
                example: example.unwrap_or_default(),
            },
        })
        .collect();

    let confidence = raw
        .confidence
        .unwrap_or_else(|| default_confidence(evidence.len()))
        .clamp(0.0, 1.0);
    let priority = match raw.priority {
        Some(p) if p > 0 => p.min(5),
        _ => default_priority(insight_type, evidence.len(), confidence),
    };

    let recommendation = raw
        .recommendation
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| raw.description.clone());

    DeltaItem {
        id: new_delta_id(),
        insight_type,
        title: raw.title.trim().to_string(),
        description: raw.description.trim().to_string(),
        recommendation,
        evidence,
        applicability: raw.applicability.unwrap_or_default(),
        priority,
        confidence,
        action: raw
            .suggested_action
            .map(SuggestedAction::from)
            .unwrap_or(SuggestedAction::AddNew),
    }
}

/// The single delta emitted when a response could not be parsed.
pub fn raw_analysis_delta(raw: RawAnalysis, analyzed: &[TraceId]) -> DeltaItem {
    DeltaItem {
        id: new_delta_id(),
        insight_type: InsightType::RawAnalysis,
        title: raw
            .title
            .unwrap_or_else(|| "Unstructured reflection output".to_string()),
        description: raw.excerpt,
        recommendation: raw
            .recommendation
            .unwrap_or_else(|| "Review the raw analysis and restate it as concrete guidance".to_string()),
        evidence: analyzed
            .iter()
            .map(|id| Evidence {
                trace_id: id.clone(),
                execution: 1,
                example: String::new(),
            })
            .collect(),
        applicability: String::new(),
        priority: FALLBACK_PRIORITY,
        confidence: FALLBACK_CONFIDENCE,
        action: SuggestedAction::AddNew,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(insight_type: &str, evidence: &[&str]) -> RawDelta {
        RawDelta {
            insight_type: Some(insight_type.to_string()),
            title: "Title".to_string(),
            description: "Description".to_string(),
            recommendation: None,
            evidence: Some(evidence.iter().map(|e| RawEvidence::TraceId(e.to_string())).collect()),
            applicability: None,
            priority: None,
            confidence: None,
            suggested_action: None,
        }
    }

    #[test]
    fn confidence_tracks_evidence_count() {
        assert_eq!(finalize(raw("best_practice", &[])).confidence, 0.4);
        assert_eq!(finalize(raw("best_practice", &["t1"])).confidence, 0.6);
        assert_eq!(finalize(raw("best_practice", &["t1", "t2"])).confidence, 0.75);
        assert_eq!(finalize(raw("best_practice", &["t1", "t2", "t3"])).confidence, 0.9);
        // Each citation counts, even when two point at the same trace.
        assert_eq!(finalize(raw("best_practice", &["t1", "t1"])).confidence, 0.75);
    }

    #[test]
    fn two_executions_of_one_trace_count_as_two_entries() {
        let mut item = raw("failure_mode", &[]);
        item.evidence = Some(vec![
            RawEvidence::Detailed {
                trace_id: "trace_a".to_string(),
                execution: Some(1),
                example: None,
            },
            RawEvidence::Detailed {
                trace_id: "trace_a".to_string(),
                execution: Some(2),
                example: Some("timed out again".to_string()),
            },
        ]);

        let delta = finalize(item);

        assert_eq!(delta.priority, 5);
        assert_eq!(delta.confidence, 0.75);
        assert_eq!(delta.evidence.len(), 2);
        assert_eq!(delta.evidence[1].execution, 2);
    }

    #[test]
    fn priority_follows_type_rules() {
        assert_eq!(finalize(raw("failure_mode", &[])).priority, 5);
        assert_eq!(finalize(raw("success_pattern", &["t1", "t2"])).priority, 4);
        assert_eq!(finalize(raw("success_pattern", &["t1"])).priority, 3);
        // Three traces give confidence 0.9, which makes the optimization high priority.
        assert_eq!(finalize(raw("optimization", &["t1", "t2", "t3"])).priority, 4);
        assert_eq!(finalize(raw("optimization", &["t1"])).priority, 3);
        assert_eq!(finalize(raw("tool_usage", &[])).priority, 3);
        assert_eq!(finalize(raw("domain_concept", &[])).priority, 2);
        assert_eq!(finalize(raw("something_new", &[])).priority, 3);
    }

    #[test]
    fn explicit_values_are_kept() {
        let mut item = raw("failure_mode", &["t1"]);
        item.priority = Some(2);
        item.confidence = Some(0.55);
        item.recommendation = Some("Retry with backoff".to_string());
        item.suggested_action = Some("mark_harmful".to_string());

        let delta = finalize(item);

        assert_eq!(delta.priority, 2);
        assert_eq!(delta.confidence, 0.55);
        assert_eq!(delta.recommendation, "Retry with backoff");
        assert_eq!(delta.action, SuggestedAction::MarkHarmful);
    }

    #[test]
    fn zero_priority_is_a_placeholder() {
        let mut item = raw("domain_concept", &[]);
        item.priority = Some(0);
        assert_eq!(finalize(item).priority, 2);
    }

    #[test]
    fn raw_analysis_uses_fixed_low_confidence() {
        let delta = raw_analysis_delta(
            RawAnalysis {
                title: None,
                recommendation: None,
                excerpt: "free text".to_string(),
            },
            &[TraceId::new("trace_a")],
        );

        assert_eq!(delta.insight_type, InsightType::RawAnalysis);
        assert_eq!(delta.priority, 3);
        assert_eq!(delta.confidence, 0.3);
        assert_eq!(delta.description, "free text");
        assert_eq!(delta.evidence.len(), 1);
    }
}
