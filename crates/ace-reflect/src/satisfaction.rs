//! Deltas derived directly from user satisfaction.
//!
//! | score | insight          | priority | confidence                          |
//! |-------|------------------|----------|-------------------------------------|
//! | 5     | success_pattern  | 4        | 0.9, or 0.95 with positive feedback |
//! | 4     | success_pattern  | 3        | 0.7                                 |
//! | 3     | (none)           |          |                                     |
//! | 2     | failure_mode     | 4        | 0.6                                 |
//! | 1     | failure_mode     | 5        | 0.7, or 0.8 with improvement areas  |

use ace_contracts::{
    delta::{DeltaItem, Evidence, InsightType, SuggestedAction},
    trace::ExecutionTrace,
};

use crate::defaults::new_delta_id;

const REQUEST_PREVIEW_CHARS: usize = 80;

fn preview(text: &str) -> String {
    let mut out: String = text.trim().chars().take(REQUEST_PREVIEW_CHARS).collect();
    if text.trim().chars().count() > REQUEST_PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

/// The satisfaction delta for one trace, if its score warrants one.
pub fn satisfaction_delta(trace: &ExecutionTrace) -> Option<DeltaItem> {
    let satisfaction = trace.user_satisfaction.as_ref()?;
    let request = preview(&trace.request);
    let positive = satisfaction
        .positive_feedback
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let improve = satisfaction
        .improvement_areas
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let (insight_type, priority, confidence, title, description, recommendation) = match satisfaction.score {
        5 => (
            InsightType::SuccessPattern,
            4,
            if positive.is_some() { 0.95 } else { 0.9 },
            format!("User highly satisfied: {request}"),
            match positive {
                Some(feedback) => format!("The user rated this outcome 5/5: {feedback}"),
                None => "The user rated this outcome 5/5".to_string(),
            },
            format!("Repeat the approach used for requests like \"{request}\""),
        ),
        4 => (
            InsightType::SuccessPattern,
            3,
            0.7,
            format!("User satisfied: {request}"),
            match positive {
                Some(feedback) => format!("The user rated this outcome 4/5: {feedback}"),
                None => "The user rated this outcome 4/5".to_string(),
            },
            format!("Keep the approach used for requests like \"{request}\""),
        ),
        2 => (
            InsightType::FailureMode,
            4,
            0.6,
            format!("User dissatisfied: {request}"),
            match improve {
                Some(areas) => format!("The user rated this outcome 2/5 and asked for: {areas}"),
                None => "The user rated this outcome 2/5".to_string(),
            },
            match improve {
                Some(areas) => format!("Address these points on similar requests: {areas}"),
                None => format!("Revisit the approach used for requests like \"{request}\""),
            },
        ),
        1 => (
            InsightType::FailureMode,
            5,
            if improve.is_some() { 0.8 } else { 0.7 },
            format!("User very dissatisfied: {request}"),
            match improve {
                Some(areas) => format!("The user rated this outcome 1/5 and asked for: {areas}"),
                None => "The user rated this outcome 1/5".to_string(),
            },
            match improve {
                Some(areas) => format!("Avoid repeating this approach; address: {areas}"),
                None => format!("Avoid repeating the approach used for requests like \"{request}\""),
            },
        ),
        _ => return None,
    };

    Some(DeltaItem {
        id: new_delta_id(),
        insight_type,
        title,
        description,
        recommendation,
        evidence: vec![Evidence {
            trace_id: trace.trace_id.clone(),
            execution: 1,
            example: request,
        }],
        applicability: String::new(),
        priority,
        confidence,
        action: SuggestedAction::AddNew,
    })
}

/// Satisfaction deltas for every trace that carries a decisive score.
pub fn satisfaction_deltas(traces: &[ExecutionTrace]) -> Vec<DeltaItem> {
    traces.iter().filter_map(satisfaction_delta).collect()
}
