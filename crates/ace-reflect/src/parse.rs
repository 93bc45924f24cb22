//! Strict-then-lenient parsing of insight-extraction responses.
//!
//! The response is untrusted free text. Parsing never fails:
//!
//! 1. Find a JSON payload: a fenced block, the whole text, or the widest
//!    bracketed span. A list, or an object with a `deltas` list, is accepted.
//! 2. Validate every item against `DELTA_ITEM_SCHEMA`; invalid items are
//!    dropped with a warning.
//! 3. When nothing usable survives, fall back to a single low-confidence
//!    `raw_analysis` delta built from the text itself.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use ace_contracts::{
    agent::TraceId,
    error::{AceError, AceResult},
};

/// Characters of unparsed text kept in a fallback delta.
pub const RAW_EXCERPT_CHARS: usize = 200;

/// What one response item must look like before it is trusted.
fn delta_item_schema() -> Value {
    json!({
        "type": "object",
        "required": ["title", "description"],
        "properties": {
            "title": { "type": "string", "minLength": 1 },
            "description": { "type": "string", "minLength": 1 },
            "recommendation": { "type": ["string", "null"] },
            "insight_type": { "type": ["string", "null"] },
            "type": { "type": ["string", "null"] },
            "applicability": { "type": ["string", "null"] },
            "priority": { "type": ["integer", "null"], "minimum": 0, "maximum": 5 },
            "confidence": { "type": ["number", "null"], "minimum": 0, "maximum": 1 },
            "suggested_action": { "type": ["string", "null"] },
            "action": { "type": ["string", "null"] },
            "evidence": {
                "type": ["array", "null"],
                "items": {
                    "anyOf": [
                        { "type": "string" },
                        {
                            "type": "object",
                            "required": ["trace_id"],
                            "properties": {
                                "trace_id": { "type": "string" },
                                "execution": { "type": ["integer", "null"], "minimum": 1, "maximum": 2 },
                                "example": { "type": ["string", "null"] }
                            }
                        }
                    ]
                }
            }
        }
    })
}

/// One piece of evidence as the extractor wrote it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawEvidence {
    TraceId(String),
    Detailed {
        trace_id: String,
        #[serde(default)]
        execution: Option<u8>,
        #[serde(default)]
        example: Option<String>,
    },
}

impl RawEvidence {
    pub fn trace_id(&self) -> TraceId {
        match self {
            RawEvidence::TraceId(id) => TraceId::new(id.trim()),
            RawEvidence::Detailed { trace_id, .. } => TraceId::new(trace_id.trim()),
        }
    }
}

/// A validated response item, before defaults are applied.
///
/// `priority` and `confidence` stay `None` when the extractor left them out
/// or set them to null; a priority of 0 is treated the same way.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDelta {
    #[serde(default, alias = "type")]
    pub insight_type: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub evidence: Option<Vec<RawEvidence>>,
    #[serde(default)]
    pub applicability: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, alias = "action")]
    pub suggested_action: Option<String>,
}

/// Result of parsing one response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// A structured payload was found. May be empty when the extractor
    /// reported no insights.
    Structured(Vec<RawDelta>),
    /// Nothing structured could be recovered.
    Unstructured(RawAnalysis),
}

/// Fields recovered from free text by keyword scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAnalysis {
    pub title: Option<String>,
    pub recommendation: Option<String>,
    /// The first `RAW_EXCERPT_CHARS` characters of the response.
    pub excerpt: String,
}

pub struct ResponseParser {
    validator: jsonschema::Validator,
}

impl ResponseParser {
    pub fn new() -> AceResult<Self> {
        let validator = jsonschema::validator_for(&delta_item_schema()).map_err(|e| AceError::Config {
            reason: format!("invalid delta item schema: {e}"),
        })?;
        Ok(Self { validator })
    }

    pub fn parse(&self, text: &str) -> ParsedResponse {
        let mut saw_structure = false;
        for candidate in json_candidates(text) {
            let Ok(value) = serde_json::from_str::<Value>(&candidate) else {
                continue;
            };
            let Some(items) = delta_items(value) else {
                continue;
            };
            saw_structure = true;
            if items.is_empty() {
                debug!("extractor returned an empty delta list");
                return ParsedResponse::Structured(Vec::new());
            }

            let deltas: Vec<RawDelta> = items
                .into_iter()
                .enumerate()
                .filter_map(|(index, item)| self.accept(index, item))
                .collect();
            if !deltas.is_empty() {
                return ParsedResponse::Structured(deltas);
            }
        }

        if saw_structure {
            warn!("no delta item passed validation; falling back to raw analysis");
        } else {
            warn!("extractor response held no structured deltas; falling back to raw analysis");
        }
        ParsedResponse::Unstructured(scan_keywords(text))
    }

    fn accept(&self, index: usize, item: Value) -> Option<RawDelta> {
        let problems: Vec<String> = self
            .validator
            .iter_errors(&item)
            .map(|e| format!("{} {}", e.instance_path, e))
            .collect();
        if !problems.is_empty() {
            warn!(index, problems = %problems.join("; "), "dropping invalid delta item");
            return None;
        }
        match serde_json::from_value::<RawDelta>(item) {
            Ok(delta) => Some(delta),
            Err(e) => {
                warn!(index, error = %e, "dropping undecodable delta item");
                None
            }
        }
    }
}

/// Possible JSON payloads, most specific first.
fn json_candidates(text: &str) -> Vec<String> {
    let mut candidates = fenced_blocks(text);
    candidates.push(text.trim().to_string());
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                candidates.push(text[start..=end].to_string());
            }
        }
    }
    candidates
}

/// Contents of every ``` fenced block, with any language tag dropped.
fn fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
        let body = &after_fence[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(body[..close].trim().to_string());
        rest = &body[close + 3..];
    }
    blocks
}

/// The item list of a parsed payload, if it has one.
fn delta_items(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("deltas") {
            Some(Value::Array(items)) => Some(items),
            Some(_) => None,
            None if map.contains_key("title") && map.contains_key("description") => {
                Some(vec![Value::Object(map)])
            }
            None => None,
        },
        _ => None,
    }
}

/// Recover what we can from prose: `Title:` and `Recommendation:` lines.
fn scan_keywords(text: &str) -> RawAnalysis {
    RawAnalysis {
        title: keyword_value(text, "title"),
        recommendation: keyword_value(text, "recommendation"),
        excerpt: text.trim().chars().take(RAW_EXCERPT_CHARS).collect(),
    }
}

fn keyword_value(text: &str, keyword: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let line = line.trim().trim_start_matches(['-', '*', '#', ' ']);
        let (key, value) = line.split_once(':')?;
        let key = key.trim().trim_matches('*').trim();
        if key.eq_ignore_ascii_case(keyword) {
            let value = value.trim().trim_matches('*').trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ResponseParser {
        ResponseParser::new().unwrap()
    }

    fn structured(parsed: ParsedResponse) -> Vec<RawDelta> {
        match parsed {
            ParsedResponse::Structured(deltas) => deltas,
            other => panic!("expected structured deltas, got {other:?}"),
        }
    }

    #[test]
    fn fenced_block_is_parsed() {
        let text = r#"Here is what I found:

```json
[
  {"insight_type": "failure_mode", "title": "Missing index", "description": "Queries timed out",
   "recommendation": "Add an index on user_id", "evidence": ["trace_20250101_000000_000001"],
   "priority": 5, "confidence": 0.8, "suggested_action": "add_new"}
]
```
Let me know if you need more."#;

        let deltas = structured(parser().parse(text));

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].title, "Missing index");
        assert_eq!(deltas[0].priority, Some(5));
        assert_eq!(
            deltas[0].evidence.as_ref().unwrap()[0].trace_id().as_str(),
            "trace_20250101_000000_000001"
        );
    }

    #[test]
    fn bare_list_and_deltas_object_are_parsed() {
        let list = r#"[{"type": "tool_usage", "title": "Use rg", "description": "rg is fast"}]"#;
        let object = r#"{"deltas": [{"type": "tool_usage", "title": "Use rg", "description": "rg is fast",
            "evidence": [{"trace_id": "trace_x", "execution": 2, "example": "rg foo"}]}]}"#;

        let from_list = structured(parser().parse(list));
        let from_object = structured(parser().parse(object));

        assert_eq!(from_list[0].insight_type.as_deref(), Some("tool_usage"));
        assert_eq!(from_list[0].priority, None);
        assert_eq!(from_object[0].title, "Use rg");
        assert!(matches!(
            from_object[0].evidence.as_ref().unwrap()[0],
            RawEvidence::Detailed { execution: Some(2), .. }
        ));
    }

    #[test]
    fn json_embedded_in_prose_is_found() {
        let text = "Analysis follows. {\"deltas\": [{\"title\": \"Cache builds\", \"description\": \"Rebuilds were slow\"}]} Done.";
        let deltas = structured(parser().parse(text));
        assert_eq!(deltas[0].title, "Cache builds");
    }

    #[test]
    fn invalid_items_are_dropped_individually() {
        let text = r#"[
            {"title": "Good", "description": "kept"},
            {"title": "", "description": "empty title"},
            {"title": "Bad confidence", "description": "x", "confidence": 7},
            {"description": "no title"}
        ]"#;

        let deltas = structured(parser().parse(text));

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].title, "Good");
    }

    #[test]
    fn empty_list_means_no_insights() {
        assert_eq!(parser().parse("```json\n[]\n```"), ParsedResponse::Structured(vec![]));
    }

    #[test]
    fn prose_falls_back_to_keyword_scan() {
        let text = "The agent struggled.\n**Title:** Slow test suite\n- Recommendation: run tests in parallel\n";

        match parser().parse(text) {
            ParsedResponse::Unstructured(raw) => {
                assert_eq!(raw.title.as_deref(), Some("Slow test suite"));
                assert_eq!(raw.recommendation.as_deref(), Some("run tests in parallel"));
                assert!(raw.excerpt.starts_with("The agent struggled."));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn all_invalid_items_fall_back() {
        let text = r#"[{"title": 3, "description": null}]"#;
        assert!(matches!(parser().parse(text), ParsedResponse::Unstructured(_)));
    }

    #[test]
    fn excerpt_is_capped() {
        let text = "x".repeat(1000);
        match parser().parse(&text) {
            ParsedResponse::Unstructured(raw) => assert_eq!(raw.excerpt.chars().count(), RAW_EXCERPT_CHARS),
            other => panic!("expected fallback, got {other:?}"),
        }
    }
}
