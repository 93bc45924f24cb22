//! Agent identity and trace identity types.
//!
//! These types name who did the work and which recorded request it belongs
//! to. They appear in every trace, delta, and playbook the pipeline writes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The name/objective/success-criteria triple that identifies an agent.
///
/// Only `name` is used for partitioning and file layout; the other two
/// fields are carried into traces and playbooks so reflection prompts can
/// judge work against what the agent is supposed to achieve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Stable agent name (e.g. "backend-architect").
    pub name: String,
    /// What the agent is for, in one sentence.
    #[serde(default)]
    pub objective: String,
    /// How a good outcome is recognised.
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

impl AgentIdentity {
    /// Build an identity from a name alone.
    ///
    /// Used by command-line tools that only know the agent name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objective: String::new(),
            success_criteria: Vec::new(),
        }
    }

    pub fn new(
        name: impl Into<String>,
        objective: impl Into<String>,
        success_criteria: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            objective: objective.into(),
            success_criteria,
        }
    }

    /// File-system safe form of the agent name.
    ///
    /// Anything outside `[A-Za-z0-9_-]` becomes `_` so a name can never
    /// escape its partition directory.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// File-system safe form of an arbitrary agent name.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "_".to_string()
    } else {
        slug
    }
}

/// Unique identifier of one recorded trace.
///
/// Minted by the capture stage from a microsecond clock reading, e.g.
/// `trace_20261019_143022_123456`. The embedded date is the partition the
/// trace is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `YYYY-MM-DD` partition encoded in a minted id, if the id has the
    /// minted shape.
    pub fn date_hint(&self) -> Option<String> {
        let digits = self.0.strip_prefix("trace_")?.get(..8)?;
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..8]))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
