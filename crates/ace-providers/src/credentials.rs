//! API key lookup.
//!
//! Keys come from the environment by default. Tests pass a closure instead
//! so they never touch the process environment.

use ace_contracts::error::{AceError, AceResult};

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Read a variable from the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Resolve a required key or explain how to provide it.
pub fn require_key(
    lookup: &dyn Fn(&str) -> Option<String>,
    var: &str,
    capability: &str,
) -> AceResult<String> {
    match lookup(var).map(|v| v.trim().to_string()) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(AceError::CapabilityUnavailable {
            capability: capability.to_string(),
            reason: format!("{var} is not set; run `export {var}=<your key>` and retry"),
        }),
    }
}
