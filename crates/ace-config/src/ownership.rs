//! Static table of which agent owns which directories.
//!
//! Loaded from TOML:
//!
//! ```toml
//! [[agents]]
//! name = "backend-architect"
//! owns = ["backend/", "api/"]
//! ```
//!
//! A built-in table ships with the crate; a file replaces it entirely.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use ace_contracts::error::{AceError, AceResult};

const BUILTIN_TABLE: &str = include_str!("ownership/default.toml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOwnership {
    pub name: String,
    #[serde(default)]
    pub owns: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OwnershipFile {
    #[serde(default)]
    agents: Vec<AgentOwnership>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipTable {
    agents: BTreeMap<String, Vec<String>>,
}

impl OwnershipTable {
    /// The table compiled into the crate.
    pub fn builtin() -> AceResult<Self> {
        Self::from_toml_str(BUILTIN_TABLE)
    }

    /// Returns `AceError::Config` if the TOML is malformed.
    pub fn from_toml_str(s: &str) -> AceResult<Self> {
        let file: OwnershipFile = toml::from_str(s).map_err(|e| AceError::Config {
            reason: format!("failed to parse ownership TOML: {e}"),
        })?;
        let mut agents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in file.agents {
            agents.entry(entry.name).or_default().extend(entry.owns);
        }
        Ok(Self { agents })
    }

    pub fn from_file(path: &Path) -> AceResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AceError::Config {
            reason: format!("failed to read ownership file '{}': {e}", path.display()),
        })?;
        debug!(path = %path.display(), "ownership table loaded");
        Self::from_toml_str(&contents)
    }

    /// Directories owned by `agent`; empty for agents not in the table.
    pub fn owned_directories(&self, agent: &str) -> &[String] {
        self.agents.get(agent).map(Vec::as_slice).unwrap_or(&[])
    }
}
