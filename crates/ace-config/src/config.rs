//! Pipeline configuration.
//!
//! Each field is resolved on its own, in this order:
//!
//! 1. the TOML file (`ACE_CONFIG`, default `.ace/config.toml`)
//! 2. the matching `ACE_*` environment variable
//! 3. the built-in default
//!
//! A file that sets only `max_bullets` still lets the environment set
//! `pruning_rate`.

use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use ace_contracts::error::{AceError, AceResult};
use ace_core::generator::{CapturePolicy, DEFAULT_DUPLICATE_THRESHOLD};

use crate::ownership::OwnershipTable;

/// Names the config file to load.
pub const CONFIG_PATH_ENV: &str = "ACE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = ".ace/config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AceConfig {
    /// Master switch for trace capture.
    pub enabled: bool,
    pub trace_dir: PathBuf,
    pub delta_dir: PathBuf,
    pub playbook_dir: PathBuf,
    pub auto_reflect: bool,
    pub auto_curate: bool,
    pub reflection_batch_size: usize,
    /// Cosine similarity above which a delta merges into an existing bullet.
    pub similarity_threshold: f64,
    /// Extra fraction pruned beyond the excess when over `max_bullets`.
    pub pruning_rate: f64,
    pub min_helpful_count: u32,
    pub max_bullets: usize,
    pub embedding_model: String,
    pub insight_model: String,
    pub retention_days: u32,
    /// Replaces the built-in ownership table when set.
    pub ownership_file: Option<PathBuf>,
}

impl Default for AceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trace_dir: PathBuf::from(".ace/traces"),
            delta_dir: PathBuf::from(".ace/deltas"),
            playbook_dir: PathBuf::from(".ace/playbooks"),
            auto_reflect: false,
            auto_curate: false,
            reflection_batch_size: 10,
            similarity_threshold: 0.85,
            pruning_rate: 0.10,
            min_helpful_count: 2,
            max_bullets: 150,
            embedding_model: "text-embedding-3-small".to_string(),
            insight_model: "claude-sonnet-4-5".to_string(),
            retention_days: 30,
            ownership_file: None,
        }
    }
}

/// The config file as written: every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    enabled: Option<bool>,
    trace_dir: Option<PathBuf>,
    delta_dir: Option<PathBuf>,
    playbook_dir: Option<PathBuf>,
    auto_reflect: Option<bool>,
    auto_curate: Option<bool>,
    reflection_batch_size: Option<usize>,
    similarity_threshold: Option<f64>,
    pruning_rate: Option<f64>,
    min_helpful_count: Option<u32>,
    max_bullets: Option<usize>,
    embedding_model: Option<String>,
    insight_model: Option<String>,
    retention_days: Option<u32>,
    ownership_file: Option<PathBuf>,
}

/// Resolves one field from file, environment, or default.
struct Resolver<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Resolver<'_> {
    fn pick<T: Debug>(
        &self,
        field: &str,
        from_file: Option<T>,
        env_key: &str,
        parse: fn(&str) -> Option<T>,
        default: T,
    ) -> AceResult<T> {
        if let Some(value) = from_file {
            debug!(field, ?value, source = "file", "config value");
            return Ok(value);
        }
        if let Some(raw) = (self.lookup)(env_key) {
            let value = parse(raw.trim()).ok_or_else(|| AceError::Config {
                reason: format!("{env_key}={raw:?} is not a valid value for {field}"),
            })?;
            debug!(field, ?value, source = "environment", "config value");
            return Ok(value);
        }
        Ok(default)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: FromStr>(raw: &str) -> Option<T> {
    raw.parse().ok()
}

fn parse_path(raw: &str) -> Option<PathBuf> {
    (!raw.is_empty()).then(|| PathBuf::from(raw))
}

fn parse_string(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

fn parse_optional_path(raw: &str) -> Option<Option<PathBuf>> {
    Some(parse_path(raw))
}

impl AceConfig {
    /// Load from the real process environment and the configured file.
    pub fn load() -> AceResult<Self> {
        Self::load_with(&|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    ///
    /// A missing file at the default path is fine; a missing file that
    /// `ACE_CONFIG` points at is an `AceError::Config`.
    pub fn load_with(lookup: &dyn Fn(&str) -> Option<String>) -> AceResult<Self> {
        let explicit = lookup(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty());
        let path = explicit
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let file = if path.is_file() {
            Some(read_file(&path)?)
        } else if explicit.is_some() {
            return Err(AceError::Config {
                reason: format!("config file '{}' does not exist", path.display()),
            });
        } else {
            None
        };

        Self::resolve(file.unwrap_or_default(), lookup)
    }

    /// Parse a TOML document and fill the rest from defaults.
    pub fn from_toml_str(s: &str) -> AceResult<Self> {
        Self::resolve(parse_file(s)?, &|_| None)
    }

    fn resolve(file: FileConfig, lookup: &dyn Fn(&str) -> Option<String>) -> AceResult<Self> {
        let r = Resolver { lookup };
        let d = AceConfig::default();
        let config = AceConfig {
            enabled: r.pick("enabled", file.enabled, "ACE_ENABLED", parse_bool, d.enabled)?,
            trace_dir: r.pick("trace_dir", file.trace_dir, "ACE_TRACE_DIR", parse_path, d.trace_dir)?,
            delta_dir: r.pick("delta_dir", file.delta_dir, "ACE_DELTA_DIR", parse_path, d.delta_dir)?,
            playbook_dir: r.pick(
                "playbook_dir",
                file.playbook_dir,
                "ACE_PLAYBOOK_DIR",
                parse_path,
                d.playbook_dir,
            )?,
            auto_reflect: r.pick(
                "auto_reflect",
                file.auto_reflect,
                "ACE_AUTO_REFLECT",
                parse_bool,
                d.auto_reflect,
            )?,
            auto_curate: r.pick(
                "auto_curate",
                file.auto_curate,
                "ACE_AUTO_CURATE",
                parse_bool,
                d.auto_curate,
            )?,
            reflection_batch_size: r.pick(
                "reflection_batch_size",
                file.reflection_batch_size,
                "ACE_REFLECTION_BATCH_SIZE",
                parse_number,
                d.reflection_batch_size,
            )?,
            similarity_threshold: r.pick(
                "similarity_threshold",
                file.similarity_threshold,
                "ACE_SIMILARITY_THRESHOLD",
                parse_number,
                d.similarity_threshold,
            )?,
            pruning_rate: r.pick(
                "pruning_rate",
                file.pruning_rate,
                "ACE_PRUNING_RATE",
                parse_number,
                d.pruning_rate,
            )?,
            min_helpful_count: r.pick(
                "min_helpful_count",
                file.min_helpful_count,
                "ACE_MIN_HELPFUL_COUNT",
                parse_number,
                d.min_helpful_count,
            )?,
            max_bullets: r.pick(
                "max_bullets",
                file.max_bullets,
                "ACE_MAX_BULLETS",
                parse_number,
                d.max_bullets,
            )?,
            embedding_model: r.pick(
                "embedding_model",
                file.embedding_model,
                "ACE_EMBEDDING_MODEL",
                parse_string,
                d.embedding_model,
            )?,
            insight_model: r.pick(
                "insight_model",
                file.insight_model,
                "ACE_INSIGHT_MODEL",
                parse_string,
                d.insight_model,
            )?,
            retention_days: r.pick(
                "retention_days",
                file.retention_days,
                "ACE_RETENTION_DAYS",
                parse_number,
                d.retention_days,
            )?,
            ownership_file: r.pick(
                "ownership_file",
                file.ownership_file.map(Some),
                "ACE_OWNERSHIP_FILE",
                parse_optional_path,
                d.ownership_file,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the learning stages cannot work with.
    pub fn validate(&self) -> AceResult<()> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(AceError::Config {
                    reason: format!("{name} must be within [0, 1], got {value}"),
                })
            }
        };
        unit("similarity_threshold", self.similarity_threshold)?;
        unit("pruning_rate", self.pruning_rate)?;
        if self.max_bullets == 0 {
            return Err(AceError::Config {
                reason: "max_bullets must be at least 1".to_string(),
            });
        }
        if self.reflection_batch_size == 0 {
            return Err(AceError::Config {
                reason: "reflection_batch_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The configured ownership table, or the built-in one.
    pub fn ownership(&self) -> AceResult<OwnershipTable> {
        match &self.ownership_file {
            Some(path) => OwnershipTable::from_file(path),
            None => OwnershipTable::builtin(),
        }
    }

    /// Capture settings for one agent.
    pub fn capture_policy(&self, agent: &str, ownership: &OwnershipTable) -> CapturePolicy {
        CapturePolicy {
            enabled: self.enabled,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            owned_directories: ownership.owned_directories(agent).to_vec(),
            auto_reflect: self.auto_reflect,
            reflection_batch_size: self.reflection_batch_size,
        }
    }
}

fn parse_file(s: &str) -> AceResult<FileConfig> {
    toml::from_str(s).map_err(|e| AceError::Config {
        reason: format!("failed to parse config TOML: {e}"),
    })
}

fn read_file(path: &Path) -> AceResult<FileConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| AceError::Config {
        reason: format!("failed to read config file '{}': {e}", path.display()),
    })?;
    debug!(path = %path.display(), "config file loaded");
    parse_file(&contents)
}
