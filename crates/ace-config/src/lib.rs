//! # ace-config
//!
//! Configuration for the ACE learning pipeline.
//!
//! - `AceConfig`: storage locations, thresholds, and stage switches,
//!   resolved field by field from a TOML file, `ACE_*` environment
//!   variables, and defaults
//! - `OwnershipTable`: which directories each agent owns, used by capture
//!   to decide when a second execution would disturb finished work

pub mod config;
pub mod ownership;

pub use config::AceConfig;
pub use ownership::OwnershipTable;

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, fs, path::PathBuf};

    use tempfile::TempDir;

    use ace_contracts::error::ErrorKind;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ── AceConfig ────────────────────────────────────────────────────────────

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = AceConfig::from_toml_str("").unwrap();

        assert!(config.enabled);
        assert_eq!(config.max_bullets, 150);
        assert!((config.similarity_threshold - 0.85).abs() < 1e-12);
        assert_eq!(config.embedding_model, "text-embedding-3-small");
    }

    #[test]
    fn file_beats_environment_field_by_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_bullets = 40\ntrace_dir = \"/data/traces\"\n").unwrap();
        let vars = env(&[
            ("ACE_CONFIG", path.to_str().unwrap()),
            ("ACE_MAX_BULLETS", "999"),
            ("ACE_PRUNING_RATE", "0.25"),
            ("ACE_AUTO_CURATE", "yes"),
        ]);

        let config = AceConfig::load_with(&|key| vars.get(key).cloned()).unwrap();

        assert_eq!(config.max_bullets, 40);
        assert_eq!(config.trace_dir, PathBuf::from("/data/traces"));
        assert!((config.pruning_rate - 0.25).abs() < 1e-12);
        assert!(config.auto_curate);
        assert_eq!(config.min_helpful_count, 2);
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let vars = env(&[("ACE_CONFIG", missing.to_str().unwrap())]);

        let err = AceConfig::load_with(&|key| vars.get(key).cloned()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn unparseable_environment_value_is_a_config_error() {
        let vars = env(&[("ACE_CONFIG", ""), ("ACE_MAX_BULLETS", "lots")]);
        let err = AceConfig::load_with(&|key| vars.get(key).cloned()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("ACE_MAX_BULLETS"));
    }

    #[test]
    fn out_of_range_thresholds_are_rejected() {
        for toml in [
            "similarity_threshold = 1.5",
            "pruning_rate = -0.1",
            "max_bullets = 0",
            "reflection_batch_size = 0",
        ] {
            let err = AceConfig::from_toml_str(toml).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "{toml}");
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AceConfig::from_toml_str("max_bullet = 10").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn capture_policy_carries_owned_directories() {
        let config = AceConfig::from_toml_str("auto_reflect = true\nreflection_batch_size = 5").unwrap();
        let table = OwnershipTable::builtin().unwrap();

        let policy = config.capture_policy("test-engineer", &table);

        assert!(policy.enabled);
        assert!(policy.auto_reflect);
        assert_eq!(policy.reflection_batch_size, 5);
        assert_eq!(policy.owned_directories, vec!["tests/".to_string()]);
        assert_eq!(policy.duplicate_threshold.as_secs(), 30);
    }

    // ── OwnershipTable ───────────────────────────────────────────────────────

    #[test]
    fn builtin_table_parses() {
        let table = OwnershipTable::builtin().unwrap();
        assert!(table
            .owned_directories("backend-architect")
            .iter()
            .any(|dir| dir.as_str() == "api/"));
        assert!(table.owned_directories("unknown-agent").is_empty());
    }

    #[test]
    fn repeated_agent_entries_are_merged() {
        let table = OwnershipTable::from_toml_str(
            r#"
            [[agents]]
            name = "backend-architect"
            owns = ["services/"]

            [[agents]]
            name = "payments-specialist"
            owns = ["./services/payments"]

            [[agents]]
            name = "backend-architect"
            owns = ["api/"]
            "#,
        )
        .unwrap();

        assert_eq!(
            table.owned_directories("backend-architect"),
            &["services/".to_string(), "api/".to_string()]
        );
        assert_eq!(table.owned_directories("payments-specialist"), &["./services/payments".to_string()]);
    }

    #[test]
    fn ownership_file_replaces_builtin() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("owners.toml");
        fs::write(&path, "[[agents]]\nname = \"docs-writer\"\nowns = [\"handbook/\"]\n").unwrap();
        let config = AceConfig::from_toml_str(&format!("ownership_file = {:?}", path.to_str().unwrap())).unwrap();

        let table = config.ownership().unwrap();

        assert_eq!(table.owned_directories("docs-writer"), &["handbook/".to_string()]);
        assert!(table.owned_directories("backend-architect").is_empty());
    }

    #[test]
    fn malformed_ownership_toml_is_a_config_error() {
        let err = OwnershipTable::from_toml_str("[[agents]]\nowns = 3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
