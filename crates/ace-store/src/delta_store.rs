//! File-backed `DeltaStore`.
//!
//! Reflection output waits in `<root>/<agent slug>/deltas_<timestamp>.json`
//! until curation consumes it and moves it to `<root>/<agent slug>/processed/`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use ace_contracts::{agent::slugify, delta::DeltaFile, error::AceResult};
use ace_core::traits::DeltaStore;

use crate::atomic::{io_error, read_json, write_json};

const PROCESSED_DIR: &str = "processed";

pub struct FsDeltaStore {
    root: PathBuf,
}

impl FsDeltaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn agent_dir(&self, agent: &str) -> PathBuf {
        self.root.join(slugify(agent))
    }
}

impl DeltaStore for FsDeltaStore {
    fn write(&self, file: &DeltaFile) -> AceResult<PathBuf> {
        let dir = self.agent_dir(&file.metadata.agent);
        let stamp = file.metadata.created_at.format("%Y%m%d_%H%M%S_%6f");
        let mut path = dir.join(format!("deltas_{stamp}.json"));
        let mut suffix = 1;
        while path.exists() {
            path = dir.join(format!("deltas_{stamp}_{suffix}.json"));
            suffix += 1;
        }

        write_json(&path, file)?;
        debug!(agent = %file.metadata.agent, path = %path.display(), deltas = file.deltas.len(), "delta file written");
        Ok(path)
    }

    fn pending(&self, agent: &str) -> AceResult<Vec<PathBuf>> {
        let dir = self.agent_dir(agent);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| io_error("list", &dir, e))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("deltas_") && n.ends_with(".json"))
            })
            .collect();
        // The timestamp in the name sorts chronologically.
        files.sort();
        Ok(files)
    }

    fn read(&self, path: &Path) -> AceResult<DeltaFile> {
        read_json(path)
    }

    fn archive(&self, path: &Path) -> AceResult<PathBuf> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let processed = parent.join(PROCESSED_DIR);
        fs::create_dir_all(&processed).map_err(|e| io_error("create directory", &processed, e))?;
        let name = path
            .file_name()
            .ok_or_else(|| io_error("archive", path, "path has no file name"))?;
        let target = processed.join(name);
        fs::rename(path, &target).map_err(|e| io_error("archive", path, e))?;
        debug!(from = %path.display(), to = %target.display(), "delta file archived");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use ace_contracts::{
        agent::TraceId,
        delta::{DeltaFile, DeltaItem, Evidence, InsightType, SuggestedAction},
    };
    use ace_core::traits::DeltaStore;

    use super::FsDeltaStore;

    fn delta_file(agent: &str, offset_secs: i64) -> DeltaFile {
        let item = DeltaItem {
            id: "d1".to_string(),
            insight_type: InsightType::ToolUsage,
            title: "Use ripgrep".to_string(),
            description: "Searching with ripgrep was faster".to_string(),
            recommendation: "Prefer ripgrep for code search".to_string(),
            evidence: vec![Evidence {
                trace_id: TraceId::new("trace_20250101_000000_000001"),
                execution: 1,
                example: "rg TODO".to_string(),
            }],
            applicability: "code search".to_string(),
            priority: 3,
            confidence: 0.6,
            action: SuggestedAction::AddNew,
        };
        let mut file = DeltaFile::new(agent, vec![TraceId::new("trace_20250101_000000_000001")], vec![item]);
        file.metadata.created_at = Utc::now() + Duration::seconds(offset_secs);
        file
    }

    #[test]
    fn pending_lists_oldest_first_and_archive_removes_from_pending() {
        let dir = TempDir::new().unwrap();
        let store = FsDeltaStore::new(dir.path());

        let newer = store.write(&delta_file("test-engineer", 10)).unwrap();
        let older = store.write(&delta_file("test-engineer", 0)).unwrap();
        store.write(&delta_file("docs-writer", 0)).unwrap();

        let pending = store.pending("test-engineer").unwrap();
        assert_eq!(pending, vec![older.clone(), newer.clone()]);

        let archived = store.archive(&older).unwrap();
        let expected = older.parent().unwrap().join("processed").join(older.file_name().unwrap());
        assert_eq!(archived, expected);
        assert_eq!(store.pending("test-engineer").unwrap(), vec![newer]);

        let back = store.read(&archived).unwrap();
        assert_eq!(back.deltas[0].title, "Use ripgrep");
    }

    #[test]
    fn pending_for_unknown_agent_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsDeltaStore::new(dir.path());
        assert!(store.pending("nobody").unwrap().is_empty());
    }
}
