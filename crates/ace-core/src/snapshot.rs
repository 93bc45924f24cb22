//! Version-control snapshots and the before/after diff that becomes an
//! `ExternalObservation`.
//!
//! The diff is only meaningful when nothing else touches the working tree
//! between the two snapshots, which is why capture never runs executions
//! concurrently.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use ace_contracts::trace::ExternalObservation;

/// Status of the working tree at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsSnapshot {
    pub staged: BTreeSet<String>,
    pub unstaged: BTreeSet<String>,
    pub untracked: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

impl VcsSnapshot {
    /// Parse `git status --porcelain` (v1) output.
    ///
    /// Each line is `XY path`, where X is the index status and Y the
    /// work-tree status. Renames (`R  old -> new`) record the new path.
    pub fn parse_porcelain(output: &str) -> Self {
        let mut snapshot = VcsSnapshot::default();
        for line in output.lines() {
            if line.len() < 4 {
                continue;
            }
            let mut codes = line.chars();
            let (Some(index), Some(worktree)) = (codes.next(), codes.next()) else {
                continue;
            };
            let raw_path = line.get(3..).unwrap_or_default().trim();
            let path = match raw_path.rsplit_once(" -> ") {
                Some((_, renamed)) => renamed,
                None => raw_path,
            }
            .trim_matches('"')
            .to_string();
            if path.is_empty() {
                continue;
            }

            if index == '?' && worktree == '?' {
                snapshot.untracked.insert(path);
                continue;
            }
            if index == 'D' || worktree == 'D' {
                snapshot.deleted.insert(path);
                continue;
            }
            if index != ' ' {
                snapshot.staged.insert(path.clone());
            }
            if worktree != ' ' {
                snapshot.unstaged.insert(path);
            }
        }
        snapshot
    }

    fn changed(&self) -> BTreeSet<&String> {
        self.staged.iter().chain(self.unstaged.iter()).collect()
    }
}

/// Derive what a run changed from the snapshots taken around it.
///
/// created = newly untracked files; modified = newly staged or unstaged
/// files; deleted = newly deleted files.
pub fn diff_snapshots(before: &VcsSnapshot, after: &VcsSnapshot) -> ExternalObservation {
    let files_created: Vec<String> = after.untracked.difference(&before.untracked).cloned().collect();

    let before_changed = before.changed();
    let files_modified: Vec<String> = after
        .changed()
        .into_iter()
        .filter(|path| !before_changed.contains(path) && !after.deleted.contains(*path))
        .cloned()
        .collect();

    let files_deleted: Vec<String> = after.deleted.difference(&before.deleted).cloned().collect();

    let vcs_summary = format!(
        "{} created, {} modified, {} deleted",
        files_created.len(),
        files_modified.len(),
        files_deleted.len()
    );

    ExternalObservation {
        files_created,
        files_modified,
        files_deleted,
        vcs_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_porcelain_classifies_each_status() {
        let output = "\
M  src/staged.rs
 M src/unstaged.rs
MM src/both.rs
?? notes.txt
 D gone.rs
R  old.rs -> renamed.rs
";
        let snapshot = VcsSnapshot::parse_porcelain(output);

        assert!(snapshot.staged.contains("src/staged.rs"));
        assert!(snapshot.unstaged.contains("src/unstaged.rs"));
        assert!(snapshot.staged.contains("src/both.rs"));
        assert!(snapshot.unstaged.contains("src/both.rs"));
        assert!(snapshot.untracked.contains("notes.txt"));
        assert!(snapshot.deleted.contains("gone.rs"));
        assert!(snapshot.staged.contains("renamed.rs"));
        assert!(!snapshot.staged.contains("old.rs"));
    }

    #[test]
    fn diff_reports_only_new_changes() {
        let before = VcsSnapshot::parse_porcelain(" M already_dirty.rs\n?? old_untracked.txt\n");
        let after = VcsSnapshot::parse_porcelain(
            " M already_dirty.rs\n?? old_untracked.txt\n?? api/new_handler.rs\nM  api/routes.rs\n D legacy.rs\n",
        );

        let observation = diff_snapshots(&before, &after);

        assert_eq!(observation.files_created, vec!["api/new_handler.rs".to_string()]);
        assert_eq!(observation.files_modified, vec!["api/routes.rs".to_string()]);
        assert_eq!(observation.files_deleted, vec!["legacy.rs".to_string()]);
        assert_eq!(observation.vcs_summary, "1 created, 1 modified, 1 deleted");
    }

    #[test]
    fn identical_snapshots_produce_an_empty_observation() {
        let snapshot = VcsSnapshot::parse_porcelain(" M a.rs\n");
        let observation = diff_snapshots(&snapshot, &snapshot);
        assert!(observation.is_empty());
    }
}
