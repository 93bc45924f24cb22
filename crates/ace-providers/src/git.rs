//! `git status` backed workspace probe.

use std::{path::PathBuf, process::Command};

use tracing::debug;

use ace_contracts::error::{AceError, AceResult};
use ace_core::{traits::WorkspaceProbe, VcsSnapshot};

const CAPABILITY: &str = "workspace probe";

#[derive(Debug, Clone)]
pub struct GitProbe {
    workdir: PathBuf,
}

impl GitProbe {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl WorkspaceProbe for GitProbe {
    fn snapshot(&self) -> AceResult<VcsSnapshot> {
        let output = Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(&self.workdir)
            .output()
            .map_err(|e| AceError::Capability {
                capability: CAPABILITY.to_string(),
                reason: format!("failed to run git: {e}"),
            })?;

        if !output.status.success() {
            return Err(AceError::Capability {
                capability: CAPABILITY.to_string(),
                reason: format!(
                    "git status failed in {}: {}",
                    self.workdir.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let snapshot = VcsSnapshot::parse_porcelain(&String::from_utf8_lossy(&output.stdout));
        debug!(
            workdir = %self.workdir.display(),
            staged = snapshot.staged.len(),
            unstaged = snapshot.unstaged.len(),
            untracked = snapshot.untracked.len(),
            "workspace snapshot taken"
        );
        Ok(snapshot)
    }
}
