//! File-backed `PlaybookStore`.
//!
//! Layout per agent:
//!
//! ```text
//! <root>/<agent slug>/playbook.json
//! <root>/<agent slug>/playbook.md
//! <root>/<agent slug>/reports/curation_<timestamp>.json
//! ```

use std::path::PathBuf;

use tracing::{debug, warn};

use ace_contracts::{
    agent::{slugify, AgentIdentity},
    error::AceResult,
    playbook::{CurationReport, Playbook},
};
use ace_core::traits::PlaybookStore;

use crate::{
    atomic::{read_json, write_atomic, write_json},
    render::render_playbook_markdown,
};

pub struct FsPlaybookStore {
    root: PathBuf,
}

impl FsPlaybookStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn playbook_path(&self, agent: &str) -> PathBuf {
        self.root.join(slugify(agent)).join("playbook.json")
    }

    pub fn reports_dir(&self, agent: &str) -> PathBuf {
        self.root.join(slugify(agent)).join("reports")
    }
}

impl PlaybookStore for FsPlaybookStore {
    fn load(&self, agent: &AgentIdentity) -> Playbook {
        let path = self.playbook_path(&agent.name);
        if !path.exists() {
            debug!(agent = %agent.name, "no playbook yet; starting empty");
            return Playbook::empty(agent.clone());
        }
        match read_json::<Playbook>(&path) {
            Ok(playbook) => playbook,
            Err(e) => {
                warn!(agent = %agent.name, error = %e, "playbook unreadable; starting empty");
                Playbook::empty(agent.clone())
            }
        }
    }

    fn save(&self, playbook: &Playbook) -> AceResult<PathBuf> {
        let path = self.playbook_path(&playbook.agent.name);
        write_json(&path, playbook)?;

        let markdown = render_playbook_markdown(playbook);
        if let Err(e) = write_atomic(&path.with_extension("md"), markdown.as_bytes()) {
            warn!(agent = %playbook.agent.name, error = %e, "playbook markdown not written");
        }
        debug!(agent = %playbook.agent.name, version = %playbook.version, "playbook saved");
        Ok(path)
    }

    fn exists(&self, agent: &str) -> bool {
        self.playbook_path(agent).is_file()
    }

    fn render_markdown(&self, playbook: &Playbook) -> String {
        render_playbook_markdown(playbook)
    }

    fn write_report(&self, report: &CurationReport) -> AceResult<PathBuf> {
        let stamp = report.timestamp.format("%Y%m%d_%H%M%S_%6f");
        let path = self
            .reports_dir(&report.agent)
            .join(format!("curation_{stamp}.json"));
        write_json(&path, report)?;
        Ok(path)
    }
}
