//! Local durable storage: the Jira ingestion history and artifact exports.

use crate::config::APP_DIR;
use crate::model::JobId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Namespace for the ingestion history file.
pub const HISTORY_KEY: &str = "jira-ingest-history";
pub const HISTORY_CAP: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub job_id: JobId,
    pub query: String,
    pub timestamp: String,
}

/// Newest-first list of recent Jira ingestions, capped at [`HISTORY_CAP`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

impl HistoryStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// History file under the platform data directory.
    pub fn default_location() -> Result<Self> {
        let dir = dirs::data_dir().context("no data directory on this platform")?;
        Ok(Self::at(dir.join(APP_DIR).join(format!("{HISTORY_KEY}.json"))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load entries. Missing or corrupt data is treated as an empty history.
    pub fn load(&self) -> Vec<HistoryEntry> {
        let data = match std::fs::read(&self.path) {
            Ok(d) => d,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_slice::<Vec<HistoryEntry>>(&data) {
            Ok(mut entries) => {
                entries.truncate(HISTORY_CAP);
                entries
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt ingestion history");
                Vec::new()
            }
        }
    }

    /// Prepend an entry for `job_id`, keep at most [`HISTORY_CAP`], and persist.
    pub fn record(&self, job_id: &JobId, query: &str) -> Result<Vec<HistoryEntry>> {
        self.record_entry(HistoryEntry {
            job_id: job_id.clone(),
            query: query.to_string(),
            timestamp: now_rfc3339(),
        })
    }

    pub fn record_entry(&self, entry: HistoryEntry) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.load();
        entries.insert(0, entry);
        entries.truncate(HISTORY_CAP);
        self.write(&entries)?;
        Ok(entries)
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", self.path.display())),
        }
    }

    fn write(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(entries)?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}

/// Default export filename in the current directory, e.g. `autotest-script-2024-01-01_10-00-00Z.txt`.
pub fn default_export_path(stem: &str, ext: &str) -> Result<PathBuf> {
    let stamp = now_rfc3339().replace(':', "-").replace('T', "_");
    let current_dir = std::env::current_dir().context("get current directory")?;
    Ok(current_dir.join(format!("autotest-{stem}-{stamp}.{ext}")))
}

pub fn export_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn export_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
