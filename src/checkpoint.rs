use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Durable batch progress, written after every item so a killed run loses at
/// most one item's work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Index the next run resumes from.
    pub cursor: usize,
    /// Item keys processed successfully.
    pub succeeded: Vec<String>,
    /// Item key → human-readable failure reason.
    #[serde(default)]
    pub failed: BTreeMap<String, String>,
    pub timestamp: String,
}

impl CheckpointState {
    pub fn fresh() -> Self {
        Self {
            cursor: 0,
            succeeded: Vec::new(),
            failed: BTreeMap::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Whether an item key was already accounted for (success or failure).
    pub fn covers(&self, key: &str) -> bool {
        self.failed.contains_key(key) || self.succeeded.iter().any(|k| k == key)
    }

    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// One checkpoint file per job key, next to the data store.
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(dir: impl AsRef<Path>, job_key: &str) -> Self {
        let name: String = job_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        Self {
            path: dir.as_ref().join(format!("{}.checkpoint.json", name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load a prior checkpoint if one exists. A stale or unreadable file is
    /// treated as missing so a resume can never corrupt store records.
    pub fn load(&self) -> Result<Option<CheckpointState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading checkpoint {}", self.path.display()))?;
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!("Discarding unreadable checkpoint {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    /// Write the state durably: temp file, fsync, atomic rename. The resume
    /// guarantee depends on the write landing before the process dies.
    pub fn save(&self, state: &CheckpointState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string(state)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("creating checkpoint {}", tmp.display()))?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("publishing checkpoint {}", self.path.display()))?;
        Ok(())
    }

    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("deleting checkpoint {}", self.path.display()))?;
        }
        Ok(())
    }
}

// ── Tests ──
