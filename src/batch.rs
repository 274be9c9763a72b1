use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checkpoint::{CheckpointFile, CheckpointState};

/// Why a single item failed. One bad card page must never abort the batch,
/// so every per-item operation funnels into this instead of bubbling up.
///
/// Display is "kind: detail"; the kind prefix doubles as the breakdown key
/// in run summaries.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("malformed_code: {0}")]
    MalformedCode(String),
    #[error("fetch: {0}")]
    Fetch(String),
    #[error("extract: {0}")]
    Extract(String),
    #[error("translate: {0}")]
    Translate(String),
    #[error("upload: {0}")]
    Upload(String),
    #[error("store: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Discard any prior checkpoint and start over.
    Fresh,
    /// Load the prior checkpoint if one exists (the default).
    Resume,
}

/// Wraps a per-item processing loop with durable progress.
///
/// The caller drives the loop and reports each outcome; the tracker skips
/// items a prior run already covered and persists after every item.
pub struct BatchTracker {
    file: CheckpointFile,
    state: CheckpointState,
    resumed: bool,
}

impl BatchTracker {
    pub fn begin(file: CheckpointFile, mode: BatchMode) -> Result<Self> {
        let prior = match mode {
            BatchMode::Fresh => {
                file.delete()?;
                None
            }
            BatchMode::Resume => file.load()?,
        };
        let resumed = prior.is_some();
        let state = prior.unwrap_or_else(CheckpointState::fresh);
        if resumed {
            info!(
                "Resuming from item {} ({} succeeded, {} failed so far)",
                state.cursor + 1,
                state.succeeded.len(),
                state.failed.len()
            );
        }
        Ok(Self { file, state, resumed })
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    /// Whether the item at `index` with this key was already handled.
    pub fn skip(&self, index: usize, key: &str) -> bool {
        index < self.state.cursor || self.state.covers(key)
    }

    pub fn record_success(&mut self, index: usize, key: impl Into<String>) {
        self.state.succeeded.push(key.into());
        self.advance(index);
    }

    pub fn record_failure(&mut self, index: usize, key: impl Into<String>, err: &ItemError) {
        let key = key.into();
        warn!("Item {} failed: {}", key, err);
        self.state.failed.insert(key, err.to_string());
        self.advance(index);
    }

    fn advance(&mut self, index: usize) {
        self.state.cursor = self.state.cursor.max(index + 1);
        self.state.timestamp = chrono::Utc::now().to_rfc3339();
        // Best-effort durability: the in-memory state stays correct for the
        // rest of the run even if this write is lost.
        if let Err(e) = self.file.save(&self.state) {
            warn!("Could not save checkpoint: {}", e);
        }
    }

    /// Close the run. A fully successful run deletes its checkpoint; a run
    /// with failures keeps it so the failures stay resumable and visible.
    pub fn complete(self, job_key: &str) -> Result<RunSummary> {
        if self.state.failed.is_empty() {
            self.file.delete()?;
        } else {
            self.file.save(&self.state)?;
            info!(
                "Keeping checkpoint {} ({} failed items)",
                self.file.path().display(),
                self.state.failed.len()
            );
        }
        Ok(RunSummary {
            job_key: job_key.to_string(),
            processed: self.state.processed(),
            succeeded: self.state.succeeded.len(),
            failed: self.state.failed.len(),
            failures: self.state.failed,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Immutable end-of-run record, persisted for observability and retry runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub job_key: String,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Item key → failure reason.
    pub failures: BTreeMap<String, String>,
    pub finished_at: String,
}

impl RunSummary {
    /// Failure counts grouped by the reason's kind prefix.
    pub fn breakdown(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for reason in self.failures.values() {
            let kind = reason.split(':').next().unwrap_or("other").trim();
            *out.entry(kind.to_string()).or_insert(0) += 1;
        }
        out
    }

    pub fn print(&self) {
        println!(
            "Run {}: {} processed ({} ok, {} failed)",
            self.job_key, self.processed, self.succeeded, self.failed
        );
        if self.failed > 0 {
            println!("Failure breakdown:");
            for (kind, count) in self.breakdown() {
                println!("  {}: {}", kind, count);
            }
            for (key, reason) in &self.failures {
                println!("  - {}: {}", key, reason);
            }
        }
    }
}

// ── Tests ──
