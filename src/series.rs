use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

/// Series-code → English-title map, loaded once per process and passed by
/// reference. Never mutated mid-run; `check --update` merges and saves a
/// new copy.
#[derive(Debug, Clone)]
pub struct SeriesMap {
    entries: BTreeMap<String, String>,
    path: PathBuf,
}

impl SeriesMap {
    /// Load from a JSON file. Accepts the current object form and the
    /// legacy array form (every title mapping to itself). A missing file is
    /// an empty map.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            info!("No series map at {}, starting empty", path.display());
            return Ok(Self {
                entries: BTreeMap::new(),
                path,
            });
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading series map {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing series map {}", path.display()))?;

        let entries = match value {
            serde_json::Value::Array(titles) => titles
                .into_iter()
                .filter_map(|v| v.as_str().map(|s| (s.to_string(), s.to_string())))
                .collect(),
            serde_json::Value::Object(map) => map
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                .collect(),
            other => anyhow::bail!(
                "series map {} must be a JSON object or array, got {}",
                path.display(),
                other
            ),
        };
        Ok(Self { entries, path })
    }

    /// English title for a series code, falling back to the code itself for
    /// series not mapped yet.
    pub fn title_for<'a>(&'a self, code: &'a str) -> &'a str {
        self.entries.get(code).map(String::as_str).unwrap_or(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// All mapped codes — the "known" side of series reconciliation.
    pub fn known_codes(&self) -> HashSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn merge(&mut self, new_entries: BTreeMap<String, String>) {
        self.entries.extend(new_entries);
    }

    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json)
            .with_context(|| format!("writing series map {}", self.path.display()))?;
        Ok(())
    }
}

// ── Tests ──
