use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, warn};

use crate::config::StorageConfig;

/// Which persisted id set to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSet {
    Notified,
    Responded,
}

/// Durable storage for the dedup id sets, one JSON array file per set.
#[derive(Debug, Clone)]
pub struct IdStore {
    notified_path: PathBuf,
    responded_path: PathBuf,
}

impl IdStore {
    pub fn new(notified_path: impl Into<PathBuf>, responded_path: impl Into<PathBuf>) -> Self {
        Self {
            notified_path: notified_path.into(),
            responded_path: responded_path.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.notified_path, &config.responded_path)
    }

    pub fn path(&self, set: IdSet) -> &Path {
        match set {
            IdSet::Notified => &self.notified_path,
            IdSet::Responded => &self.responded_path,
        }
    }

    /// Load a set; an unreadable or malformed file yields an empty set.
    pub fn load(&self, set: IdSet) -> HashSet<String> {
        load_ids(self.path(set))
    }

    /// Save a set; failures are logged and swallowed.
    pub fn save(&self, ids: &HashSet<String>, set: IdSet) {
        save_ids(ids, self.path(set));
    }
}

/// Read a JSON array of ids, falling back to an empty set.
pub fn load_ids(path: &Path) -> HashSet<String> {
    match try_load_ids(path) {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Could not load ids from {}: {e:#}", path.display());
            HashSet::new()
        }
    }
}

/// Write ids as a JSON array, logging any failure.
pub fn save_ids(ids: &HashSet<String>, path: &Path) {
    if let Err(e) = try_save_ids(ids, path) {
        error!("Could not save ids to {}: {e:#}", path.display());
    }
}

fn try_load_ids(path: &Path) -> Result<HashSet<String>> {
    let contents = fs::read_to_string(path).context("read failed")?;
    let ids: Vec<String> = serde_json::from_str(&contents).context("not a JSON array of strings")?;
    Ok(ids.into_iter().collect())
}

/// Write to a sibling temp file and rename over the target, so an interrupted
/// save leaves the previous file intact.
fn try_save_ids(ids: &HashSet<String>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();
    let contents = serde_json::to_string_pretty(&sorted).context("failed to serialize ids")?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
