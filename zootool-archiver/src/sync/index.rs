#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use zootool_core::Item;

pub const INDEX_FILENAME: &str = "Info.json";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What to do with an entry whose content cannot be found anywhere on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Keep the stale entry in the document (warned about every run).
    #[default]
    Keep,
    /// Remove the entry, accepting the metadata loss.
    Drop,
}

/// Metadata persisted for one downloaded file.
///
/// `extra` flattens any fields this version does not know about, so a
/// document written by a newer version survives a rewrite intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub uid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub added: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source: String,
    pub hash: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IndexEntry {
    pub fn from_item(item: &Item, hash: String) -> Self {
        Self {
            uid: item.uid.clone(),
            title: item.title.clone(),
            added: item.added.clone(),
            description: item.description.clone(),
            tags: item.tags.clone(),
            url: item.url.clone(),
            source: item.referer.clone(),
            hash,
            extra: serde_json::Map::new(),
        }
    }
}

/// The persisted mapping from root-relative path to item metadata, plus
/// derived lookup tables that are rebuilt in memory and never written out.
pub struct MetadataIndex {
    root: PathBuf,
    path: PathBuf,
    entries: BTreeMap<String, IndexEntry>,
    by_hash: HashMap<String, String>,
    by_uid: HashMap<String, String>,
    orphan_policy: OrphanPolicy,
}

impl MetadataIndex {
    /// Read `<root>/Info.json`. A missing document starts empty; an
    /// unparseable one is warned about and also starts empty, so one bad
    /// write never blocks future runs.
    pub fn load(root: &Path, orphan_policy: OrphanPolicy) -> Result<Self, IndexError> {
        let path = root.join(INDEX_FILENAME);
        let entries = if path.is_file() {
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str::<BTreeMap<String, IndexEntry>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(%err, "metadata index corrupted, starting over");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        let mut index = Self {
            root: root.to_path_buf(),
            path,
            entries,
            by_hash: HashMap::new(),
            by_uid: HashMap::new(),
            orphan_policy,
        };
        index.rebuild_lookups();
        Ok(index)
    }

    fn rebuild_lookups(&mut self) {
        self.by_hash.clear();
        self.by_uid.clear();
        for (key, entry) in &self.entries {
            if let Some(previous) = self.by_hash.insert(entry.hash.clone(), key.clone()) {
                warn!(hash = %entry.hash, first = %previous, second = %key,
                    "duplicate hash in index");
            }
            self.by_uid.insert(entry.uid.clone(), key.clone());
        }
    }

    /// Re-key entries whose file moved (matched by fingerprint among the
    /// files actually on disk) and apply the orphan policy to the rest.
    /// Persists immediately when anything changed. Returns the relink count.
    pub fn reconcile(&mut self, on_disk: &HashMap<String, String>) -> Result<usize, IndexError> {
        let lost: Vec<String> = self
            .entries
            .keys()
            .filter(|key| !self.root.join(key).is_file())
            .cloned()
            .collect();
        if lost.is_empty() {
            return Ok(0);
        }

        let mut relinked = 0;
        let mut changed = false;
        for old_key in lost {
            let Some(entry) = self.entries.remove(&old_key) else {
                continue;
            };
            match on_disk.get(&entry.hash) {
                Some(new_key) => {
                    debug!(from = %old_key, to = %new_key, "relinking index entry");
                    self.entries.insert(new_key.clone(), entry);
                    relinked += 1;
                    changed = true;
                }
                None => match self.orphan_policy {
                    OrphanPolicy::Keep => {
                        warn!(path = %old_key, "file lost, keeping orphaned entry");
                        self.entries.insert(old_key, entry);
                    }
                    OrphanPolicy::Drop => {
                        warn!(path = %old_key, "file lost, dropping orphaned entry");
                        changed = true;
                    }
                },
            }
        }

        self.rebuild_lookups();
        if changed {
            self.save()?;
        }
        Ok(relinked)
    }

    pub fn contains_uid(&self, uid: &str) -> bool {
        self.by_uid.contains_key(uid)
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn add(&mut self, path: impl Into<String>, entry: IndexEntry) {
        let path = path.into();
        self.by_hash.insert(entry.hash.clone(), path.clone());
        self.by_uid.insert(entry.uid.clone(), path.clone());
        self.entries.insert(path, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whole-document overwrite through a temp file sibling, so a crash
    /// mid-write cannot truncate the index.
    pub fn save(&self) -> Result<(), IndexError> {
        let raw = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
