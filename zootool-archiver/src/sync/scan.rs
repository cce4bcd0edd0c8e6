use std::collections::HashMap;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

use super::hash::fingerprint_file;
use super::index::INDEX_FILENAME;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Fingerprint every regular file under `root`, keyed by content hash with
/// root-relative (forward-slash) paths as values.
///
/// Two files with identical content are warned about; the later one wins,
/// which is all relinking needs. The index document and leftover transfer
/// artifacts are not part of the archive and are skipped.
pub fn scan_local_files(root: &Path) -> Result<HashMap<String, String>, ScanError> {
    let mut by_hash = HashMap::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if is_bookkeeping_file(&rel) {
            continue;
        }
        let hash = fingerprint_file(entry.path())?;
        if let Some(previous) = by_hash.insert(hash.clone(), rel.clone()) {
            warn!(%hash, first = %previous, second = %rel, "duplicate file content on disk");
        }
    }
    Ok(by_hash)
}

fn is_bookkeeping_file(rel: &str) -> bool {
    rel == INDEX_FILENAME || rel.ends_with(".partial") || rel.ends_with(".tmp")
}
