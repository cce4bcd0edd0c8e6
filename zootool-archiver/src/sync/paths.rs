use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum NamingError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("url has no usable file name: {0}")]
    NoFileName(String),
}

/// Derive the local file name from the last path segment of an item url.
///
/// Segments that would escape the download root are rejected rather than
/// sanitized; the caller skips the item.
pub fn filename_from_url(raw: &str) -> Result<String, NamingError> {
    let url = Url::parse(raw)?;
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(NamingError::NoFileName(raw.to_string()));
    }
    Ok(name.to_string())
}

pub fn target_path(root: &Path, filename: &str) -> PathBuf {
    root.join(filename)
}
