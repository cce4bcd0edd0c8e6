use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("transfer cancelled")]
    Cancelled,
}

#[derive(Clone)]
pub struct TransferClient {
    http: Client,
}

impl TransferClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    #[allow(dead_code)]
    pub fn with_http(http: Client) -> Self {
        Self { http }
    }

    /// Stream `href` into `target`, going through a `.partial` sibling so the
    /// target path never holds truncated bytes. A failed or cancelled
    /// transfer removes the partial file.
    pub async fn download_to_path(
        &self,
        href: &str,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let url = Url::parse(href)?;
        let response = self.http.get(url).send().await?.error_for_status()?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        if let Err(err) = write_stream(response, &partial, cancel).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        tokio::fs::rename(&partial, target).await?;
        Ok(())
    }
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_stream(
    response: reqwest::Response,
    partial: &Path,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let chunk = chunk?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
