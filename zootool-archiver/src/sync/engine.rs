use std::path::PathBuf;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zootool_core::{Item, PAGE_SIZE, ZootoolClient, ZootoolError};

use super::hash::fingerprint_file;
use super::index::{IndexEntry, IndexError, MetadataIndex};
use super::paths::{filename_from_url, target_path};
use super::scan::{ScanError, scan_local_files};
use super::transfer::{TransferClient, TransferError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("api error: {0}")]
    Api(#[from] ZootoolError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-end summary of what happened to each remote item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub downloaded: usize,
    pub skipped_non_image: usize,
    pub skipped_duplicate: usize,
    pub skipped_collision: usize,
    pub failed: usize,
    pub relinked: usize,
}

enum ItemOutcome {
    Downloaded,
    SkippedNonImage,
    SkippedDuplicate,
    SkippedCollision,
    Failed,
}

pub struct SyncEngine {
    client: ZootoolClient,
    index: MetadataIndex,
    transfer: TransferClient,
    root: PathBuf,
    username: String,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        client: ZootoolClient,
        index: MetadataIndex,
        root: PathBuf,
        username: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            index,
            transfer: TransferClient::new(),
            root,
            username,
            cancel,
        }
    }

    #[allow(dead_code)]
    pub fn with_transfer(mut self, transfer: TransferClient) -> Self {
        self.transfer = transfer;
        self
    }

    /// Reconcile the index against the files actually on disk, then walk the
    /// remote item pages and download whatever is missing. The index is
    /// persisted after every completed page, so a crash loses at most one
    /// page of additions. Cancellation is honored between pages and between
    /// items; a cancelled run still persists what it has.
    pub async fn run(&mut self) -> Result<SyncReport, EngineError> {
        let mut report = SyncReport::default();

        let local = scan_local_files(&self.root)?;
        report.relinked = self.index.reconcile(&local)?;

        let client = self.client.clone();
        let mut pages = client.item_pages(&self.username, PAGE_SIZE);
        'pages: while let Some(page) = pages.next_page().await? {
            if self.cancel.is_cancelled() {
                info!("cancellation requested, stopping before next page");
                break;
            }
            for item in &page {
                if self.cancel.is_cancelled() {
                    info!("cancellation requested, stopping mid-page");
                    break 'pages;
                }
                match self.process_item(item).await? {
                    ItemOutcome::Downloaded => report.downloaded += 1,
                    ItemOutcome::SkippedNonImage => report.skipped_non_image += 1,
                    ItemOutcome::SkippedDuplicate => report.skipped_duplicate += 1,
                    ItemOutcome::SkippedCollision => report.skipped_collision += 1,
                    ItemOutcome::Failed => report.failed += 1,
                }
            }
            self.index.save()?;
        }
        self.index.save()?;

        info!(
            downloaded = report.downloaded,
            skipped_duplicate = report.skipped_duplicate,
            skipped_collision = report.skipped_collision,
            skipped_non_image = report.skipped_non_image,
            failed = report.failed,
            relinked = report.relinked,
            "sync finished"
        );
        Ok(report)
    }

    async fn process_item(&mut self, item: &Item) -> Result<ItemOutcome, EngineError> {
        if !item.is_image() {
            debug!(uid = %item.uid, kind = %item.kind, "skipping: not an image");
            return Ok(ItemOutcome::SkippedNonImage);
        }
        let filename = match filename_from_url(&item.url) {
            Ok(filename) => filename,
            Err(err) => {
                warn!(uid = %item.uid, url = %item.url, %err, "skipping: no usable file name");
                return Ok(ItemOutcome::Failed);
            }
        };
        if self.index.contains_uid(&item.uid) {
            debug!(uid = %item.uid, %filename, "skipping: already downloaded");
            return Ok(ItemOutcome::SkippedDuplicate);
        }
        let target = target_path(&self.root, &filename);
        if target.exists() {
            warn!(%filename, "skipping: file already exists at target path");
            return Ok(ItemOutcome::SkippedCollision);
        }

        info!(url = %item.url, %filename, "downloading");
        if let Err(err) = self
            .transfer
            .download_to_path(&item.url, &target, &self.cancel)
            .await
        {
            match err {
                TransferError::Cancelled => debug!(%filename, "download cancelled"),
                err => warn!(uid = %item.uid, %filename, %err, "download failed, skipping item"),
            }
            return Ok(ItemOutcome::Failed);
        }

        let hash = fingerprint_file(&target)?;
        self.index.add(filename, IndexEntry::from_item(item, hash));
        Ok(ItemOutcome::Downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::hash::fingerprint_bytes;
    use crate::sync::index::{INDEX_FILENAME, OrphanPolicy};
    use std::path::Path;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_engine(server: &MockServer, root: &Path) -> SyncEngine {
        let client = ZootoolClient::with_base_url(&server.uri(), "test-key").unwrap();
        let index = MetadataIndex::load(root, OrphanPolicy::Keep).unwrap();
        SyncEngine::new(
            client,
            index,
            root.to_path_buf(),
            "tester".to_string(),
            CancellationToken::new(),
        )
    }

    fn item(uid: &str, url: &str, kind: &str) -> serde_json::Value {
        serde_json::json!({
            "uid": uid,
            "title": format!("item {uid}"),
            "added": "2011-10-17 19:44:01",
            "description": "",
            "tags": ["pets"],
            "url": url,
            "referer": "http://example.com/gallery",
            "type": kind
        })
    }

    async fn mount_page(server: &MockServer, offset: u32, items: Vec<serde_json::Value>) {
        Mock::given(method("GET"))
            .and(path("/api/users/items/"))
            .and(query_param("offset", offset.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Array(items)))
            .mount(server)
            .await;
    }

    async fn mount_file(server: &MockServer, file_path: &str, bytes: &[u8]) {
        Mock::given(method("GET"))
            .and(path(file_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn downloads_new_item_and_indexes_it() {
        let server = MockServer::start().await;
        let url = format!("{}/x/cat.png", server.uri());
        mount_page(&server, 0, vec![item("42", &url, "image")]).await;
        mount_file(&server, "/x/cat.png", b"png bytes").await;

        let dir = tempdir().unwrap();
        let mut engine = make_engine(&server, dir.path());
        let report = engine.run().await.unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(std::fs::read(dir.path().join("cat.png")).unwrap(), b"png bytes");

        let entry = engine.index.get("cat.png").expect("entry for cat.png");
        assert_eq!(entry.uid, "42");
        assert_eq!(entry.source, "http://example.com/gallery");
        assert_eq!(entry.hash, fingerprint_bytes(b"png bytes"));
        assert!(dir.path().join(INDEX_FILENAME).is_file());
    }

    #[tokio::test]
    async fn second_run_downloads_nothing() {
        let server = MockServer::start().await;
        let url = format!("{}/x/cat.png", server.uri());
        mount_page(&server, 0, vec![item("42", &url, "image")]).await;

        Mock::given(method("GET"))
            .and(path("/x/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let first = make_engine(&server, dir.path()).run().await.unwrap();
        assert_eq!(first.downloaded, 1);

        let second = make_engine(&server, dir.path()).run().await.unwrap();
        assert_eq!(second.downloaded, 0);
        assert_eq!(second.skipped_duplicate, 1);
    }

    #[tokio::test]
    async fn renamed_file_is_relinked_not_redownloaded() {
        let server = MockServer::start().await;
        let url = format!("{}/x/cat.png", server.uri());
        mount_page(&server, 0, vec![item("42", &url, "image")]).await;

        Mock::given(method("GET"))
            .and(path("/x/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        make_engine(&server, dir.path()).run().await.unwrap();
        std::fs::rename(dir.path().join("cat.png"), dir.path().join("kitty.png")).unwrap();

        let mut engine = make_engine(&server, dir.path());
        let report = engine.run().await.unwrap();

        assert_eq!(report.relinked, 1);
        assert_eq!(report.downloaded, 0);
        assert_eq!(report.skipped_duplicate, 1);
        assert!(engine.index.get("cat.png").is_none());
        assert_eq!(engine.index.get("kitty.png").unwrap().uid, "42");
    }

    #[tokio::test]
    async fn indexed_uid_is_never_redownloaded_regardless_of_filename() {
        let server = MockServer::start().await;
        let url = format!("{}/x/renamed-remote.png", server.uri());
        mount_page(&server, 0, vec![item("42", &url, "image")]).await;

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("old.png"), b"old bytes").unwrap();
        let mut seeded = MetadataIndex::load(dir.path(), OrphanPolicy::Keep).unwrap();
        let remote = Item {
            uid: "42".to_string(),
            title: "old".to_string(),
            added: String::new(),
            description: String::new(),
            tags: Vec::new(),
            url: "http://example.com/old.png".to_string(),
            referer: String::new(),
            kind: "image".to_string(),
        };
        seeded.add(
            "old.png",
            IndexEntry::from_item(&remote, fingerprint_bytes(b"old bytes")),
        );
        seeded.save().unwrap();

        let report = make_engine(&server, dir.path()).run().await.unwrap();

        assert_eq!(report.downloaded, 0);
        assert_eq!(report.skipped_duplicate, 1);
        // No mock for the remote file path: a download attempt would have
        // failed the run's counts.
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn refuses_to_overwrite_unindexed_file() {
        let server = MockServer::start().await;
        let url = format!("{}/x/cat.png", server.uri());
        mount_page(&server, 0, vec![item("42", &url, "image")]).await;

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("cat.png"), b"somebody else's cat").unwrap();

        let mut engine = make_engine(&server, dir.path());
        let report = engine.run().await.unwrap();

        assert_eq!(report.skipped_collision, 1);
        assert_eq!(report.downloaded, 0);
        assert_eq!(
            std::fs::read(dir.path().join("cat.png")).unwrap(),
            b"somebody else's cat"
        );
        assert!(engine.index.get("cat.png").is_none());
    }

    #[tokio::test]
    async fn non_image_items_are_filtered_out() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            0,
            vec![
                item("1", "http://example.com/article", "link"),
                item("2", "http://example.com/clip.mov", "video"),
            ],
        )
        .await;

        let dir = tempdir().unwrap();
        let report = make_engine(&server, dir.path()).run().await.unwrap();

        assert_eq!(report.skipped_non_image, 2);
        assert_eq!(report.downloaded, 0);
    }

    #[tokio::test]
    async fn stops_after_short_page() {
        let server = MockServer::start().await;
        let full: Vec<serde_json::Value> = (0..100)
            .map(|i| item(&format!("p0-{i}"), "http://example.com/article", "link"))
            .collect();
        let short: Vec<serde_json::Value> = (0..37)
            .map(|i| item(&format!("p1-{i}"), "http://example.com/article", "link"))
            .collect();
        mount_page(&server, 0, full).await;
        mount_page(&server, 100, short).await;

        let dir = tempdir().unwrap();
        let report = make_engine(&server, dir.path()).run().await.unwrap();

        // A third page request would have hit no mock and failed the run.
        assert_eq!(report.skipped_non_image, 137);
    }

    #[tokio::test]
    async fn malformed_item_url_skips_item_and_continues() {
        let server = MockServer::start().await;
        let good = format!("{}/x/good.png", server.uri());
        mount_page(
            &server,
            0,
            vec![
                item("1", "http://example.com/gallery/", "image"),
                item("2", &good, "image"),
            ],
        )
        .await;
        mount_file(&server, "/x/good.png", b"good bytes").await;

        let dir = tempdir().unwrap();
        let report = make_engine(&server, dir.path()).run().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.downloaded, 1);
        assert!(dir.path().join("good.png").is_file());
    }

    #[tokio::test]
    async fn transfer_failure_skips_item_and_continues() {
        let server = MockServer::start().await;
        let bad = format!("{}/x/bad.png", server.uri());
        let good = format!("{}/x/good.png", server.uri());
        mount_page(
            &server,
            0,
            vec![item("1", &bad, "image"), item("2", &good, "image")],
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/x/bad.png"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_file(&server, "/x/good.png", b"good bytes").await;

        let dir = tempdir().unwrap();
        let mut engine = make_engine(&server, dir.path());
        let report = engine.run().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.downloaded, 1);
        assert!(!dir.path().join("bad.png").exists());
        assert!(!dir.path().join("bad.png.partial").exists());
        assert!(dir.path().join("good.png").is_file());
        assert!(engine.index.get("bad.png").is_none());
        assert_eq!(engine.index.get("good.png").unwrap().uid, "2");
    }

    #[tokio::test]
    async fn cancelled_run_persists_index_and_stops() {
        let server = MockServer::start().await;
        let url = format!("{}/x/cat.png", server.uri());
        mount_page(&server, 0, vec![item("42", &url, "image")]).await;
        mount_file(&server, "/x/cat.png", b"png bytes").await;

        let dir = tempdir().unwrap();
        let client = ZootoolClient::with_base_url(&server.uri(), "test-key").unwrap();
        let index = MetadataIndex::load(dir.path(), OrphanPolicy::Keep).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut engine = SyncEngine::new(
            client,
            index,
            dir.path().to_path_buf(),
            "tester".to_string(),
            cancel,
        );

        let report = engine.run().await.unwrap();

        assert_eq!(report.downloaded, 0);
        assert!(dir.path().join(INDEX_FILENAME).is_file());
    }
}
