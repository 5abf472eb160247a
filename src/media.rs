//! Idempotent media download.
//!
//! Every record and author carries a download-state flag. A pass walks the
//! items whose flag is still false, fetches whatever files are missing on
//! disk and sets the flag only when every file of the item is present. An
//! item with a failing URL stays pending and is retried on the next pass.

use crate::config::ApiSettings;
use crate::error::{HoardError, Result};
use crate::log_progress;
use crate::logging::OperationGuard;
use crate::model::{ItemKind, PendingDownload};
use crate::store::ArchiveStore;
use reqwest::blocking::Client;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Items processed between commits.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Fetches the bytes behind a media URL.
pub trait MediaSource {
    /// # Errors
    ///
    /// Any failure; the caller treats it as transient.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP GET, no authentication.
pub struct HttpMediaSource {
    client: Client,
}

impl HttpMediaSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(api: &ApiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .user_agent(api.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

impl MediaSource for HttpMediaSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(HoardError::media_fetch(url, format!("HTTP {status}")));
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// Outcome of one download pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub items_completed: usize,
    pub items_failed: usize,
    pub files_fetched: usize,
    pub files_skipped: usize,
}

impl DownloadReport {
    fn absorb(&mut self, other: Self) {
        self.items_completed += other.items_completed;
        self.items_failed += other.items_failed;
        self.files_fetched += other.files_fetched;
        self.files_skipped += other.files_skipped;
    }
}

/// File name for a media URL: its last path segment, query stripped.
#[must_use]
pub fn file_name_for(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| is_plain_segment(s) && !s.contains(':'))
        .unwrap_or("media")
        .to_string()
}

/// True when `segment` names an entry inside its parent directory.
fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains(['/', '\\'])
}

pub struct MediaResolver<'a> {
    source: &'a dyn MediaSource,
    root: PathBuf,
    batch_size: usize,
}

impl<'a> MediaResolver<'a> {
    pub fn new(source: &'a dyn MediaSource, root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            root: root.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding an item's files.
    #[must_use]
    pub fn target_dir(&self, item: &PendingDownload) -> PathBuf {
        match item {
            PendingDownload::Record { id, .. } => self.root.join("records").join(id.to_string()),
            PendingDownload::Author { id, handle, .. } => {
                let dir = if is_plain_segment(handle) {
                    handle.clone()
                } else {
                    id.to_string()
                };
                self.root.join("authors").join(dir)
            }
        }
    }

    /// Download everything still pending: records first, then authors.
    ///
    /// # Errors
    ///
    /// Store failures and local filesystem failures abort the pass. Fetch
    /// failures do not; they leave the item pending.
    pub fn download_pending(&self, store: &mut dyn ArchiveStore) -> Result<DownloadReport> {
        let guard = OperationGuard::new("download media");
        let result = self.run_pass(store);
        guard.finish(result)
    }

    fn run_pass(&self, store: &mut dyn ArchiveStore) -> Result<DownloadReport> {
        let mut report = DownloadReport::default();
        for kind in [ItemKind::Record, ItemKind::Author] {
            report.absorb(self.download_kind(store, kind)?);
        }
        info!(
            "Media pass done: {} items complete, {} still pending, {} files fetched",
            report.items_completed, report.items_failed, report.files_fetched
        );
        Ok(report)
    }

    fn download_kind(&self, store: &mut dyn ArchiveStore, kind: ItemKind) -> Result<DownloadReport> {
        let items = store.pending_download_items(kind)?;
        let total = items.len();
        let mut report = DownloadReport::default();
        if total == 0 {
            return Ok(report);
        }
        info!("Downloading media for {total} {}s", kind.label());

        for (index, item) in items.iter().enumerate() {
            if self.download_item(item, &mut report)? {
                store.mark_downloaded(kind, item.id())?;
                report.items_completed += 1;
            } else {
                report.items_failed += 1;
            }

            let processed = index + 1;
            if processed % self.batch_size == 0 {
                store.commit()?;
                log_progress!(processed, total, "Committed {} media batch", kind.label());
            }
        }
        store.commit()?;
        Ok(report)
    }

    /// Returns `true` when every file of the item is on disk.
    fn download_item(&self, item: &PendingDownload, report: &mut DownloadReport) -> Result<bool> {
        let urls: Vec<&str> = match item {
            PendingDownload::Record { urls, .. } => urls.iter().map(String::as_str).collect(),
            PendingDownload::Author { avatar_url, .. } => avatar_url.as_deref().into_iter().collect(),
        };
        if urls.is_empty() {
            return Ok(true);
        }

        let dir = self.target_dir(item);
        fs::create_dir_all(&dir).map_err(|e| HoardError::path_error("create", &dir, e))?;

        let mut complete = true;
        for url in urls {
            let target = dir.join(file_name_for(url));
            if target.exists() {
                debug!("Already have {}", target.display());
                report.files_skipped += 1;
                continue;
            }

            match self.source.fetch(url) {
                Ok(bytes) => {
                    write_atomically(&target, &bytes)?;
                    report.files_fetched += 1;
                }
                Err(e) => {
                    warn!("Media download failed for {} {}: {e}", item.kind().label(), item.id());
                    complete = false;
                }
            }
        }
        Ok(complete)
    }
}

fn write_atomically(target: &Path, bytes: &[u8]) -> Result<()> {
    let partial = target.with_extension("part");
    fs::write(&partial, bytes).map_err(|e| HoardError::path_error("write", &partial, e))?;
    fs::rename(&partial, target).map_err(|e| HoardError::path_error("rename", target, e))?;
    Ok(())
}
