//! Incremental ingestion of remote feeds and CSV exports.
//!
//! # API mode
//!
//! [`IngestionPipeline::run`] pages backwards through a feed. Each request
//! asks for records strictly older than everything seen so far (`max_id`).
//! Paging stops when the remote runs dry or when the scan reaches content the
//! archive already holds; for the timeline, the first known identity marks
//! the boundary. Every new status is snapshotted to disk as soon as it is
//! seen. The batch is merged into the store newest-first and committed once
//! paging ends.
//!
//! # CSV mode
//!
//! [`IngestionPipeline::import_csv`] reads the export, looks the unknown
//! identities up in groups of up to 100 and merges whatever the remote still
//! returns. Identities the remote no longer knows become standalone records
//! built from the CSV row.
//!
//! In both modes a throttling error forces a backoff wait and the same
//! request is retried, and pacing waits are first offered to the media
//! resolver.

use crate::backoff::{Backoff, Clock, RateBudget, WaitStats};
use crate::config::{Config, RateLimits};
use crate::error::{HoardError, Result};
use crate::identity::IdentitySet;
use crate::log_progress;
use crate::logging::OperationGuard;
use crate::media::{DownloadReport, MediaResolver};
use crate::merge::{MergeOutcome, ReconciliationMerge};
use crate::model::{FeedKind, RawStatus, Record};
use crate::parser::ExportParser;
use crate::remote::{MAX_LOOKUP_IDS, PAGE_SIZE, RemoteFeed, estimate_lookup_seconds};
use crate::snapshot::SnapshotWriter;
use crate::store::ArchiveStore;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Paging boundaries for one run.
///
/// Public runs always start unbounded. A `since_id` only matters to a remote
/// that ignores it and still returns identities at or above the boundary;
/// one that honours it never triggers the check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CursorState {
    /// Identities at or above this end the scan.
    pub(crate) since_id: Option<u64>,
    /// Upper bound (inclusive) for the next page request.
    pub(crate) max_id: Option<u64>,
}

impl CursorState {
    pub(crate) const fn passes_since(&self, id: u64) -> bool {
        match self.since_id {
            Some(since) => id >= since,
            None => false,
        }
    }

    /// Exclude `id` and everything newer from the next page.
    ///
    /// Returns `false` once `id` is 0: nothing older can exist, and an
    /// inclusive `max_id` of 0 would serve the same record forever.
    pub(crate) fn advance_past(&mut self, id: u64) -> bool {
        let Some(next) = id.checked_sub(1) else {
            return false;
        };
        self.max_id = Some(self.max_id.map_or(next, |current| current.min(next)));
        true
    }
}

/// Tunables for a pipeline, usually derived from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub page_size: usize,
    pub lookup_batch: usize,
    pub upgrade_csv_stubs: bool,
    pub budgets: RateLimits,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            lookup_batch: MAX_LOOKUP_IDS,
            upgrade_csv_stubs: true,
            budgets: RateLimits::default(),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size(),
            lookup_batch: MAX_LOOKUP_IDS,
            upgrade_csv_stubs: config.sync.upgrade_csv_stubs,
            budgets: config.rate_limits,
        }
    }
}

impl PipelineSettings {
    const fn budget_for(&self, kind: FeedKind) -> RateBudget {
        match kind {
            FeedKind::Timeline => self.budgets.timeline,
            FeedKind::Favorites => self.budgets.favorites,
        }
    }
}

/// Counters for the most recent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub pages: u64,
    pub requests: u64,
    pub forced_waits: u64,
    pub paced_waits: u64,
    pub deferred_runs: u64,
    pub inserted: u64,
    pub upgraded: u64,
    pub skipped: u64,
    pub favorites: u64,
}

impl RunStats {
    fn absorb_waits(&mut self, waits: WaitStats) {
        self.requests += waits.requests;
        self.forced_waits += waits.forced_waits;
        self.paced_waits += waits.paced_waits;
        self.deferred_runs += waits.deferred_runs;
    }

    fn count(&mut self, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted(_) => self.inserted += 1,
            MergeOutcome::Upgraded(_) => self.upgraded += 1,
            MergeOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Result of a CSV reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsvImportReport {
    /// CSV rows not yet archived when the import started.
    pub pending: usize,
    /// Bulk lookups issued, excluding retries.
    pub lookups: usize,
    /// Pending identities the remote confirmed.
    pub confirmed: usize,
    /// Pending identities inserted from CSV data alone.
    pub stubs: usize,
}

pub struct IngestionPipeline<'a> {
    store: &'a mut dyn ArchiveStore,
    feed: &'a mut dyn RemoteFeed,
    clock: &'a dyn Clock,
    snapshots: SnapshotWriter,
    media: Option<MediaResolver<'a>>,
    actor: String,
    settings: PipelineSettings,
    merge: ReconciliationMerge,
    stats: RunStats,
}

impl<'a> IngestionPipeline<'a> {
    /// `actor` is the handle being archived: the timeline owner and the
    /// account whose favorites are marked.
    pub fn new(
        store: &'a mut dyn ArchiveStore,
        feed: &'a mut dyn RemoteFeed,
        clock: &'a dyn Clock,
        snapshots: SnapshotWriter,
        actor: impl Into<String>,
    ) -> Self {
        let settings = PipelineSettings::default();
        Self {
            store,
            feed,
            clock,
            snapshots,
            media: None,
            actor: actor.into().trim_start_matches('@').to_string(),
            settings,
            merge: ReconciliationMerge::new(settings.upgrade_csv_stubs),
            stats: RunStats::default(),
        }
    }

    /// Download media during pacing waits.
    #[must_use]
    pub fn with_media(mut self, media: MediaResolver<'a>) -> Self {
        self.media = Some(media);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self.merge = ReconciliationMerge::new(settings.upgrade_csv_stubs);
        self
    }

    #[must_use]
    pub const fn last_run_stats(&self) -> RunStats {
        self.stats
    }

    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Archive the timeline, then the favorites, of the actor.
    ///
    /// # Errors
    ///
    /// Propagates the first non-throttling failure.
    pub fn archive_account(&mut self, known: &mut IdentitySet) -> Result<Vec<Record>> {
        let mut inserted = self.run(FeedKind::Timeline, known)?;
        let timeline_stats = self.stats;
        inserted.extend(self.run(FeedKind::Favorites, known)?);
        self.stats = merge_stats(timeline_stats, self.stats);
        Ok(inserted)
    }

    /// Ingest one feed from the newest item backwards.
    ///
    /// Newly inserted identities are added to `known`. Returns the inserted
    /// records, newest first.
    ///
    /// # Errors
    ///
    /// Propagates any failure other than throttling. Records of an aborted
    /// run are not committed; their snapshots remain on disk.
    pub fn run(&mut self, kind: FeedKind, known: &mut IdentitySet) -> Result<Vec<Record>> {
        self.run_from(kind, known, CursorState::default())
    }

    /// [`run`](Self::run) continuing from an existing cursor.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub(crate) fn run_from(
        &mut self,
        kind: FeedKind,
        known: &mut IdentitySet,
        cursor: CursorState,
    ) -> Result<Vec<Record>> {
        self.stats = RunStats::default();
        let guard = OperationGuard::new(format!("sync {kind} for @{}", self.actor));
        let result = self.ingest_feed(kind, known, cursor);
        guard.finish(result)
    }

    fn ingest_feed(
        &mut self,
        kind: FeedKind,
        known: &mut IdentitySet,
        mut cursor: CursorState,
    ) -> Result<Vec<Record>> {
        let clock = self.clock;
        let mut backoff = Backoff::new(self.settings.budget_for(kind), clock);
        let mut batch: Vec<RawStatus> = Vec::new();

        loop {
            backoff.before_request(|| self.run_deferred_media())?;

            let page = match self.feed.page(
                kind,
                cursor.since_id,
                cursor.max_id,
                self.settings.page_size,
            ) {
                Ok(page) => page,
                Err(HoardError::RateLimited { retry_after }) => {
                    backoff.force(retry_after);
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.stats.pages += 1;

            if page.is_empty() {
                debug!("Remote {kind} feed exhausted");
                break;
            }

            let mut stop = false;
            for status in page {
                if cursor.passes_since(status.id)
                    || (kind == FeedKind::Timeline && known.contains(status.id))
                {
                    debug!("Reached archived status {}, stopping", status.id);
                    stop = true;
                    break;
                }
                self.snapshots.write(&status)?;
                let more = cursor.advance_past(status.id);
                batch.push(status);
                if !more {
                    debug!("Reached identity 0, nothing older to fetch");
                    stop = true;
                    break;
                }
            }
            if stop {
                break;
            }
        }
        self.stats.absorb_waits(backoff.stats());

        batch.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        batch.dedup_by_key(|s| s.id);
        info!("Adding {} {kind} statuses to the archive...", batch.len());

        let favorite_of = (kind == FeedKind::Favorites).then_some(self.actor.as_str());
        let mut inserted = Vec::new();
        for status in &batch {
            let outcome = self.merge.apply(&mut *self.store, status, favorite_of)?;
            self.stats.count(&outcome);
            if favorite_of.is_some() {
                self.stats.favorites += 1;
            }
            if let MergeOutcome::Inserted(record) = outcome {
                known.insert(record.id);
                inserted.push(record);
            }
        }
        self.store.commit()?;

        info!(
            "{kind}: {} new, {} upgraded, {} already archived over {} pages",
            self.stats.inserted, self.stats.upgraded, self.stats.skipped, self.stats.pages
        );
        Ok(inserted)
    }

    /// Reconcile a CSV export against the remote.
    ///
    /// Only identities absent from `known` are considered. Those the remote
    /// confirms are merged like any API record; the rest become CSV stubs.
    ///
    /// # Errors
    ///
    /// Propagates parse failures and any non-throttling remote or store error.
    pub fn import_csv(&mut self, path: &Path, known: &mut IdentitySet) -> Result<CsvImportReport> {
        self.stats = RunStats::default();
        let guard = OperationGuard::new(format!("import {} for @{}", path.display(), self.actor));
        let result = self.reconcile_csv(path, known);
        guard.finish(result)
    }

    fn reconcile_csv(&mut self, path: &Path, known: &mut IdentitySet) -> Result<CsvImportReport> {
        let pending = ExportParser::new(path).parse_pending(&self.actor, known)?;
        let budget = self.settings.budgets.lookup;
        let mut report = CsvImportReport {
            pending: pending.len(),
            ..CsvImportReport::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }
        info!(
            "Estimated time to complete import: {} seconds",
            estimate_lookup_seconds(pending.len(), budget)
        );

        let ids: Vec<u64> = pending.keys().copied().collect();
        let groups = ids.chunks(self.settings.lookup_batch.clamp(1, MAX_LOOKUP_IDS));
        let group_count = groups.len();
        let clock = self.clock;
        let mut backoff = Backoff::new(budget, clock);

        for (index, group) in groups.enumerate() {
            let statuses = loop {
                backoff.before_request(|| self.run_deferred_media())?;
                match self.feed.bulk_lookup(group) {
                    Ok(statuses) => break statuses,
                    Err(HoardError::RateLimited { retry_after }) => backoff.force(retry_after),
                    Err(e) => return Err(e),
                }
            };
            report.lookups += 1;

            for status in &statuses {
                self.snapshots.write(status)?;
                let outcome = self.merge.apply(&mut *self.store, status, None)?;
                self.stats.count(&outcome);
                if pending.contains_key(&status.id) {
                    report.confirmed += 1;
                }
                if let MergeOutcome::Inserted(record) = outcome {
                    known.insert(record.id);
                }
            }
            self.store.commit()?;
            log_progress!(index + 1, group_count, "Looked up {} of {} groups", index + 1, group_count);
        }
        self.stats.absorb_waits(backoff.stats());

        for record in pending.values() {
            if self.merge.insert_stub(&mut *self.store, record)? {
                report.stubs += 1;
                self.stats.inserted += 1;
                known.insert(record.id);
            }
        }
        self.store.commit()?;

        info!(
            "CSV import: {} pending, {} confirmed by the API, {} stored from CSV only",
            report.pending, report.confirmed, report.stubs
        );
        Ok(report)
    }

    /// Explicit media pass. Does nothing without a resolver.
    ///
    /// # Errors
    ///
    /// Propagates store and filesystem failures from the resolver.
    pub fn download_media(&mut self) -> Result<DownloadReport> {
        match &self.media {
            Some(media) => media.download_pending(&mut *self.store),
            None => Ok(DownloadReport::default()),
        }
    }

    fn run_deferred_media(&mut self) -> Result<()> {
        self.download_media().map(|_| ())
    }
}

fn merge_stats(a: RunStats, b: RunStats) -> RunStats {
    RunStats {
        pages: a.pages + b.pages,
        requests: a.requests + b.requests,
        forced_waits: a.forced_waits + b.forced_waits,
        paced_waits: a.paced_waits + b.paced_waits,
        deferred_runs: a.deferred_runs + b.deferred_runs,
        inserted: a.inserted + b.inserted,
        upgraded: a.upgraded + b.upgraded,
        skipped: a.skipped + b.skipped,
        favorites: a.favorites + b.favorites,
    }
}
