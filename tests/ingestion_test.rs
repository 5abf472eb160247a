//! Integration tests for the ingestion engine.
//!
//! The remote is simulated in-process: it serves pages the way the real API
//! does (newest first, bounded by `since_id`/`max_id`) and can be told to
//! throttle specific calls. The clock is manual, so waits are recorded
//! instead of slept.

use hoard::error::HoardError;
use hoard::remote::validate_lookup_ids;
use hoard::{
    ArchiveStore, Clock, FeedKind, IdentitySet, IngestionPipeline, ItemKind, MediaResolver,
    MediaSource, PipelineSettings, Provenance, RateBudget, RawStatus, RemoteFeed, Result,
    SnapshotWriter, Storage,
};
use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// =============================================================================
// Test doubles
// =============================================================================

struct ManualClock {
    base: Instant,
    offset: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.offset.set(self.offset.get() + duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PageRequest {
    kind: FeedKind,
    since_id: Option<u64>,
    max_id: Option<u64>,
}

#[derive(Default)]
struct SimulatedRemote {
    timeline: Vec<RawStatus>,
    favorites: Vec<RawStatus>,
    lookup_index: HashMap<u64, RawStatus>,
    /// 1-based call numbers (pages and lookups together) that get throttled.
    throttle_calls: HashSet<usize>,
    calls: usize,
    requests: Vec<PageRequest>,
    served: Vec<Vec<u64>>,
    lookups: Vec<Vec<u64>>,
}

impl SimulatedRemote {
    fn with_timeline(mut self, statuses: Vec<RawStatus>) -> Self {
        self.timeline = newest_first(statuses);
        self
    }

    fn with_favorites(mut self, statuses: Vec<RawStatus>) -> Self {
        self.favorites = newest_first(statuses);
        self
    }

    fn with_lookup(mut self, statuses: Vec<RawStatus>) -> Self {
        self.lookup_index = statuses.into_iter().map(|s| (s.id, s)).collect();
        self
    }

    fn throttle(mut self, call: usize) -> Self {
        self.throttle_calls.insert(call);
        self
    }

    fn next_call_throttled(&mut self) -> bool {
        self.calls += 1;
        self.throttle_calls.contains(&self.calls)
    }
}

fn newest_first(mut statuses: Vec<RawStatus>) -> Vec<RawStatus> {
    statuses.sort_by(|a, b| b.id.cmp(&a.id));
    statuses
}

impl RemoteFeed for SimulatedRemote {
    fn page(
        &mut self,
        kind: FeedKind,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: usize,
    ) -> Result<Vec<RawStatus>> {
        self.requests.push(PageRequest {
            kind,
            since_id,
            max_id,
        });
        if self.next_call_throttled() {
            return Err(HoardError::rate_limited(None));
        }

        let source = match kind {
            FeedKind::Timeline => &self.timeline,
            FeedKind::Favorites => &self.favorites,
        };
        let page: Vec<RawStatus> = source
            .iter()
            .filter(|s| since_id.is_none_or(|since| s.id > since))
            .filter(|s| max_id.is_none_or(|max| s.id <= max))
            .take(count)
            .cloned()
            .collect();
        self.served.push(page.iter().map(|s| s.id).collect());
        Ok(page)
    }

    fn bulk_lookup(&mut self, ids: &[u64]) -> Result<Vec<RawStatus>> {
        validate_lookup_ids(ids)?;
        if self.next_call_throttled() {
            return Err(HoardError::rate_limited(Some(Duration::from_secs(30))));
        }
        self.lookups.push(ids.to_vec());
        Ok(ids
            .iter()
            .filter_map(|id| self.lookup_index.get(id).cloned())
            .collect())
    }
}

#[derive(Default)]
struct FakeMedia {
    fetched: RefCell<Vec<String>>,
}

impl FakeMedia {
    fn fetch_count(&self) -> usize {
        self.fetched.borrow().len()
    }
}

impl MediaSource for FakeMedia {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.fetched.borrow_mut().push(url.to_string());
        if url.contains("broken") {
            return Err(HoardError::media_fetch(url, "HTTP 404 Not Found"));
        }
        Ok(url.as_bytes().to_vec())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn status(id: u64, author: u64, tags: &[&str], media: &[&str]) -> RawStatus {
    let hashtags: Vec<Value> = tags.iter().map(|t| json!({ "text": t })).collect();
    let media: Vec<Value> = media
        .iter()
        .map(|url| json!({ "media_url_https": url }))
        .collect();
    serde_json::from_value(json!({
        "id": id,
        "full_text": format!("status {id}"),
        "created_at": "Wed Oct 10 20:19:24 +0000 2018",
        "user": {
            "id": author,
            "screen_name": format!("user{author}"),
            "profile_image_url_https": format!("https://pbs.example/avatars/{author}.jpg")
        },
        "entities": { "hashtags": hashtags, "media": media }
    }))
    .unwrap()
}

fn plain(ids: impl IntoIterator<Item = u64>) -> Vec<RawStatus> {
    ids.into_iter().map(|id| status(id, 1, &[], &[])).collect()
}

fn snapshots(dir: &TempDir) -> SnapshotWriter {
    SnapshotWriter::new(dir.path().join("snapshots")).unwrap()
}

fn small_pages(page_size: usize) -> PipelineSettings {
    PipelineSettings {
        page_size,
        ..PipelineSettings::default()
    }
}

fn write_export(dir: &TempDir, ids: &[u64]) -> PathBuf {
    let mut content = String::from(
        "tweet_id,in_reply_to_status_id,in_reply_to_user_id,timestamp,source,text,\
         retweeted_status_id,retweeted_status_user_id,retweeted_status_timestamp,expanded_urls\n",
    );
    for id in ids {
        content.push_str(&format!(
            "{id},,,2015-03-01 12:00:00 +0000,web,\"from csv {id}\",,,,\n"
        ));
    }
    let path = dir.path().join("tweets.csv");
    std::fs::write(&path, content).unwrap();
    path
}

fn known_records(store: &Storage) -> IdentitySet {
    store.all_identities_of_kind(ItemKind::Record).unwrap()
}

fn ids(records: &[hoard::Record]) -> Vec<u64> {
    records.iter().map(|r| r.id).collect()
}

// =============================================================================
// API mode
// =============================================================================

#[test]
fn second_run_against_unchanged_remote_inserts_nothing() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default()
        .with_timeline(plain(1..=5))
        .with_favorites(vec![status(3, 1, &[], &[]), status(50, 2, &[], &[])]);

    let mut known = known_records(&store);
    let first = IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .archive_account(&mut known)
        .unwrap();
    assert_eq!(ids(&first), vec![5, 4, 3, 2, 1, 50]);

    let mut known = known_records(&store);
    let second = IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .archive_account(&mut known)
        .unwrap();
    assert!(second.is_empty());

    assert_eq!(store.get_stats().unwrap().records_count, 6);
    assert_eq!(store.favorites_for_record(3).unwrap(), vec!["alice"]);
    assert_eq!(store.favorites_for_record(50).unwrap(), vec!["alice"]);
    assert!(store.favorites_for_record(4).unwrap().is_empty());
}

#[test]
fn timeline_stops_at_first_known_identity() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    let mut seed = status(103, 1, &[], &[]).to_record(Provenance::Api);
    seed.author_id = None;
    store.insert_record(&seed).unwrap();
    store.commit().unwrap();

    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default().with_timeline(plain([105, 104, 103, 102, 101]));
    let mut known = known_records(&store);

    let inserted = {
        let mut pipeline =
            IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice");
        pipeline.run(FeedKind::Timeline, &mut known).unwrap()
    };

    assert_eq!(ids(&inserted), vec![105, 104]);
    assert_eq!(remote.requests.len(), 1, "no page after the known boundary");
    assert!(!store.has_identity(102).unwrap());
    assert!(known.contains(105) && known.contains(104));
}

#[test]
fn favorites_do_not_stop_at_known_identities() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default().with_favorites(plain([30, 20, 10]));
    let mut known: IdentitySet = [20].into_iter().collect();

    let inserted = IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .run(FeedKind::Favorites, &mut known)
        .unwrap();

    assert_eq!(ids(&inserted), vec![30, 20, 10]);
    assert_eq!(remote.requests.len(), 2);
}

#[test]
fn max_id_stays_below_every_identity_already_seen() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default().with_timeline(plain(1..=9));
    let mut known = IdentitySet::new();

    let inserted = IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .with_settings(small_pages(2))
        .run(FeedKind::Timeline, &mut known)
        .unwrap();

    assert_eq!(ids(&inserted), vec![9, 8, 7, 6, 5, 4, 3, 2, 1]);
    assert_eq!(remote.requests[0].max_id, None);
    for (n, page) in remote.served.iter().enumerate().take(remote.served.len() - 1) {
        let min_seen = *page.iter().min().unwrap();
        let next_max = remote.requests[n + 1].max_id.unwrap();
        assert!(next_max < min_seen, "page {n}: max_id {next_max} >= {min_seen}");
    }
    assert!(remote.served.last().unwrap().is_empty());
}

#[test]
fn paging_ends_after_identity_zero() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default().with_timeline(plain([2, 1, 0]));

    let inserted = IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .with_settings(small_pages(2))
        .run(FeedKind::Timeline, &mut IdentitySet::new())
        .unwrap();

    assert_eq!(ids(&inserted), vec![2, 1, 0]);
    assert_eq!(remote.requests.len(), 2, "no request after identity 0");
    assert_eq!(remote.requests[1].max_id, Some(0));
}

#[test]
fn throttled_page_is_retried_without_losing_records() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default()
        .with_timeline(plain(1..=6))
        .throttle(3);
    let mut known = IdentitySet::new();

    let (inserted, stats) = {
        let mut pipeline =
            IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
                .with_settings(small_pages(2));
        let inserted = pipeline.run(FeedKind::Timeline, &mut known).unwrap();
        (inserted, pipeline.last_run_stats())
    };

    assert_eq!(ids(&inserted), vec![6, 5, 4, 3, 2, 1]);
    assert_eq!(stats.forced_waits, 1);
    // Every request after the throttle is paced at the nominal spacing.
    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len() as u64, 1 + stats.paced_waits);
    assert!(sleeps.iter().all(|d| *d == RateBudget::timeline().spacing));
    assert_eq!(remote.requests[2], remote.requests[3], "same page requested again");
    assert_eq!(store.get_stats().unwrap().records_count, 6);
}

#[test]
fn non_throttling_errors_abort_the_run() {
    struct Broken;
    impl RemoteFeed for Broken {
        fn page(
            &mut self,
            _: FeedKind,
            _: Option<u64>,
            _: Option<u64>,
            _: usize,
        ) -> Result<Vec<RawStatus>> {
            Err(HoardError::Remote {
                status: 401,
                message: "[89] Invalid or expired token.".to_string(),
            })
        }

        fn bulk_lookup(&mut self, _: &[u64]) -> Result<Vec<RawStatus>> {
            unreachable!()
        }
    }

    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut feed = Broken;
    let err = IngestionPipeline::new(&mut store, &mut feed, &clock, snapshots(&dir), "alice")
        .run(FeedKind::Timeline, &mut IdentitySet::new())
        .unwrap_err();

    assert!(matches!(err, HoardError::Remote { status: 401, .. }));
    assert!(clock.sleeps().is_empty());
}

#[test]
fn snapshots_are_written_per_identity() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default().with_timeline(plain([7, 8]));

    IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .run(FeedKind::Timeline, &mut IdentitySet::new())
        .unwrap();

    for id in [7, 8] {
        let path = dir.path().join("snapshots").join(format!("{id}.json"));
        let dumped: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(dumped["id"], id);
    }
}

#[test]
fn tags_differing_only_in_case_share_one_row() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default()
        .with_timeline(vec![status(1, 1, &["Foo"], &[]), status(2, 1, &["foo"], &[])]);

    IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .run(FeedKind::Timeline, &mut IdentitySet::new())
        .unwrap();

    let tags = store.tag_counts(10).unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "foo");
    assert_eq!(tags[0].records, 2);
}

// =============================================================================
// CSV reconciliation
// =============================================================================

#[test]
fn csv_identity_missing_from_lookup_becomes_one_stub() {
    let dir = TempDir::new().unwrap();
    let csv = write_export(&dir, &[41, 42, 43]);
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default()
        .with_lookup(vec![status(41, 1, &["csv"], &[]), status(43, 1, &[], &[])]);
    let mut known = known_records(&store);

    let (report, stats) = {
        let mut pipeline =
            IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "@user1");
        let report = pipeline.import_csv(&csv, &mut known).unwrap();
        (report, pipeline.last_run_stats())
    };

    assert_eq!(report.pending, 3);
    assert_eq!(report.lookups, 1);
    assert_eq!(report.confirmed, 2);
    assert_eq!(report.stubs, 1);
    assert_eq!(stats.inserted, 3);
    assert_eq!(remote.lookups, vec![vec![41, 42, 43]]);

    assert_eq!(store.get_stats().unwrap().records_count, 3);
    let stub = store.get_record(42).unwrap().unwrap();
    assert_eq!(stub.provenance, Provenance::Csv);
    assert_eq!(stub.text, "from csv 42");
    assert_eq!(stub.author_id, Some(1), "linked to the author already stored");
    assert_eq!(store.record_provenance(41).unwrap(), Some(Provenance::Api));
    assert_eq!(store.tags_for_record(41).unwrap(), vec!["csv"]);
    assert!(known.contains(42));
}

#[test]
fn csv_lookup_is_retried_after_throttling() {
    let dir = TempDir::new().unwrap();
    let csv = write_export(&dir, &[1, 2]);
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default()
        .with_lookup(plain([1, 2]))
        .throttle(1);
    let mut known = IdentitySet::new();

    let report = IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .import_csv(&csv, &mut known)
        .unwrap();

    assert_eq!(report.confirmed, 2);
    assert_eq!(report.stubs, 0);
    assert_eq!(remote.lookups.len(), 1);
    // Hint of 30s beats the 15s nominal spacing.
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
}

#[test]
fn csv_lookups_are_grouped_by_one_hundred() {
    let dir = TempDir::new().unwrap();
    let all: Vec<u64> = (1..=250).collect();
    let csv = write_export(&dir, &all);
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default();
    let mut known: IdentitySet = [5].into_iter().collect();

    let report = IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .import_csv(&csv, &mut known)
        .unwrap();

    assert_eq!(report.pending, 249);
    let sizes: Vec<usize> = remote.lookups.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![100, 100, 49]);
    assert!(!remote.lookups.iter().flatten().any(|id| *id == 5));
    assert_eq!(report.stubs, 249);
}

#[test]
fn csv_stub_is_upgraded_when_the_api_returns_it() {
    let dir = TempDir::new().unwrap();
    let csv = write_export(&dir, &[42]);
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default()
        .with_favorites(vec![status(42, 9, &["late"], &["https://pbs.example/m/42.jpg"])]);
    let mut known = IdentitySet::new();

    IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .import_csv(&csv, &mut known)
        .unwrap();
    assert_eq!(store.record_provenance(42).unwrap(), Some(Provenance::Csv));

    let (inserted, stats) = {
        let mut pipeline =
            IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice");
        let inserted = pipeline.run(FeedKind::Favorites, &mut known).unwrap();
        (inserted, pipeline.last_run_stats())
    };

    assert!(inserted.is_empty());
    assert_eq!(stats.upgraded, 1);
    let record = store.get_record(42).unwrap().unwrap();
    assert_eq!(record.provenance, Provenance::Merged);
    assert_eq!(record.author_id, Some(9));
    assert_eq!(record.media_urls, vec!["https://pbs.example/m/42.jpg"]);
    assert_eq!(store.tags_for_record(42).unwrap(), vec!["late"]);
    assert_eq!(store.get_stats().unwrap().records_count, 1);
}

#[test]
fn csv_stub_is_left_alone_when_upgrades_are_disabled() {
    let dir = TempDir::new().unwrap();
    let csv = write_export(&dir, &[42]);
    let mut store = Storage::open_memory().unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default().with_favorites(plain([42]));
    let settings = PipelineSettings {
        upgrade_csv_stubs: false,
        ..PipelineSettings::default()
    };
    let mut known = IdentitySet::new();

    let mut pipeline =
        IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
            .with_settings(settings);
    pipeline.import_csv(&csv, &mut known).unwrap();
    pipeline.run(FeedKind::Favorites, &mut known).unwrap();
    assert_eq!(pipeline.last_run_stats().skipped, 1);
    drop(pipeline);

    assert_eq!(store.record_provenance(42).unwrap(), Some(Provenance::Csv));
    assert_eq!(store.favorites_for_record(42).unwrap(), vec!["alice"]);
}

// =============================================================================
// Media
// =============================================================================

fn media_root(dir: &TempDir) -> PathBuf {
    dir.path().join("media")
}

fn seed_media_records(store: &mut Storage, dir: &TempDir) {
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default().with_timeline(vec![
        status(
            1,
            1,
            &[],
            &["https://pbs.example/m/a.jpg", "https://pbs.example/m/b.jpg"],
        ),
        status(2, 1, &[], &["https://pbs.example/broken/c.jpg"]),
    ]);
    IngestionPipeline::new(store, &mut remote, &clock, snapshots(dir), "alice")
        .run(FeedKind::Timeline, &mut IdentitySet::new())
        .unwrap();
}

fn exists(root: &Path, parts: &[&str]) -> bool {
    parts.iter().fold(root.to_path_buf(), |p, part| p.join(part)).exists()
}

#[test]
fn media_pass_is_idempotent_and_retries_failures() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    seed_media_records(&mut store, &dir);
    let media = FakeMedia::default();
    let resolver = MediaResolver::new(&media, media_root(&dir));

    let first = resolver.download_pending(&mut store).unwrap();
    assert_eq!(first.items_completed, 2, "record 1 and its author");
    assert_eq!(first.items_failed, 1);
    assert_eq!(first.files_fetched, 3);
    assert_eq!(media.fetch_count(), 4);
    assert!(exists(&media_root(&dir), &["records", "1", "a.jpg"]));
    assert!(exists(&media_root(&dir), &["authors", "user1", "1.jpg"]));
    assert!(!exists(&media_root(&dir), &["records", "2", "c.jpg"]));

    let second = resolver.download_pending(&mut store).unwrap();
    assert_eq!(second.items_completed, 0);
    assert_eq!(second.items_failed, 1);
    assert_eq!(media.fetch_count(), 5, "only the failing URL is fetched again");
    assert_eq!(
        media.fetched.borrow().last().map(String::as_str),
        Some("https://pbs.example/broken/c.jpg")
    );

    let pending = store.pending_download_items(ItemKind::Record).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id(), 2);
}

/// Records how many record downloads a second connection sees committed at
/// each fetch.
struct CommitWatcher {
    db_path: PathBuf,
    committed: RefCell<Vec<i64>>,
}

impl MediaSource for CommitWatcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let conn = rusqlite::Connection::open(&self.db_path)?;
        let done: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE files_downloaded = 1",
            [],
            |row| row.get(0),
        )?;
        self.committed.borrow_mut().push(done);
        Ok(url.as_bytes().to_vec())
    }
}

#[test]
fn media_state_is_committed_per_batch() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("hoard.db");
    let mut store = Storage::open(&db_path).unwrap();
    let clock = ManualClock::new();
    let mut remote = SimulatedRemote::default().with_timeline(
        (1..=5)
            .map(|id| status(id, 1, &[], &[&format!("https://pbs.example/m/{id}.jpg")]))
            .collect(),
    );
    IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
        .run(FeedKind::Timeline, &mut IdentitySet::new())
        .unwrap();

    let watcher = CommitWatcher {
        db_path: db_path.clone(),
        committed: RefCell::new(Vec::new()),
    };
    let report = MediaResolver::new(&watcher, media_root(&dir))
        .with_batch_size(2)
        .download_pending(&mut store)
        .unwrap();

    assert_eq!(report.items_completed, 6, "five records and one author");
    // Records 1-2 commit before record 3 is fetched, 3-4 before record 5,
    // and the tail before the author pass.
    assert_eq!(*watcher.committed.borrow(), vec![0, 0, 2, 2, 4, 5]);
    assert!(!store.has_pending_writes());

    drop(store);
    let reopened = Storage::open(&db_path).unwrap();
    assert_eq!(reopened.get_stats().unwrap().pending_record_downloads, 0);
    assert_eq!(reopened.get_stats().unwrap().pending_author_downloads, 0);
}

#[test]
fn files_already_on_disk_are_not_fetched() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    seed_media_records(&mut store, &dir);
    let target = media_root(&dir).join("records").join("1");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("a.jpg"), b"already here").unwrap();

    let media = FakeMedia::default();
    let report = MediaResolver::new(&media, media_root(&dir))
        .download_pending(&mut store)
        .unwrap();

    assert_eq!(report.files_skipped, 1);
    assert!(!media.fetched.borrow().iter().any(|u| u.ends_with("/a.jpg")));
    assert_eq!(std::fs::read(target.join("a.jpg")).unwrap(), b"already here");
}

#[test]
fn pacing_waits_are_used_to_download_media() {
    let dir = TempDir::new().unwrap();
    let mut store = Storage::open_memory().unwrap();
    seed_media_records(&mut store, &dir);

    let clock = ManualClock::new();
    let media = FakeMedia::default();
    let mut remote = SimulatedRemote::default().with_timeline(plain(10..=13));
    let settings = PipelineSettings {
        page_size: 2,
        budgets: hoard::config::RateLimits {
            timeline: RateBudget::new(2, Duration::from_secs(10)),
            ..hoard::config::RateLimits::default()
        },
        ..PipelineSettings::default()
    };

    let stats = {
        let mut pipeline =
            IngestionPipeline::new(&mut store, &mut remote, &clock, snapshots(&dir), "alice")
                .with_settings(settings)
                .with_media(MediaResolver::new(&media, media_root(&dir)));
        pipeline
            .run(FeedKind::Timeline, &mut IdentitySet::new())
            .unwrap();
        pipeline.last_run_stats()
    };

    assert!(stats.deferred_runs >= 1);
    assert_eq!(stats.paced_waits, stats.deferred_runs);
    assert!(media.fetched.borrow().iter().any(|u| u.ends_with("/a.jpg")));
    assert!(clock.sleeps().iter().all(|d| *d == Duration::from_secs(10)));
    assert!(store.get_record(1).unwrap().unwrap().files_downloaded);
    assert_eq!(store.get_stats().unwrap().records_count, 6);
}
