//! `SQLite` storage for archived records.
//!
//! Writes are staged in an implicit transaction opened by the first write and
//! closed by [`ArchiveStore::commit`]. Dropping a `Storage` with staged writes
//! rolls them back, so a crash loses at most the current batch.

use crate::error::{HoardError, Result};
use crate::identity::IdentitySet;
use crate::model::{
    ArchiveStats, Author, ItemKind, PendingDownload, Provenance, Record, TagCount,
};
use crate::store::ArchiveStore;
use crate::tags::normalize_tag;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;

const RECORD_COLUMNS: &str = "id, author_id, text, created_at, in_reply_to_status_id, \
                              media_urls_json, provenance, files_downloaded";
const AUTHOR_COLUMNS: &str = "id, handle, display_name, avatar_url, files_downloaded";

fn parse_rfc3339_opt(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let media_json: String = row.get(5)?;
    let provenance: String = row.get(6)?;
    Ok(Record {
        id: row.get(0)?,
        author_id: row.get(1)?,
        text: row.get(2)?,
        created_at: parse_rfc3339_opt(row.get(3)?),
        in_reply_to_status_id: row.get(4)?,
        media_urls: serde_json::from_str(&media_json).unwrap_or_default(),
        provenance: Provenance::from_column(&provenance),
        files_downloaded: row.get::<_, i32>(7)? != 0,
    })
}

fn row_to_author(row: &Row<'_>) -> rusqlite::Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        handle: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        files_downloaded: row.get::<_, i32>(4)? != 0,
    })
}

/// Map a primary-key collision to the fatal integrity error.
fn duplicate_as_violation(kind: &'static str, id: u64) -> impl FnOnce(rusqlite::Error) -> HoardError {
    move |err| match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            HoardError::IntegrityViolation { kind, id }
        }
        _ => err.into(),
    }
}

/// `SQLite` storage manager
pub struct Storage {
    conn: Connection,
    in_transaction: bool,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;

        // Set pragmas for performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let storage = Self {
            conn,
            in_transaction: false,
        };
        storage.migrate()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        let storage = Self {
            conn,
            in_transaction: false,
        };
        storage.migrate()?;
        Ok(storage)
    }

    /// Whether writes are staged and not yet committed.
    #[must_use]
    pub const fn has_pending_writes(&self) -> bool {
        self.in_transaction
    }

    fn migrate(&self) -> Result<()> {
        let current_version = self.get_schema_version();

        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: rusqlite::Result<i32> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat missing schema table as version 0.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS authors (
                id INTEGER PRIMARY KEY,
                handle TEXT NOT NULL,
                display_name TEXT,
                avatar_url TEXT,
                files_downloaded INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_authors_handle ON authors(handle COLLATE NOCASE);

            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY,
                author_id INTEGER REFERENCES authors(id),
                text TEXT NOT NULL,
                created_at TEXT,
                in_reply_to_status_id INTEGER,
                media_urls_json TEXT NOT NULL DEFAULT '[]',
                provenance TEXT NOT NULL,
                files_downloaded INTEGER NOT NULL DEFAULT 0,
                archived_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);
            CREATE INDEX IF NOT EXISTS idx_records_pending ON records(files_downloaded);

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS record_tags (
                record_id INTEGER NOT NULL REFERENCES records(id),
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                PRIMARY KEY (record_id, tag_id)
            );
            CREATE INDEX IF NOT EXISTS idx_record_tags_tag ON record_tags(tag_id);

            CREATE TABLE IF NOT EXISTS favorites (
                record_id INTEGER NOT NULL REFERENCES records(id),
                actor_handle TEXT NOT NULL,
                PRIMARY KEY (record_id, actor_handle)
            );
            ",
        )?;

        Ok(())
    }

    /// Open the staging transaction if one is not already running.
    fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    // =========================================================================
    // Read helpers
    // =========================================================================

    /// Fetch a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_record(&self, id: u64) -> Result<Option<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_record)
            .optional()?)
    }

    /// Normalized tag names attached to a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn tags_for_record(&self, id: u64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT t.name FROM tags t
            JOIN record_tags rt ON rt.tag_id = t.id
            WHERE rt.record_id = ?
            ORDER BY t.name
            ",
        )?;
        let names = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Handles that favorited a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn favorites_for_record(&self, id: u64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT actor_handle FROM favorites WHERE record_id = ? ORDER BY actor_handle",
        )?;
        let handles = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(handles)
    }

    /// Records carrying a tag, newest first. The tag is normalized first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn records_with_tag(&self, tag: &str, limit: usize) -> Result<Vec<Record>> {
        let Some(name) = normalize_tag(tag) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            r"
            SELECT {cols} FROM records
            WHERE id IN (
                SELECT rt.record_id FROM record_tags rt
                JOIN tags t ON t.id = rt.tag_id
                WHERE t.name = ?
            )
            ORDER BY id DESC
            LIMIT ?
            ",
            cols = RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![name, limit_to_i64(limit)], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Most used tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn tag_counts(&self, limit: usize) -> Result<Vec<TagCount>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT t.name, COUNT(rt.record_id) AS n FROM tags t
            LEFT JOIN record_tags rt ON rt.tag_id = t.id
            GROUP BY t.id
            ORDER BY n DESC, t.name ASC
            LIMIT ?
            ",
        )?;
        let counts = stmt
            .query_map(params![limit_to_i64(limit)], |row| {
                Ok(TagCount {
                    name: row.get(0)?,
                    records: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Get archive statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub fn get_stats(&self) -> Result<ArchiveStats> {
        let count = |sql: &str| -> Result<i64> { Ok(self.conn.query_row(sql, [], |r| r.get(0))?) };
        let (first, last): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM records WHERE created_at IS NOT NULL",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(ArchiveStats {
            records_count: count("SELECT COUNT(*) FROM records")?,
            authors_count: count("SELECT COUNT(*) FROM authors")?,
            tags_count: count("SELECT COUNT(*) FROM tags")?,
            favorites_count: count("SELECT COUNT(*) FROM favorites")?,
            api_records: count("SELECT COUNT(*) FROM records WHERE provenance = 'api'")?,
            csv_records: count("SELECT COUNT(*) FROM records WHERE provenance = 'csv'")?,
            merged_records: count("SELECT COUNT(*) FROM records WHERE provenance = 'merged'")?,
            pending_record_downloads: count(
                "SELECT COUNT(*) FROM records WHERE files_downloaded = 0",
            )?,
            pending_author_downloads: count(
                "SELECT COUNT(*) FROM authors WHERE files_downloaded = 0",
            )?,
            first_record_date: parse_rfc3339_opt(first),
            last_record_date: parse_rfc3339_opt(last),
        })
    }
}

impl ArchiveStore for Storage {
    fn has_identity(&self, id: u64) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM records WHERE id = ?", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn record_provenance(&self, id: u64) -> Result<Option<Provenance>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT provenance FROM records WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.as_deref().map(Provenance::from_column))
    }

    fn insert_record(&mut self, record: &Record) -> Result<()> {
        self.begin()?;
        self.conn
            .execute(
                r"
                INSERT INTO records
                (id, author_id, text, created_at, in_reply_to_status_id,
                 media_urls_json, provenance, files_downloaded, archived_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    record.id,
                    record.author_id,
                    record.text,
                    record.created_at.map(|d| d.to_rfc3339()),
                    record.in_reply_to_status_id,
                    serde_json::to_string(&record.media_urls)?,
                    record.provenance.as_str(),
                    i32::from(record.files_downloaded),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(duplicate_as_violation("record", record.id))?;
        debug!("Inserted record {} ({})", record.id, record.provenance);
        Ok(())
    }

    fn upgrade_record(&mut self, record: &Record) -> Result<()> {
        self.begin()?;
        let changed = self.conn.execute(
            r"
            UPDATE records SET
                author_id = ?, text = ?, created_at = ?, in_reply_to_status_id = ?,
                media_urls_json = ?, provenance = ?, files_downloaded = ?
            WHERE id = ?
            ",
            params![
                record.author_id,
                record.text,
                record.created_at.map(|d| d.to_rfc3339()),
                record.in_reply_to_status_id,
                serde_json::to_string(&record.media_urls)?,
                record.provenance.as_str(),
                i32::from(record.files_downloaded),
                record.id,
            ],
        )?;
        if changed == 0 {
            return Err(HoardError::validation(format!(
                "cannot upgrade record {}: not archived",
                record.id
            )));
        }
        debug!("Upgraded record {} to {}", record.id, record.provenance);
        Ok(())
    }

    fn insert_author(&mut self, author: &Author) -> Result<()> {
        self.begin()?;
        self.conn
            .execute(
                r"
                INSERT INTO authors (id, handle, display_name, avatar_url, files_downloaded)
                VALUES (?, ?, ?, ?, ?)
                ",
                params![
                    author.id,
                    author.handle,
                    author.display_name,
                    author.avatar_url,
                    i32::from(author.files_downloaded),
                ],
            )
            .map_err(duplicate_as_violation("author", author.id))?;
        debug!("Inserted author {} (@{})", author.id, author.handle);
        Ok(())
    }

    fn find_author_by_identity(&self, id: u64) -> Result<Option<Author>> {
        let sql = format!("SELECT {AUTHOR_COLUMNS} FROM authors WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_author)
            .optional()?)
    }

    fn find_author_by_handle(&self, handle: &str) -> Result<Option<Author>> {
        let sql = format!(
            "SELECT {AUTHOR_COLUMNS} FROM authors WHERE handle = ? COLLATE NOCASE ORDER BY id LIMIT 1"
        );
        let handle = handle.trim_start_matches('@');
        Ok(self
            .conn
            .query_row(&sql, params![handle], row_to_author)
            .optional()?)
    }

    fn attach_tag(&mut self, record_id: u64, tag_name: &str) -> Result<bool> {
        let Some(name) = normalize_tag(tag_name) else {
            return Ok(false);
        };
        self.begin()?;
        self.conn
            .execute("INSERT OR IGNORE INTO tags (name) VALUES (?)", params![name])?;
        let tag_id: i64 =
            self.conn
                .query_row("SELECT id FROM tags WHERE name = ?", params![name], |row| {
                    row.get(0)
                })?;
        self.conn.execute(
            "INSERT OR IGNORE INTO record_tags (record_id, tag_id) VALUES (?, ?)",
            params![record_id, tag_id],
        )?;
        Ok(true)
    }

    fn attach_favorite(&mut self, record_id: u64, actor_handle: &str) -> Result<()> {
        self.begin()?;
        self.conn.execute(
            "INSERT OR IGNORE INTO favorites (record_id, actor_handle) VALUES (?, ?)",
            params![record_id, actor_handle.trim_start_matches('@')],
        )?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn all_identities_of_kind(&self, kind: ItemKind) -> Result<IdentitySet> {
        let sql = match kind {
            ItemKind::Record => "SELECT id FROM records",
            ItemKind::Author => "SELECT id FROM authors",
        };
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, u64>(0))?
            .collect::<rusqlite::Result<IdentitySet>>()?;
        Ok(ids)
    }

    fn pending_download_items(&self, kind: ItemKind) -> Result<Vec<PendingDownload>> {
        let items = match kind {
            ItemKind::Record => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, media_urls_json FROM records WHERE files_downloaded = 0 ORDER BY id",
                )?;
                stmt.query_map([], |row| {
                    let urls: String = row.get(1)?;
                    Ok(PendingDownload::Record {
                        id: row.get(0)?,
                        urls: serde_json::from_str(&urls).unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
            ItemKind::Author => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, handle, avatar_url FROM authors WHERE files_downloaded = 0 ORDER BY id",
                )?;
                stmt.query_map([], |row| {
                    Ok(PendingDownload::Author {
                        id: row.get(0)?,
                        handle: row.get(1)?,
                        avatar_url: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(items)
    }

    fn mark_downloaded(&mut self, kind: ItemKind, id: u64) -> Result<()> {
        self.begin()?;
        let sql = match kind {
            ItemKind::Record => "UPDATE records SET files_downloaded = 1 WHERE id = ?",
            ItemKind::Author => "UPDATE authors SET files_downloaded = 1 WHERE id = ?",
        };
        self.conn.execute(sql, params![id])?;
        Ok(())
    }
}

fn limit_to_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_test_author(id: u64, handle: &str) -> Author {
        Author {
            id,
            handle: handle.to_string(),
            display_name: Some(format!("{handle} display")),
            avatar_url: Some(format!("https://pbs.example/{handle}.jpg")),
            files_downloaded: false,
        }
    }

    fn create_test_record(id: u64, author_id: Option<u64>) -> Record {
        Record {
            id,
            author_id,
            text: format!("record {id}"),
            created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single(),
            in_reply_to_status_id: None,
            media_urls: vec![format!("https://pbs.example/media/{id}.jpg")],
            provenance: Provenance::Api,
            files_downloaded: false,
        }
    }

    #[test]
    fn test_create_database() {
        let storage = Storage::open_memory().unwrap();
        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.records_count, 0);
        assert!(stats.first_record_date.is_none());
    }

    #[test]
    fn test_insert_and_read_back_record() {
        let mut storage = Storage::open_memory().unwrap();
        storage.insert_author(&create_test_author(7, "alice")).unwrap();
        storage.insert_record(&create_test_record(100, Some(7))).unwrap();
        storage.commit().unwrap();

        assert!(storage.has_identity(100).unwrap());
        assert!(!storage.has_identity(101).unwrap());
        let record = storage.get_record(100).unwrap().unwrap();
        assert_eq!(record, create_test_record(100, Some(7)));
        assert_eq!(storage.record_provenance(100).unwrap(), Some(Provenance::Api));
    }

    #[test]
    fn test_duplicate_insert_is_integrity_violation() {
        let mut storage = Storage::open_memory().unwrap();
        storage.insert_record(&create_test_record(1, None)).unwrap();
        let err = storage
            .insert_record(&create_test_record(1, None))
            .unwrap_err();
        assert!(
            matches!(err, HoardError::IntegrityViolation { kind: "record", id: 1 }),
            "unexpected error: {err}"
        );

        storage.insert_author(&create_test_author(2, "bob")).unwrap();
        let err = storage
            .insert_author(&create_test_author(2, "bob"))
            .unwrap_err();
        assert!(matches!(
            err,
            HoardError::IntegrityViolation { kind: "author", id: 2 }
        ));
    }

    #[test]
    fn test_tags_dedupe_by_normalized_name() {
        let mut storage = Storage::open_memory().unwrap();
        storage.insert_record(&create_test_record(1, None)).unwrap();
        storage.insert_record(&create_test_record(2, None)).unwrap();

        assert!(storage.attach_tag(1, "Foo").unwrap());
        assert!(storage.attach_tag(2, "foo").unwrap());
        assert!(storage.attach_tag(2, "#FOO").unwrap());
        assert!(!storage.attach_tag(2, "  ").unwrap());
        storage.commit().unwrap();

        let counts = storage.tag_counts(10).unwrap();
        assert_eq!(
            counts,
            vec![TagCount {
                name: "foo".to_string(),
                records: 2
            }]
        );
        let tagged = storage.records_with_tag("FOO", 10).unwrap();
        assert_eq!(tagged.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_favorites_are_idempotent_per_actor() {
        let mut storage = Storage::open_memory().unwrap();
        storage.insert_record(&create_test_record(1, None)).unwrap();
        storage.attach_favorite(1, "alice").unwrap();
        storage.attach_favorite(1, "@alice").unwrap();
        storage.attach_favorite(1, "bob").unwrap();
        storage.commit().unwrap();

        assert_eq!(storage.favorites_for_record(1).unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_author_lookup_by_handle_is_case_insensitive() {
        let mut storage = Storage::open_memory().unwrap();
        storage.insert_author(&create_test_author(9, "Alice")).unwrap();

        let found = storage.find_author_by_handle("@alice").unwrap().unwrap();
        assert_eq!(found.id, 9);
        assert!(storage.find_author_by_handle("carol").unwrap().is_none());
        assert!(storage.find_author_by_identity(9).unwrap().is_some());
    }

    #[test]
    fn test_pending_downloads_and_mark() {
        let mut storage = Storage::open_memory().unwrap();
        storage.insert_author(&create_test_author(7, "alice")).unwrap();
        storage.insert_record(&create_test_record(1, Some(7))).unwrap();
        storage.insert_record(&create_test_record(2, Some(7))).unwrap();

        let pending = storage.pending_download_items(ItemKind::Record).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(
            pending[0],
            PendingDownload::Record {
                id: 1,
                urls: vec!["https://pbs.example/media/1.jpg".to_string()]
            }
        );

        storage.mark_downloaded(ItemKind::Record, 1).unwrap();
        storage.mark_downloaded(ItemKind::Author, 7).unwrap();
        storage.commit().unwrap();

        let pending = storage.pending_download_items(ItemKind::Record).unwrap();
        assert_eq!(pending.iter().map(PendingDownload::id).collect::<Vec<_>>(), vec![2]);
        assert!(storage
            .pending_download_items(ItemKind::Author)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_upgrade_record_in_place() {
        let mut storage = Storage::open_memory().unwrap();
        let mut stub = create_test_record(5, None);
        stub.provenance = Provenance::Csv;
        stub.media_urls.clear();
        storage.insert_record(&stub).unwrap();
        storage.mark_downloaded(ItemKind::Record, 5).unwrap();

        storage.insert_author(&create_test_author(7, "alice")).unwrap();
        let mut full = create_test_record(5, Some(7));
        full.provenance = Provenance::Merged;
        storage.upgrade_record(&full).unwrap();
        storage.commit().unwrap();

        let stored = storage.get_record(5).unwrap().unwrap();
        assert_eq!(stored, full);
        assert!(!stored.files_downloaded);

        let missing = storage.upgrade_record(&create_test_record(6, None));
        assert!(missing.is_err());
    }

    #[test]
    fn test_uncommitted_writes_roll_back_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hoard.db");
        {
            let mut storage = Storage::open(&path).unwrap();
            storage.insert_record(&create_test_record(1, None)).unwrap();
            storage.commit().unwrap();
            storage.insert_record(&create_test_record(2, None)).unwrap();
            assert!(storage.has_pending_writes());
        }

        let storage = Storage::open(&path).unwrap();
        let ids = storage.all_identities_of_kind(ItemKind::Record).unwrap();
        assert!(ids.contains(1));
        assert!(!ids.contains(2));
    }

    #[test]
    fn test_stats_by_provenance() {
        let mut storage = Storage::open_memory().unwrap();
        storage.insert_record(&create_test_record(1, None)).unwrap();
        let mut csv = create_test_record(2, None);
        csv.provenance = Provenance::Csv;
        csv.created_at = Utc.with_ymd_and_hms(2015, 6, 1, 0, 0, 0).single();
        storage.insert_record(&csv).unwrap();
        storage.commit().unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.records_count, 2);
        assert_eq!(stats.api_records, 1);
        assert_eq!(stats.csv_records, 1);
        assert_eq!(stats.pending_record_downloads, 2);
        assert_eq!(
            stats.first_record_date,
            Utc.with_ymd_and_hms(2015, 6, 1, 0, 0, 0).single()
        );
    }

    #[test]
    fn test_schema_version() {
        let storage = Storage::open_memory().unwrap();
        assert_eq!(storage.get_schema_version(), SCHEMA_VERSION);
    }
}
