//! The narrow persistence interface the ingestion engine depends on.
//!
//! [`crate::storage::Storage`] is the `SQLite` implementation. Writes are
//! staged until [`ArchiveStore::commit`] marks a durability boundary.

use crate::error::Result;
use crate::identity::IdentitySet;
use crate::model::{Author, ItemKind, PendingDownload, Provenance, Record};

pub trait ArchiveStore {
    /// Whether a record with this identity is stored.
    fn has_identity(&self, id: u64) -> Result<bool>;

    /// Provenance of a stored record, `None` if absent.
    fn record_provenance(&self, id: u64) -> Result<Option<Provenance>>;

    /// Insert a record whose identity is not yet stored.
    ///
    /// Inserting an existing identity is an `IntegrityViolation`.
    fn insert_record(&mut self, record: &Record) -> Result<()>;

    /// Overwrite the content of an existing record in place.
    fn upgrade_record(&mut self, record: &Record) -> Result<()>;

    /// Insert an author whose identity is not yet stored.
    fn insert_author(&mut self, author: &Author) -> Result<()>;

    fn find_author_by_identity(&self, id: u64) -> Result<Option<Author>>;

    /// Case-insensitive handle lookup.
    fn find_author_by_handle(&self, handle: &str) -> Result<Option<Author>>;

    /// Attach a tag, creating it on first use. Returns `false` when the name
    /// normalizes to nothing and no tag was attached.
    fn attach_tag(&mut self, record_id: u64, tag_name: &str) -> Result<bool>;

    /// Record that `actor_handle` favorited the record. Idempotent.
    fn attach_favorite(&mut self, record_id: u64, actor_handle: &str) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn all_identities_of_kind(&self, kind: ItemKind) -> Result<IdentitySet>;

    /// Items whose download-state flag is still false.
    fn pending_download_items(&self, kind: ItemKind) -> Result<Vec<PendingDownload>>;

    fn mark_downloaded(&mut self, kind: ItemKind, id: u64) -> Result<()>;
}
