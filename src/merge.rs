//! Reconciliation of records arriving from the API and from CSV exports.
//!
//! Both paths share one identity space. The first path to see an identity
//! creates the record. A later API sighting of a CSV-only stub either
//! upgrades it in place (the default) or is skipped, depending on
//! `upgrade_csv_stubs`. Any other known identity is skipped.

use crate::error::Result;
use crate::model::{PendingCsvRecord, Provenance, RawStatus, RawUser, Record};
use crate::store::ArchiveStore;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    InsertNew,
    UpgradeStub,
    SkipExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted(Record),
    Upgraded(Record),
    Skipped,
}

pub struct ReconciliationMerge {
    upgrade_csv_stubs: bool,
    /// Last author confirmed present in the store. Saves a lookup when
    /// consecutive statuses share an author, which is the common case for
    /// a timeline.
    author_slot: Option<u64>,
}

impl ReconciliationMerge {
    #[must_use]
    pub const fn new(upgrade_csv_stubs: bool) -> Self {
        Self {
            upgrade_csv_stubs,
            author_slot: None,
        }
    }

    /// Decide what an API sighting of `id` should do.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup fails.
    pub fn resolve(&self, store: &dyn ArchiveStore, id: u64) -> Result<MergeDecision> {
        Ok(match store.record_provenance(id)? {
            None => MergeDecision::InsertNew,
            Some(Provenance::Csv) if self.upgrade_csv_stubs => MergeDecision::UpgradeStub,
            Some(_) => MergeDecision::SkipExisting,
        })
    }

    /// Merge one API status into the store.
    ///
    /// When `favorite_of` is set the actor's favorite mark is attached
    /// whatever the decision, so a record favorited by several archived
    /// accounts keeps one mark per account.
    ///
    /// # Errors
    ///
    /// Returns an error if any store operation fails.
    pub fn apply(
        &mut self,
        store: &mut dyn ArchiveStore,
        status: &RawStatus,
        favorite_of: Option<&str>,
    ) -> Result<MergeOutcome> {
        let outcome = match self.resolve(store, status.id)? {
            MergeDecision::InsertNew => {
                self.ensure_author(store, &status.user)?;
                let record = status.to_record(Provenance::Api);
                store.insert_record(&record)?;
                attach_hashtags(store, status)?;
                MergeOutcome::Inserted(record)
            }
            MergeDecision::UpgradeStub => {
                self.ensure_author(store, &status.user)?;
                let record = status.to_record(Provenance::Merged);
                store.upgrade_record(&record)?;
                attach_hashtags(store, status)?;
                debug!("Upgraded CSV stub {}", record.id);
                MergeOutcome::Upgraded(record)
            }
            MergeDecision::SkipExisting => MergeOutcome::Skipped,
        };

        if let Some(actor) = favorite_of {
            store.attach_favorite(status.id, actor)?;
        }
        Ok(outcome)
    }

    /// Insert a record built from CSV data alone.
    ///
    /// The author is linked by handle only if already stored; CSV rows lack
    /// the data to create one. Returns `false` if the identity exists.
    ///
    /// # Errors
    ///
    /// Returns an error if any store operation fails.
    pub fn insert_stub(
        &mut self,
        store: &mut dyn ArchiveStore,
        pending: &PendingCsvRecord,
    ) -> Result<bool> {
        if store.has_identity(pending.id)? {
            return Ok(false);
        }
        let author_id = store
            .find_author_by_handle(&pending.username)?
            .map(|a| a.id);
        store.insert_record(&pending.to_record(author_id))?;
        Ok(true)
    }

    fn ensure_author(&mut self, store: &mut dyn ArchiveStore, user: &RawUser) -> Result<()> {
        if self.author_slot == Some(user.id) {
            return Ok(());
        }
        if store.find_author_by_identity(user.id)?.is_none() {
            store.insert_author(&user.to_author())?;
        }
        self.author_slot = Some(user.id);
        Ok(())
    }
}

fn attach_hashtags(store: &mut dyn ArchiveStore, status: &RawStatus) -> Result<()> {
    for tag in status.hashtags() {
        store.attach_tag(status.id, tag)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemKind;
    use crate::storage::Storage;

    fn status(id: u64, user_id: u64, tags: &[&str]) -> RawStatus {
        let hashtags: Vec<_> = tags.iter().map(|t| serde_json::json!({"text": t})).collect();
        serde_json::from_value(serde_json::json!({
            "id": id,
            "full_text": format!("status {id}"),
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "user": {"id": user_id, "screen_name": format!("user{user_id}")},
            "entities": {"hashtags": hashtags}
        }))
        .unwrap()
    }

    fn pending(id: u64, username: &str) -> PendingCsvRecord {
        PendingCsvRecord {
            id,
            username: username.to_string(),
            in_reply_to_status_id: None,
            in_reply_to_user_id: None,
            timestamp: "2015-03-01 12:00:00 +0000".to_string(),
            text: format!("csv {id}"),
            retweeted_status_id: None,
            retweeted_status_user_id: None,
            retweeted_status_timestamp: None,
            expanded_urls: Vec::new(),
        }
    }

    #[test]
    fn insert_then_skip() {
        let mut store = Storage::open_memory().unwrap();
        let mut merge = ReconciliationMerge::new(true);

        let first = merge.apply(&mut store, &status(10, 1, &["Rust"]), None).unwrap();
        assert!(matches!(first, MergeOutcome::Inserted(_)));
        let second = merge.apply(&mut store, &status(10, 1, &["Rust"]), None).unwrap();
        assert_eq!(second, MergeOutcome::Skipped);

        assert_eq!(store.all_identities_of_kind(ItemKind::Author).unwrap().len(), 1);
        assert_eq!(store.tags_for_record(10).unwrap(), vec!["rust"]);
    }

    #[test]
    fn author_is_created_once_per_identity() {
        let mut store = Storage::open_memory().unwrap();
        let mut merge = ReconciliationMerge::new(true);
        merge.apply(&mut store, &status(1, 7, &[]), None).unwrap();
        merge.apply(&mut store, &status(2, 8, &[]), None).unwrap();
        merge.apply(&mut store, &status(3, 7, &[]), None).unwrap();
        assert_eq!(store.all_identities_of_kind(ItemKind::Author).unwrap().len(), 2);
    }

    #[test]
    fn csv_stub_is_upgraded_when_enabled() {
        let mut store = Storage::open_memory().unwrap();
        let mut merge = ReconciliationMerge::new(true);
        assert!(merge.insert_stub(&mut store, &pending(42, "alice")).unwrap());
        assert_eq!(merge.resolve(&store, 42).unwrap(), MergeDecision::UpgradeStub);

        let outcome = merge.apply(&mut store, &status(42, 1, &["x"]), None).unwrap();
        assert!(matches!(outcome, MergeOutcome::Upgraded(_)));
        let stored = store.get_record(42).unwrap().unwrap();
        assert_eq!(stored.provenance, Provenance::Merged);
        assert_eq!(stored.text, "status 42");
        assert_eq!(stored.author_id, Some(1));
        assert_eq!(merge.resolve(&store, 42).unwrap(), MergeDecision::SkipExisting);
    }

    #[test]
    fn csv_stub_is_kept_when_upgrade_disabled() {
        let mut store = Storage::open_memory().unwrap();
        let mut merge = ReconciliationMerge::new(false);
        merge.insert_stub(&mut store, &pending(42, "alice")).unwrap();

        let outcome = merge.apply(&mut store, &status(42, 1, &[]), None).unwrap();
        assert_eq!(outcome, MergeOutcome::Skipped);
        let stored = store.get_record(42).unwrap().unwrap();
        assert_eq!(stored.provenance, Provenance::Csv);
        assert_eq!(stored.text, "csv 42");
    }

    #[test]
    fn stub_links_existing_author_by_handle_only() {
        let mut store = Storage::open_memory().unwrap();
        let mut merge = ReconciliationMerge::new(true);
        merge.apply(&mut store, &status(1, 9, &[]), None).unwrap();

        merge.insert_stub(&mut store, &pending(2, "USER9")).unwrap();
        merge.insert_stub(&mut store, &pending(3, "nobody")).unwrap();
        assert!(!merge.insert_stub(&mut store, &pending(3, "nobody")).unwrap());

        assert_eq!(store.get_record(2).unwrap().unwrap().author_id, Some(9));
        assert_eq!(store.get_record(3).unwrap().unwrap().author_id, None);
        assert_eq!(store.all_identities_of_kind(ItemKind::Author).unwrap().len(), 1);
    }

    #[test]
    fn favorites_attach_even_when_skipped() {
        let mut store = Storage::open_memory().unwrap();
        let mut merge = ReconciliationMerge::new(true);
        merge.apply(&mut store, &status(5, 1, &[]), Some("alice")).unwrap();
        let again = merge.apply(&mut store, &status(5, 1, &[]), Some("bob")).unwrap();

        assert_eq!(again, MergeOutcome::Skipped);
        assert_eq!(store.favorites_for_record(5).unwrap(), vec!["alice", "bob"]);
    }
}
