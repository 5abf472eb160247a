//! The remote feed capability the ingestion engine consumes.

use crate::backoff::RateBudget;
use crate::error::{HoardError, Result};
use crate::model::{FeedKind, RawStatus};

/// Largest page the remote serves.
pub const PAGE_SIZE: usize = 200;

/// Most identities accepted by one bulk lookup.
pub const MAX_LOOKUP_IDS: usize = 100;

/// A paginated, rate-limited source of statuses.
///
/// Implementations raise [`HoardError::RateLimited`] when throttled; the
/// pipeline absorbs that signal and retries the same call.
pub trait RemoteFeed {
    /// One page of statuses, newest first.
    ///
    /// `since_id` and `max_id` bound the page: only identities greater than
    /// `since_id` and at most `max_id` are returned.
    ///
    /// # Errors
    ///
    /// `RateLimited` on throttling, any other error on failure.
    fn page(
        &mut self,
        kind: FeedKind,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: usize,
    ) -> Result<Vec<RawStatus>>;

    /// Fetch statuses by explicit identity. Unknown or deleted identities are
    /// silently absent from the result.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty or oversized id list, `RateLimited` on
    /// throttling.
    fn bulk_lookup(&mut self, ids: &[u64]) -> Result<Vec<RawStatus>>;
}

/// Reject lookups the remote would refuse.
///
/// # Errors
///
/// Returns `Validation` when `ids` is empty or longer than [`MAX_LOOKUP_IDS`].
pub fn validate_lookup_ids(ids: &[u64]) -> Result<()> {
    if ids.is_empty() {
        return Err(HoardError::validation("bulk lookup needs at least one id"));
    }
    if ids.len() > MAX_LOOKUP_IDS {
        return Err(HoardError::validation(format!(
            "bulk lookup accepts at most {MAX_LOOKUP_IDS} ids, got {}",
            ids.len()
        )));
    }
    Ok(())
}

/// Rough duration of a CSV reconciliation, in seconds.
///
/// Each call costs about two seconds; calls beyond the burst also pay the
/// nominal spacing.
#[must_use]
pub fn estimate_lookup_seconds(pending: usize, budget: RateBudget) -> u64 {
    let calls = u64::try_from(pending / MAX_LOOKUP_IDS).unwrap_or(u64::MAX);
    let burst = u64::from(budget.requests_before_wait());
    let base = calls * 2;
    if calls <= burst {
        base
    } else {
        base + (calls - burst) * budget.spacing.as_secs()
    }
}
