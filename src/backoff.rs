//! Request pacing against a remote rate budget.
//!
//! The remote allows `requests` calls per window. The first `requests - 1`
//! calls go out back to back. After that every call is spaced at least
//! `spacing` after the previous one, so the budget drains slowly instead of
//! ending in one long stall. Time spent waiting is offered to a deferred-work
//! callback first (the media pass), and only the remainder is slept.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Source of time. Abstracted so tests can run without sleeping.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Per-endpoint request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
    /// Requests allowed per 15 minute window.
    pub requests: u32,
    /// Nominal spacing between requests once the burst is spent.
    #[serde(rename = "spacing_secs", with = "secs")]
    pub spacing: Duration,
}

impl RateBudget {
    #[must_use]
    pub const fn new(requests: u32, spacing: Duration) -> Self {
        Self { requests, spacing }
    }

    /// `statuses/user_timeline`: 300 per window, 3s apart.
    #[must_use]
    pub const fn timeline() -> Self {
        Self::new(300, Duration::from_secs(3))
    }

    /// `favorites/list`: 15 per window, 60s apart.
    #[must_use]
    pub const fn favorites() -> Self {
        Self::new(15, Duration::from_secs(60))
    }

    /// `statuses/lookup`: 60 per window, 15s apart.
    #[must_use]
    pub const fn lookup() -> Self {
        Self::new(60, Duration::from_secs(15))
    }

    /// Number of requests issued before pacing starts.
    #[must_use]
    pub const fn requests_before_wait(&self) -> u32 {
        self.requests.saturating_sub(1)
    }

    /// True once `request_index` requests have consumed the burst.
    #[must_use]
    pub const fn should_wait(&self, request_index: u32) -> bool {
        request_index >= self.requests_before_wait()
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Counters describing how a backoff spent its time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WaitStats {
    pub requests: u64,
    pub paced_waits: u64,
    pub forced_waits: u64,
    pub deferred_runs: u64,
}

/// Pacing state for one endpoint over one run.
pub struct Backoff<'c> {
    budget: RateBudget,
    clock: &'c dyn Clock,
    request_index: u32,
    window_start: Option<Instant>,
    stats: WaitStats,
}

impl<'c> Backoff<'c> {
    #[must_use]
    pub fn new(budget: RateBudget, clock: &'c dyn Clock) -> Self {
        Self {
            budget,
            clock,
            request_index: 0,
            window_start: None,
            stats: WaitStats::default(),
        }
    }

    #[must_use]
    pub const fn budget(&self) -> RateBudget {
        self.budget
    }

    #[must_use]
    pub const fn request_index(&self) -> u32 {
        self.request_index
    }

    #[must_use]
    pub const fn stats(&self) -> WaitStats {
        self.stats
    }

    /// Whether the next request has to respect the spacing.
    #[must_use]
    pub const fn should_wait(&self) -> bool {
        self.budget.should_wait(self.request_index)
    }

    fn remaining(&self) -> Option<Duration> {
        let start = self.window_start?;
        let elapsed = self.clock.now().saturating_duration_since(start);
        self.budget
            .spacing
            .checked_sub(elapsed)
            .filter(|d| !d.is_zero())
    }

    /// Call before every request.
    ///
    /// When pacing is due and time remains, `deferred` runs first. Whatever
    /// wait is still left afterwards is slept.
    ///
    /// # Errors
    ///
    /// Propagates an error returned by `deferred`.
    pub fn before_request<F>(&mut self, deferred: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        if self.should_wait() && self.remaining().is_some() {
            debug!("Running deferred work during rate-limit wait");
            self.stats.deferred_runs += 1;
            deferred()?;

            if let Some(left) = self.remaining() {
                info!(
                    "Sleeping for {:.1} seconds to ease up on rate limit...",
                    left.as_secs_f64()
                );
                self.stats.paced_waits += 1;
                self.clock.sleep(left);
            }
        }

        self.window_start = Some(self.clock.now());
        self.request_index = self.request_index.saturating_add(1);
        self.stats.requests += 1;
        Ok(())
    }

    /// React to an explicit throttling signal.
    ///
    /// Exhausts the burst so every later request is paced, then sleeps once
    /// for the nominal spacing or the remote's hint, whichever is longer.
    pub fn force(&mut self, retry_after: Option<Duration>) {
        self.request_index = self.budget.requests;
        let wait = retry_after.map_or(self.budget.spacing, |hint| hint.max(self.budget.spacing));
        warn!(
            "Overran rate limit. Sleeping {} seconds in an attempt to recover...",
            wait.as_secs()
        );
        self.stats.forced_waits += 1;
        self.clock.sleep(wait);
    }
}
