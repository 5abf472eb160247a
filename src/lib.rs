//! hoard - incremental tweet archiver
//!
//! Pages through a rate-limited remote feed, reconciles legacy CSV exports
//! with what the API still returns, and downloads referenced media exactly
//! once into a tag-searchable `SQLite` archive.
//!
//! # Modules
//!
//! - [`pipeline`] - Paging, early termination and CSV reconciliation
//! - [`merge`] - Insert, upgrade or skip decisions per identity
//! - [`backoff`] - Request pacing and forced waits
//! - [`media`] - Idempotent media download
//! - [`remote`] / [`twitter`] - Remote feed capability and its HTTP adapter
//! - [`store`] / [`storage`] - Persistence interface and its `SQLite` implementation
//! - [`cli`] - Command-line interface definitions

pub mod backoff;
pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod media;
pub mod merge;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod remote;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod tags;
pub mod twitter;

pub use backoff::{Backoff, Clock, RateBudget, SystemClock};
pub use config::{Account, Config};
pub use error::{HoardError, Result, format_error};
pub use identity::IdentitySet;
pub use media::{DownloadReport, HttpMediaSource, MediaResolver, MediaSource};
pub use merge::{MergeDecision, MergeOutcome, ReconciliationMerge};
pub use model::*;
pub use pipeline::{CsvImportReport, IngestionPipeline, PipelineSettings, RunStats};
pub use remote::RemoteFeed;
pub use snapshot::SnapshotWriter;
pub use storage::Storage;
pub use store::ArchiveStore;
pub use twitter::TwitterClient;

use chrono::{DateTime, Datelike, Utc};
use std::path::PathBuf;

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "hoard.db";

/// Standard width for content dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

/// Get the default data directory for hoard
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hoard")
}

/// Get the default database path
#[must_use]
pub fn default_db_path() -> PathBuf {
    default_data_dir().join(DEFAULT_DB_NAME)
}

#[must_use]
pub fn default_media_path() -> PathBuf {
    default_data_dir().join("media")
}

#[must_use]
pub fn default_snapshots_path() -> PathBuf {
    default_data_dir().join("snapshots")
}

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_count(value: usize) -> String {
    format_number(i64::try_from(value).unwrap_or(i64::MAX))
}

/// Format a datetime relative to now: "just now", "5m ago", "Jan 15, 2023".
#[must_use]
pub fn format_relative_date(dt: DateTime<Utc>) -> String {
    format_relative_date_with_base(dt, Utc::now())
}

/// Format a datetime relative to a fixed base time (useful for tests).
#[must_use]
pub fn format_relative_date_with_base(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(dt);
    if duration.num_seconds() < 0 {
        return dt.format("%b %d, %Y").to_string();
    }

    if duration.num_seconds() < 60 {
        "just now".to_string()
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else if dt.year() == now.year() {
        dt.format("%b %d").to_string()
    } else {
        dt.format("%b %d, %Y").to_string()
    }
}

/// Format an optional datetime with human-friendly output.
#[must_use]
pub fn format_optional_date(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "unknown".to_string(), format_relative_date)
}
