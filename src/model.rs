//! Data models for archived content.
//!
//! [`Record`] and [`Author`] are the normalized rows the store keeps.
//! [`RawStatus`] mirrors the remote API JSON: unknown fields are kept and
//! explicit `null`s are written back, so a snapshot reproduces what the API
//! sent, while [`PendingCsvRecord`] carries the partial
//! data a CSV export row provides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Which path first created a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Api,
    Csv,
    Merged,
}

impl Provenance {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Csv => "csv",
            Self::Merged => "merged",
        }
    }

    /// Parse the stored column value. Unknown values read back as `Api`.
    #[must_use]
    pub fn from_column(value: &str) -> Self {
        match value {
            "csv" => Self::Csv,
            "merged" => Self::Merged,
            _ => Self::Api,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote feed to page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Timeline,
    Favorites,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeline => write!(f, "timeline"),
            Self::Favorites => write!(f, "favorites"),
        }
    }
}

/// Entity kinds that carry a download-state flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Record,
    Author,
}

impl ItemKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Author => "author",
        }
    }
}

/// An archived tweet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub author_id: Option<u64>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub in_reply_to_status_id: Option<u64>,
    pub media_urls: Vec<String>,
    pub provenance: Provenance,
    pub files_downloaded: bool,
}

/// An account that authored archived records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: u64,
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub files_downloaded: bool,
}

/// A row from a CSV export whose identity was not yet archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCsvRecord {
    pub id: u64,
    pub username: String,
    pub in_reply_to_status_id: Option<u64>,
    pub in_reply_to_user_id: Option<u64>,
    pub timestamp: String,
    pub text: String,
    pub retweeted_status_id: Option<u64>,
    pub retweeted_status_user_id: Option<u64>,
    pub retweeted_status_timestamp: Option<String>,
    pub expanded_urls: Vec<String>,
}

/// Work item for the media resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingDownload {
    Record { id: u64, urls: Vec<String> },
    Author {
        id: u64,
        handle: String,
        avatar_url: Option<String>,
    },
}

impl PendingDownload {
    #[must_use]
    pub const fn id(&self) -> u64 {
        match self {
            Self::Record { id, .. } | Self::Author { id, .. } => *id,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        match self {
            Self::Record { .. } => ItemKind::Record,
            Self::Author { .. } => ItemKind::Author,
        }
    }
}

// =============================================================================
// Remote API payloads
// =============================================================================

/// A status object as returned by the remote API.
///
/// Nullable fields the API always sends serialize back as `null`. Only
/// `text`/`full_text` (one per tweet mode) and `extended_entities` are
/// omitted when absent, matching how the API itself leaves them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStatus {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub in_reply_to_status_id: Option<u64>,
    pub user: RawUser,
    #[serde(default)]
    pub entities: Option<RawEntities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_entities: Option<RawEntities>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The user object embedded in a status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUser {
    pub id: u64,
    pub screen_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_image_url_https: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEntities {
    #[serde(default)]
    pub hashtags: Vec<RawHashtag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<RawMedia>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHashtag {
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMedia {
    pub media_url_https: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawStatus {
    /// Body text, preferring the untruncated form.
    #[must_use]
    pub fn body(&self) -> &str {
        self.full_text
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }

    /// Media URLs, preferring `extended_entities` which lists every attachment.
    #[must_use]
    pub fn media_urls(&self) -> Vec<String> {
        let from = |entities: &Option<RawEntities>| -> Vec<String> {
            entities
                .as_ref()
                .map(|e| e.media.iter().map(|m| m.media_url_https.clone()).collect())
                .unwrap_or_default()
        };
        let extended = from(&self.extended_entities);
        if extended.is_empty() {
            from(&self.entities)
        } else {
            extended
        }
    }

    /// Raw hashtag texts, unnormalized.
    #[must_use]
    pub fn hashtags(&self) -> Vec<&str> {
        self.entities
            .as_ref()
            .map(|e| e.hashtags.iter().map(|h| h.text.as_str()).collect())
            .unwrap_or_default()
    }

    /// Normalize into a store row.
    #[must_use]
    pub fn to_record(&self, provenance: Provenance) -> Record {
        Record {
            id: self.id,
            author_id: Some(self.user.id),
            text: self.body().to_string(),
            created_at: self
                .created_at
                .as_deref()
                .and_then(crate::parser::parse_api_date),
            in_reply_to_status_id: self.in_reply_to_status_id,
            media_urls: self.media_urls(),
            provenance,
            files_downloaded: false,
        }
    }
}

impl RawUser {
    #[must_use]
    pub fn to_author(&self) -> Author {
        Author {
            id: self.id,
            handle: self.screen_name.clone(),
            display_name: self.name.clone(),
            avatar_url: self.profile_image_url_https.clone(),
            files_downloaded: false,
        }
    }
}

impl PendingCsvRecord {
    /// Build a standalone record from export data alone.
    #[must_use]
    pub fn to_record(&self, author_id: Option<u64>) -> Record {
        Record {
            id: self.id,
            author_id,
            text: self.text.clone(),
            created_at: crate::parser::parse_csv_timestamp(&self.timestamp),
            in_reply_to_status_id: self.in_reply_to_status_id,
            media_urls: Vec::new(),
            provenance: Provenance::Csv,
            files_downloaded: false,
        }
    }
}

// =============================================================================
// Reporting
// =============================================================================

/// Statistics about the archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub records_count: i64,
    pub authors_count: i64,
    pub tags_count: i64,
    pub favorites_count: i64,
    pub api_records: i64,
    pub csv_records: i64,
    pub merged_records: i64,
    pub pending_record_downloads: i64,
    pub pending_author_downloads: i64,
    pub first_record_date: Option<DateTime<Utc>>,
    pub last_record_date: Option<DateTime<Utc>>,
}

/// A tag and how many records carry it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub records: i64,
}
