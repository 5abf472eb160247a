//! Export data parser.
//!
//! Handles the legacy `tweets.csv` export and the two timestamp formats the
//! remote API and the export use.

use crate::error::{HoardError, Result};
use crate::identity::IdentitySet;
use crate::model::PendingCsvRecord;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// API format: "Wed Oct 10 20:19:24 +0000 2018"
pub fn parse_api_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(date_str, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Export format: "2015-03-01 12:34:56 +0000"
pub fn parse_csv_timestamp(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(date_str.trim(), "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    tweet_id: u64,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    in_reply_to_status_id: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    in_reply_to_user_id: Option<u64>,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    text: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    retweeted_status_id: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    retweeted_status_user_id: Option<u64>,
    #[serde(default)]
    retweeted_status_timestamp: String,
    #[serde(default)]
    expanded_urls: String,
}

/// Parser for a CSV tweet export
pub struct ExportParser {
    csv_path: PathBuf,
}

impl ExportParser {
    pub fn new(csv_path: impl AsRef<Path>) -> Self {
        Self {
            csv_path: csv_path.as_ref().to_path_buf(),
        }
    }

    /// Parse every row whose identity is not in `known`.
    ///
    /// Rows are keyed (and therefore ordered) by identity. `username` is the
    /// handle the export belongs to; the file itself does not carry it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a row is malformed.
    pub fn parse_pending(
        &self,
        username: &str,
        known: &IdentitySet,
    ) -> Result<BTreeMap<u64, PendingCsvRecord>> {
        debug!("Scanning {} for new tweets...", self.csv_path.display());
        let file = File::open(&self.csv_path)
            .map_err(|e| HoardError::path_error("open", &self.csv_path, e))?;
        let mut reader = csv::Reader::from_reader(file);

        let mut pending = BTreeMap::new();
        let mut total = 0usize;
        for row in reader.deserialize::<CsvRow>() {
            let row = row?;
            total += 1;
            if known.contains(row.tweet_id) {
                continue;
            }
            pending.insert(row.tweet_id, Self::to_pending(row, username));
        }

        info!(
            "Found {} new of {} tweets in {}",
            pending.len(),
            total,
            self.csv_path.display()
        );
        Ok(pending)
    }

    fn to_pending(row: CsvRow, username: &str) -> PendingCsvRecord {
        PendingCsvRecord {
            id: row.tweet_id,
            username: username.to_string(),
            in_reply_to_status_id: row.in_reply_to_status_id,
            in_reply_to_user_id: row.in_reply_to_user_id,
            timestamp: row.timestamp,
            text: row.text,
            retweeted_status_id: row.retweeted_status_id,
            retweeted_status_user_id: row.retweeted_status_user_id,
            retweeted_status_timestamp: Some(row.retweeted_status_timestamp)
                .filter(|s| !s.is_empty()),
            expanded_urls: row
                .expanded_urls
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "tweet_id,in_reply_to_status_id,in_reply_to_user_id,timestamp,source,text,retweeted_status_id,retweeted_status_user_id,retweeted_status_timestamp,expanded_urls";

    fn write_export(dir: &TempDir, rows: &[&str]) -> PathBuf {
        let path = dir.path().join("tweets.csv");
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_rows_and_skips_known() {
        let dir = TempDir::new().unwrap();
        let path = write_export(
            &dir,
            &[
                r#"42,,,2015-03-01 12:34:56 +0000,"<a>web</a>","hello, world",,,,"#,
                r#"43,42,7,2015-03-02 08:00:00 +0000,"<a>web</a>",reply,,,,"https://a.example/x,https://b.example/y""#,
                r#"44,,,2015-03-03 08:00:00 +0000,"<a>web</a>",old,,,,"#,
            ],
        );

        let known: IdentitySet = [44].into_iter().collect();
        let pending = ExportParser::new(&path)
            .parse_pending("alice", &known)
            .unwrap();

        assert_eq!(pending.keys().copied().collect::<Vec<_>>(), vec![42, 43]);
        let first = &pending[&42];
        assert_eq!(first.text, "hello, world");
        assert_eq!(first.username, "alice");
        assert_eq!(first.in_reply_to_status_id, None);
        assert!(first.expanded_urls.is_empty());

        let reply = &pending[&43];
        assert_eq!(reply.in_reply_to_status_id, Some(42));
        assert_eq!(reply.in_reply_to_user_id, Some(7));
        assert_eq!(reply.expanded_urls.len(), 2);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ExportParser::new("/definitely/not/here.csv")
            .parse_pending("alice", &IdentitySet::new())
            .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.csv"));
    }

    #[test]
    fn parses_both_date_formats() {
        let api = parse_api_date("Wed Oct 10 20:19:24 +0000 2018").unwrap();
        let csv = parse_csv_timestamp("2018-10-10 20:19:24 +0000").unwrap();
        assert_eq!(api, csv);
        assert!(parse_api_date("not a date").is_none());
        assert!(parse_csv_timestamp("").is_none());
    }
}
