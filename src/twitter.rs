//! `RemoteFeed` adapter over the v1.1 REST API.
//!
//! Only the three endpoints ingestion needs are wrapped. Throttling is
//! reported as [`HoardError::RateLimited`] so the pipeline can absorb it;
//! every other failure becomes [`HoardError::Remote`].

use crate::config::{Account, ApiSettings};
use crate::error::{HoardError, Result};
use crate::model::{FeedKind, RawStatus};
use crate::remote::{RemoteFeed, validate_lookup_ids};
use itertools::Itertools;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// API error code for "Rate limit exceeded".
const RATE_LIMIT_CODE: i64 = 88;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Blocking client bound to one account.
pub struct TwitterClient {
    client: Client,
    base_url: String,
    bearer_token: String,
    screen_name: String,
}

impl TwitterClient {
    /// Build a client for `account`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(api: &ApiSettings, account: &Account) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .user_agent(api.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            bearer_token: account.bearer_token.clone(),
            screen_name: account.handle.trim_start_matches('@').to_string(),
        })
    }

    fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Vec<RawStatus>> {
        let url = format!("{}/{endpoint}.json", self.base_url);
        debug!("GET {url} {:?}", query);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()?;
        Self::decode(response)
    }

    fn decode(response: Response) -> Result<Vec<RawStatus>> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }

        let reset = response
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());
        let body = response.text().unwrap_or_default();
        Err(classify_error(
            status.as_u16(),
            reset,
            chrono::Utc::now().timestamp(),
            &body,
        ))
    }
}

/// Turn a non-success response into the matching error.
///
/// `reset_epoch` is the `x-rate-limit-reset` header (seconds since the
/// epoch); the retry hint is its distance from `now_epoch`.
#[must_use]
pub fn classify_error(status: u16, reset_epoch: Option<i64>, now_epoch: i64, body: &str) -> HoardError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let entries = parsed.map(|b| b.errors).unwrap_or_default();

    if status == 429 || entries.iter().any(|e| e.code == RATE_LIMIT_CODE) {
        let retry_after = reset_epoch
            .map(|reset| reset - now_epoch)
            .filter(|secs| *secs > 0)
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs);
        return HoardError::rate_limited(retry_after);
    }

    let message = if entries.is_empty() {
        body.trim().chars().take(200).collect()
    } else {
        entries
            .iter()
            .map(|e| format!("[{}] {}", e.code, e.message))
            .join("; ")
    };
    HoardError::Remote { status, message }
}

impl RemoteFeed for TwitterClient {
    fn page(
        &mut self,
        kind: FeedKind,
        since_id: Option<u64>,
        max_id: Option<u64>,
        count: usize,
    ) -> Result<Vec<RawStatus>> {
        info!(
            "Pulling {count} {kind} statuses for @{} (since_id {:?}, max_id {:?})...",
            self.screen_name, since_id, max_id
        );
        let endpoint = match kind {
            FeedKind::Timeline => "statuses/user_timeline",
            FeedKind::Favorites => "favorites/list",
        };

        let mut query = vec![
            ("screen_name", self.screen_name.clone()),
            ("count", count.to_string()),
            ("include_entities", "true".to_string()),
            ("tweet_mode", "extended".to_string()),
        ];
        if let Some(id) = since_id {
            query.push(("since_id", id.to_string()));
        }
        if let Some(id) = max_id {
            query.push(("max_id", id.to_string()));
        }

        let statuses = self.get(endpoint, &query)?;
        info!("Found {} statuses this iteration", statuses.len());
        Ok(statuses)
    }

    fn bulk_lookup(&mut self, ids: &[u64]) -> Result<Vec<RawStatus>> {
        validate_lookup_ids(ids)?;
        let query = [
            ("id", ids.iter().join(",")),
            ("include_entities", "true".to_string()),
            ("tweet_mode", "extended".to_string()),
        ];
        self.get("statuses/lookup", &query)
    }
}
