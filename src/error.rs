//! Custom error types for hoard.
//!
//! Variants are grouped by the layer that raises them. The ingestion engine
//! only recovers locally from [`HoardError::RateLimited`]; everything else
//! propagates to the caller and aborts the current run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Primary error type for hoard operations.
#[derive(Error, Debug)]
pub enum HoardError {
    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The remote API throttled us. Retried locally after a forced wait.
    #[error("Remote rate limit exceeded{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The remote API rejected a request for any other reason.
    #[error("Remote API error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    /// Transport-level failure talking to the remote API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An insert collided with an identity that is already stored.
    #[error("Integrity violation: {kind} {id} is already archived")]
    IntegrityViolation { kind: &'static str, id: u64 },

    // =========================================================================
    // Media Errors
    // =========================================================================
    /// A single media URL could not be fetched.
    #[error("Failed to fetch media '{url}': {reason}")]
    MediaFetch { url: String, reason: String },

    // =========================================================================
    // Input Errors
    // =========================================================================
    /// Invalid user input or malformed request.
    #[error("Invalid input: {reason}")]
    Validation { reason: String },

    /// No credentials are configured for the requested handle.
    #[error("No account configured for handle '@{handle}'")]
    AccountNotConfigured { handle: String },

    /// Configuration file could not be parsed.
    #[error("Invalid configuration in '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// CSV export could not be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encode/decode failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after.map_or_else(String::new, |d| format!(" (retry after {}s)", d.as_secs()))
}

/// Result type alias for hoard operations.
pub type Result<T> = std::result::Result<T, HoardError>;

impl HoardError {
    /// Create a rate-limit signal with an optional retry hint.
    #[must_use]
    pub const fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a media fetch error.
    pub fn media_fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MediaFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::AccountNotConfigured { .. } => {
                Some("Add an [[accounts]] entry with this handle and a bearer_token to the config file.")
            }
            Self::Config { .. } => Some("Run 'hoard config --init' to write a fresh default file."),
            Self::Remote { status: 401 | 403, .. } => {
                Some("Check the bearer_token configured for this account.")
            }
            Self::IntegrityViolation { .. } => {
                Some("This is a bug: ingestion should never insert an identity twice.")
            }
            _ => None,
        }
    }
}

// =============================================================================
// CLI Error Formatting
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_display_includes_hint() {
        let err = HoardError::rate_limited(Some(Duration::from_secs(90)));
        assert!(matches!(err, HoardError::RateLimited { .. }));
        assert!(err.to_string().contains("retry after 90s"));

        let bare = HoardError::rate_limited(None);
        assert_eq!(bare.to_string(), "Remote rate limit exceeded");
    }

    #[test]
    fn test_integrity_violation_is_fatal() {
        let err = HoardError::IntegrityViolation {
            kind: "record",
            id: 42,
        };
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_account_suggestion() {
        let err = HoardError::AccountNotConfigured {
            handle: "alice".to_string(),
        };
        assert!(err.to_string().contains("@alice"));
        assert!(err.suggestion().unwrap().contains("[[accounts]]"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HoardError = io_err.into();
        assert!(matches!(err, HoardError::Io(_)));
    }

    #[test]
    fn test_from_rusqlite_error() {
        fn accepts(_: HoardError) {}
        accepts(rusqlite::Error::InvalidQuery.into());
    }

    #[test]
    fn format_error_multiple_suggestions() {
        let output = format_error("Missing handle", "CSV import needs one", &["First", "Second"]);
        assert!(output.contains("Missing handle"));
        assert!(output.contains("CSV import needs one"));
        assert!(output.contains("First"));
        assert!(output.contains("Second"));
    }
}
