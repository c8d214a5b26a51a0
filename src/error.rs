//! Error types for eventsync
//!
//! Two layers: `EventSyncError` for failures that abort a run or a pass, and
//! `SyncIssueError` for failures confined to a single source issue. The
//! reconciler catches the latter, logs them and moves on to the next issue.

use crate::model::{EventStatus, EventUrl, IssueId};
use thiserror::Error;

/// Result type alias for eventsync operations
pub type Result<T> = std::result::Result<T, EventSyncError>;

/// Errors that abort a run (startup) or a whole pass (nothing is committed)
#[derive(Error, Debug)]
pub enum EventSyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage/database errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Network/HTTP errors
    #[error("Network error: {0}")]
    Network(String),

    /// Parsing errors (YAML, JSON, dates)
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Redmine API errors
    #[error("Redmine error: {0}")]
    Redmine(#[from] redmine::Error),

    /// Two issues in one batch resolved to the same URL
    #[error("Duplicate issue URL in batch: {url} (issues #{first} and #{second})")]
    DuplicateUrl {
        url: EventUrl,
        first: IssueId,
        second: IssueId,
    },

    /// A mapped Redmine project does not exist
    #[error("Unknown Redmine project: {0}")]
    UnknownProject(String),

    /// A mapped event group does not exist
    #[error("Unknown event group: {0}")]
    UnknownGroup(String),

    /// The sync user does not exist in the event store
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// The default category does not exist in the event store
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// A configured tracker does not exist
    #[error("Unknown Redmine tracker: {0}")]
    UnknownTracker(String),

    /// Template expansion errors
    #[error("Template error: {0}")]
    Template(#[from] crate::templates::TemplateError),

    /// Rate limited (with retry-after duration in seconds)
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl crate::integrations::retry::RetryableError for EventSyncError {
    fn retry_decision(&self) -> crate::integrations::retry::RetryDecision {
        use crate::integrations::retry::RetryDecision;
        use std::time::Duration;

        match self {
            EventSyncError::Network(_) => RetryDecision::Retry,
            EventSyncError::Redmine(redmine::Error::RateLimited(secs))
            | EventSyncError::RateLimited(secs) => {
                RetryDecision::RetryAfter(Duration::from_secs(*secs))
            }
            EventSyncError::Redmine(e) if e.is_transient() => RetryDecision::Retry,
            _ => RetryDecision::NoRetry,
        }
    }
}

/// Failures confined to one source issue
///
/// These never abort a batch: the offending issue is logged with its id and
/// skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncIssueError {
    /// The tracker reported a status label outside the configured vocabulary
    #[error("unknown status label '{0}'")]
    UnknownStatus(String),

    /// A recognized custom field arrived with the wrong value shape
    #[error("custom field '{field}' has unexpected shape: expected {expected}, got {found}")]
    CustomFieldShape {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    /// Events need a start date
    #[error("issue has no start date")]
    MissingStartDate,

    /// The status machine does not allow this change
    #[error("status transition {from} -> {to} is not allowed")]
    ForbiddenTransition { from: EventStatus, to: EventStatus },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::retry::{RetryDecision, RetryableError};
    use std::time::Duration;

    #[test]
    fn test_redmine_rate_limit_is_retried_after() {
        let err = EventSyncError::Redmine(redmine::Error::RateLimited(12));
        assert_eq!(
            err.retry_decision(),
            RetryDecision::RetryAfter(Duration::from_secs(12))
        );
    }

    #[test]
    fn test_redmine_server_error_is_retried() {
        let err = EventSyncError::Redmine(redmine::Error::Api {
            status: 502,
            body: "bad gateway".to_string(),
        });
        assert_eq!(err.retry_decision(), RetryDecision::Retry);
    }

    #[test]
    fn test_permanent_errors_are_not_retried() {
        assert_eq!(
            EventSyncError::Redmine(redmine::Error::Unauthorized).retry_decision(),
            RetryDecision::NoRetry
        );
        assert_eq!(
            EventSyncError::Config("bad".to_string()).retry_decision(),
            RetryDecision::NoRetry
        );
        assert_eq!(
            EventSyncError::UnknownProject("kultur".to_string()).retry_decision(),
            RetryDecision::NoRetry
        );
    }

    #[test]
    fn test_issue_error_messages() {
        let err = SyncIssueError::UnknownStatus("In Klärung".to_string());
        assert_eq!(err.to_string(), "unknown status label 'In Klärung'");

        let err = SyncIssueError::ForbiddenTransition {
            from: EventStatus::Confirmed,
            to: EventStatus::New,
        };
        assert_eq!(
            err.to_string(),
            "status transition confirmed -> new is not allowed"
        );
    }
}
