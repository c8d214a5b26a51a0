//! Issue source integrations
//!
//! The reconciliation core never talks to Redmine directly. It consumes the
//! [`IssueSource`] trait, and pagination, retries and wire types stay inside
//! the adapter.
//!
//! # Built-in Integrations
//!
//! - **Redmine**: REST API adapter ([`RedmineAdapter`])

pub mod redmine;
pub mod retry;

pub use self::redmine::RedmineAdapter;
pub use retry::{with_retry, RetryDecision, RetryPolicy, RetryableError};

use crate::model::{NamedRef, Project, SourceIssue};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Which issue statuses to fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    /// Open issues only
    #[default]
    Open,
    /// Open and closed issues
    All,
    /// A single status id
    Id(u64),
}

/// Parameters of one issue fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueQuery {
    /// Trackers to fetch from; issues of all of them are concatenated
    pub tracker_ids: Vec<u64>,
    pub status: StatusFilter,
    /// Lower bound on the last update (day granularity at the source)
    pub updated_after: Option<DateTime<Utc>>,
    /// Issues updated at or after this instant are excluded
    pub updated_before: Option<DateTime<Utc>>,
}

impl IssueQuery {
    pub fn new(tracker_ids: Vec<u64>) -> Self {
        Self {
            tracker_ids,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn updated_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.updated_after = after;
        self.updated_before = before;
        self
    }
}

/// Source of event tickets
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Fetch every issue matching the query (all pages)
    async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<SourceIssue>>;

    async fn find_project_by_identifier(&self, identifier: &str) -> Result<Option<Project>>;

    async fn find_tracker_by_name(&self, name: &str) -> Result<Option<NamedRef>>;
}
