//! Type-safe ids and the URL correlation key

use crate::{EventSyncError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(v: $inner) -> Self {
                Self(v)
            }
        }
    };
}

numeric_id!(
    /// Redmine issue id
    IssueId(u64)
);
numeric_id!(
    /// Redmine project id
    ProjectId(u64)
);
numeric_id!(
    /// Event row id in the event store
    EventId(i64)
);
numeric_id!(
    /// Event group id (the calendar's notion of an organizer)
    GroupId(i64)
);
numeric_id!(
    /// Event store user id
    UserId(i64)
);
numeric_id!(
    /// Event category id
    CategoryId(i64)
);

/// Scheme and host of the Redmine instance, used to build issue URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerBase {
    scheme: String,
    host: String,
}

impl TrackerBase {
    /// Parse a base URL such as `https://redmine.example.org/`
    ///
    /// The host part may carry a path prefix (`https://example.org/redmine`).
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim().trim_end_matches('/');
        let (scheme, host) = url.split_once("://").ok_or_else(|| {
            EventSyncError::Config(format!("Tracker URL has no scheme: {}", url))
        })?;

        if scheme != "https" && scheme != "http" {
            return Err(EventSyncError::Config(format!(
                "Tracker URL must use http or https: {}",
                url
            )));
        }
        if host.is_empty() {
            return Err(EventSyncError::Config(format!(
                "Tracker URL has no host: {}",
                url
            )));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The stable correlation URL for an issue
    pub fn issue_url(&self, id: IssueId) -> EventUrl {
        EventUrl(format!("{}://{}/issues/{}", self.scheme, self.host, id))
    }
}

/// External URL of an event: the unique key correlating it to a source issue
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventUrl(String);

impl EventUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventUrl {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
