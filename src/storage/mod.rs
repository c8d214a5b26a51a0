//! Storage layer
//!
//! - [`EventStore`]: the target event database, with buffered writes and a
//!   single-transaction commit
//! - [`SqliteEventStore`]: the SQLite implementation
//! - [`CheckpointStore`]: persistence of the last successful sync instant

mod checkpoint;
mod sqlite;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore};
pub use sqlite::SqliteEventStore;

use crate::model::{CategoryId, EventStatus, EventUrl, GroupId, TargetEvent, UserId};
use crate::Result;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Inclusive start-date window; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    /// The unbounded window
    pub fn all() -> Self {
        Self::default()
    }

    /// Every date on or after `start`
    pub fn starting(start: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// Which events an update pass may touch
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Restrict to these URLs (None: any URL)
    pub urls: Option<Vec<EventUrl>>,
    pub owner: Option<UserId>,
    /// Allowed statuses (empty: any status)
    pub statuses: Vec<EventStatus>,
    pub window: DateWindow,
    /// Cancelled events starting before this date are excluded
    pub cancelled_since: Option<NaiveDate>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_urls(mut self, urls: Vec<EventUrl>) -> Self {
        self.urls = Some(urls);
        self
    }

    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = EventStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_cancelled_since(mut self, since: Option<NaiveDate>) -> Self {
        self.cancelled_since = since;
        self
    }

    pub fn matches(&self, event: &TargetEvent) -> bool {
        if let Some(ref urls) = self.urls {
            if !urls.contains(&event.url) {
                return false;
            }
        }
        if let Some(owner) = self.owner {
            if event.owner() != owner {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&event.status()) {
            return false;
        }
        if !self.window.contains(event.fields.startdate) {
            return false;
        }
        if let (EventStatus::Cancelled, Some(since)) = (event.status(), self.cancelled_since) {
            if event.fields.startdate < since {
                return false;
            }
        }
        true
    }
}

/// Category names known to the event store
#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    by_name: HashMap<String, CategoryId>,
}

impl CategoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, id: CategoryId) {
        self.by_name.insert(name.into(), id);
    }

    pub fn resolve(&self, name: &str) -> Option<CategoryId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, CategoryId)> for CategoryCatalog {
    fn from_iter<T: IntoIterator<Item = (S, CategoryId)>>(iter: T) -> Self {
        Self {
            by_name: iter.into_iter().map(|(n, id)| (n.into(), id)).collect(),
        }
    }
}

/// Rows written by one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// The target event database
///
/// Adds and updates are buffered; nothing reaches the database until
/// [`commit`](EventStore::commit), which writes all of them in one transaction.
pub trait EventStore {
    /// Load committed events matching the filter
    fn query_events(&self, filter: &EventFilter) -> Result<Vec<TargetEvent>>;

    /// Which of `urls` already exist, regardless of owner, status or date
    fn existing_urls(&self, urls: &[EventUrl]) -> Result<HashSet<EventUrl>>;

    /// Stage a new event
    fn add_event(&mut self, event: TargetEvent) -> Result<()>;

    /// Stage an update of a committed event
    fn update_event(&mut self, event: TargetEvent) -> Result<()>;

    /// Write all staged changes atomically
    ///
    /// On error nothing is written and the staged changes are dropped.
    fn commit(&mut self) -> Result<CommitSummary>;

    /// Drop staged changes, returning how many there were
    fn discard(&mut self) -> usize;

    fn find_user_by_name(&self, name: &str) -> Result<Option<UserId>>;

    fn find_group_by_name(&self, name: &str) -> Result<Option<GroupId>>;

    fn category_catalog(&self) -> Result<CategoryCatalog>;
}
