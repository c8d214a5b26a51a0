//! Target events in the event store

use super::ids::{CategoryId, EventId, EventUrl, GroupId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Event lifecycle status
///
/// Moves only forward: New -> Confirmed -> Cancelled, or New -> Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    New,
    Confirmed,
    Cancelled,
}

impl EventStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "new",
            EventStatus::Confirmed => "confirmed",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(EventStatus::New),
            "confirmed" => Some(EventStatus::Confirmed),
            "cancelled" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }

    /// Cancelled events are never touched again
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Cancelled)
    }

    /// Whether the status machine allows moving from `self` to `next`
    ///
    /// Staying in the same non-terminal status is allowed (a field refresh).
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (New, New)
                | (New, Confirmed)
                | (New, Cancelled)
                | (Confirmed, Confirmed)
                | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every field the sync owns; recomputed in full on each update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFields {
    pub title: String,
    pub body: String,
    pub startdate: NaiveDate,
    pub enddate: Option<NaiveDate>,
    pub starttime: Option<String>,
    pub endtime: Option<String>,
    pub location: String,
    pub address: Option<String>,
    pub group: GroupId,
    pub status: EventStatus,
    pub owner: UserId,
    pub categories: BTreeSet<CategoryId>,
    pub remarks: String,
    pub timezone: String,
    pub alias: String,
}

/// A row in the event store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEvent {
    /// None until the event has been committed
    pub id: Option<EventId>,
    pub url: EventUrl,
    pub fields: EventFields,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl TargetEvent {
    /// Build a new, uncommitted event
    pub fn create(url: EventUrl, fields: EventFields, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            url,
            fields,
            created: now,
            modified: now,
        }
    }

    /// Overwrite all sync-owned fields, keeping id, url and created
    pub fn apply(&mut self, fields: EventFields, now: DateTime<Utc>) {
        self.fields = fields;
        self.modified = now;
    }

    pub fn status(&self) -> EventStatus {
        self.fields.status
    }

    pub fn owner(&self) -> UserId {
        self.fields.owner
    }
}
