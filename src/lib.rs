//! eventsync - one-way synchronization of Redmine event tickets into an
//! event calendar database
//!
//! Redmine is the source of truth. Each pass fetches the issues of the event
//! trackers updated since the last checkpoint, reconciles them against the
//! events already in the calendar, and commits all creates and updates in a
//! single transaction before the checkpoint advances.
//!
//! # Architecture
//!
//! - **model**: Source issues, target events, identifiers and URLs
//! - **config**: YAML configuration, project-to-group mapping, validation
//! - **integrations**: Redmine adapter behind the `IssueSource` trait, retries
//! - **storage**: `EventStore` trait, SQLite store, checkpoint file
//! - **sync**: Status classifier, field mapper, matcher, reconciler, runner
//! - **templates**: Expansion of recurring event templates

pub mod config;
pub mod error;
pub mod integrations;
pub mod logging;
pub mod model;
pub mod storage;
pub mod sync;
pub mod templates;

// Re-exports
pub use error::{EventSyncError, Result, SyncIssueError};
