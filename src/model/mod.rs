//! Core data model
//!
//! - **SourceIssue**: an event ticket as fetched from Redmine (read-only)
//! - **TargetEvent**: the mirrored row in the event store
//! - **EventCustomFields**: the recognized custom fields, parsed strictly
//! - Type-safe ids and the URL correlation key

mod custom_fields;
mod ids;
mod source_issue;
mod target_event;

pub use custom_fields::{
    EventCustomFields, FIELD_ADDRESS, FIELD_CATEGORIES, FIELD_END_TIME, FIELD_LOCATION,
    FIELD_START_TIME,
};
pub use ids::{CategoryId, EventId, EventUrl, GroupId, IssueId, ProjectId, TrackerBase, UserId};
pub use source_issue::{CustomField, FieldValue, NamedRef, Project, SourceIssue};
pub use target_event::{EventFields, EventStatus, TargetEvent};
