//! Source issues as delivered by the issue source

use super::ids::{IssueId, ProjectId};
use chrono::{DateTime, NaiveDate, Utc};

/// An `id` + `name` reference (tracker, status, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub id: u64,
    pub name: String,
}

impl NamedRef {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A Redmine project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub identifier: String,
    pub name: String,
}

/// Loosely typed custom field value, as received
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    #[default]
    Empty,
    Text(String),
    List(Vec<String>),
    /// Any other JSON shape, kept as its textual form for error reporting
    Unexpected(String),
}

impl FieldValue {
    /// Short name of the shape, for error messages
    pub fn shape(&self) -> String {
        match self {
            FieldValue::Empty => "empty".to_string(),
            FieldValue::Text(_) => "text".to_string(),
            FieldValue::List(_) => "list".to_string(),
            FieldValue::Unexpected(raw) => format!("unexpected value {}", raw),
        }
    }
}

/// A named custom field on an issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomField {
    pub name: String,
    pub value: FieldValue,
}

impl CustomField {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, FieldValue::Text(value.into()))
    }

    pub fn list<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldValue::List(values.into_iter().map(Into::into).collect()),
        )
    }
}

/// An event ticket from the tracker
///
/// Immutable for the duration of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIssue {
    pub id: IssueId,
    pub tracker: NamedRef,
    /// Status label exactly as the tracker reports it
    pub status: String,
    pub subject: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub project: ProjectId,
    pub custom_fields: Vec<CustomField>,
    pub updated_on: DateTime<Utc>,
}

impl SourceIssue {
    /// Create an issue with the mandatory attributes; the rest via `with_*`
    pub fn new(
        id: impl Into<IssueId>,
        subject: impl Into<String>,
        status: impl Into<String>,
        project: impl Into<ProjectId>,
        updated_on: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            tracker: NamedRef::new(0, ""),
            status: status.into(),
            subject: subject.into(),
            description: String::new(),
            start_date: None,
            due_date: None,
            project: project.into(),
            custom_fields: Vec::new(),
            updated_on,
        }
    }

    pub fn with_tracker(mut self, tracker: NamedRef) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn with_due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn with_custom_field(mut self, field: CustomField) -> Self {
        self.custom_fields.push(field);
        self
    }

    /// Look up a custom field value by name
    pub fn custom_field(&self, name: &str) -> Option<&FieldValue> {
        self.custom_fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }
}
