//! Explicit schema for the custom fields the field mapper understands
//!
//! The tracker delivers custom fields as loosely typed name/value pairs. This
//! module turns them into a fixed record and rejects unexpected shapes, so
//! the mapper never deals with the wire representation.

use super::source_issue::{CustomField, FieldValue};
use crate::error::SyncIssueError;

pub const FIELD_START_TIME: &str = "Startzeit";
pub const FIELD_END_TIME: &str = "Ende";
pub const FIELD_LOCATION: &str = "Veranstaltungsort";
pub const FIELD_ADDRESS: &str = "Adresse";
pub const FIELD_CATEGORIES: &str = "Kategorien";

/// The recognized event custom fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCustomFields {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    /// Category names in tracker order, not yet resolved
    pub categories: Vec<String>,
}

impl EventCustomFields {
    /// Parse the recognized fields; unknown field names are ignored
    pub fn parse(fields: &[CustomField]) -> Result<Self, SyncIssueError> {
        let mut parsed = Self::default();

        for field in fields {
            match field.name.as_str() {
                FIELD_START_TIME => parsed.start_time = scalar(FIELD_START_TIME, &field.value)?,
                FIELD_END_TIME => parsed.end_time = scalar(FIELD_END_TIME, &field.value)?,
                FIELD_LOCATION => parsed.location = scalar(FIELD_LOCATION, &field.value)?,
                FIELD_ADDRESS => parsed.address = scalar(FIELD_ADDRESS, &field.value)?,
                FIELD_CATEGORIES => parsed.categories = list(FIELD_CATEGORIES, &field.value)?,
                _ => {}
            }
        }

        Ok(parsed)
    }
}

/// Blank text counts as absent
fn scalar(field: &'static str, value: &FieldValue) -> Result<Option<String>, SyncIssueError> {
    match value {
        FieldValue::Empty => Ok(None),
        FieldValue::Text(s) if s.trim().is_empty() => Ok(None),
        FieldValue::Text(s) => Ok(Some(s.trim().to_string())),
        other => Err(SyncIssueError::CustomFieldShape {
            field,
            expected: "text",
            found: other.shape(),
        }),
    }
}

fn list(field: &'static str, value: &FieldValue) -> Result<Vec<String>, SyncIssueError> {
    match value {
        FieldValue::Empty => Ok(Vec::new()),
        FieldValue::List(items) => Ok(items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()),
        other => Err(SyncIssueError::CustomFieldShape {
            field,
            expected: "list",
            found: other.shape(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_fields() {
        let fields = vec![
            CustomField::text(FIELD_START_TIME, "19:30"),
            CustomField::text(FIELD_END_TIME, "23:00"),
            CustomField::text(FIELD_LOCATION, "Keller"),
            CustomField::text(FIELD_ADDRESS, "Hauptstr. 1"),
            CustomField::list(FIELD_CATEGORIES, ["Konzert", "Jazz"]),
            CustomField::text("Terminart", "Termin"),
        ];

        let parsed = EventCustomFields::parse(&fields).unwrap();
        assert_eq!(parsed.start_time.as_deref(), Some("19:30"));
        assert_eq!(parsed.end_time.as_deref(), Some("23:00"));
        assert_eq!(parsed.location.as_deref(), Some("Keller"));
        assert_eq!(parsed.address.as_deref(), Some("Hauptstr. 1"));
        assert_eq!(parsed.categories, vec!["Konzert", "Jazz"]);
    }

    #[test]
    fn test_absent_and_blank_fields() {
        let fields = vec![
            CustomField::new(FIELD_START_TIME, FieldValue::Empty),
            CustomField::text(FIELD_LOCATION, "   "),
            CustomField::new(FIELD_CATEGORIES, FieldValue::Empty),
        ];

        let parsed = EventCustomFields::parse(&fields).unwrap();
        assert_eq!(parsed, EventCustomFields::default());
    }

    #[test]
    fn test_list_for_scalar_field_is_rejected() {
        let fields = vec![CustomField::list(FIELD_LOCATION, ["a", "b"])];
        let err = EventCustomFields::parse(&fields).unwrap_err();
        assert_eq!(
            err,
            SyncIssueError::CustomFieldShape {
                field: FIELD_LOCATION,
                expected: "text",
                found: "list".to_string(),
            }
        );
    }

    #[test]
    fn test_text_for_categories_is_rejected() {
        let fields = vec![CustomField::text(FIELD_CATEGORIES, "Konzert")];
        assert!(matches!(
            EventCustomFields::parse(&fields),
            Err(SyncIssueError::CustomFieldShape {
                field: FIELD_CATEGORIES,
                ..
            })
        ));
    }

    #[test]
    fn test_unexpected_value_is_rejected() {
        let fields = vec![CustomField::new(
            FIELD_START_TIME,
            FieldValue::Unexpected("{\"h\":19}".to_string()),
        )];
        let err = EventCustomFields::parse(&fields).unwrap_err();
        assert!(err.to_string().contains("Startzeit"));
    }
}
