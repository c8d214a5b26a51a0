//! Recurring event templates
//!
//! A template issue (tracker "Terminvorlage") describes a series of events:
//! its start and due date bound the series, `Wiederholungsart` and
//! `Intervall` define the rhythm, and `Terminart` names the tracker the
//! generated issues go to. Expansion yields one [`NewIssue`] draft per
//! occurrence; subject and description may reference `$datum` and the
//! template's custom fields.

mod recurrence;
mod render;

pub use recurrence::Recurrence;
pub use render::render;

use redmine::{CustomValue, IdName, Issue, NewCustomField, NewIssue};
use std::collections::HashMap;
use thiserror::Error;

pub const FIELD_RECURRENCE: &str = "Wiederholungsart";
pub const FIELD_INTERVAL: &str = "Intervall";
pub const FIELD_EVENT_KIND: &str = "Terminart";

/// Placeholder bound to the occurrence date
pub const DATE_PLACEHOLDER: &str = "datum";

/// Occurrence dates are rendered as e.g. `10.01.2024`
const READABLE_DATE_FORMAT: &str = "%d.%m.%Y";

/// Template expansion errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template has no '{0}' field")]
    MissingField(&'static str),

    #[error("template has no start date")]
    MissingStartDate,

    #[error("template has no due date (series would be unbounded)")]
    MissingDueDate,

    #[error("unknown recurrence '{0}'")]
    UnknownRecurrence(String),

    #[error("invalid interval '{0}', expected a positive integer")]
    InvalidInterval(String),

    #[error("unknown event kind '{0}'")]
    UnknownEventKind(String),

    #[error("placeholder '${0}' has no value")]
    MissingPlaceholder(String),

    #[error("invalid placeholder at offset {0}")]
    InvalidPlaceholder(usize),
}

/// Target trackers a template's `Terminart` can select
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTrackers {
    pub internal: IdName,
    pub external: IdName,
}

impl TemplateTrackers {
    fn select(&self, kind: &str) -> Result<u64, TemplateError> {
        let kind = kind.trim();
        if kind == self.internal.name {
            Ok(self.internal.id)
        } else if kind == self.external.name {
            Ok(self.external.id)
        } else {
            Err(TemplateError::UnknownEventKind(kind.to_string()))
        }
    }
}

/// Expand a template issue into one draft per occurrence
pub fn expand_template(
    template: &Issue,
    trackers: &TemplateTrackers,
) -> Result<Vec<NewIssue>, TemplateError> {
    let start = template.start_date.ok_or(TemplateError::MissingStartDate)?;
    let end = template.due_date.ok_or(TemplateError::MissingDueDate)?;

    let kind = text_field(template, FIELD_RECURRENCE)?;
    let interval = template
        .custom_field(FIELD_INTERVAL)
        .map(|f| f.value.to_text());
    let recurrence = Recurrence::parse(&kind, interval.as_deref())?;

    let tracker_id = trackers.select(&text_field(template, FIELD_EVENT_KIND)?)?;

    let kept: Vec<_> = template
        .custom_fields
        .iter()
        .filter(|f| {
            let name = f.name.to_lowercase();
            name != FIELD_RECURRENCE.to_lowercase()
                && name != FIELD_INTERVAL.to_lowercase()
                && name != FIELD_EVENT_KIND.to_lowercase()
        })
        .collect();

    let mut values: HashMap<String, String> = kept
        .iter()
        .map(|f| (f.name.clone(), f.value.to_text()))
        .collect();

    let description = template.description.clone().unwrap_or_default();

    let mut drafts = Vec::new();
    for date in recurrence.occurrences(start, end) {
        values.insert(
            DATE_PLACEHOLDER.to_string(),
            date.format(READABLE_DATE_FORMAT).to_string(),
        );

        drafts.push(NewIssue {
            project_id: template.project.id,
            tracker_id,
            subject: render(&template.subject, &values)?,
            description: Some(render(&description, &values)?),
            start_date: Some(date),
            due_date: Some(date),
            custom_fields: kept
                .iter()
                .map(|f| NewCustomField {
                    id: f.id,
                    value: f.value.clone(),
                })
                .collect(),
        });
    }

    tracing::debug!(
        template_id = template.id,
        recurrence = ?recurrence,
        drafts = drafts.len(),
        "Expanded template"
    );

    Ok(drafts)
}

fn text_field(issue: &Issue, name: &'static str) -> Result<String, TemplateError> {
    match issue.custom_field(name).map(|f| &f.value) {
        Some(CustomValue::Text(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(TemplateError::MissingField(name)),
    }
}
