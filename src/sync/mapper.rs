//! Source issue → event fields
//!
//! Pure: no I/O, everything it needs is resolved up front.

use crate::config::SyncSettings;
use crate::error::SyncIssueError;
use crate::model::{
    CategoryId, EventCustomFields, EventFields, EventStatus, GroupId, ProjectId, SourceIssue,
    UserId,
};
use crate::storage::CategoryCatalog;
use std::collections::BTreeSet;
use tracing::debug;

/// Who the sync writes as, resolved once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncIdentity {
    pub owner: UserId,
    pub default_category: CategoryId,
}

/// Result of mapping one issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOutcome {
    Mapped(EventFields),
    /// The issue's project has no group
    Unmapped { project: ProjectId },
}

/// Computes every sync-owned event field from a source issue
#[derive(Debug, Clone)]
pub struct FieldMapper {
    identity: SyncIdentity,
    unknown_location: String,
    remarks: String,
    timezone: String,
    catalog: CategoryCatalog,
}

impl FieldMapper {
    pub fn new(identity: SyncIdentity, settings: &SyncSettings, catalog: CategoryCatalog) -> Self {
        Self {
            identity,
            unknown_location: settings.unknown_location.clone(),
            remarks: settings.remarks.clone(),
            timezone: settings.timezone.clone(),
            catalog,
        }
    }

    pub fn map(
        &self,
        issue: &SourceIssue,
        group: Option<GroupId>,
        status: EventStatus,
    ) -> Result<MapOutcome, SyncIssueError> {
        let Some(group) = group else {
            return Ok(MapOutcome::Unmapped {
                project: issue.project,
            });
        };

        let startdate = issue.start_date.ok_or(SyncIssueError::MissingStartDate)?;
        let custom = EventCustomFields::parse(&issue.custom_fields)?;

        let mut categories = BTreeSet::new();
        for name in &custom.categories {
            match self.catalog.resolve(name) {
                Some(id) => {
                    categories.insert(id);
                }
                None => debug!(issue_id = %issue.id, category = %name, "Unknown category dropped"),
            }
        }
        if categories.is_empty() {
            categories.insert(self.identity.default_category);
        }

        Ok(MapOutcome::Mapped(EventFields {
            title: issue.subject.clone(),
            body: issue.description.clone(),
            startdate,
            enddate: issue.due_date,
            starttime: custom.start_time,
            endtime: custom.end_time,
            location: custom
                .location
                .unwrap_or_else(|| self.unknown_location.clone()),
            address: custom.address,
            group,
            status,
            owner: self.identity.owner,
            categories,
            remarks: self.remarks.clone(),
            timezone: self.timezone.clone(),
            alias: String::new(),
        }))
    }
}
