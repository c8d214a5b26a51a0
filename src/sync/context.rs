//! Per-run resolved settings
//!
//! Everything the passes need from the outside world by name (sync user,
//! default category, trackers, project mappings) is looked up once at
//! startup. Any miss is fatal to the run.

use super::classifier::StatusClassifier;
use super::mapper::SyncIdentity;
use crate::config::{
    EventSyncConfig, MappingFile, ProjectMapping, ScopeConfig, ScopeWindow, SyncSettings,
};
use crate::integrations::{IssueQuery, IssueSource, StatusFilter};
use crate::model::TrackerBase;
use crate::storage::{Checkpoint, DateWindow, EventStore};
use crate::{EventSyncError, Result};
use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use tracing::info;

/// Resolved configuration of a sync run
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub base: TrackerBase,
    pub classifier: StatusClassifier,
    pub identity: SyncIdentity,
    pub settings: SyncSettings,
    pub mapping: ProjectMapping,
    pub scope: ScopeConfig,
    pub tracker_ids: Vec<u64>,
    pub status_filter: StatusFilter,
}

impl SyncContext {
    /// Resolve configuration names against the issue source and the store
    pub async fn resolve(
        config: &EventSyncConfig,
        mappings: &MappingFile,
        source: &dyn IssueSource,
        store: &dyn EventStore,
    ) -> Result<Self> {
        let base = TrackerBase::parse(&config.redmine.url)?;

        let owner = store
            .find_user_by_name(&config.sync.user)?
            .ok_or_else(|| EventSyncError::UnknownUser(config.sync.user.clone()))?;

        let default_category = store
            .category_catalog()?
            .resolve(&config.sync.default_category)
            .ok_or_else(|| EventSyncError::UnknownCategory(config.sync.default_category.clone()))?;

        let mut tracker_ids = Vec::with_capacity(config.redmine.trackers.len());
        for name in &config.redmine.trackers {
            let tracker = source
                .find_tracker_by_name(name)
                .await?
                .ok_or_else(|| EventSyncError::UnknownTracker(name.clone()))?;
            tracker_ids.push(tracker.id);
        }

        let mapping = mappings.resolve(source, store).await?;

        info!(
            user = %config.sync.user,
            trackers = tracker_ids.len(),
            projects = mapping.len(),
            "Resolved sync context"
        );

        Ok(Self {
            base,
            classifier: StatusClassifier::new(&config.statuses),
            identity: SyncIdentity {
                owner,
                default_category,
            },
            settings: config.sync.clone(),
            mapping,
            scope: config.scope.clone(),
            tracker_ids,
            status_filter: if config.redmine.include_closed {
                StatusFilter::All
            } else {
                StatusFilter::Open
            },
        })
    }

    /// The fetch for the window `(checkpoint, now)`
    pub fn issue_query(&self, checkpoint: &Checkpoint, now: DateTime<Utc>) -> IssueQuery {
        IssueQuery::new(self.tracker_ids.clone())
            .with_status(self.status_filter)
            .updated_between(Some(checkpoint.last_updated), Some(now))
    }

    /// Start-date window of events considered for update
    pub fn window_for(&self, checkpoint: &Checkpoint) -> DateWindow {
        match self.scope.window {
            ScopeWindow::All => DateWindow::all(),
            ScopeWindow::FromCheckpointDay => DateWindow::starting(
                checkpoint.last_updated.with_timezone(&Local).date_naive(),
            ),
        }
    }

    /// Cancelled events starting before this date drop out of scope
    ///
    /// None when no retention is configured, or when it reaches past the
    /// earliest representable date.
    pub fn cancelled_since(&self, now: DateTime<Utc>) -> Option<NaiveDate> {
        self.scope
            .cancelled_retention_days
            .and_then(|days| now.date_naive().checked_sub_days(Days::new(u64::from(days))))
    }
}
