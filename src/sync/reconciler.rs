//! Reconciliation of a fetch batch against known events
//!
//! The reconciler decides; it never writes. Every pairing of an in-scope
//! event with a batch issue, and every batch issue left over, yields exactly
//! one [`Decision`]. The staged events come back in a [`ReconcilePlan`].
//!
//! 1. **Known events**: each in-scope event whose URL is in the batch is
//!    skipped (cancelled, or unchanged since the checkpoint) or refreshed from
//!    its issue. An event modified after the checkpoint was edited by hand;
//!    that is warned about and overwritten.
//! 2. **Unknown URLs**: the rest of the batch is created, unless the URL
//!    already exists outside the scope, the issue is not confirmed yet, or its
//!    project has no group.

use super::classifier::StatusClassifier;
use super::mapper::{FieldMapper, MapOutcome};
use super::matcher::IssueIndex;
use crate::config::ProjectMapping;
use crate::error::SyncIssueError;
use crate::model::{EventUrl, IssueId, ProjectId, SourceIssue, TargetEvent};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error, info, warn};

/// What happened to one issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// The event is cancelled and never touched again
    SkippedTerminal,
    /// The issue has not changed since the checkpoint
    SkippedUnchanged,
    Updated,
    /// Updated, overwriting a manual edit
    WarnedButUpdated,
    /// Known event whose project lost its group; left untouched
    SkippedUnmapped { project: ProjectId },
    Created,
    /// New issue whose project has no group; dropped
    RejectedUnmapped { project: ProjectId },
    /// New issue still in the "new" status
    SkippedNotConfirmed,
    /// The URL exists in the store outside the update scope
    SkippedOutOfScope,
    Failed(SyncIssueError),
}

impl SyncAction {
    /// Short name for structured logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::SkippedTerminal => "skipped_terminal",
            SyncAction::SkippedUnchanged => "skipped_unchanged",
            SyncAction::Updated => "updated",
            SyncAction::WarnedButUpdated => "warned_but_updated",
            SyncAction::SkippedUnmapped { .. } => "skipped_unmapped",
            SyncAction::Created => "created",
            SyncAction::RejectedUnmapped { .. } => "rejected_unmapped",
            SyncAction::SkippedNotConfirmed => "skipped_not_confirmed",
            SyncAction::SkippedOutOfScope => "skipped_out_of_scope",
            SyncAction::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decision, for reporting; never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub issue_id: IssueId,
    pub url: EventUrl,
    pub action: SyncAction,
}

/// Counters of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub issues: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Events found modified after the checkpoint
    pub warned: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl SyncStats {
    fn record(&mut self, action: &SyncAction) {
        match action {
            SyncAction::Created => self.created += 1,
            SyncAction::Updated | SyncAction::WarnedButUpdated => self.updated += 1,
            SyncAction::SkippedTerminal
            | SyncAction::SkippedUnchanged
            | SyncAction::SkippedNotConfirmed
            | SyncAction::SkippedOutOfScope => self.skipped += 1,
            SyncAction::SkippedUnmapped { .. } | SyncAction::RejectedUnmapped { .. } => {
                self.rejected += 1
            }
            SyncAction::Failed(_) => self.failed += 1,
        }
    }
}

/// Output of [`Reconciler::reconcile`]
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// New events to stage
    pub creates: Vec<TargetEvent>,
    /// Refreshed events to stage
    pub updates: Vec<TargetEvent>,
    pub decisions: Vec<Decision>,
    pub stats: SyncStats,
}

impl ReconcilePlan {
    fn decide(&mut self, issue_id: IssueId, url: EventUrl, action: SyncAction) {
        log_decision(issue_id, &url, &action);
        self.stats.record(&action);
        self.decisions.push(Decision {
            issue_id,
            url,
            action,
        });
    }

    pub fn has_writes(&self) -> bool {
        !self.creates.is_empty() || !self.updates.is_empty()
    }
}

/// Decides create / update / skip for one batch
pub struct Reconciler<'a> {
    classifier: &'a StatusClassifier,
    mapper: &'a FieldMapper,
    mapping: &'a ProjectMapping,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        classifier: &'a StatusClassifier,
        mapper: &'a FieldMapper,
        mapping: &'a ProjectMapping,
    ) -> Self {
        Self {
            classifier,
            mapper,
            mapping,
        }
    }

    /// Reconcile `pending` against the in-scope events
    ///
    /// `known_urls` are the batch URLs present anywhere in the store. `now` is
    /// the pass timestamp written to `created`/`modified`.
    pub fn reconcile(
        &self,
        mut pending: IssueIndex,
        in_scope: Vec<TargetEvent>,
        known_urls: &HashSet<EventUrl>,
        last_checkpoint: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ReconcilePlan {
        let mut plan = ReconcilePlan {
            stats: SyncStats {
                issues: pending.len(),
                ..SyncStats::default()
            },
            ..ReconcilePlan::default()
        };

        for event in in_scope {
            let Some(issue) = pending.remove(&event.url) else {
                continue;
            };
            let url = event.url.clone();

            if event.status().is_terminal() {
                plan.decide(issue.id, url, SyncAction::SkippedTerminal);
                continue;
            }

            let edited = event.modified > last_checkpoint;
            if edited {
                plan.stats.warned += 1;
                warn!(
                    issue_id = %issue.id,
                    url = %url,
                    title = %event.fields.title,
                    modified = %event.modified,
                    checkpoint = %last_checkpoint,
                    "Event mutated outside sync window"
                );
            }

            if issue.updated_on <= last_checkpoint {
                plan.decide(issue.id, url, SyncAction::SkippedUnchanged);
                continue;
            }

            let action = match self.refresh(&issue, event, now) {
                Ok(Refresh::Applied(updated)) => {
                    plan.updates.push(updated);
                    if edited {
                        SyncAction::WarnedButUpdated
                    } else {
                        SyncAction::Updated
                    }
                }
                Ok(Refresh::Unmapped(project)) => SyncAction::SkippedUnmapped { project },
                Err(e) => SyncAction::Failed(e),
            };
            plan.decide(issue.id, url, action);
        }

        for (url, issue) in pending {
            if known_urls.contains(&url) {
                plan.decide(issue.id, url, SyncAction::SkippedOutOfScope);
                continue;
            }

            let action = match self.create(&issue, &url, now) {
                Ok(Create::Staged(event)) => {
                    plan.creates.push(event);
                    SyncAction::Created
                }
                Ok(Create::NotConfirmed) => SyncAction::SkippedNotConfirmed,
                Ok(Create::Unmapped(project)) => SyncAction::RejectedUnmapped { project },
                Err(e) => SyncAction::Failed(e),
            };
            plan.decide(issue.id, url, action);
        }

        plan
    }

    fn refresh(
        &self,
        issue: &SourceIssue,
        mut event: TargetEvent,
        now: DateTime<Utc>,
    ) -> Result<Refresh, SyncIssueError> {
        let status = self.classifier.classify(&issue.status)?;
        if !event.status().can_transition_to(status) {
            return Err(SyncIssueError::ForbiddenTransition {
                from: event.status(),
                to: status,
            });
        }

        match self
            .mapper
            .map(issue, self.mapping.group_for(issue.project), status)?
        {
            MapOutcome::Mapped(fields) => {
                event.apply(fields, now);
                Ok(Refresh::Applied(event))
            }
            MapOutcome::Unmapped { project } => Ok(Refresh::Unmapped(project)),
        }
    }

    fn create(
        &self,
        issue: &SourceIssue,
        url: &EventUrl,
        now: DateTime<Utc>,
    ) -> Result<Create, SyncIssueError> {
        let status = self.classifier.classify(&issue.status)?;
        if status == crate::model::EventStatus::New {
            return Ok(Create::NotConfirmed);
        }

        match self
            .mapper
            .map(issue, self.mapping.group_for(issue.project), status)?
        {
            MapOutcome::Mapped(fields) => Ok(Create::Staged(TargetEvent::create(
                url.clone(),
                fields,
                now,
            ))),
            MapOutcome::Unmapped { project } => Ok(Create::Unmapped(project)),
        }
    }
}

enum Refresh {
    Applied(TargetEvent),
    Unmapped(ProjectId),
}

enum Create {
    Staged(TargetEvent),
    NotConfirmed,
    Unmapped(ProjectId),
}

/// One log line per decision, always keyed by the issue id
fn log_decision(issue_id: IssueId, url: &EventUrl, action: &SyncAction) {
    let name = action.as_str();
    match action {
        SyncAction::Created | SyncAction::Updated | SyncAction::WarnedButUpdated => {
            info!(issue_id = %issue_id, url = %url, action = name, "Event synchronized")
        }
        SyncAction::RejectedUnmapped { project } | SyncAction::SkippedUnmapped { project } => {
            warn!(
                issue_id = %issue_id,
                url = %url,
                action = name,
                project = %project,
                "No event group mapped for project"
            )
        }
        SyncAction::Failed(e) => {
            error!(issue_id = %issue_id, url = %url, action = name, error = %e, "Issue skipped")
        }
        _ => debug!(issue_id = %issue_id, url = %url, action = name, "Issue skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::model::{
        CategoryId, EventFields, EventId, EventStatus, GroupId, TrackerBase, UserId,
    };
    use crate::storage::CategoryCatalog;
    use crate::sync::mapper::SyncIdentity;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::BTreeSet;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// In-memory log sink for a thread-local subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .finish();
            tracing::subscriber::with_default(subscriber, f)
        }

        fn lines_containing(&self, needle: &str) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .filter(|l| l.contains(needle))
                .map(str::to_string)
                .collect()
        }
    }

    const OWNER: UserId = UserId(5);

    struct Fixture {
        classifier: StatusClassifier,
        mapper: FieldMapper,
        mapping: ProjectMapping,
        base: TrackerBase,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog: CategoryCatalog = [("Schmarnn", CategoryId(1))].into_iter().collect();
            Self {
                classifier: StatusClassifier::default(),
                mapper: FieldMapper::new(
                    SyncIdentity {
                        owner: OWNER,
                        default_category: CategoryId(1),
                    },
                    &SyncSettings::default(),
                    catalog,
                ),
                mapping: [(ProjectId(7), GroupId(3))].into_iter().collect(),
                base: TrackerBase::parse("https://redmine.example.org").unwrap(),
            }
        }

        fn reconcile(
            &self,
            issues: Vec<SourceIssue>,
            in_scope: Vec<TargetEvent>,
            known: &[&TargetEvent],
        ) -> ReconcilePlan {
            let index = IssueIndex::build(&self.base, issues).unwrap();
            let mut known_urls: HashSet<EventUrl> = known.iter().map(|e| e.url.clone()).collect();
            known_urls.extend(in_scope.iter().map(|e| e.url.clone()));
            Reconciler::new(&self.classifier, &self.mapper, &self.mapping).reconcile(
                index,
                in_scope,
                &known_urls,
                checkpoint(),
                now(),
            )
        }

        fn event(&self, id: u64, status: EventStatus, modified: DateTime<Utc>) -> TargetEvent {
            let mut event = TargetEvent::create(
                self.base.issue_url(IssueId(id)),
                EventFields {
                    title: "Alt".to_string(),
                    body: String::new(),
                    startdate: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                    enddate: None,
                    starttime: None,
                    endtime: None,
                    location: "Keller".to_string(),
                    address: None,
                    group: GroupId(3),
                    status,
                    owner: OWNER,
                    categories: BTreeSet::from([CategoryId(1)]),
                    remarks: String::new(),
                    timezone: "Europe/Berlin".to_string(),
                    alias: String::new(),
                },
                modified,
            );
            event.id = Some(EventId(id as i64));
            event
        }
    }

    fn checkpoint() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap()
    }

    fn before() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 4, 12, 0, 0).unwrap()
    }

    fn after() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 18, 0, 0).unwrap()
    }

    fn issue(id: u64, status: &str, project: u64, updated_on: DateTime<Utc>) -> SourceIssue {
        SourceIssue::new(id, "Konzert", status, project, updated_on)
            .with_start_date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
    }

    fn actions(plan: &ReconcilePlan) -> Vec<SyncAction> {
        plan.decisions.iter().map(|d| d.action.clone()).collect()
    }

    #[test]
    fn test_creates_confirmed_issue() {
        let fx = Fixture::new();
        let plan = fx.reconcile(vec![issue(42, "Bestätigt", 7, after())], vec![], &[]);

        assert_eq!(actions(&plan), vec![SyncAction::Created]);
        assert_eq!(plan.creates.len(), 1);
        let event = &plan.creates[0];
        assert_eq!(event.url.as_str(), "https://redmine.example.org/issues/42");
        assert_eq!(event.status(), EventStatus::Confirmed);
        assert_eq!(event.fields.group, GroupId(3));
        assert_eq!(event.fields.location, "unbekannt");
        assert_eq!(event.fields.categories, BTreeSet::from([CategoryId(1)]));
        assert_eq!(event.created, now());
        assert_eq!(plan.stats.created, 1);
    }

    #[test]
    fn test_creates_cancelled_issue_as_cancelled() {
        let fx = Fixture::new();
        let plan = fx.reconcile(vec![issue(42, "Abgesagt", 7, after())], vec![], &[]);
        assert_eq!(plan.creates[0].status(), EventStatus::Cancelled);
    }

    #[test]
    fn test_new_issue_is_not_created() {
        let fx = Fixture::new();
        let plan = fx.reconcile(vec![issue(42, "Neu", 7, after())], vec![], &[]);
        assert_eq!(actions(&plan), vec![SyncAction::SkippedNotConfirmed]);
        assert!(!plan.has_writes());
    }

    #[test]
    fn test_unmapped_project_is_rejected_once() {
        let fx = Fixture::new();
        let plan = fx.reconcile(vec![issue(42, "Bestätigt", 8, after())], vec![], &[]);

        assert_eq!(
            actions(&plan),
            vec![SyncAction::RejectedUnmapped {
                project: ProjectId(8)
            }]
        );
        assert!(plan.creates.is_empty());
        assert_eq!(plan.stats.rejected, 1);
    }

    #[test]
    fn test_unmapped_project_logs_one_warning() {
        let fx = Fixture::new();
        let logs = CapturedLogs::default();

        let plan = logs.capture(|| {
            fx.reconcile(
                vec![
                    issue(42, "Bestätigt", 8, after()),
                    issue(43, "Bestätigt", 7, after()),
                ],
                vec![],
                &[],
            )
        });

        assert_eq!(plan.stats.rejected, 1);
        assert_eq!(plan.stats.created, 1);

        let rejections = logs.lines_containing("No event group mapped for project");
        assert_eq!(rejections.len(), 1);
        assert!(rejections[0].contains("WARN"));
        assert!(rejections[0].contains("issue_id=42"));
        assert!(rejections[0].contains("rejected_unmapped"));
    }

    #[test]
    fn test_unchanged_issue_is_skipped() {
        let fx = Fixture::new();
        let event = fx.event(42, EventStatus::Confirmed, before());
        let plan = fx.reconcile(vec![issue(42, "Bestätigt", 7, before())], vec![event], &[]);

        assert_eq!(actions(&plan), vec![SyncAction::SkippedUnchanged]);
        assert!(!plan.has_writes());
    }

    #[test]
    fn test_changed_issue_updates_event() {
        let fx = Fixture::new();
        let event = fx.event(42, EventStatus::Confirmed, before());
        let plan = fx.reconcile(vec![issue(42, "Abgesagt", 7, after())], vec![event], &[]);

        assert_eq!(actions(&plan), vec![SyncAction::Updated]);
        let updated = &plan.updates[0];
        assert_eq!(updated.id, Some(EventId(42)));
        assert_eq!(updated.status(), EventStatus::Cancelled);
        assert_eq!(updated.fields.title, "Konzert");
        assert_eq!(updated.fields.location, "unbekannt");
        assert_eq!(updated.created, before());
        assert_eq!(updated.modified, now());
    }

    #[test]
    fn test_manual_edit_is_warned_and_overwritten() {
        let fx = Fixture::new();
        let event = fx.event(42, EventStatus::Confirmed, after());
        let plan = fx.reconcile(vec![issue(42, "Bestätigt", 7, after())], vec![event], &[]);

        assert_eq!(actions(&plan), vec![SyncAction::WarnedButUpdated]);
        assert_eq!(plan.stats.warned, 1);
        assert_eq!(plan.stats.updated, 1);
    }

    #[test]
    fn test_manual_edit_without_issue_change_is_only_warned() {
        let fx = Fixture::new();
        let event = fx.event(42, EventStatus::Confirmed, after());
        let plan = fx.reconcile(vec![issue(42, "Bestätigt", 7, before())], vec![event], &[]);

        assert_eq!(actions(&plan), vec![SyncAction::SkippedUnchanged]);
        assert_eq!(plan.stats.warned, 1);
    }

    #[test]
    fn test_cancelled_event_is_terminal() {
        let fx = Fixture::new();
        let event = fx.event(42, EventStatus::Cancelled, before());
        let plan = fx.reconcile(vec![issue(42, "Bestätigt", 7, after())], vec![event], &[]);

        assert_eq!(actions(&plan), vec![SyncAction::SkippedTerminal]);
        assert!(!plan.has_writes());
    }

    #[test]
    fn test_backwards_transition_fails_issue() {
        let fx = Fixture::new();
        let event = fx.event(42, EventStatus::Confirmed, before());
        let plan = fx.reconcile(
            vec![issue(42, "Neu", 7, after()), issue(43, "Bestätigt", 7, after())],
            vec![event],
            &[],
        );

        assert_eq!(plan.stats.failed, 1);
        assert_eq!(plan.stats.created, 1);
        assert!(plan.decisions.contains(&Decision {
            issue_id: IssueId(42),
            url: fx.base.issue_url(IssueId(42)),
            action: SyncAction::Failed(SyncIssueError::ForbiddenTransition {
                from: EventStatus::Confirmed,
                to: EventStatus::New,
            }),
        }));
    }

    #[test]
    fn test_unknown_status_fails_only_that_issue() {
        let fx = Fixture::new();
        let plan = fx.reconcile(
            vec![
                issue(42, "In Klärung", 7, after()),
                issue(43, "Bestätigt", 7, after()),
            ],
            vec![],
            &[],
        );

        assert_eq!(
            actions(&plan),
            vec![
                SyncAction::Failed(SyncIssueError::UnknownStatus("In Klärung".to_string())),
                SyncAction::Created,
            ]
        );
    }

    #[test]
    fn test_out_of_scope_url_is_not_recreated() {
        let fx = Fixture::new();
        let mut foreign = fx.event(42, EventStatus::Confirmed, before());
        foreign.fields.owner = UserId(99);
        let plan = fx.reconcile(vec![issue(42, "Bestätigt", 7, after())], vec![], &[&foreign]);

        assert_eq!(actions(&plan), vec![SyncAction::SkippedOutOfScope]);
        assert!(plan.creates.is_empty());
    }

    #[test]
    fn test_unmapped_project_on_update_leaves_event() {
        let fx = Fixture::new();
        let event = fx.event(42, EventStatus::Confirmed, before());
        let plan = fx.reconcile(vec![issue(42, "Bestätigt", 8, after())], vec![event], &[]);

        assert_eq!(
            actions(&plan),
            vec![SyncAction::SkippedUnmapped {
                project: ProjectId(8)
            }]
        );
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn test_in_scope_event_outside_batch_is_ignored() {
        let fx = Fixture::new();
        let event = fx.event(99, EventStatus::Confirmed, before());
        let plan = fx.reconcile(vec![issue(42, "Bestätigt", 7, after())], vec![event], &[]);

        assert_eq!(plan.decisions.len(), 1);
        assert_eq!(plan.decisions[0].issue_id, IssueId(42));
    }
}
