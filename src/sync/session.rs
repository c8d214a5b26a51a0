//! One reconciliation pass against the event store

use super::context::SyncContext;
use super::mapper::FieldMapper;
use super::matcher::IssueIndex;
use super::reconciler::{Decision, Reconciler, SyncStats};
use crate::model::EventStatus;
use crate::storage::{Checkpoint, CommitSummary, DateWindow, EventFilter, EventStore};
use crate::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Outcome of a pass
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// The new checkpoint; None on dry runs
    pub checkpoint: Option<Checkpoint>,
    pub stats: SyncStats,
    pub decisions: Vec<Decision>,
    pub commit: CommitSummary,
    /// Staged writes dropped by a dry run
    pub discarded: usize,
}

/// Applies a batch to the store and commits once
pub struct SyncSession<'a> {
    context: &'a SyncContext,
    dry_run: bool,
}

impl<'a> SyncSession<'a> {
    pub fn new(context: &'a SyncContext) -> Self {
        Self {
            context,
            dry_run: false,
        }
    }

    /// Decide and stage, but discard instead of committing
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run a pass stamped with the current time
    pub fn run<S: EventStore + ?Sized>(
        &self,
        store: &mut S,
        index: IssueIndex,
        last_checkpoint: DateTime<Utc>,
        window: DateWindow,
    ) -> Result<SyncReport> {
        self.run_at(store, index, last_checkpoint, window, Utc::now())
    }

    /// Run a pass stamped with `now`, which becomes the new checkpoint
    ///
    /// `now` must not be later than the instant the batch was fetched.
    pub fn run_at<S: EventStore + ?Sized>(
        &self,
        store: &mut S,
        index: IssueIndex,
        last_checkpoint: DateTime<Utc>,
        window: DateWindow,
        now: DateTime<Utc>,
    ) -> Result<SyncReport> {
        let ctx = self.context;
        let urls = index.urls();

        let filter = EventFilter::new()
            .with_urls(urls.clone())
            .with_owner(ctx.identity.owner)
            .with_statuses([EventStatus::Confirmed, EventStatus::Cancelled])
            .with_window(window)
            .with_cancelled_since(ctx.cancelled_since(now));

        let in_scope = store.query_events(&filter)?;
        let known_urls = store.existing_urls(&urls)?;
        let mapper = FieldMapper::new(ctx.identity, &ctx.settings, store.category_catalog()?);

        info!(
            issues = index.len(),
            in_scope = in_scope.len(),
            known = known_urls.len(),
            "Reconciling batch"
        );

        let plan = Reconciler::new(&ctx.classifier, &mapper, &ctx.mapping).reconcile(
            index,
            in_scope,
            &known_urls,
            last_checkpoint,
            now,
        );

        let has_writes = plan.has_writes();
        if let Err(e) = stage(store, plan.creates, plan.updates) {
            store.discard();
            return Err(e);
        }

        let (checkpoint, commit, discarded) = if self.dry_run {
            let discarded = store.discard();
            info!(discarded, "Dry run, nothing committed");
            (None, CommitSummary::default(), discarded)
        } else {
            let commit = if has_writes {
                store.commit()?
            } else {
                debug!("Nothing to commit");
                CommitSummary::default()
            };
            (Some(Checkpoint::new(now)), commit, 0)
        };

        Ok(SyncReport {
            checkpoint,
            stats: plan.stats,
            decisions: plan.decisions,
            commit,
            discarded,
        })
    }
}

fn stage<S: EventStore + ?Sized>(
    store: &mut S,
    creates: Vec<crate::model::TargetEvent>,
    updates: Vec<crate::model::TargetEvent>,
) -> Result<()> {
    for event in creates {
        store.add_event(event)?;
    }
    for event in updates {
        store.update_event(event)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProjectMapping, ScopeConfig, SyncSettings};
    use crate::integrations::StatusFilter;
    use crate::model::{GroupId, IssueId, ProjectId, SourceIssue, TrackerBase};
    use crate::storage::SqliteEventStore;
    use crate::sync::classifier::StatusClassifier;
    use crate::sync::mapper::SyncIdentity;
    use chrono::{NaiveDate, TimeZone};

    fn setup() -> (SqliteEventStore, SyncContext) {
        let store = SqliteEventStore::open_in_memory().unwrap();
        let owner = store.insert_user("redmine").unwrap();
        let group = store.insert_group("Kulturgruppe").unwrap();
        let category = store.insert_category("Schmarnn").unwrap();

        let context = SyncContext {
            base: TrackerBase::parse("https://redmine.example.org").unwrap(),
            classifier: StatusClassifier::default(),
            identity: SyncIdentity {
                owner,
                default_category: category,
            },
            settings: SyncSettings::default(),
            mapping: [(ProjectId(7), group)].into_iter().collect::<ProjectMapping>(),
            scope: ScopeConfig::default(),
            tracker_ids: vec![1],
            status_filter: StatusFilter::All,
        };
        (store, context)
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    fn batch(ctx: &SyncContext, issues: Vec<SourceIssue>) -> IssueIndex {
        IssueIndex::build(&ctx.base, issues).unwrap()
    }

    fn confirmed(id: u64, updated_on: DateTime<Utc>) -> SourceIssue {
        SourceIssue::new(id, "Konzert", "Bestätigt", 7u64, updated_on)
            .with_start_date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
    }

    #[test]
    fn test_commits_and_returns_now_as_checkpoint() {
        let (mut store, ctx) = setup();
        let report = SyncSession::new(&ctx)
            .run_at(
                &mut store,
                batch(&ctx, vec![confirmed(42, ts(2))]),
                ts(1),
                DateWindow::all(),
                ts(3),
            )
            .unwrap();

        assert_eq!(report.checkpoint, Some(Checkpoint::new(ts(3))));
        assert_eq!(report.commit.inserted, 1);
        assert_eq!(store.count_events().unwrap(), 1);
        let event = store
            .get_event_by_url(&ctx.base.issue_url(IssueId(42)))
            .unwrap()
            .unwrap();
        assert_eq!(event.fields.group, GroupId(1));
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let (mut store, ctx) = setup();
        let session = SyncSession::new(&ctx);

        let first = session
            .run_at(
                &mut store,
                batch(&ctx, vec![confirmed(42, ts(2))]),
                ts(1),
                DateWindow::all(),
                ts(3),
            )
            .unwrap();
        let checkpoint = first.checkpoint.unwrap().last_updated;

        let second = session
            .run_at(
                &mut store,
                batch(&ctx, vec![confirmed(42, ts(2))]),
                checkpoint,
                DateWindow::all(),
                ts(4),
            )
            .unwrap();

        assert_eq!(second.commit, CommitSummary::default());
        assert_eq!(second.stats.created, 0);
        assert_eq!(second.stats.updated, 0);
        assert_eq!(second.stats.warned, 0);
        assert_eq!(store.count_events().unwrap(), 1);
    }

    #[test]
    fn test_dry_run_discards() {
        let (mut store, ctx) = setup();
        let report = SyncSession::new(&ctx)
            .with_dry_run(true)
            .run_at(
                &mut store,
                batch(&ctx, vec![confirmed(42, ts(2))]),
                ts(1),
                DateWindow::all(),
                ts(3),
            )
            .unwrap();

        assert_eq!(report.checkpoint, None);
        assert_eq!(report.discarded, 1);
        assert_eq!(report.stats.created, 1);
        assert_eq!(store.count_events().unwrap(), 0);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn test_event_outside_window_is_protected() {
        let (mut store, ctx) = setup();
        let session = SyncSession::new(&ctx);
        session
            .run_at(
                &mut store,
                batch(&ctx, vec![confirmed(42, ts(2))]),
                ts(1),
                DateWindow::all(),
                ts(3),
            )
            .unwrap();

        let window = DateWindow::starting(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        let report = session
            .run_at(&mut store, batch(&ctx, vec![confirmed(42, ts(4))]), ts(3), window, ts(5))
            .unwrap();

        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.commit, CommitSummary::default());
        assert_eq!(store.count_events().unwrap(), 1);
    }
}
