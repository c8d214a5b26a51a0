//! Poll loop
//!
//! One pass: load checkpoint, capture `now`, fetch `(checkpoint, now)`, index,
//! reconcile and commit, then save `now` as the new checkpoint. Passes never
//! overlap; a signal is handled between passes.

use super::context::SyncContext;
use super::matcher::IssueIndex;
use super::session::{SyncReport, SyncSession};
use crate::integrations::IssueSource;
use crate::storage::{Checkpoint, CheckpointStore, EventStore};
use crate::Result;
use chrono::Utc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Drives sync passes against one source, store and checkpoint
pub struct SyncRunner<I, S, C> {
    source: I,
    store: S,
    checkpoints: C,
    context: SyncContext,
    dry_run: bool,
}

impl<I, S, C> SyncRunner<I, S, C>
where
    I: IssueSource,
    S: EventStore,
    C: CheckpointStore,
{
    pub fn new(source: I, store: S, checkpoints: C, context: SyncContext) -> Self {
        Self {
            source,
            store,
            checkpoints,
            context,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// Run a single pass
    ///
    /// Without a stored checkpoint the pass starts from the Unix epoch.
    pub async fn run_once(&mut self) -> Result<SyncReport> {
        let last = self
            .checkpoints
            .load_checkpoint()?
            .unwrap_or_else(Checkpoint::epoch);
        let now = Utc::now();

        tracing::debug!(checkpoint = %last.last_updated, now = %now, "Starting sync pass");

        let query = self.context.issue_query(&last, now);
        let issues = self.source.list_issues(&query).await?;
        let index = IssueIndex::build(&self.context.base, issues)?;
        let window = self.context.window_for(&last);

        let report = SyncSession::new(&self.context)
            .with_dry_run(self.dry_run)
            .run_at(&mut self.store, index, last.last_updated, window, now)?;

        if let Some(ref checkpoint) = report.checkpoint {
            self.checkpoints.save_checkpoint(checkpoint)?;
        }

        let stats = &report.stats;
        tracing::info!(
            issues = stats.issues,
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            warned = stats.warned,
            rejected = stats.rejected,
            failed = stats.failed,
            dry_run = self.dry_run,
            "Sync pass complete"
        );

        Ok(report)
    }

    /// Run a pass every `every` until SIGINT/SIGTERM
    ///
    /// A failed pass is logged and retried on the next tick; the checkpoint
    /// stays where it was.
    pub async fn run_forever(&mut self, every: Duration) -> Result<()> {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = every.as_secs(), "Starting poll loop");

        #[cfg(unix)]
        self.run_with_signals(&mut interval).await?;

        #[cfg(not(unix))]
        self.run_until_ctrl_c(&mut interval).await?;

        tracing::info!("Poll loop stopped");
        Ok(())
    }

    async fn tick_pass(&mut self) {
        if let Err(e) = self.run_once().await {
            tracing::error!(error = %e, "Sync pass failed, nothing committed");
        }
    }

    #[cfg(unix)]
    async fn run_with_signals(&mut self, interval: &mut tokio::time::Interval) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            crate::EventSyncError::Other(format!("Failed to set up SIGTERM handler: {}", e))
        })?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
            crate::EventSyncError::Other(format!("Failed to set up SIGINT handler: {}", e))
        })?;

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick_pass().await,
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn run_until_ctrl_c(&mut self, interval: &mut tokio::time::Interval) -> Result<()> {
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick_pass().await,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl-C, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}
