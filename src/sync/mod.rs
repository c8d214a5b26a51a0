//! Reconciliation engine
//!
//! # Pass Phases
//!
//! 1. **Fetch**: the runner pulls issues updated in `(checkpoint, now)`
//! 2. **Index**: [`IssueIndex`] keys the batch by issue URL
//! 3. **Scope**: the session loads in-scope events and the known URLs
//! 4. **Reconcile**: [`Reconciler`] classifies (via [`StatusClassifier`]) and
//!    maps (via [`FieldMapper`]) every pairing
//! 5. **Commit**: the session stages and commits once, returning `now` as the
//!    new checkpoint

mod classifier;
mod context;
mod mapper;
mod matcher;
mod reconciler;
mod runner;
mod session;

pub use classifier::StatusClassifier;
pub use context::SyncContext;
pub use mapper::{FieldMapper, MapOutcome, SyncIdentity};
pub use matcher::IssueIndex;
pub use reconciler::{Decision, ReconcilePlan, Reconciler, SyncAction, SyncStats};
pub use runner::SyncRunner;
pub use session::{SyncReport, SyncSession};
