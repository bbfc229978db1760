//! Sync layer: Remote Settings and Bugzilla collaborators, reconciliation of
//! exception records, and the automatic derive/apply/close-out run.

pub mod auto;
pub mod error;
pub mod lifecycle;
pub mod prompt;
pub mod reconcile;
pub mod store;
pub mod tracker;

#[cfg(feature = "http")]
pub mod http;

#[cfg(test)]
pub(crate) mod testing;

pub use auto::{DerivationReport, DerivationRun};
pub use error::{ReconcileError, SyncError};
pub use lifecycle::{BugAction, LifecycleDriver, LifecycleReport};
pub use prompt::Prompt;
pub use reconcile::{ApplyOutcome, Plan, Reconciler, Removal, RemoveOutcome, ReviewOutcome};
pub use store::{CollectionStatus, RecordStore, SnapshotSource};
pub use tracker::{BugQuery, BugTracker};

#[cfg(feature = "http")]
pub use http::{Auth, BugzillaClient, BugzillaConfig, PublishedSnapshotClient, RemoteSettingsClient};
