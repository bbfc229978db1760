//! Bug-tracker collaborator.

use async_trait::async_trait;
use ucem_core::Bug;
use ucem_core::config::{DEFAULT_COMPONENT, DEFAULT_PRODUCT, OPEN_RESOLUTION};

use crate::SyncError;

/// Which bugs to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugQuery {
    pub product: String,
    pub component: String,
    /// Bugzilla resolution filter; `---` selects open bugs.
    pub resolution: String,
}

impl BugQuery {
    pub fn open_bugs(product: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            component: component.into(),
            resolution: OPEN_RESOLUTION.to_string(),
        }
    }
}

impl Default for BugQuery {
    /// Open privacy site reports.
    fn default() -> Self {
        Self::open_bugs(DEFAULT_PRODUCT, DEFAULT_COMPONENT)
    }
}

#[async_trait]
pub trait BugTracker: Send + Sync {
    async fn query_bugs(&self, query: &BugQuery) -> Result<Vec<Bug>, SyncError>;

    /// Login of the bug's reporter, `None` if the tracker does not return one.
    async fn bug_creator(&self, bug_id: u64) -> Result<Option<String>, SyncError>;

    /// Resolve the bug with a comment.
    async fn close_bug(&self, bug_id: u64, resolution: &str, comment: &str)
    -> Result<(), SyncError>;

    /// Set a needinfo flag on `requestee` with a comment.
    async fn need_info(&self, bug_id: u64, comment: &str, requestee: &str)
    -> Result<(), SyncError>;
}
