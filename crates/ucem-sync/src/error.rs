use thiserror::Error;
use ucem_core::{RuleError, Tier};

/// Failure talking to Remote Settings or Bugzilla.
#[derive(Error, Debug)]
pub enum SyncError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("tier `{0}` has no published record snapshot")]
    NoSnapshot(Tier),
    #[error("a Bugzilla API key is required to {0}")]
    MissingApiKey(&'static str),
}

/// Failure while reconciling, removing, or deriving exceptions.
///
/// Write failures carry the ids already written so the operator can see how
/// far a batch got; nothing is rolled back.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("failed to write record {id} after {} successful write(s): {source}", .written.len())]
    Write {
        id: String,
        written: Vec<String>,
        source: SyncError,
    },
    #[error("failed to delete record {id} after {} successful deletion(s): {source}", .deleted.len())]
    Delete {
        id: String,
        deleted: Vec<String>,
        source: SyncError,
    },
    #[error("failed to remove all records: {0}")]
    DeleteAll(#[source] SyncError),
    #[error("no exception ids given")]
    NoIds,
    #[error("planned record has no id")]
    MissingId,
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Rule(#[from] RuleError),
}
