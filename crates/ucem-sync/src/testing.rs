//! In-memory collaborators for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use ucem_core::{Bug, Tier};

use crate::SyncError;
use crate::prompt::Prompt;
use crate::store::{CollectionStatus, RecordStore, SnapshotSource};
use crate::tracker::{BugQuery, BugTracker};

fn server_error(what: &str) -> SyncError {
    SyncError::Server {
        status: 503,
        body: format!("{what} unavailable"),
    }
}

/// A Kinto-like collection held in memory.
pub struct MemoryStore {
    pub records: Mutex<Vec<Value>>,
    pub status: Mutex<CollectionStatus>,
    /// Upserts and deletes of this id fail.
    pub fail_on: Option<String>,
    /// Every upsert fails.
    pub fail_writes: bool,
    pub fail_listing: bool,
    /// Status changes in order.
    pub transitions: Mutex<Vec<CollectionStatus>>,
    /// Ids written, in order.
    pub writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn with_records(records: Vec<Value>) -> Self {
        Self {
            records: Mutex::new(records),
            status: Mutex::new(CollectionStatus::Signed),
            fail_on: None,
            fail_writes: false,
            fail_listing: false,
            transitions: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, id: &str) -> Self {
        self.fail_on = Some(id.to_string());
        self
    }

    pub fn record_ids(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn transitions(&self) -> Vec<CollectionStatus> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn mark_dirty(&self) {
        *self.status.lock().unwrap() = CollectionStatus::WorkInProgress;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_records(Vec::new())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_records(&self) -> Result<Vec<Value>, SyncError> {
        if self.fail_listing {
            return Err(server_error("listing"));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn upsert_record(&self, id: &str, data: &Value) -> Result<(), SyncError> {
        if self.fail_writes || self.fail_on.as_deref() == Some(id) {
            return Err(server_error(id));
        }
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
        records.push(data.clone());
        self.writes.lock().unwrap().push(id.to_string());
        drop(records);
        self.mark_dirty();
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<(), SyncError> {
        if self.fail_on.as_deref() == Some(id) {
            return Err(server_error(id));
        }
        self.records
            .lock()
            .unwrap()
            .retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
        self.mark_dirty();
        Ok(())
    }

    async fn delete_all_records(&self) -> Result<(), SyncError> {
        self.records.lock().unwrap().clear();
        self.mark_dirty();
        Ok(())
    }

    async fn collection_status(&self) -> Result<CollectionStatus, SyncError> {
        Ok(*self.status.lock().unwrap())
    }

    async fn set_collection_status(&self, status: CollectionStatus) -> Result<(), SyncError> {
        *self.status.lock().unwrap() = status;
        self.transitions.lock().unwrap().push(status);
        Ok(())
    }
}

/// Published snapshots per tier.
#[derive(Default)]
pub struct MemorySnapshots {
    pub by_tier: HashMap<Tier, Vec<Value>>,
    pub requested: Mutex<Vec<Tier>>,
}

impl MemorySnapshots {
    pub fn with(tier: Tier, records: Vec<Value>) -> Self {
        let mut by_tier = HashMap::new();
        by_tier.insert(tier, records);
        Self {
            by_tier,
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SnapshotSource for MemorySnapshots {
    async fn published_records(&self, tier: Tier) -> Result<Vec<Value>, SyncError> {
        self.requested.lock().unwrap().push(tier);
        self.by_tier
            .get(&tier)
            .cloned()
            .ok_or(SyncError::NoSnapshot(tier))
    }
}

/// A bug tracker that records every write.
#[derive(Default)]
pub struct FakeTracker {
    pub bugs: Vec<Bug>,
    pub creators: HashMap<u64, String>,
    pub fail_close: HashSet<u64>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeTracker {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BugTracker for FakeTracker {
    async fn query_bugs(&self, _query: &BugQuery) -> Result<Vec<Bug>, SyncError> {
        Ok(self.bugs.clone())
    }

    async fn bug_creator(&self, bug_id: u64) -> Result<Option<String>, SyncError> {
        Ok(self.creators.get(&bug_id).cloned())
    }

    async fn close_bug(
        &self,
        bug_id: u64,
        resolution: &str,
        _comment: &str,
    ) -> Result<(), SyncError> {
        if self.fail_close.contains(&bug_id) {
            return Err(server_error("bugzilla"));
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("close {bug_id} {resolution}"));
        Ok(())
    }

    async fn need_info(
        &self,
        bug_id: u64,
        _comment: &str,
        requestee: &str,
    ) -> Result<(), SyncError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("needinfo {bug_id} {requestee}"));
        Ok(())
    }
}

/// Answers every confirmation with a fixed value and records the exchange.
pub struct ScriptedPrompt {
    pub answer: bool,
    pub shown: Mutex<Vec<String>>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            shown: Mutex::new(Vec::new()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn shown(&self) -> String {
        self.shown.lock().unwrap().join("\n")
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn show(&self, text: &str) {
        self.shown.lock().unwrap().push(text.to_string());
    }

    fn confirm(&self, action: &str) -> bool {
        self.asked.lock().unwrap().push(action.to_string());
        self.answer
    }
}
