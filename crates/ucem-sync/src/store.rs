//! Record-store collaborators: the writable Remote Settings collection and
//! the read-only published snapshot of a tier.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use ucem_core::{Rule, Tier, parse_records};

use crate::SyncError;

/// Signing workflow status of the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionStatus {
    /// Unreviewed local changes exist.
    WorkInProgress,
    /// Review requested.
    ToReview,
    /// Approved, waiting to be signed and published.
    ToSign,
    ToRollback,
    ToRefresh,
    Signed,
    #[serde(other)]
    Unknown,
}

/// The writable exception collection on one Remote Settings server.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record in the collection, as stored.
    async fn list_records(&self) -> Result<Vec<Value>, SyncError>;

    /// Create or replace the record with the given id.
    async fn upsert_record(&self, id: &str, data: &Value) -> Result<(), SyncError>;

    async fn delete_record(&self, id: &str) -> Result<(), SyncError>;

    async fn delete_all_records(&self) -> Result<(), SyncError>;

    async fn collection_status(&self) -> Result<CollectionStatus, SyncError>;

    async fn set_collection_status(&self, status: CollectionStatus) -> Result<(), SyncError>;
}

/// Read-only access to the records a tier currently publishes to clients.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn published_records(&self, tier: Tier) -> Result<Vec<Value>, SyncError>;
}

/// List the collection as parsed rules, skipping malformed records.
pub async fn list_rules(store: &dyn RecordStore) -> Result<Vec<Rule>, SyncError> {
    let records = store.list_records().await?;
    let total = records.len();
    let rules = parse_records(records);
    info!(total, parsed = rules.len(), "listed exception records");
    Ok(rules)
}

/// Fetch and parse the published snapshot of `tier`.
pub async fn published_rules(
    source: &dyn SnapshotSource,
    tier: Tier,
) -> Result<Vec<Rule>, SyncError> {
    let records = source.published_records(tier).await?;
    let rules = parse_records(records);
    info!(tier = %tier, count = rules.len(), "fetched published snapshot");
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySnapshots, MemoryStore};
    use serde_json::json;

    #[test]
    fn status_wire_names() {
        let s: CollectionStatus = serde_json::from_value(json!("work-in-progress")).unwrap();
        assert_eq!(s, CollectionStatus::WorkInProgress);
        assert_eq!(
            serde_json::to_value(CollectionStatus::ToReview).unwrap(),
            json!("to-review")
        );
        assert_eq!(
            serde_json::to_value(CollectionStatus::ToSign).unwrap(),
            json!("to-sign")
        );
        let other: CollectionStatus = serde_json::from_value(json!("frozen")).unwrap();
        assert_eq!(other, CollectionStatus::Unknown);
    }

    #[tokio::test]
    async fn list_rules_skips_malformed_records() {
        let store = MemoryStore::with_records(vec![
            json!({"id": "a", "bugId": "1", "urlPattern": "*://a/*", "classifierFeatures": ["tracking-protection"]}),
            json!({"id": "broken"}),
        ]);
        let rules = list_rules(&store).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].bug_ids, vec!["1"]);
    }

    #[tokio::test]
    async fn published_rules_for_missing_tier_errors() {
        let snapshots = MemorySnapshots::default();
        let err = published_rules(&snapshots, Tier::Dev).await.unwrap_err();
        assert!(matches!(err, SyncError::NoSnapshot(Tier::Dev)));
    }
}
