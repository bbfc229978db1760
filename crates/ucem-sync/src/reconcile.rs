//! Reconciliation of desired exception rules against the remote collection.
//!
//! A desired rule matches a remote record by `id` first, then by identity
//! (see [`Rule::same_identity`]). Matches adopt the remote id and are written
//! only when their content differs; everything else is created under a fresh
//! UUID. Writes go updates first, then creates, and stop at the first failure.

use std::fmt;

use tracing::{info, warn};
use ucem_core::{Rule, RuleError, Tier};
use uuid::Uuid;

use crate::error::{ReconcileError, SyncError};
use crate::prompt::Prompt;
use crate::store::{self, CollectionStatus, RecordStore};

pub const APPLY_ACTION: &str = "add new exceptions and update existing ones";
pub const REMOVE_ALL_ACTION: &str = "remove ALL exceptions from the server";

const HEADER_RULE: &str = "==================================================";
const RECORD_RULE: &str = "--------------------------------------------------";

/// Writes needed to bring the remote collection in line with a desired set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub to_create: Vec<Rule>,
    pub to_update: Vec<Rule>,
    /// Matched rules whose content already equals the remote record.
    pub unchanged: Vec<Rule>,
}

impl Plan {
    /// No record needs writing.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty()
    }

    /// Human-readable diff shown before confirmation.
    pub fn render(&self) -> Result<String, RuleError> {
        let mut out = String::new();
        push_section(&mut out, "Exceptions to be added:", &self.to_create)?;
        push_section(&mut out, "Exceptions to be updated:", &self.to_update)?;
        Ok(out)
    }
}

fn push_section(out: &mut String, title: &str, rules: &[Rule]) -> Result<(), RuleError> {
    if rules.is_empty() {
        return Ok(());
    }
    out.push('\n');
    out.push_str(title);
    out.push('\n');
    out.push_str(HEADER_RULE);
    out.push('\n');
    for rule in rules {
        out.push_str(&rule.to_sorted_json()?);
        out.push('\n');
        out.push_str(RECORD_RULE);
        out.push('\n');
    }
    Ok(())
}

/// Plan against `remote`, minting UUID v4 ids for new records.
pub fn plan(desired: Vec<Rule>, remote: &[Rule]) -> Plan {
    plan_with_ids(desired, remote, || Uuid::new_v4().to_string())
}

/// [`plan`] with a caller-supplied id generator.
pub fn plan_with_ids(
    desired: Vec<Rule>,
    remote: &[Rule],
    mut new_id: impl FnMut() -> String,
) -> Plan {
    let mut out = Plan::default();
    for mut rule in desired {
        let by_id = rule
            .id
            .as_deref()
            .and_then(|id| remote.iter().find(|r| r.id.as_deref() == Some(id)));
        let matched = by_id.or_else(|| {
            remote
                .iter()
                .filter(|r| r.id.is_some())
                .find(|r| rule.same_identity(r))
        });

        match matched {
            Some(existing) => {
                rule.id = existing.id.clone();
                if rule.same_content(existing) {
                    out.unchanged.push(rule);
                } else {
                    out.to_update.push(rule);
                }
            }
            None => {
                rule.id = Some(new_id());
                out.to_create.push(rule);
            }
        }
    }
    out
}

/// What happened to the collection's review status after a batch of writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Dev tier: pending changes moved straight to `to-sign`.
    Approved,
    ReviewRequested,
    /// The collection was not `work-in-progress`; status left alone.
    NoPendingChanges,
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewOutcome::Approved => {
                f.write_str("Dev server does not require a review, changes approved")
            }
            ReviewOutcome::ReviewRequested => {
                f.write_str("Review requested for updated/created records")
            }
            ReviewOutcome::NoPendingChanges => {
                f.write_str("No changes were made, no new review request is needed")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub review: ReviewOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Every desired rule already exists with identical content.
    NothingToDo,
    /// The operator declined the confirmation.
    Cancelled,
    Applied(Summary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Ids(Vec<String>),
    All,
}

impl Removal {
    fn action(&self) -> String {
        match self {
            Removal::Ids(ids) => format!("remove {} exception(s)", ids.len()),
            Removal::All => REMOVE_ALL_ACTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Cancelled,
    Removed(ReviewOutcome),
}

/// Applies plans and removals to one collection.
pub struct Reconciler<'a> {
    store: &'a dyn RecordStore,
    prompt: &'a dyn Prompt,
    tier: Tier,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn RecordStore, prompt: &'a dyn Prompt, tier: Tier) -> Self {
        Self {
            store,
            prompt,
            tier,
        }
    }

    pub async fn list_rules(&self) -> Result<Vec<Rule>, SyncError> {
        store::list_rules(self.store).await
    }

    /// Read the remote listing once, then plan and apply `desired`.
    pub async fn reconcile_and_apply(
        &self,
        desired: Vec<Rule>,
        force_confirm: bool,
    ) -> Result<ApplyOutcome, ReconcileError> {
        let remote = self.list_rules().await?;
        self.apply(plan(desired, &remote), force_confirm).await
    }

    pub async fn apply(
        &self,
        plan: Plan,
        force_confirm: bool,
    ) -> Result<ApplyOutcome, ReconcileError> {
        if plan.is_empty() {
            info!(
                unchanged = plan.unchanged.len(),
                "all exceptions already exist and are up-to-date"
            );
            return Ok(ApplyOutcome::NothingToDo);
        }

        self.prompt.show(&plan.render()?);
        if !force_confirm && !self.prompt.confirm(APPLY_ACTION) {
            info!("operation cancelled");
            return Ok(ApplyOutcome::Cancelled);
        }

        let mut written = Vec::new();
        for rule in plan.to_update.iter().chain(&plan.to_create) {
            let id = rule.id.clone().ok_or(ReconcileError::MissingId)?;
            let data = serde_json::to_value(rule).map_err(RuleError::from)?;
            if let Err(source) = self.store.upsert_record(&id, &data).await {
                warn!(record_id = %id, written = written.len(), "record write failed, stopping");
                return Err(ReconcileError::Write {
                    id,
                    written,
                    source,
                });
            }
            written.push(id);
        }

        let review = self.request_review().await?;
        let summary = Summary {
            created: plan.to_create.len(),
            updated: plan.to_update.len(),
            unchanged: plan.unchanged.len(),
            review,
        };
        info!(
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "exceptions applied"
        );
        Ok(ApplyOutcome::Applied(summary))
    }

    /// Delete the given records, or all of them, then request review.
    pub async fn remove_rules(
        &self,
        removal: Removal,
        force_confirm: bool,
    ) -> Result<RemoveOutcome, ReconcileError> {
        if matches!(&removal, Removal::Ids(ids) if ids.is_empty()) {
            return Err(ReconcileError::NoIds);
        }
        if !force_confirm && !self.prompt.confirm(&removal.action()) {
            info!("operation cancelled");
            return Ok(RemoveOutcome::Cancelled);
        }

        match removal {
            Removal::All => {
                self.store
                    .delete_all_records()
                    .await
                    .map_err(ReconcileError::DeleteAll)?;
                info!("removed all exceptions");
            }
            Removal::Ids(ids) => {
                let mut deleted = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Err(source) = self.store.delete_record(&id).await {
                        return Err(ReconcileError::Delete {
                            id,
                            deleted,
                            source,
                        });
                    }
                    deleted.push(id);
                }
                info!(count = deleted.len(), "removed exceptions");
            }
        }

        Ok(RemoveOutcome::Removed(self.request_review().await?))
    }

    /// Move pending changes on: straight to `to-sign` on dev, `to-review`
    /// elsewhere.
    pub async fn request_review(&self) -> Result<ReviewOutcome, SyncError> {
        let status = self.store.collection_status().await?;
        if status != CollectionStatus::WorkInProgress {
            info!(?status, "no pending changes, review not requested");
            return Ok(ReviewOutcome::NoPendingChanges);
        }

        if self.tier.requires_review() {
            self.store
                .set_collection_status(CollectionStatus::ToReview)
                .await?;
            info!(tier = %self.tier, "review requested");
            Ok(ReviewOutcome::ReviewRequested)
        } else {
            self.store
                .set_collection_status(CollectionStatus::ToSign)
                .await?;
            info!(tier = %self.tier, "changes approved without review");
            Ok(ReviewOutcome::Approved)
        }
    }
}
