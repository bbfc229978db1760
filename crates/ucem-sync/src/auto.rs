//! End-to-end automatic run: derive rules from bugs, apply them, close out
//! bugs whose rules are already published.

use tracing::{info, warn};
use ucem_core::{Derivation, DerivationPolicy, Deriver, Tier};

use crate::error::ReconcileError;
use crate::lifecycle::{LifecycleDriver, LifecycleReport};
use crate::prompt::Prompt;
use crate::reconcile::{self, ApplyOutcome, Reconciler};
use crate::store::{self, RecordStore, SnapshotSource};
use crate::tracker::{BugQuery, BugTracker};

#[derive(Debug)]
pub struct DerivationReport {
    pub derivation: Derivation,
    /// `None` on a dry run or when the write batch failed.
    pub apply: Option<ApplyOutcome>,
    /// Why the write batch stopped; the bug close-out still ran.
    pub apply_error: Option<ReconcileError>,
    /// `None` unless running against prod.
    pub lifecycle: Option<LifecycleReport>,
}

impl DerivationReport {
    /// No write or bug update failed.
    pub fn is_clean(&self) -> bool {
        self.apply_error.is_none()
            && self
                .lifecycle
                .as_ref()
                .is_none_or(|lifecycle| lifecycle.failed.is_empty())
    }
}

pub struct DerivationRun<'a> {
    store: &'a dyn RecordStore,
    snapshots: &'a dyn SnapshotSource,
    tracker: &'a dyn BugTracker,
    prompt: &'a dyn Prompt,
    tier: Tier,
    query: BugQuery,
    policy: DerivationPolicy,
}

impl<'a> DerivationRun<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        snapshots: &'a dyn SnapshotSource,
        tracker: &'a dyn BugTracker,
        prompt: &'a dyn Prompt,
        tier: Tier,
    ) -> Self {
        Self {
            store,
            snapshots,
            tracker,
            prompt,
            tier,
            query: BugQuery::default(),
            policy: DerivationPolicy::default(),
        }
    }

    pub fn with_query(mut self, query: BugQuery) -> Self {
        self.query = query;
        self
    }

    pub fn with_policy(mut self, policy: DerivationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Every read happens before the first write; a read failure aborts the
    /// run with the collection untouched. A failed write batch is reported
    /// in [`DerivationReport::apply_error`] and does not stop the close-out.
    pub async fn run(
        &self,
        dry_run: bool,
        force_confirm: bool,
    ) -> Result<DerivationReport, ReconcileError> {
        let bugs = self.tracker.query_bugs(&self.query).await?;
        let known = store::list_rules(self.store).await?;
        let deployed = store::published_rules(self.snapshots, self.tier.snapshot_tier()).await?;
        info!(
            tier = %self.tier,
            bugs = bugs.len(),
            known = known.len(),
            deployed = deployed.len(),
            "starting automatic derivation"
        );

        let derivation = Deriver::new(&known, &deployed, self.tier)
            .with_policy(self.policy.clone())
            .run(&bugs);
        self.prompt.show(&bug_listing(&derivation));

        let plan = reconcile::plan(derivation.rules.clone(), &known);
        let (apply, apply_error) = if dry_run {
            self.prompt.show(&plan.render()?);
            (None, None)
        } else {
            let reconciler = Reconciler::new(self.store, self.prompt, self.tier);
            match reconciler.apply(plan, force_confirm).await {
                Ok(outcome) => (Some(outcome), None),
                Err(e) => {
                    warn!(error = %e, "exception write batch failed");
                    (None, Some(e))
                }
            }
        };

        let lifecycle = if self.tier == Tier::Prod {
            let driver = LifecycleDriver::new(self.tracker, self.prompt, dry_run);
            Some(driver.close_out(&derivation.already_handled, &deployed).await)
        } else {
            None
        };

        Ok(DerivationReport {
            derivation,
            apply,
            apply_error,
            lifecycle,
        })
    }
}

fn bug_listing(derivation: &Derivation) -> String {
    let mut out = String::from("Bugs that will get exceptions deployed:\n");
    for id in &derivation.needs_rules {
        out.push_str(&format!("  Bug {id}\n"));
    }
    if !derivation.already_handled.is_empty() {
        out.push_str("Bugs that have exceptions deployed:\n");
        for id in &derivation.already_handled {
            out.push_str(&format!("  Bug {id}\n"));
        }
    }
    out
}
