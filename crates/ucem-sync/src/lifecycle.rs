//! Closing out bugs whose exceptions are published.

use std::fmt;

use tracing::{info, warn};
use ucem_core::{Rule, RuleError};

use crate::SyncError;
use crate::prompt::Prompt;
use crate::tracker::BugTracker;

pub const FIXED_RESOLUTION: &str = "FIXED";

pub const NEEDINFO_MESSAGE: &str = "This message is auto-generated.\n\n\
Would you please verify if the issue is resolved by the ETP exceptions? Really appreciate your help.\n";

const SEPARATOR: &str = "------------------------------";

/// Closing comment listing the deployed rules, ids stripped.
pub fn close_message(rules: &[&Rule]) -> Result<String, RuleError> {
    let mut message = String::from(
        "This message is auto-generated.\n\n\
         Enhanced Tracking Protection (ETP) exceptions have been deployed to address this issue.\n\
         We have deployed the following exceptions:\n```\n",
    );
    for rule in rules {
        message.push_str(&rule.without_id().to_pretty_json()?);
        message.push('\n');
    }
    message.push_str("```\n");
    Ok(message)
}

/// A single write to the bug tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BugAction {
    Close {
        bug_id: u64,
        resolution: String,
        comment: String,
    },
    NeedInfo {
        bug_id: u64,
        requestee: String,
        comment: String,
    },
}

impl BugAction {
    pub fn bug_id(&self) -> u64 {
        match self {
            BugAction::Close { bug_id, .. } | BugAction::NeedInfo { bug_id, .. } => *bug_id,
        }
    }

    pub async fn send(&self, tracker: &dyn BugTracker) -> Result<(), SyncError> {
        match self {
            BugAction::Close {
                bug_id,
                resolution,
                comment,
            } => tracker.close_bug(*bug_id, resolution, comment).await,
            BugAction::NeedInfo {
                bug_id,
                requestee,
                comment,
            } => tracker.need_info(*bug_id, comment, requestee).await,
        }
    }
}

impl fmt::Display for BugAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BugAction::Close {
                bug_id,
                resolution,
                comment,
            } => {
                writeln!(f, "---- Closing Bug {bug_id} as {resolution} ----")?;
                writeln!(f, "{comment}")?;
            }
            BugAction::NeedInfo {
                bug_id,
                requestee,
                comment,
            } => {
                writeln!(f, "---- NeedInfo Bug {bug_id} to {requestee} ----")?;
                writeln!(f, "{comment}")?;
            }
        }
        f.write_str(SEPARATOR)
    }
}

/// Show `action`, then send it unless this is a dry run.
pub async fn perform(
    tracker: &dyn BugTracker,
    prompt: &dyn Prompt,
    action: &BugAction,
    dry_run: bool,
) -> Result<(), SyncError> {
    prompt.show(&action.to_string());
    if dry_run {
        info!(bug_id = action.bug_id(), "dry run, bug left untouched");
        return Ok(());
    }
    action.send(tracker).await
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    pub closed: Vec<u64>,
    pub need_info: Vec<u64>,
    /// Handled bugs with no matching published rule.
    pub skipped: Vec<u64>,
    pub failed: Vec<(u64, String)>,
}

/// Closes handled bugs as FIXED and asks their reporters to verify.
pub struct LifecycleDriver<'a> {
    tracker: &'a dyn BugTracker,
    prompt: &'a dyn Prompt,
    dry_run: bool,
}

impl<'a> LifecycleDriver<'a> {
    pub fn new(tracker: &'a dyn BugTracker, prompt: &'a dyn Prompt, dry_run: bool) -> Self {
        Self {
            tracker,
            prompt,
            dry_run,
        }
    }

    /// Close every bug in `bug_ids` that has rules in `deployed`, then
    /// needinfo the reporters of the closed bugs. A failure on one bug is
    /// recorded and the rest carry on.
    ///
    /// Only bugs whose close succeeded (or would have, on a dry run) get a
    /// needinfo; skipped and failed bugs are left alone.
    pub async fn close_out(&self, bug_ids: &[u64], deployed: &[Rule]) -> LifecycleReport {
        let mut report = LifecycleReport::default();

        for &bug_id in bug_ids {
            let id = bug_id.to_string();
            let matching: Vec<&Rule> = deployed.iter().filter(|r| r.references_bug(&id)).collect();
            if matching.is_empty() {
                warn!(bug_id, "bug not found in the published exceptions, skipping");
                report.skipped.push(bug_id);
                continue;
            }

            let comment = match close_message(&matching) {
                Ok(c) => c,
                Err(e) => {
                    warn!(bug_id, error = %e, "could not render closing comment");
                    report.failed.push((bug_id, e.to_string()));
                    continue;
                }
            };
            let action = BugAction::Close {
                bug_id,
                resolution: FIXED_RESOLUTION.to_string(),
                comment,
            };
            match perform(self.tracker, self.prompt, &action, self.dry_run).await {
                Ok(()) => report.closed.push(bug_id),
                Err(e) => {
                    warn!(bug_id, error = %e, "failed to close bug");
                    report.failed.push((bug_id, e.to_string()));
                }
            }
        }

        for &bug_id in &report.closed {
            match self.need_info_creator(bug_id).await {
                Ok(true) => report.need_info.push(bug_id),
                Ok(false) => {
                    warn!(bug_id, "bug has no creator, needinfo skipped");
                }
                Err(e) => {
                    warn!(bug_id, error = %e, "failed to request info");
                    report.failed.push((bug_id, e.to_string()));
                }
            }
        }

        info!(
            closed = report.closed.len(),
            need_info = report.need_info.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            dry_run = self.dry_run,
            "bug lifecycle finished"
        );
        report
    }

    async fn need_info_creator(&self, bug_id: u64) -> Result<bool, SyncError> {
        let Some(requestee) = self.tracker.bug_creator(bug_id).await? else {
            return Ok(false);
        };
        let action = BugAction::NeedInfo {
            bug_id,
            requestee,
            comment: NEEDINFO_MESSAGE.to_string(),
        };
        perform(self.tracker, self.prompt, &action, self.dry_run).await?;
        Ok(true)
    }
}
