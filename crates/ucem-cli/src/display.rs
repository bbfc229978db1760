//! Text rendering of listings and run reports for the terminal.

use std::fmt::Write;

use ucem_core::Rule;
use ucem_sync::{ApplyOutcome, DerivationReport, Removal, RemoveOutcome};

const HEADER_RULE: &str = "==================================================";
const RECORD_RULE: &str = "--------------------------------------------------";

/// Every rule as sorted-key JSON between separator lines, with a total.
pub fn rule_listing(rules: &[Rule]) -> anyhow::Result<String> {
    let mut out = String::from("\nURL Classifier Exceptions:\n");
    writeln!(out, "{HEADER_RULE}")?;
    for rule in rules {
        writeln!(out, "{}", rule.to_sorted_json()?)?;
        writeln!(out, "{RECORD_RULE}")?;
    }
    writeln!(out, "{HEADER_RULE}")?;
    write!(out, "Total exceptions: {}", rules.len())?;
    Ok(out)
}

/// The listing as one JSON array, keys sorted.
pub fn rules_json(rules: &[Rule]) -> anyhow::Result<String> {
    let value = serde_json::to_value(rules)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn apply_outcome(outcome: &ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::NothingToDo => {
            "All exceptions already exist and are up-to-date.".to_string()
        }
        ApplyOutcome::Cancelled => "Operation cancelled.".to_string(),
        ApplyOutcome::Applied(summary) => format!(
            "*** {} ***\nSummary: {} created, {} updated, {} unchanged",
            summary.review, summary.created, summary.updated, summary.unchanged
        ),
    }
}

pub fn removal_target(removal: &Removal) -> String {
    match removal {
        Removal::All => "all exceptions".to_string(),
        Removal::Ids(ids) => format!("{} exception(s)", ids.len()),
    }
}

pub fn remove_outcome(outcome: &RemoveOutcome, target: &str) -> String {
    match outcome {
        RemoveOutcome::Cancelled => "Operation cancelled.".to_string(),
        RemoveOutcome::Removed(review) => {
            format!("Successfully removed {target}\n*** {review} ***")
        }
    }
}

pub fn derivation_report(report: &DerivationReport) -> String {
    let d = &report.derivation;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Derived {} exception(s) for {} bug(s); {} bug(s) already deployed; {} excluded",
        d.rules.len(),
        d.needs_rules.len(),
        d.already_handled.len(),
        d.excluded.len()
    );
    for (bug_id, reason) in &d.excluded {
        let _ = writeln!(out, "  Bug {bug_id}: {reason}");
    }

    match (&report.apply, &report.apply_error) {
        (Some(outcome), _) => {
            let _ = writeln!(out, "{}", apply_outcome(outcome));
        }
        (None, Some(error)) => {
            let _ = writeln!(out, "Writing exceptions failed: {error}");
        }
        (None, None) => out.push_str("Dry run: no exceptions written.\n"),
    }

    if let Some(lifecycle) = &report.lifecycle {
        let _ = writeln!(
            out,
            "Bugs closed: {:?}; needinfo sent: {:?}; skipped: {:?}",
            lifecycle.closed, lifecycle.need_info, lifecycle.skipped
        );
        for (bug_id, error) in &lifecycle.failed {
            let _ = writeln!(out, "  Bug {bug_id} failed: {error}");
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucem_core::{Category, Derivation, Exclusion};
    use ucem_sync::{LifecycleReport, ReconcileError, ReviewOutcome, SyncError};
    use ucem_sync::reconcile::Summary;

    fn sample() -> Rule {
        let mut rule = Rule::new(
            vec!["1".into()],
            "*://t.example/*",
            vec!["tracking-protection".into()],
            Category::Baseline,
        );
        rule.id = Some("rec-1".into());
        rule
    }

    #[test]
    fn listing_has_total_and_separators() {
        let text = rule_listing(&[sample(), sample()]).unwrap();
        assert!(text.starts_with("\nURL Classifier Exceptions:\n"));
        assert_eq!(text.matches(RECORD_RULE).count(), 2);
        assert!(text.ends_with("Total exceptions: 2"));
    }

    #[test]
    fn json_listing_sorts_keys() {
        let text = rules_json(&[sample()]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["id"], "rec-1");
        assert!(text.find("bugIds").unwrap() < text.find("urlPattern").unwrap());
    }

    #[test]
    fn apply_summary_line() {
        let text = apply_outcome(&ApplyOutcome::Applied(Summary {
            created: 2,
            updated: 1,
            unchanged: 3,
            review: ReviewOutcome::ReviewRequested,
        }));
        assert!(text.contains("Summary: 2 created, 1 updated, 3 unchanged"));
        assert!(text.contains("Review requested"));
    }

    #[test]
    fn report_lists_exclusions() {
        let report = DerivationReport {
            derivation: Derivation {
                excluded: vec![(7, Exclusion::NoCategory)],
                ..Default::default()
            },
            apply: None,
            apply_error: None,
            lifecycle: None,
        };
        let text = derivation_report(&report);
        assert!(text.contains("Bug 7: no exception category tag"));
        assert!(text.ends_with("Dry run: no exceptions written."));
    }

    #[test]
    fn report_shows_write_failure_and_close_out() {
        let report = DerivationReport {
            derivation: Derivation::default(),
            apply: None,
            apply_error: Some(ReconcileError::Write {
                id: "rec-9".into(),
                written: Vec::new(),
                source: SyncError::Server {
                    status: 503,
                    body: "down".into(),
                },
            }),
            lifecycle: Some(LifecycleReport {
                closed: vec![100],
                need_info: vec![100],
                ..Default::default()
            }),
        };
        let text = derivation_report(&report);
        assert!(text.contains("Writing exceptions failed: failed to write record rec-9"));
        assert!(text.contains("Bugs closed: [100]"));
    }
}
