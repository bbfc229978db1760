//! Derivation of exception rules from diagnosed site-report bugs.
//!
//! Each bug is classified independently, newest first:
//!
//! 1. not tagged `[privacy-team:diagnosed]` → excluded
//! 2. status `REOPENED` → excluded
//! 3. already referenced by a known rule → [`BugState::AlreadyHandled`] when
//!    running against prod and the bug is in the published prod snapshot,
//!    otherwise excluded
//! 4. no category tag → excluded
//! 5. URL missing or not `http(s)` → excluded
//! 6. no `trackers-blocked` domains → excluded
//! 7. every domain covered by a global rule → excluded
//! 8. otherwise [`BugState::NeedsRules`] with a temporal pair per domain
//!
//! The temporal pair splits on [`CUTOVER_VERSION`]: the "after" rule uses the
//! bug's category everywhere, the "before" rule is a convenience exception
//! limited to private browsing under the standard content-blocking category.

use std::fmt;

use tracing::{debug, info, warn};

use crate::annotation::{UserStory, Whiteboard, top_level_pattern};
use crate::bug::Bug;
use crate::config::Tier;
use crate::exemption::GlobalExemptions;
use crate::rule::{Category, Rule, host_pattern};
use crate::version::{CUTOVER_VERSION, VersionGate};

/// Content-blocking category the "before" variant is restricted to.
pub const LEGACY_CONTENT_BLOCKING_CATEGORY: &str = "standard";

/// Why a bug produced no rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    NotDiagnosed,
    Reopened,
    AlreadyRepresented,
    NoCategory,
    BadUrl(String),
    NoTrackerDomains,
    CoveredByGlobalRules,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::NotDiagnosed => f.write_str("not diagnosed"),
            Exclusion::Reopened => f.write_str("reopened"),
            Exclusion::AlreadyRepresented => f.write_str("already has exceptions"),
            Exclusion::NoCategory => f.write_str("no exception category tag"),
            Exclusion::BadUrl(url) => write!(f, "bad URL `{url}`"),
            Exclusion::NoTrackerDomains => f.write_str("no trackers-blocked domains"),
            Exclusion::CoveredByGlobalRules => f.write_str("covered by global exceptions"),
        }
    }
}

/// Outcome of classifying one bug.
#[derive(Debug, Clone, PartialEq)]
pub enum BugState {
    Excluded(Exclusion),
    /// Rules for the bug are published on prod; the bug can be closed out.
    AlreadyHandled,
    NeedsRules(Vec<Rule>),
}

/// Tunables of the derivation.
#[derive(Debug, Clone)]
pub struct DerivationPolicy {
    pub cutover_version: String,
}

impl Default for DerivationPolicy {
    fn default() -> Self {
        Self {
            cutover_version: CUTOVER_VERSION.to_string(),
        }
    }
}

/// Result of a derivation pass over a bug snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Derivation {
    pub rules: Vec<Rule>,
    /// Bugs that produced rules, newest first.
    pub needs_rules: Vec<u64>,
    /// Bugs whose rules are confirmed published, newest first.
    pub already_handled: Vec<u64>,
    pub excluded: Vec<(u64, Exclusion)>,
}

/// Classifies bugs against the known and deployed rule sets.
pub struct Deriver<'a> {
    known: &'a [Rule],
    deployed: &'a [Rule],
    tier: Tier,
    exemptions: GlobalExemptions<'a>,
    policy: DerivationPolicy,
}

impl<'a> Deriver<'a> {
    /// `known` are the rules currently on the target server; `deployed` the
    /// published snapshot of the authoritative tier.
    pub fn new(known: &'a [Rule], deployed: &'a [Rule], tier: Tier) -> Self {
        Self {
            known,
            deployed,
            tier,
            exemptions: GlobalExemptions::from_rules(known),
            policy: DerivationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DerivationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Classify every bug, newest first.
    pub fn run(&self, bugs: &[Bug]) -> Derivation {
        let mut ordered: Vec<&Bug> = bugs.iter().collect();
        ordered.sort_by(|a, b| b.id.cmp(&a.id));

        let mut out = Derivation::default();
        for bug in ordered {
            match self.classify(bug) {
                BugState::NeedsRules(rules) => {
                    out.needs_rules.push(bug.id);
                    out.rules.extend(rules);
                }
                BugState::AlreadyHandled => out.already_handled.push(bug.id),
                BugState::Excluded(reason) => out.excluded.push((bug.id, reason)),
            }
        }

        info!(
            bugs = bugs.len(),
            new_rules = out.rules.len(),
            needs_rules = out.needs_rules.len(),
            already_handled = out.already_handled.len(),
            "derivation complete"
        );
        out
    }

    pub fn classify(&self, bug: &Bug) -> BugState {
        let bug_id = bug.id_string();
        let whiteboard = Whiteboard::parse(&bug.whiteboard);

        if !whiteboard.is_diagnosed() {
            return BugState::Excluded(Exclusion::NotDiagnosed);
        }
        if bug.is_reopened() {
            debug!(bug_id = bug.id, "skipping reopened bug");
            return BugState::Excluded(Exclusion::Reopened);
        }

        if references(self.known, &bug_id) {
            if self.tier == Tier::Prod && references(self.deployed, &bug_id) {
                return BugState::AlreadyHandled;
            }
            debug!(bug_id = bug.id, "bug already has exceptions on the server");
            return BugState::Excluded(Exclusion::AlreadyRepresented);
        }

        let Some(category) = whiteboard.category() else {
            warn!(bug_id = bug.id, "ignoring bug, no exception category tag");
            return BugState::Excluded(Exclusion::NoCategory);
        };

        let Some(top_level) = top_level_pattern(&bug.url) else {
            warn!(bug_id = bug.id, url = %bug.url, "ignoring bug, bad URL?");
            return BugState::Excluded(Exclusion::BadUrl(bug.url.clone()));
        };

        let story = UserStory::parse(&bug.user_story);
        let candidates = story.tracker_domains();
        if candidates.is_empty() {
            warn!(bug_id = bug.id, "ignoring bug, no trackers-blocked domains");
            return BugState::Excluded(Exclusion::NoTrackerDomains);
        }

        let domains = self.exemptions.filter(&candidates);
        if domains.is_empty() {
            warn!(bug_id = bug.id, "ignoring bug, covered by global exceptions?");
            return BugState::Excluded(Exclusion::CoveredByGlobalRules);
        }

        let features = story.classifier_features();
        let rules = domains
            .iter()
            .flat_map(|domain| {
                temporal_pair(
                    &bug_id,
                    &host_pattern(domain),
                    &features,
                    category,
                    &top_level,
                    &self.policy.cutover_version,
                )
            })
            .collect();
        debug!(bug_id = bug.id, domains = ?domains, "bug needs exceptions");
        BugState::NeedsRules(rules)
    }
}

fn references(rules: &[Rule], bug_id: &str) -> bool {
    rules.iter().any(|r| r.references_bug(bug_id))
}

/// The "after" and "before" variants for one tracker on one site.
pub fn temporal_pair(
    bug_id: &str,
    url_pattern: &str,
    features: &[String],
    category: Category,
    top_level_url_pattern: &str,
    cutover_version: &str,
) -> [Rule; 2] {
    let after_gate = VersionGate::at_least(cutover_version);
    let before_gate = after_gate.complement();

    let after = Rule::new(
        vec![bug_id.to_string()],
        url_pattern,
        features.to_vec(),
        category,
    )
    .with_top_level_url_pattern(top_level_url_pattern)
    .with_version_gate(&after_gate);

    let before = Rule::new(
        vec![bug_id.to_string()],
        url_pattern,
        features.to_vec(),
        Category::Convenience,
    )
    .with_top_level_url_pattern(top_level_url_pattern)
    .with_private_browsing_only(true)
    .with_content_blocking_categories(vec![LEGACY_CONTENT_BLOCKING_CATEGORY.to_string()])
    .with_version_gate(&before_gate);

    [after, before]
}
