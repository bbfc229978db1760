//! Pruning of candidate tracker domains already covered by a global rule.
//!
//! A global blocking rule for `*://tracker.example/*` already excepts that
//! tracker on every site, so a per-site rule for the same host would be
//! redundant.

use std::collections::HashMap;

use tracing::warn;

use crate::annotation::split_list;
use crate::rule::{Rule, host_pattern};

/// Index of the global blocking rules in a rule set, keyed by `urlPattern`.
pub struct GlobalExemptions<'a> {
    by_pattern: HashMap<&'a str, &'a Rule>,
}

impl<'a> GlobalExemptions<'a> {
    pub fn from_rules(rules: &'a [Rule]) -> Self {
        let mut by_pattern = HashMap::new();
        for rule in rules.iter().filter(|r| r.is_global() && r.is_blocking()) {
            by_pattern.entry(rule.url_pattern.as_str()).or_insert(rule);
        }
        Self { by_pattern }
    }

    pub fn len(&self) -> usize {
        self.by_pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pattern.is_empty()
    }

    /// The global rule covering `domain`, if any.
    pub fn covering(&self, domain: &str) -> Option<&'a Rule> {
        self.by_pattern.get(host_pattern(domain).as_str()).copied()
    }

    /// Candidates not covered by a global rule, in input order.
    pub fn filter<S: AsRef<str>>(&self, domains: &[S]) -> Vec<String> {
        domains
            .iter()
            .map(|d| AsRef::<str>::as_ref(d))
            .filter(|domain| match self.covering(domain) {
                Some(rule) => {
                    warn!(
                        domain = %domain,
                        rule_id = rule.id.as_deref().unwrap_or("<unsaved>"),
                        "domain is exempted by a global exception"
                    );
                    false
                }
                None => true,
            })
            .map(str::to_string)
            .collect()
    }

    /// [`filter`](Self::filter) over a comma-separated domain list.
    pub fn filter_list(&self, domains: &str) -> Vec<String> {
        self.filter(&split_list(domains))
    }
}
