//! Parsers for the structured bits of a bug's free-text fields.
//!
//! Two fields carry triage metadata:
//!
//! - the **whiteboard**, a run of bracketed tags such as
//!   `[privacy-team:diagnosed][exception-baseline]`;
//! - the **user story**, one `name: value` directive per line, e.g.
//!   `trackers-blocked: tracker.example, cdn.tracker.example`.

use std::collections::{BTreeMap, HashSet};

use url::Url;

use crate::rule::Category;

/// Set by the privacy team once a site report has been diagnosed.
pub const TAG_DIAGNOSED: &str = "privacy-team:diagnosed";
pub const TAG_BASELINE: &str = "exception-baseline";
pub const TAG_CONVENIENCE: &str = "exception-convenience";

/// User-story directive listing the tracker hosts whose blocking breaks the site.
pub const DIRECTIVE_TRACKERS_BLOCKED: &str = "trackers-blocked";
/// User-story directive overriding the excepted classifier features.
pub const DIRECTIVE_CLASSIFIER_FEATURES: &str = "classifier-features";

/// Features excepted when the user story does not say otherwise.
pub const DEFAULT_FEATURES: &[&str] = &["tracking-protection", "emailtracking-protection"];

/// The bracketed tags of a whiteboard.
///
/// Membership is a substring test for `[tag]` on the raw text, so a tag
/// still counts when an earlier bracket is left unterminated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whiteboard {
    raw: String,
    tags: Vec<String>,
}

impl Whiteboard {
    pub fn parse(text: &str) -> Self {
        let mut tags = Vec::new();
        let mut rest = text;
        while let Some(open) = rest.find('[') {
            let after = &rest[open + 1..];
            let Some(close) = after.find(']') else {
                break;
            };
            let tag = after[..close].trim();
            if !tag.is_empty() {
                tags.push(tag.to_string());
            }
            rest = &after[close + 1..];
        }
        Self {
            raw: text.to_string(),
            tags,
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.raw.contains(&format!("[{tag}]"))
    }

    pub fn is_diagnosed(&self) -> bool {
        self.has_tag(TAG_DIAGNOSED)
    }

    /// Exception category from the category tags. Baseline wins if both are set.
    pub fn category(&self) -> Option<Category> {
        if self.has_tag(TAG_BASELINE) {
            Some(Category::Baseline)
        } else if self.has_tag(TAG_CONVENIENCE) {
            Some(Category::Convenience)
        } else {
            None
        }
    }
}

/// `name: value` directives of a user story. Later lines override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStory {
    directives: BTreeMap<String, String>,
}

impl UserStory {
    pub fn parse(text: &str) -> Self {
        let mut directives = BTreeMap::new();
        for line in text.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                continue;
            }
            directives.insert(name.to_string(), value.trim().to_string());
        }
        Self { directives }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }

    /// Hosts listed under `trackers-blocked`, empty if the directive is absent.
    pub fn tracker_domains(&self) -> Vec<String> {
        self.get(DIRECTIVE_TRACKERS_BLOCKED)
            .map(split_list)
            .unwrap_or_default()
    }

    /// Features listed under `classifier-features`, or [`DEFAULT_FEATURES`].
    pub fn classifier_features(&self) -> Vec<String> {
        let listed = self
            .get(DIRECTIVE_CLASSIFIER_FEATURES)
            .map(split_list)
            .unwrap_or_default();
        if listed.is_empty() {
            DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect()
        } else {
            listed
        }
    }
}

/// Split a comma-separated list, trimming entries and dropping blanks and
/// repeats. Order of first appearance is kept.
pub fn split_list(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty() && seen.insert(*item))
        .map(str::to_string)
        .collect()
}

/// `topLevelUrlPattern` for a bug URL, or `None` if the URL is not an
/// `http(s)` URL with a host.
pub fn top_level_pattern(bug_url: &str) -> Option<String> {
    let url = Url::parse(bug_url.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("*://{host}:{port}/*"),
        None => format!("*://{host}/*"),
    })
}
