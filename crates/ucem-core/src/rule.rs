//! The exception rule record stored in the `url-classifier-exceptions` collection.
//!
//! Records arrive from Remote Settings in more than one shape: older records
//! carry a single `bugId`, newer ones a `bugIds` list, and every field past the
//! required four may be missing. [`Rule`] is the canonical form. Absent optional
//! fields stay absent when the rule is written back out.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::version::VersionGate;

/// Suffix that marks a classifier feature as a blocking feature.
pub const BLOCKING_FEATURE_SUFFIX: &str = "-protection";

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("record has no bug ids")]
    NoBugIds,
    #[error("record has no classifier features")]
    NoFeatures,
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How aggressively the client applies an exception.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Baseline,
    #[default]
    Convenience,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Baseline => f.write_str("baseline"),
            Category::Convenience => f.write_str("convenience"),
        }
    }
}

/// One URL classifier exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord", rename_all = "camelCase")]
pub struct Rule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub bug_ids: Vec<String>,
    pub url_pattern: String,
    pub classifier_features: Vec<String>,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_level_url_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private_browsing_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_content_blocking_categories: Option<Vec<String>>,
    #[serde(
        rename = "filter_expression",
        skip_serializing_if = "Option::is_none"
    )]
    pub filter_expression: Option<String>,
}

/// Bug ids have been published both as strings and as bare numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum BugIdValue {
    Text(String),
    Number(u64),
}

impl From<BugIdValue> for String {
    fn from(value: BugIdValue) -> Self {
        match value {
            BugIdValue::Text(s) => s,
            BugIdValue::Number(n) => n.to_string(),
        }
    }
}

/// Wire shape accepted on read, before normalisation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    id: Option<String>,
    bug_ids: Option<Vec<BugIdValue>>,
    bug_id: Option<BugIdValue>,
    url_pattern: Option<String>,
    classifier_features: Option<Vec<String>>,
    category: Option<Category>,
    top_level_url_pattern: Option<String>,
    is_private_browsing_only: Option<bool>,
    filter_content_blocking_categories: Option<Vec<String>>,
    #[serde(rename = "filter_expression")]
    filter_expression: Option<String>,
}

impl TryFrom<RawRecord> for Rule {
    type Error = RuleError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        // A non-empty `bugIds` wins over the legacy `bugId`.
        let bug_ids: Vec<String> = match (raw.bug_ids, raw.bug_id) {
            (Some(ids), _) if !ids.is_empty() => ids.into_iter().map(String::from).collect(),
            (_, Some(id)) => vec![id.into()],
            (_, None) => Vec::new(),
        };
        if bug_ids.is_empty() {
            return Err(RuleError::NoBugIds);
        }

        let url_pattern = raw.url_pattern.ok_or(RuleError::MissingField("urlPattern"))?;
        let classifier_features = raw
            .classifier_features
            .ok_or(RuleError::MissingField("classifierFeatures"))?;
        if classifier_features.is_empty() {
            return Err(RuleError::NoFeatures);
        }

        Ok(Rule {
            id: raw.id,
            bug_ids,
            url_pattern,
            classifier_features,
            category: raw.category.unwrap_or_default(),
            top_level_url_pattern: raw.top_level_url_pattern,
            is_private_browsing_only: raw.is_private_browsing_only,
            filter_content_blocking_categories: raw.filter_content_blocking_categories,
            filter_expression: raw.filter_expression,
        })
    }
}

impl Rule {
    /// A rule with only the required fields set.
    pub fn new(
        bug_ids: Vec<String>,
        url_pattern: impl Into<String>,
        classifier_features: Vec<String>,
        category: Category,
    ) -> Self {
        Self {
            id: None,
            bug_ids,
            url_pattern: url_pattern.into(),
            classifier_features,
            category,
            top_level_url_pattern: None,
            is_private_browsing_only: None,
            filter_content_blocking_categories: None,
            filter_expression: None,
        }
    }

    pub fn with_top_level_url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.top_level_url_pattern = Some(pattern.into());
        self
    }

    pub fn with_private_browsing_only(mut self, pbm_only: bool) -> Self {
        self.is_private_browsing_only = Some(pbm_only);
        self
    }

    pub fn with_content_blocking_categories(mut self, categories: Vec<String>) -> Self {
        self.filter_content_blocking_categories = Some(categories);
        self
    }

    pub fn with_version_gate(mut self, gate: &VersionGate) -> Self {
        self.filter_expression = Some(gate.to_string());
        self
    }

    /// Parse one raw Remote Settings record.
    pub fn from_value(value: Value) -> Result<Self, RuleError> {
        Ok(serde_json::from_value(value)?)
    }

    /// A global rule applies regardless of the top-level page.
    pub fn is_global(&self) -> bool {
        self.top_level_url_pattern.is_none()
    }

    /// A blocking rule excepts at least one `*-protection` feature.
    pub fn is_blocking(&self) -> bool {
        self.classifier_features
            .iter()
            .any(|f| f.ends_with(BLOCKING_FEATURE_SUFFIX))
    }

    pub fn references_bug(&self, bug_id: &str) -> bool {
        self.bug_ids.iter().any(|id| id == bug_id)
    }

    /// The version gate in `filter_expression`, if it is one.
    pub fn version_gate(&self) -> Option<VersionGate> {
        self.filter_expression.as_deref().and_then(VersionGate::parse)
    }

    /// Whether this rule is active for a client at `version`. Rules without a
    /// recognisable version gate are treated as always active.
    pub fn is_active_for(&self, version: &str) -> bool {
        self.version_gate().is_none_or(|gate| gate.is_active(version))
    }

    /// Copy of the rule with its `id` removed.
    pub fn without_id(&self) -> Self {
        Self {
            id: None,
            ..self.clone()
        }
    }

    /// Pretty-printed JSON in field declaration order.
    pub fn to_pretty_json(&self) -> Result<String, RuleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Pretty-printed JSON with keys in alphabetical order.
    pub fn to_sorted_json(&self) -> Result<String, RuleError> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Whether two rules describe the same exception: same tracker pattern,
    /// bug set, feature set and content-blocking-category set.
    ///
    /// Set fields compare without regard to order. An absent
    /// `filterContentBlockingCategories` only matches another absent one.
    pub fn same_identity(&self, other: &Rule) -> bool {
        self.url_pattern == other.url_pattern
            && set_eq(&self.bug_ids, &other.bug_ids)
            && set_eq(&self.classifier_features, &other.classifier_features)
            && opt_set_eq(
                self.filter_content_blocking_categories.as_deref(),
                other.filter_content_blocking_categories.as_deref(),
            )
    }

    /// Whether writing `self` over `other` would change the stored record.
    /// Ignores `id`.
    pub fn same_content(&self, other: &Rule) -> bool {
        self.same_identity(other)
            && self.category == other.category
            && self.top_level_url_pattern == other.top_level_url_pattern
            && self.is_private_browsing_only == other.is_private_browsing_only
            && self.filter_expression == other.filter_expression
    }
}

/// The wildcard pattern matching every URL on `host`.
pub fn host_pattern(host: &str) -> String {
    format!("*://{host}/*")
}

/// Parse a Remote Settings listing, skipping records that fail validation.
pub fn parse_records(values: Vec<Value>) -> Vec<Rule> {
    let mut rules = Vec::with_capacity(values.len());
    for value in values {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<no id>")
            .to_string();
        match Rule::from_value(value) {
            Ok(rule) => rules.push(rule),
            Err(e) => warn!(record_id = %id, error = %e, "skipping malformed exception record"),
        }
    }
    rules
}

fn set_eq(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}

fn opt_set_eq(a: Option<&[String]>, b: Option<&[String]>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => set_eq(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RECORD_ID: &str = "2a50e5fa-4762-4a3b-a5d0-53a7e9bbe91a";

    #[test]
    fn legacy_bug_id_is_normalised() {
        let rule = Rule::from_value(json!({
            "id": RECORD_ID,
            "bugId": "123456",
            "urlPattern": "*://example.com/*",
            "classifierFeatures": ["tracking-protection"],
            "topLevelUrlPattern": "*://example.net/*",
            "isPrivateBrowsingOnly": true,
            "filterContentBlockingCategories": ["standard"]
        }))
        .unwrap();

        assert_eq!(rule.id.as_deref(), Some(RECORD_ID));
        assert_eq!(rule.bug_ids, vec!["123456"]);
        assert_eq!(rule.url_pattern, "*://example.com/*");
        assert_eq!(rule.classifier_features, vec!["tracking-protection"]);
        assert_eq!(rule.top_level_url_pattern.as_deref(), Some("*://example.net/*"));
        assert_eq!(rule.is_private_browsing_only, Some(true));
        assert_eq!(
            rule.filter_content_blocking_categories,
            Some(vec!["standard".to_string()])
        );
    }

    #[test]
    fn empty_bug_ids_fall_back_to_legacy_field() {
        let rule = Rule::from_value(json!({
            "bugIds": [],
            "bugId": 42,
            "urlPattern": "*://example.com/*",
            "classifierFeatures": ["tracking-protection"]
        }))
        .unwrap();
        assert_eq!(rule.bug_ids, vec!["42"]);

        let err = Rule::from_value(json!({
            "bugIds": [],
            "urlPattern": "*://example.com/*",
            "classifierFeatures": ["tracking-protection"]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("no bug ids"));
    }

    #[test]
    fn legacy_field_never_written_back() {
        let rule = Rule::from_value(json!({
            "id": RECORD_ID,
            "bugId": "123456",
            "urlPattern": "*://example.com/*",
            "classifierFeatures": ["tracking-protection"]
        }))
        .unwrap();
        let out = serde_json::to_value(&rule).unwrap();
        assert!(out.get("bugId").is_none());
        assert_eq!(out["bugIds"], json!(["123456"]));
    }

    #[test]
    fn bug_ids_list_parses_unchanged() {
        let rule = Rule::from_value(json!({
            "id": RECORD_ID,
            "bugIds": ["123456", "654321"],
            "urlPattern": "*://example.com/*",
            "classifierFeatures": ["tracking-protection"]
        }))
        .unwrap();
        assert_eq!(rule.bug_ids, vec!["123456", "654321"]);
    }

    #[test]
    fn numeric_bug_ids_accepted() {
        let rule = Rule::from_value(json!({
            "bugIds": [123456, "654321"],
            "urlPattern": "*://example.com/*",
            "classifierFeatures": ["tracking-protection"]
        }))
        .unwrap();
        assert_eq!(rule.bug_ids, vec!["123456", "654321"]);
    }

    #[test]
    fn absent_optional_fields_stay_absent() {
        let rule = Rule::from_value(json!({
            "id": RECORD_ID,
            "bugId": "123456",
            "urlPattern": "*://example.com/*",
            "classifierFeatures": ["tracking-protection"],
            "last_modified": 1700000000000u64,
            "schema": 1700000000000u64
        }))
        .unwrap();
        assert_eq!(rule.category, Category::Convenience);

        let out = serde_json::to_value(&rule).unwrap();
        let obj = out.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["bugIds", "category", "classifierFeatures", "id", "urlPattern"]
        );
    }

    #[test]
    fn filter_expression_keeps_snake_case_name() {
        let rule = Rule::new(
            vec!["1".into()],
            "*://a.example/*",
            vec!["tracking-protection".into()],
            Category::Baseline,
        )
        .with_version_gate(&VersionGate::at_least("142.0a1"));
        let out = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            out["filter_expression"],
            json!(r#"env.version|versionCompare("142.0a1") >= 0"#)
        );
        assert_eq!(out["category"], json!("baseline"));
        assert!(out.get("id").is_none());
    }

    #[test]
    fn missing_required_fields_rejected() {
        let err = Rule::from_value(json!({
            "urlPattern": "*://example.com/*",
            "classifierFeatures": ["tracking-protection"]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("no bug ids"));

        assert!(
            Rule::from_value(json!({
                "bugIds": ["1"],
                "classifierFeatures": ["tracking-protection"]
            }))
            .is_err()
        );
        assert!(
            Rule::from_value(json!({
                "bugIds": ["1"],
                "urlPattern": "*://example.com/*",
                "classifierFeatures": []
            }))
            .is_err()
        );
    }

    #[test]
    fn parse_records_skips_malformed() {
        let rules = parse_records(vec![
            json!({"id": "a", "bugIds": ["1"], "urlPattern": "*://a/*", "classifierFeatures": ["x"]}),
            json!({"id": "b", "urlPattern": "*://b/*"}),
            json!({"id": "c", "bugId": 3, "urlPattern": "*://c/*", "classifierFeatures": ["y"]}),
        ]);
        let ids: Vec<_> = rules.iter().map(|r| r.id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn global_and_blocking_predicates() {
        let rule = Rule::new(
            vec!["1".into()],
            "*://t.example/*",
            vec!["tracking-annotation".into(), "fingerprinting-protection".into()],
            Category::Baseline,
        );
        assert!(rule.is_global());
        assert!(rule.is_blocking());

        let scoped = rule.clone().with_top_level_url_pattern("*://site.example/*");
        assert!(!scoped.is_global());

        let annotation_only = Rule::new(
            vec!["1".into()],
            "*://t.example/*",
            vec!["tracking-annotation".into()],
            Category::Baseline,
        );
        assert!(!annotation_only.is_blocking());
    }

    #[test]
    fn identity_ignores_set_order() {
        let a = Rule::new(
            vec!["1".into(), "2".into()],
            "*://t.example/*",
            vec!["A".into(), "B".into()],
            Category::Baseline,
        );
        let b = Rule::new(
            vec!["2".into(), "1".into()],
            "*://t.example/*",
            vec!["B".into(), "A".into()],
            Category::Convenience,
        );
        assert!(a.same_identity(&b));
        assert!(!a.same_content(&b));
    }

    #[test]
    fn identity_distinguishes_content_blocking_categories() {
        let base = Rule::new(
            vec!["1".into()],
            "*://t.example/*",
            vec!["tracking-protection".into()],
            Category::Convenience,
        );
        let standard = base
            .clone()
            .with_content_blocking_categories(vec!["standard".into()]);
        assert!(!base.same_identity(&standard));
        assert!(standard.same_identity(&standard.clone()));
    }

    #[test]
    fn sorted_json_orders_keys() {
        let rule = Rule::new(
            vec!["1".into()],
            "*://t.example/*",
            vec!["tracking-protection".into()],
            Category::Convenience,
        );
        let text = rule.to_sorted_json().unwrap();
        let bug = text.find("bugIds").unwrap();
        let cat = text.find("category").unwrap();
        let url = text.find("urlPattern").unwrap();
        assert!(bug < cat && cat < url);
    }

    #[test]
    fn host_pattern_wraps_host() {
        assert_eq!(host_pattern("tracker.example"), "*://tracker.example/*");
        assert_eq!(host_pattern("*.cdn.example"), "*://*.cdn.example/*");
    }

    #[test]
    fn without_id_strips_only_id() {
        let mut rule = Rule::new(
            vec!["1".into()],
            "*://t.example/*",
            vec!["tracking-protection".into()],
            Category::Convenience,
        );
        rule.id = Some(RECORD_ID.into());
        let stripped = rule.without_id();
        assert!(stripped.id.is_none());
        assert!(stripped.same_content(&rule));
        assert!(!stripped.to_pretty_json().unwrap().contains(RECORD_ID));
    }
}
