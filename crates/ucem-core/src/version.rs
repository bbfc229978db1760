//! Version gates for temporal rule variants.
//!
//! Derived rules come in pairs gated on the browser version through a
//! `filter_expression` such as `env.version|versionCompare("142.0a1") >= 0`.
//! This module renders and parses those expressions and evaluates them the way
//! the client does, so the pair can be checked for mutual exclusivity.
//!
//! # Version format
//!
//! Versions are dot-separated parts. Each part is read as
//! `<number-a><string-b><number-c><string-d>`:
//!
//! - `142`   → (142, "", 0, "")
//! - `0a1`   → (0, "a", 1, "")
//! - `0b12pre` → (0, "b", 12, "pre")
//!
//! Numbers compare numerically, strings byte-wise, and an absent string sorts
//! *after* any present one (`142.0` is newer than `142.0a1`). Missing parts
//! compare as `0`.

use std::cmp::Ordering;
use std::fmt;

/// The version at which derived rules switch from the "before" to the "after" variant.
pub const CUTOVER_VERSION: &str = "142.0a1";

const EXPR_PREFIX: &str = "env.version|versionCompare(\"";
const EXPR_SUFFIX: &str = "\")";

/// Comparison applied to `versionCompare(..)`'s result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOp {
    /// `>= 0`: active at and after the gate version.
    AtLeast,
    /// `< 0`: active strictly before the gate version.
    Before,
}

/// A parsed `env.version|versionCompare("X") <op> 0` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGate {
    pub version: String,
    pub op: GateOp,
}

impl VersionGate {
    pub fn at_least(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            op: GateOp::AtLeast,
        }
    }

    pub fn before(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            op: GateOp::Before,
        }
    }

    /// Parse a filter expression. Returns `None` for anything that is not a
    /// plain version gate.
    pub fn parse(expr: &str) -> Option<Self> {
        let rest = expr.trim().strip_prefix(EXPR_PREFIX)?;
        let end = rest.find(EXPR_SUFFIX)?;
        let version = &rest[..end];
        let tail = rest[end + EXPR_SUFFIX.len()..].trim();

        let op = if let Some(rhs) = tail.strip_prefix(">=") {
            (rhs.trim() == "0").then_some(GateOp::AtLeast)?
        } else if let Some(rhs) = tail.strip_prefix('<') {
            (rhs.trim() == "0").then_some(GateOp::Before)?
        } else {
            return None;
        };

        if version.is_empty() {
            return None;
        }
        Some(Self {
            version: version.to_string(),
            op,
        })
    }

    /// Whether the gate is active for the given client version.
    pub fn is_active(&self, client_version: &str) -> bool {
        let ord = compare_versions(client_version, &self.version);
        match self.op {
            GateOp::AtLeast => ord != Ordering::Less,
            GateOp::Before => ord == Ordering::Less,
        }
    }

    /// The gate that is active exactly when this one is not.
    pub fn complement(&self) -> Self {
        Self {
            version: self.version.clone(),
            op: match self.op {
                GateOp::AtLeast => GateOp::Before,
                GateOp::Before => GateOp::AtLeast,
            },
        }
    }
}

impl fmt::Display for VersionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            GateOp::AtLeast => ">=",
            GateOp::Before => "<",
        };
        write!(f, "{EXPR_PREFIX}{}{EXPR_SUFFIX} {op} 0", self.version)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct VersionPart<'a> {
    a: u64,
    b: &'a str,
    c: u64,
    d: &'a str,
}

impl<'a> VersionPart<'a> {
    fn parse(s: &'a str) -> Self {
        let (a, rest) = split_number(s);
        let (b, rest) = split_string(rest);
        let (c, d) = split_number(rest);
        Self { a, b, c, d }
    }
}

impl Ord for VersionPart<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.a
            .cmp(&other.a)
            .then_with(|| compare_str_part(self.b, other.b))
            .then_with(|| self.c.cmp(&other.c))
            .then_with(|| compare_str_part(self.d, other.d))
    }
}

impl PartialOrd for VersionPart<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Empty string parts sort after non-empty ones.
fn compare_str_part(x: &str, y: &str) -> Ordering {
    match (x.is_empty(), y.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.cmp(y),
    }
}

fn split_number(s: &str) -> (u64, &str) {
    let end = s
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(s.len());
    let n = s[..end].parse().unwrap_or(0);
    (n, &s[end..])
}

fn split_string(s: &str) -> (&str, &str) {
    let end = s
        .bytes()
        .position(|b| b.is_ascii_digit())
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// Compare two toolkit-style version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.trim().split('.').collect();
    let right: Vec<&str> = b.trim().split('.').collect();
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).map(|s| VersionPart::parse(s)).unwrap_or_default();
        let r = right.get(i).map(|s| VersionPart::parse(s)).unwrap_or_default();
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
