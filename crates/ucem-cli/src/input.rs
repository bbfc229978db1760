//! Reading operator-supplied files.

use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use clap::ValueEnum;
use serde_json::Value;
use ucem_core::Rule;

/// Load a JSON array of exception records.
pub fn load_rules_file(path: &Path) -> anyhow::Result<Vec<Rule>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let Value::Array(records) = value else {
        bail!("{} must contain a JSON array of exceptions", path.display());
    };
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            Rule::from_value(record)
                .with_context(|| format!("exception #{} in {}", i + 1, path.display()))
        })
        .collect()
}

/// One bug id per line; blank lines are ignored.
pub fn read_bug_ids(path: &Path) -> anyhow::Result<Vec<u64>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let line = line.trim();
            line.parse::<u64>().with_context(|| {
                format!("{}:{}: invalid bug id `{line}`", path.display(), n + 1)
            })
        })
        .collect()
}

/// Canned closing comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClosePreset {
    NoImpact,
    NotFound,
    SiteDown,
    FixedPi,
}

impl ClosePreset {
    pub fn message(self) -> &'static str {
        match self {
            ClosePreset::NoImpact => {
                "This bug does not impact website functionality and is therefore closed. If this automated assessment is incorrect, please edit the bug description in comment 0 accordingly or open another bug."
            }
            ClosePreset::NotFound => {
                "The URL specified in this bug is returning error code 404. If you can still reproduce the issue with by altering the URL, please update the URL field and reopen the bug."
            }
            ClosePreset::SiteDown => {
                "Site seems down. Feel free to reopen if this becomes reproducible again."
            }
            ClosePreset::FixedPi => {
                "This bug has been fixed by a permanent intervention.\n\nThis is an automated assessment, if this bug still reproduces for you in the most recent Nightly version, please reopen."
            }
        }
    }
}
