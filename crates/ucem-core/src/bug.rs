//! Bug records as returned by the Bugzilla REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Status that takes a bug out of automatic processing.
pub const STATUS_REOPENED: &str = "REOPENED";

/// Fields requested from Bugzilla for every bug.
pub const BUG_FIELDS: &str = "id,last_change_time,summary,platform,url,whiteboard,status,resolution,severity,priority,cf_user_story";

/// One bug, restricted to [`BUG_FIELDS`].
///
/// String fields that Bugzilla omits deserialize as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bug {
    pub id: u64,
    pub status: String,
    pub resolution: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub whiteboard: String,
    #[serde(rename = "cf_user_story", deserialize_with = "null_as_empty")]
    pub user_story: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub url: String,
    pub severity: String,
    pub priority: String,
    pub summary: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change_time: Option<DateTime<Utc>>,
}

impl Bug {
    /// Bug id as it appears in a rule's `bugIds`.
    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    pub fn is_reopened(&self) -> bool {
        self.status == STATUS_REOPENED
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Envelope of `GET /rest/bug`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BugList {
    #[serde(default)]
    pub bugs: Vec<Bug>,
}
