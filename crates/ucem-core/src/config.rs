//! Deployment tiers and the service endpoints behind them.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const BUCKET: &str = "main-workspace";
pub const COLLECTION: &str = "url-classifier-exceptions";

pub const DEV_SERVER_LOCATION: &str = "https://remote-settings-dev.allizom.org/v1";
pub const STAGE_SERVER_LOCATION: &str = "https://remote-settings.allizom.org/v1";
pub const PROD_SERVER_LOCATION: &str = "https://remote-settings.mozilla.org/v1";

pub const STAGE_RECORDS_LOCATION: &str = "https://firefox.settings.services.allizom.org/v1/buckets/main/collections/url-classifier-exceptions/records";
pub const PROD_RECORDS_LOCATION: &str = "https://firefox.settings.services.mozilla.com/v1/buckets/main/collections/url-classifier-exceptions/records";

pub const BUGZILLA_REST_LOCATION: &str = "https://bugzilla.mozilla.org/rest";
pub const DEFAULT_PRODUCT: &str = "Web Compatibility";
pub const DEFAULT_COMPONENT: &str = "Privacy: Site Reports";
/// Bugzilla's spelling of "no resolution", i.e. open bugs.
pub const OPEN_RESOLUTION: &str = "---";

#[derive(Debug, Error)]
#[error("unknown server tier `{0}` (expected dev, stage or prod)")]
pub struct UnknownTier(String);

/// A Remote Settings deployment tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Dev,
    Stage,
    Prod,
}

impl Tier {
    /// Writer endpoint for the tier.
    pub fn server_location(self) -> &'static str {
        match self {
            Tier::Dev => DEV_SERVER_LOCATION,
            Tier::Stage => STAGE_SERVER_LOCATION,
            Tier::Prod => PROD_SERVER_LOCATION,
        }
    }

    /// Read-only listing of published records. Dev publishes nothing.
    pub fn published_records_location(self) -> Option<&'static str> {
        match self {
            Tier::Dev => None,
            Tier::Stage => Some(STAGE_RECORDS_LOCATION),
            Tier::Prod => Some(PROD_RECORDS_LOCATION),
        }
    }

    /// Tier whose published snapshot confirms deployment for a run against `self`.
    pub fn snapshot_tier(self) -> Tier {
        match self {
            Tier::Prod => Tier::Prod,
            Tier::Dev | Tier::Stage => Tier::Stage,
        }
    }

    /// Dev has no review step; pending changes are approved directly.
    pub fn requires_review(self) -> bool {
        self != Tier::Dev
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Dev => "dev",
            Tier::Stage => "stage",
            Tier::Prod => "prod",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Tier::Dev),
            "stage" => Ok(Tier::Stage),
            "prod" => Ok(Tier::Prod),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}
