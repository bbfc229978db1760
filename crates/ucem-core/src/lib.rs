pub mod annotation;
pub mod bug;
pub mod config;
pub mod derive;
pub mod exemption;
pub mod rule;
pub mod version;

pub use bug::{Bug, BugList};
pub use config::Tier;
pub use derive::{BugState, Derivation, DerivationPolicy, Deriver, Exclusion};
pub use exemption::GlobalExemptions;
pub use rule::{Category, Rule, RuleError, parse_records};
pub use version::VersionGate;
