//! Configuration passed in at construction time.

use std::{fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::TargetInfo;

/// Default address matched against target URLs.
pub const DEFAULT_TARGET_ADDRESS: &str = "localhost:4000";
/// Default output file.
pub const DEFAULT_OUTPUT_PATH: &str = "console-logs.txt";

/// Selects which remote target to attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// Exact target id; takes precedence over `address` when set.
    #[serde(default)]
    pub id: Option<String>,
    /// Substring matched against each target's URL.
    pub address: String,
}

impl TargetDescriptor {
    /// Match targets by URL substring.
    #[must_use]
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            id: None,
            address: address.into(),
        }
    }

    /// Whether a listed target is the one configured.
    #[must_use]
    pub fn matches(&self, target: &TargetInfo) -> bool {
        match &self.id {
            Some(id) => target.id == *id,
            None => target.url.contains(&self.address),
        }
    }

    /// First matching target in listing order.
    #[must_use]
    pub fn select<'a>(&self, targets: &'a [TargetInfo]) -> Option<&'a TargetInfo> {
        targets.iter().find(|t| self.matches(t))
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "target {id}"),
            None => write!(f, "http://{}", self.address),
        }
    }
}

impl Default for TargetDescriptor {
    fn default() -> Self {
        Self::address(DEFAULT_TARGET_ADDRESS)
    }
}

/// Bounds for remote object expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializerConfig {
    /// Nesting depth at which handles stop being expanded.
    pub max_depth: usize,
    /// Per-handle property fetch timeout.
    #[serde(rename = "fetch_timeout_ms", with = "millis")]
    pub fetch_timeout: Duration,
    /// Property fetches allowed for one event, across all its arguments.
    pub max_fetches: usize,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            fetch_timeout: Duration::from_secs(5),
            max_fetches: 1000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub target: TargetDescriptor,
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    pub output_path: PathBuf,
    pub materializer: MaterializerConfig,
    /// Upper bound for one whole connection attempt.
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            target: TargetDescriptor::default(),
            poll_interval: Duration::from_secs(5),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            materializer: MaterializerConfig::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
