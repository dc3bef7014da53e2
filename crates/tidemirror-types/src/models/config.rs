//! Static mirror configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use super::target::{ProtocolVersion, Region, TargetKind};
use crate::error::ConfigError;

/// One mirror entry as written in the config file.
///
/// Weight and base URL are deliberately unchecked here: entries with a
/// non-positive weight or an unparsable URL are skipped when the registry is
/// built rather than failing the whole config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct TargetConfig {
    /// Unique mirror name
    #[validate(length(min = 1_u64))]
    pub name: String,
    /// Absolute URL the mirror is rooted at
    pub base_url: String,
    /// Relative selection weight
    #[serde(default = "default_weight")]
    pub weight: i64,
    /// Browser-side requests must go through the same-origin proxy
    #[serde(default)]
    pub requires_proxy: bool,
    /// API generation served by this mirror
    #[serde(default)]
    pub version: ProtocolVersion,
    /// Region partition
    #[serde(default)]
    pub region: Region,
    /// Operator of the mirror
    #[serde(default)]
    pub kind: TargetKind,
}

fn default_weight() -> i64 {
    10
}

impl TargetConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, weight: i64) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            weight,
            requires_proxy: false,
            version: ProtocolVersion::V2,
            region: Region::Auto,
            kind: TargetKind::Official,
        }
    }

    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn requires_proxy(mut self, requires_proxy: bool) -> Self {
        self.requires_proxy = requires_proxy;
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn kind(mut self, kind: TargetKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Same-origin reverse proxy used for mirrors that block cross-origin requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ProxySettings {
    /// Route `requires_proxy` targets through the endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Proxy endpoint; requests become `{endpoint}?url=<encoded target URL>`
    #[validate(url)]
    #[serde(default = "default_proxy_endpoint")]
    pub endpoint: String,
}

fn default_proxy_endpoint() -> String {
    "http://127.0.0.1:8045/api/proxy".to_string()
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self { enabled: false, endpoint: default_proxy_endpoint() }
    }
}

/// Attempt loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct FetchSettings {
    /// Deadline for a single mirror attempt, in seconds
    #[validate(range(min = 1_u64, max = 300_u64))]
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Lower bound on attempts per call; short target lists are cycled
    #[validate(range(min = 1_usize, max = 10_usize))]
    #[serde(default = "default_min_attempts")]
    pub min_attempts: usize,
    /// Header sent to community mirrors
    #[validate(length(min = 1_u64))]
    #[serde(default = "default_client_header_name")]
    pub client_header_name: String,
    #[validate(length(min = 1_u64))]
    #[serde(default = "default_client_header_value")]
    pub client_header_value: String,
}

fn default_attempt_timeout_secs() -> u64 {
    15
}

fn default_min_attempts() -> usize {
    3
}

fn default_client_header_name() -> String {
    "x-client".to_string()
}

fn default_client_header_value() -> String {
    concat!("tidemirror/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: default_attempt_timeout_secs(),
            min_attempts: default_min_attempts(),
            client_header_name: default_client_header_name(),
            client_header_value: default_client_header_value(),
        }
    }
}

impl FetchSettings {
    /// Field validation, reported under the `fetch.` prefix.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|errors| match ConfigError::from(errors) {
            ConfigError::Validation { field, message } => {
                ConfigError::validation(format!("fetch.{}", field), message)
            },
            other => other,
        })
    }
}

/// Full static configuration, loaded once at process start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct MirrorConfig {
    #[serde(default = "default_targets")]
    #[validate(nested)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    #[validate(nested)]
    pub proxy: ProxySettings,
    #[serde(default)]
    #[validate(nested)]
    pub fetch: FetchSettings,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            proxy: ProxySettings::default(),
            fetch: FetchSettings::default(),
        }
    }
}

impl MirrorConfig {
    /// Field validation plus the cross-entry rule that target names are unique.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.name.as_str()) {
                return Err(ConfigError::validation(
                    format!("targets.{}", target.name),
                    "duplicate target name",
                ));
            }
        }
        Ok(())
    }
}

/// Built-in mirror catalogue used when no config file is present.
///
/// Registration order matters: the first entry of each protocol version is
/// its primary mirror.
pub fn default_targets() -> Vec<TargetConfig> {
    vec![
        TargetConfig::new("hifi-main", "https://hifi.tidemirror.net", 30),
        TargetConfig::new("hifi-edge", "https://edge.tidemirror.net/api", 20).requires_proxy(true),
        TargetConfig::new("hifi-community", "https://hifi.community-mirror.org", 10)
            .kind(TargetKind::Custom),
        TargetConfig::new("legacy-main", "https://legacy.tidemirror.net/v1", 25)
            .version(ProtocolVersion::V1),
        TargetConfig::new("legacy-backup", "https://legacy-backup.tidemirror.net", 10)
            .version(ProtocolVersion::V1)
            .requires_proxy(true),
    ]
}
