//! Mirror target models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use super::config::TargetConfig;
use crate::error::ConfigError;

/// Generation of the upstream API a mirror speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    V1,
    #[default]
    V2,
}

impl ProtocolVersion {
    pub const ALL: [ProtocolVersion; 2] = [ProtocolVersion::V1, ProtocolVersion::V2];

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "v1",
            ProtocolVersion::V2 => "v2",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(ProtocolVersion::V1),
            "v2" | "2" => Ok(ProtocolVersion::V2),
            other => Err(format!("unknown protocol version '{}', expected v1 or v2", other)),
        }
    }
}

/// Region partition a target belongs to.
///
/// `Auto` is the union of every known target; `Us` and `Eu` are named subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Auto,
    Us,
    Eu,
}

impl Region {
    /// Parse a region name. Returns `None` for names outside `auto`/`us`/`eu`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Region::Auto),
            "us" => Some(Region::Us),
            "eu" => Some(Region::Eu),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Region::Auto => "auto",
            Region::Us => "us",
            Region::Eu => "eu",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::parse(s).ok_or_else(|| format!("unknown region '{}', expected auto, us or eu", s))
    }
}

/// Who operates a mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Run by the catalogue operator
    #[default]
    Official,
    /// Community-hosted mirror; requests carry the client-identifying header
    Custom,
}

/// A validated mirror endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub base_url: Url,
    pub weight: u32,
    pub requires_proxy: bool,
    pub version: ProtocolVersion,
    pub region: Region,
    pub kind: TargetKind,
}

impl Target {
    /// Base path the mirror is rooted at (`/` when the base URL has none).
    pub fn base_path(&self) -> &str {
        self.base_url.path()
    }

    pub fn origin(&self) -> url::Origin {
        self.base_url.origin()
    }

    pub fn is_custom(&self) -> bool {
        self.kind == TargetKind::Custom
    }

    /// Copy of this target with a different selection weight.
    pub fn with_weight(&self, weight: u32) -> Self {
        Self { weight, ..self.clone() }
    }
}

impl TryFrom<&TargetConfig> for Target {
    type Error = ConfigError;

    fn try_from(config: &TargetConfig) -> Result<Self, Self::Error> {
        let field = |name: &str| format!("targets.{}.{}", config.name, name);

        if config.weight <= 0 {
            return Err(ConfigError::validation(
                field("weight"),
                format!("weight must be positive, got {}", config.weight),
            ));
        }
        let weight = u32::try_from(config.weight).map_err(|_| {
            ConfigError::validation(field("weight"), format!("weight {} too large", config.weight))
        })?;

        let base_url = Url::parse(config.base_url.trim())
            .map_err(|e| ConfigError::validation(field("base_url"), e.to_string()))?;
        if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
            return Err(ConfigError::validation(
                field("base_url"),
                format!("'{}' is not an absolute http(s) URL", config.base_url),
            ));
        }

        Ok(Self {
            name: config.name.clone(),
            base_url,
            weight,
            requires_proxy: config.requires_proxy,
            version: config.version,
            region: config.region,
            kind: config.kind,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(name: &str, base_url: &str, weight: i64) -> TargetConfig {
        TargetConfig {
            name: name.to_string(),
            base_url: base_url.to_string(),
            weight,
            requires_proxy: false,
            version: ProtocolVersion::V2,
            region: Region::Auto,
            kind: TargetKind::Official,
        }
    }

    #[test]
    fn test_target_from_valid_config() {
        let target = Target::try_from(&config("a", "https://a.example/base", 30)).unwrap();
        assert_eq!(target.name, "a");
        assert_eq!(target.weight, 30);
        assert_eq!(target.base_path(), "/base");
    }

    #[test]
    fn test_target_without_path_has_root_base() {
        let target = Target::try_from(&config("a", "https://a.example", 1)).unwrap();
        assert_eq!(target.base_path(), "/");
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        assert!(Target::try_from(&config("zero", "https://a.example", 0)).is_err());
        let err = Target::try_from(&config("neg", "https://a.example", -4)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "targets.neg.weight"));
    }

    #[test]
    fn test_unparsable_base_url_rejected() {
        assert!(Target::try_from(&config("bad", "not a url", 10)).is_err());
        assert!(Target::try_from(&config("mailto", "mailto:someone@example.com", 10)).is_err());
    }

    #[test]
    fn test_region_parse() {
        assert_eq!(Region::parse("EU"), Some(Region::Eu));
        assert_eq!(Region::parse(" auto "), Some(Region::Auto));
        assert_eq!(Region::parse("apac"), None);
        assert!("apac".parse::<Region>().is_err());
    }

    #[test]
    fn test_protocol_version_serde() {
        let json = serde_json::to_string(&ProtocolVersion::V1).unwrap();
        assert_eq!(json, "\"v1\"");
        let parsed: ProtocolVersion = serde_json::from_str("\"v2\"").unwrap();
        assert_eq!(parsed, ProtocolVersion::V2);
        assert_eq!("V1".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V1);
    }
}
