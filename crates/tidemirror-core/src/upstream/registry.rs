//! Static mirror catalogue.
//!
//! Targets are registered once and never change. The weighted index for each
//! protocol version is built lazily on first use and then only read, so
//! concurrent fetches share it without locking.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock, OnceLock};
use tidemirror_types::{default_targets, MirrorConfig, ProtocolVersion, Region, Target, TargetConfig};
use url::Url;

use super::proxy_decider::matches_target;
use super::selector::{build_weighted, WeightedTarget};
use crate::error::{FetchError, FetchResult};

/// Weight given to v2 mirrors when they back up a v1 request.
pub const V1_FALLBACK_WEIGHT: u32 = 1;

/// Registry over the built-in catalogue.
pub static DEFAULT_REGISTRY: LazyLock<Arc<TargetRegistry>> =
    LazyLock::new(|| Arc::new(TargetRegistry::from_configs(&default_targets())));

pub struct TargetRegistry {
    /// Valid targets in registration order
    targets: Vec<Target>,
    v1_weighted: OnceLock<Vec<WeightedTarget>>,
    v2_weighted: OnceLock<Vec<WeightedTarget>>,
}

impl TargetRegistry {
    /// Register already-validated targets. Later duplicates of a name are dropped.
    pub fn from_targets(targets: Vec<Target>) -> Self {
        let mut seen = HashSet::new();
        let targets = targets
            .into_iter()
            .filter(|t| {
                let fresh = seen.insert(t.name.clone());
                if !fresh {
                    tracing::warn!(mirror = %t.name, "Skipping duplicate target name");
                }
                fresh
            })
            .collect();
        Self { targets, v1_weighted: OnceLock::new(), v2_weighted: OnceLock::new() }
    }

    /// Register config entries, skipping those with a non-positive weight or bad base URL.
    pub fn from_configs(configs: &[TargetConfig]) -> Self {
        let targets: Vec<Target> = configs
            .iter()
            .filter_map(|config| match Target::try_from(config) {
                Ok(target) => Some(target),
                Err(e) => {
                    tracing::warn!("Skipping invalid target: {}", e);
                    None
                },
            })
            .collect();

        tracing::info!(
            configured = configs.len(),
            valid = targets.len(),
            "Mirror registry initialized"
        );
        Self::from_targets(targets)
    }

    pub fn from_config(config: &MirrorConfig) -> Self {
        Self::from_configs(&config.targets)
    }

    /// Every valid target in registration order, regardless of version.
    pub fn registered(&self) -> &[Target] {
        &self.targets
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Targets eligible for `version`.
    ///
    /// v1 callers also get every v2 mirror at [`V1_FALLBACK_WEIGHT`], so a v1
    /// request never fails only because the v1 pool is down.
    pub fn all_targets(&self, version: ProtocolVersion) -> Vec<Target> {
        let native = self.targets.iter().filter(|t| t.version == version).cloned();
        match version {
            ProtocolVersion::V2 => native.collect(),
            ProtocolVersion::V1 => native
                .chain(
                    self.targets
                        .iter()
                        .filter(|t| t.version == ProtocolVersion::V2)
                        .map(|t| t.with_weight(V1_FALLBACK_WEIGHT)),
                )
                .collect(),
        }
    }

    /// Targets in a region partition. `auto` is every target; unknown names yield nothing.
    pub fn targets_for_region(&self, region: &str) -> Vec<Target> {
        match Region::parse(region) {
            Some(region) => self.targets_in(region),
            None => {
                tracing::warn!(region = %region, "Unknown region requested");
                Vec::new()
            },
        }
    }

    pub fn targets_in(&self, region: Region) -> Vec<Target> {
        match region {
            Region::Auto => self.targets.clone(),
            named => self.targets.iter().filter(|t| t.region == named).cloned().collect(),
        }
    }

    /// First registered target for `version`; the deterministic preferred mirror.
    pub fn primary_target(&self, version: ProtocolVersion) -> Option<Target> {
        self.all_targets(version).into_iter().next()
    }

    /// Cached cumulative-weight index for `version`.
    pub fn weighted(&self, version: ProtocolVersion) -> FetchResult<&[WeightedTarget]> {
        let cell = match version {
            ProtocolVersion::V1 => &self.v1_weighted,
            ProtocolVersion::V2 => &self.v2_weighted,
        };
        let weighted = cell.get_or_init(|| {
            let built = build_weighted(&self.all_targets(version));
            tracing::debug!(version = %version, targets = built.len(), "Built weighted target index");
            built
        });
        if weighted.is_empty() {
            return Err(FetchError::NoValidTargets { scope: version.to_string() });
        }
        Ok(weighted)
    }

    /// Weighted index for `version` narrowed to `region`.
    ///
    /// An empty region partition falls back to the full index rather than failing.
    pub fn weighted_in(
        &self,
        version: ProtocolVersion,
        region: Region,
    ) -> FetchResult<Vec<WeightedTarget>> {
        let all = self.weighted(version)?;
        if region == Region::Auto {
            return Ok(all.to_vec());
        }

        let in_region: Vec<Target> = all
            .iter()
            .filter(|w| w.target.region == region)
            .map(|w| w.target.clone())
            .collect();
        if in_region.is_empty() {
            tracing::debug!(region = %region, "Region partition empty, using auto");
            return Ok(all.to_vec());
        }
        Ok(build_weighted(&in_region))
    }

    /// The registered target `url` currently addresses.
    ///
    /// When several match, the one with the longest base path wins; ties go to
    /// the earliest registered.
    pub fn target_for_url(&self, url: &Url) -> Option<&Target> {
        self.targets
            .iter()
            .filter(|t| matches_target(url, t))
            .fold(None, |best: Option<&Target>, candidate| match best {
                Some(current)
                    if current.base_path().trim_end_matches('/').len()
                        >= candidate.base_path().trim_end_matches('/').len() =>
                {
                    Some(current)
                },
                _ => Some(candidate),
            })
    }
}
