//! Domain models for Tidemirror.

mod config;
mod target;

pub use config::{default_targets, FetchSettings, MirrorConfig, ProxySettings, TargetConfig};
pub use target::{ProtocolVersion, Region, Target, TargetKind};
