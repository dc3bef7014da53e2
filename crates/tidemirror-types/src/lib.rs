//! # Tidemirror Types
//!
//! Mirror target and configuration models shared across the Tidemirror crates.
//!
//! - **`error`** - Typed configuration errors
//! - **`models`** - Targets, protocol versions, regions and the static `MirrorConfig`
//!
//! ## Architecture Role
//!
//! ```text
//!      tidemirror-types (this crate)
//!               │
//!               ▼
//!        tidemirror-core
//!               │
//!               ▼
//!        tidemirror-cli
//! ```
//!
//! Config types are serde-serializable so they can be loaded from JSON. Resolved
//! [`Target`]s carry a parsed base URL and are only built by validated conversion.

pub mod error;
pub mod models;

pub use error::ConfigError;

pub use models::{
    default_targets, FetchSettings, MirrorConfig, ProtocolVersion, ProxySettings, Region,
    Target, TargetConfig, TargetKind,
};
