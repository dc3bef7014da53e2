//! # Tidemirror Core
//!
//! Resilient fetching over a weighted pool of interchangeable mirrors.
//!
//! ```text
//! tidemirror-core/src/
//! ├── upstream/
//! │   ├── registry.rs       # Mirror catalogue, version/region views, cached weights
//! │   ├── selector.rs       # Weighted random pick
//! │   ├── rewrite.rs        # Re-rooting URLs between mirror bases
//! │   ├── proxy_decider.rs  # Routing through the same-origin proxy
//! │   ├── classifier.rs     # Accept / error / disguised error / invalid
//! │   ├── transport.rs      # One HTTP request per attempt
//! │   └── client/           # MirrorClient and the failover loop
//! └── modules/config.rs     # mirrors.json loading and saving
//! ```

#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::indexing_slicing
    )
)]

pub mod error;
pub mod modules;
pub mod upstream;

pub use error::{FetchError, FetchResult, TransportError, TransportErrorKind};
pub use modules::config::{default_config_path, load_config, save_config};
pub use upstream::classifier::{validate_fn, RequireJsonField, ResponseValidator};
pub use upstream::client::{Attempt, AttemptOutcome, FetchOptions, FetchReport, MirrorClient};
pub use upstream::registry::{TargetRegistry, DEFAULT_REGISTRY};
pub use upstream::response::MirrorResponse;
pub use upstream::transport::{ReqwestTransport, Transport};
