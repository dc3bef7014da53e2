//! Mirror pool, failover and proxy routing.

pub mod canonical;
pub mod classifier;
pub mod client;
pub mod proxy_decider;
pub mod registry;
pub mod response;
pub mod rewrite;
pub mod selector;
pub mod transport;
