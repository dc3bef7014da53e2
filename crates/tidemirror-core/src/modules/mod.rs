//! Process-level support modules.

pub mod config;
