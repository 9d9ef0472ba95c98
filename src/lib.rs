//! Kiln - incremental JVM compile core
//!
//! Turns Java/Scala compile units into cached, content-addressed outputs:
//! source dependency analysis, a digest-verified classpath from a pinned
//! lockfile, a reusable JDK sandbox, and a multi-round compile state machine
//! whose results are keyed on the content of every input.

pub mod analysis;
pub mod cache;
pub mod classpath;
pub mod cli;
pub mod compile;
pub mod config;
pub mod error;
pub mod memo;
pub mod process;
pub mod run_tracker;
pub mod sandbox;
pub mod store;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{KilnError, KilnResult};
