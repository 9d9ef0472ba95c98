//! CLI command implementations

pub mod analyze;
pub mod cache;
pub mod compile;
pub mod config;
pub mod lockfile;

pub use analyze::execute as analyze;
pub use cache::execute as cache;
pub use compile::execute as compile;
pub use config::execute as config;
pub use lockfile::execute as lockfile;
