//! Execution sandboxes

mod jdk;

pub use jdk::{JdkLocator, JdkSandbox, JdkSandboxBuilder, JdkSelector, JAVA_HOME_LINK, PREPARATION_SCRIPT};

use crate::classpath::{Coordinate, LockfileEntry};
use crate::store::Digest;

/// Coordinate of the default persistent compiler server
pub const DEFAULT_SERVER_COORDINATE: &str = "com.martiansoftware:nailgun-server:0.9.1";

/// Pinned lockfile entry for the default persistent compiler server
pub fn default_persistent_server() -> LockfileEntry {
    LockfileEntry::leaf(
        Coordinate::new("com.martiansoftware", "nailgun-server", "0.9.1"),
        "nailgun-server-0.9.1.jar",
        Digest::new(
            "4518faa6bf4bd26fccdc4d85e1625dc679381a08d56872d8ad12151dda9cef25",
            32927,
        ),
    )
}
