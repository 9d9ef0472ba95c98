//! Classpath resolution from a pinned lockfile
//!
//! Every artifact is fetched through a `CoordinateFetcher`, verified against
//! the digest pinned in the lockfile and stored in the content store.

mod coordinate;
mod lockfile;
mod resolver;

pub use coordinate::Coordinate;
pub use lockfile::{Lockfile, LockfileEntry};
pub use resolver::{ClasspathResolver, CoordinateFetcher, DirFetcher, ResolvedClasspathEntry};
