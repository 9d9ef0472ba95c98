//! Content-addressed compile cache
//!
//! Compile results are keyed by the fingerprint of every input that can
//! change the compiler's output. There is no invalidation step: a changed
//! input is a different key.
//!
//! # Lookup Outcomes
//!
//! | Outcome | Cause |
//! |---------|-------|
//! | Hit | Entry found and its outputs are (or can be put) in the content store |
//! | Miss | No entry at any read location |
//! | Miss (warned) | Entry unreadable, corrupt, or its blobs missing or altered |

mod backend;
mod entry;
mod key;
mod layer;

pub use backend::{local_dir, open_backend, CacheBackend, DirBackend, HttpBackend};
pub use entry::{format_bytes, CacheEntry, CachedFile};
pub use key::{CacheKey, CompileUnit, Platform};
pub use layer::IncrementalCache;
