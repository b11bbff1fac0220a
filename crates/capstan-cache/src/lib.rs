#![forbid(unsafe_code)]

//! On-disk artifact cache.
//!
//! One directory per `(url, version)` identity, addressed by a truncated
//! SHA-256 of the identity. Numbered generation directories inside it hold
//! the artifact next to its `.info` sidecar and `.lock` file; the highest
//! generation is the active one. Superseded generations are tombstoned via
//! the sidecar and swept by an external cleanup pass.

pub mod entry;
pub mod error;
mod layout;
pub mod lock;
pub mod store;

pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult};
pub use lock::EntryLock;
pub use store::CacheStore;
