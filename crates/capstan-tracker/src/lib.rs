#![forbid(unsafe_code)]

//! Resource tracking and download scheduling.
//!
//! Callers attach resources to a [`Tracker`] and block in
//! [`Tracker::wait_for_resources`]; pooled workers pop work off the shared
//! [`Engine`], run the connect and download phases, publish state
//! transitions, and signal the completion condition. Trackers that opt into
//! prefetch contribute speculative work, one resource at a time, whenever
//! the demand queue is empty.
//!
//! Lock hierarchy, in strict acquire order:
//! 1. engine scheduler lock (demand queue, worker accounting, completion
//!    condvar)
//! 2. prefetch registry lock
//! 3. tracker resources lock
//! 4. resource monitor
//! 5. tracker listeners lock
//!
//! No path acquires an earlier lock while holding a later one, and listener
//! callbacks run with no locks held at all.

pub mod engine;
pub mod error;
pub mod events;
pub mod resource;
pub mod status;
pub mod tracker;
mod worker;

pub use engine::{Engine, EngineOptions};
pub use error::{TrackerError, TrackerResult};
pub use events::{DownloadEvent, DownloadListener};
pub use resource::Resource;
pub use status::Status;
pub use tracker::Tracker;
