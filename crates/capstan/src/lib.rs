#![forbid(unsafe_code)]

//! # Capstan
//!
//! Facade crate for the capstan resource engine: content-addressed caching
//! and scheduled downloading of launcher artifacts.
//!
//! ## Quick start
//!
//! ```ignore
//! use capstan::{DownloadOptions, Engine, EngineOptions, Tracker, UpdatePolicy};
//!
//! let engine = Engine::new(EngineOptions::new("/var/cache/capstan"))?;
//! let tracker = Tracker::new(engine);
//!
//! let jar = url::Url::parse("https://example.com/app/main.jar")?;
//! tracker.add_resource(&jar, None, DownloadOptions::default(), UpdatePolicy::Always)?;
//! tracker.wait_for_resources(&[jar.clone()], None)?;
//! let local = tracker.get_cache_file(&jar)?;
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod cache {
    pub use capstan_cache::*;
}

pub mod core {
    pub use capstan_core::*;
}

pub mod net {
    pub use capstan_net::*;
}

pub mod tracker {
    pub use capstan_tracker::*;
}

pub mod unpack {
    pub use capstan_unpack::*;
}

// ── Common surface ──────────────────────────────────────────────────────

pub use capstan_core::{Env, UpdatePolicy, Version};
pub use capstan_net::{DownloadOptions, NetOptions};
pub use capstan_tracker::{
    DownloadEvent, DownloadListener, Engine, EngineOptions, Status, Tracker, TrackerError,
    TrackerResult,
};
pub use capstan_unpack::Unpacker;
