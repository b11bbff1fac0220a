//! Filesystem routines over the cache root.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use capstan_core::Version;
use tracing::debug;
use url::Url;

use crate::entry::CacheEntry;
use crate::error::{CacheError, CacheResult};
use crate::layout::{artifact_name, identity_hash};

/// Pure filesystem routines: path resolution, generation allocation,
/// output streams, and currency checks. All methods are safe to call from
/// any thread; cross-process coherence is the caller's job via
/// [`CacheEntry::lock`](crate::CacheEntry::lock).
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the engine caches this resource at all. Only network
    /// artifacts are cached; `file://` and exotic schemes pass through.
    pub fn is_cacheable(&self, url: &Url, _version: Option<&Version>) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    fn resource_dir(&self, url: &Url, version: Option<&Version>) -> PathBuf {
        self.root.join(identity_hash(url, version))
    }

    fn latest_generation(dir: &Path) -> Option<u64> {
        let entries = fs::read_dir(dir).ok()?;
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_string_lossy().parse::<u64>().ok())
            .max()
    }

    /// Deterministic path of the active cached artifact. The file may not
    /// exist yet; the path is stable until a new generation is allocated.
    pub fn cache_file_for(&self, url: &Url, version: Option<&Version>) -> PathBuf {
        let dir = self.resource_dir(url, version);
        let generation = Self::latest_generation(&dir).unwrap_or(0);
        dir.join(generation.to_string()).join(artifact_name(url))
    }

    /// Allocate a fresh generation for `(url, version)`, distinct from any
    /// existing artifact path, and claim it with an empty file. The old
    /// generation stays on disk until swept.
    pub fn make_new_cache_file(&self, url: &Url, version: Option<&Version>) -> CacheResult<PathBuf> {
        let dir = self.resource_dir(url, version);
        let next = Self::latest_generation(&dir).map_or(0, |g| g + 1);
        let generation_dir = dir.join(next.to_string());
        fs::create_dir_all(&generation_dir).map_err(CacheError::io(&generation_dir))?;
        let path = generation_dir.join(artifact_name(url));
        File::create(&path).map_err(CacheError::io(&path))?;
        debug!(url = %url, generation = next, path = %path.display(), "allocated cache file");
        Ok(path)
    }

    /// Buffered write stream to the active artifact path, truncating any
    /// previous content.
    pub fn open_output_stream(
        &self,
        url: &Url,
        version: Option<&Version>,
    ) -> CacheResult<BufWriter<File>> {
        let path = self.cache_file_for(url, version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(CacheError::io(parent))?;
        }
        let file = File::create(&path).map_err(CacheError::io(&path))?;
        Ok(BufWriter::new(file))
    }

    /// Whether the cached copy of `(url, version)` matches the remote
    /// `Last-Modified` stamp. Absent or unreadable entries are not current.
    pub fn is_current(
        &self,
        url: &Url,
        version: Option<&Version>,
        remote_last_modified: Option<SystemTime>,
    ) -> bool {
        CacheEntry::open(self, url, version)
            .map(|entry| entry.is_current(remote_last_modified))
            .unwrap_or(false)
    }
}
