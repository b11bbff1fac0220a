//! Inter-process advisory locks for cache entries.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::trace;

use crate::error::{CacheError, CacheResult};

/// Exclusive advisory lock on a cache entry, held for the duration of any
/// mutating operation on the artifact. Released on drop.
///
/// The lock file is a sibling of the artifact and is never deleted; only
/// the advisory lock on it is taken and released.
#[derive(Debug)]
pub struct EntryLock {
    file: File,
    path: PathBuf,
}

impl EntryLock {
    /// Acquire the lock, blocking until any other holder (in this process or
    /// another) releases it.
    pub fn acquire(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(CacheError::io(parent))?;
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(CacheError::io(&path))?;
        FileExt::lock_exclusive(&file).map_err(CacheError::io(&path))?;
        trace!(path = %path.display(), "entry lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        trace!(path = %self.path.display(), "entry lock released");
    }
}
