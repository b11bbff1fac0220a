//! Cache entry sidecars.
//!
//! Each cached artifact carries a line-oriented `key=value` sidecar
//! (`<artifact>.info`) recording what is known about the remote, plus a
//! sibling lock file scoped to the entry. The sidecar format is shared with
//! the external cache cleanup pass, which sweeps tombstoned entries.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use capstan_core::Version;
use tracing::debug;
use url::Url;

use crate::error::{CacheError, CacheResult};
use crate::lock::EntryLock;
use crate::store::CacheStore;

const KEY_REMOTE_CONTENT_LENGTH: &str = "remote-content-length";
const KEY_ORIGINAL_CONTENT_LENGTH: &str = "original-content-length";
const KEY_LAST_MODIFIED: &str = "last-modified";
const KEY_LAST_UPDATED: &str = "last-updated";
const KEY_DELETE: &str = "delete";

/// Metadata sidecar for one cached artifact.
///
/// Timestamps are kept at millisecond precision: remote `Last-Modified`
/// values are compared for equality, and sub-millisecond noise must not
/// break currency after a store/load round-trip.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    artifact: PathBuf,
    info: PathBuf,
    remote_content_length: Option<u64>,
    original_content_length: Option<u64>,
    last_modified_millis: Option<u64>,
    last_updated_millis: Option<u64>,
    marked_for_delete: bool,
}

impl CacheEntry {
    /// Open the sidecar for the active cached artifact of `(url, version)`.
    pub fn open(store: &CacheStore, url: &Url, version: Option<&Version>) -> CacheResult<Self> {
        Self::for_artifact(store.cache_file_for(url, version))
    }

    /// Open the sidecar next to a specific artifact path, loading any
    /// existing fields.
    pub fn for_artifact(artifact: PathBuf) -> CacheResult<Self> {
        let info = sibling(&artifact, "info");
        let mut entry = Self {
            artifact,
            info,
            remote_content_length: None,
            original_content_length: None,
            last_modified_millis: None,
            last_updated_millis: None,
            marked_for_delete: false,
        };
        entry.load()?;
        Ok(entry)
    }

    fn load(&mut self) -> CacheResult<()> {
        let text = match fs::read_to_string(&self.info) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::io(&self.info)(e)),
        };
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                KEY_REMOTE_CONTENT_LENGTH => {
                    self.remote_content_length = parse_u64(&self.info, key, value);
                }
                KEY_ORIGINAL_CONTENT_LENGTH => {
                    self.original_content_length = parse_u64(&self.info, key, value);
                }
                KEY_LAST_MODIFIED => {
                    self.last_modified_millis = parse_u64(&self.info, key, value);
                }
                KEY_LAST_UPDATED => {
                    self.last_updated_millis = parse_u64(&self.info, key, value);
                }
                KEY_DELETE => {
                    self.marked_for_delete = value.trim() == "true";
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Persist the sidecar. Writes a temporary file and renames it into
    /// place so concurrent readers never observe a torn sidecar.
    pub fn store(&self) -> CacheResult<()> {
        let mut out = String::new();
        if let Some(len) = self.remote_content_length {
            out.push_str(&format!("{KEY_REMOTE_CONTENT_LENGTH}={len}\n"));
        }
        if let Some(len) = self.original_content_length {
            out.push_str(&format!("{KEY_ORIGINAL_CONTENT_LENGTH}={len}\n"));
        }
        if let Some(millis) = self.last_modified_millis {
            out.push_str(&format!("{KEY_LAST_MODIFIED}={millis}\n"));
        }
        if let Some(millis) = self.last_updated_millis {
            out.push_str(&format!("{KEY_LAST_UPDATED}={millis}\n"));
        }
        if self.marked_for_delete {
            out.push_str(&format!("{KEY_DELETE}=true\n"));
        }

        if let Some(parent) = self.info.parent() {
            fs::create_dir_all(parent).map_err(CacheError::io(parent))?;
        }
        let tmp = sibling(&self.artifact, "info.tmp");
        fs::write(&tmp, out).map_err(CacheError::io(&tmp))?;
        fs::rename(&tmp, &self.info).map_err(CacheError::io(&self.info))?;
        Ok(())
    }

    /// Acquire the entry's inter-process lock.
    pub fn lock(&self) -> CacheResult<EntryLock> {
        EntryLock::acquire(sibling(&self.artifact, "lock"))
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Length of the cached artifact on disk, if present.
    pub fn artifact_len(&self) -> Option<u64> {
        fs::metadata(&self.artifact).map(|m| m.len()).ok()
    }

    /// Whether a usable copy exists: the artifact file is present and at
    /// least as long as the recorded remote length (when known).
    pub fn is_cached(&self) -> bool {
        let Some(len) = self.artifact_len() else {
            return false;
        };
        match self.remote_content_length {
            Some(remote) => len >= remote,
            None => true,
        }
    }

    /// Whether the cached copy matches the remote `Last-Modified` stamp.
    /// An absent stamp on both sides counts as a match.
    pub fn is_current(&self, remote_last_modified: Option<SystemTime>) -> bool {
        self.is_cached() && self.last_modified_millis == remote_last_modified.map(to_millis)
    }

    pub fn remote_content_length(&self) -> Option<u64> {
        self.remote_content_length
    }

    pub fn set_remote_content_length(&mut self, len: Option<u64>) {
        self.remote_content_length = len;
    }

    pub fn original_content_length(&self) -> Option<u64> {
        self.original_content_length
    }

    pub fn set_original_content_length(&mut self, len: Option<u64>) {
        self.original_content_length = len;
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified_millis.map(from_millis)
    }

    pub fn set_last_modified(&mut self, stamp: Option<SystemTime>) {
        self.last_modified_millis = stamp.map(to_millis);
    }

    pub fn last_updated(&self) -> Option<SystemTime> {
        self.last_updated_millis.map(from_millis)
    }

    pub fn set_last_updated(&mut self, stamp: SystemTime) {
        self.last_updated_millis = Some(to_millis(stamp));
    }

    pub fn is_marked_for_delete(&self) -> bool {
        self.marked_for_delete
    }

    /// Soft tombstone: the entry stays readable until an external cleanup
    /// pass sweeps it.
    pub fn mark_for_delete(&mut self) {
        self.marked_for_delete = true;
    }
}

fn sibling(artifact: &Path, extension: &str) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "resource".to_string());
    name.push('.');
    name.push_str(extension);
    artifact.with_file_name(name)
}

fn parse_u64(info: &Path, key: &str, value: &str) -> Option<u64> {
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(path = %info.display(), key, value, "ignoring malformed sidecar field");
            None
        }
    }
}

fn to_millis(stamp: SystemTime) -> u64 {
    stamp
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn from_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}
