//! Per-client tracking facade.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use capstan_cache::CacheEntry;
use capstan_core::{normalize_url, urls_equal, UpdatePolicy, Version};
use capstan_net::DownloadOptions;
use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::engine::Engine;
use crate::error::{TrackerError, TrackerResult};
use crate::events::{DownloadEvent, DownloadListener};
use crate::resource::Resource;
use crate::status::Status;

/// Tracker state shared with the engine (for the prefetch registry and
/// resource event fan-out).
pub(crate) struct TrackerShared {
    pub(crate) prefetch: bool,
    pub(crate) resources: Mutex<Vec<Arc<Resource>>>,
    pub(crate) listeners: Mutex<Vec<Arc<dyn DownloadListener>>>,
}

impl TrackerShared {
    /// Fire the event matching the resource's state right now. The listener
    /// list and the status are snapshotted first; callbacks run with no
    /// locks held because they may call back into the tracker.
    pub(crate) fn fire_download_event(&self, resource: &Resource) {
        let listeners = self.listeners.lock().clone();
        if listeners.is_empty() {
            return;
        }
        let status = resource.status();
        let event = DownloadEvent {
            location: resource.location().clone(),
            version: resource.request_version().cloned(),
            status,
        };
        for listener in listeners {
            if status.intersects(Status::ERROR | Status::DOWNLOADED) {
                listener.download_completed(&event);
            } else if status.contains(Status::DOWNLOADING) {
                listener.download_started(&event);
            } else if status.contains(Status::CONNECTING) {
                listener.update_started(&event);
            }
        }
    }
}

/// Client handle onto the engine: a set of tracked resources, listeners
/// for their progress, and blocking accessors for their local files.
pub struct Tracker {
    engine: Arc<Engine>,
    shared: Arc<TrackerShared>,
}

impl Tracker {
    /// A tracker that only works on demand.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self::with_prefetch(engine, false)
    }

    /// Prefetch trackers additionally contribute speculative background
    /// work, one resource at a time, whenever the demand queue is empty.
    pub fn with_prefetch(engine: Arc<Engine>, prefetch: bool) -> Self {
        let shared = Arc::new(TrackerShared {
            prefetch,
            resources: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        });
        if prefetch {
            engine.register_prefetch(&shared);
        }
        Self { engine, shared }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Track a resource. Idempotent per identity; the first add wins for
    /// version and policy. When the cache already satisfies the resource
    /// it turns terminal immediately; otherwise a prefetch tracker nudges
    /// a worker awake to make speculative progress.
    pub fn add_resource(
        &self,
        location: &Url,
        version: Option<Version>,
        options: DownloadOptions,
        update_policy: UpdatePolicy,
    ) -> TrackerResult<()> {
        let location = normalize_url(location)?;
        let resource = self.engine.intern(location, version, update_policy);

        {
            let mut resources = self.shared.resources.lock();
            if resources.iter().any(|r| Arc::ptr_eq(r, &resource)) {
                return Ok(());
            }
            resource.add_tracker(&self.shared);
            resources.push(Arc::clone(&resource));
        }

        self.engine.set_download_options(&resource, options);

        let downloaded = self.check_cache(&resource, update_policy);
        if !downloaded && self.shared.prefetch {
            self.engine.spawn_worker();
        }
        Ok(())
    }

    /// Stop tracking a location. The interned resource lives on for any
    /// other tracker holding it.
    pub fn remove_resource(&self, location: &Url) {
        let mut resources = self.shared.resources.lock();
        if let Some(index) = resources
            .iter()
            .position(|r| urls_equal(r.location(), location))
        {
            let resource = resources.remove(index);
            resource.remove_tracker(&self.shared);
        }
    }

    /// Decide whether the cache already satisfies the resource, per policy:
    /// non-cacheable resources pass straight through; acceptable cached
    /// copies turn terminal without network; `Force` wipes state for an
    /// unconditional refetch; anything else defers to the connect phase,
    /// which holds the remote `Last-Modified`.
    fn check_cache(&self, resource: &Arc<Resource>, update_policy: UpdatePolicy) -> bool {
        let store = self.engine.store();
        if !store.is_cacheable(resource.location(), resource.request_version()) {
            // passes through the tracker as if never added: terminal at
            // once, absent from total-size accounting
            resource.change_status(
                Status::empty(),
                Status::DOWNLOADED | Status::CONNECTED | Status::PROCESSING,
            );
            self.shared.fire_download_event(resource);
            return true;
        }

        if !matches!(update_policy, UpdatePolicy::Always | UpdatePolicy::Force) {
            if let Ok(entry) = CacheEntry::open(store, resource.location(), resource.request_version())
            {
                if entry.is_cached()
                    && !update_policy.should_update(entry.last_updated(), self.engine.session_start())
                {
                    debug!(url = %resource.location(), "cache is acceptable, not updating");
                    let len = entry.artifact_len().unwrap_or(0);
                    let path = entry.artifact().to_path_buf();
                    resource.with_inner(|inner| {
                        inner.local_file = Some(path);
                        inner.size = len as i64;
                        inner.transferred = inner.transferred.max(len);
                        inner.status.insert(
                            Status::DOWNLOADED | Status::CONNECTED | Status::PROCESSING,
                        );
                    });
                    self.shared.fire_download_event(resource);
                    return true;
                }
            }
        }

        if update_policy == UpdatePolicy::Force {
            resource.reset_status();
        }

        false
    }

    fn get_resource(&self, location: &Url) -> TrackerResult<Arc<Resource>> {
        self.shared
            .resources
            .lock()
            .iter()
            .find(|r| urls_equal(r.location(), location))
            .cloned()
            .ok_or_else(|| TrackerError::InvalidDescriptor(location.clone()))
    }

    /// Block until every listed resource is terminal. `Ok(true)` when all
    /// finished (downloaded or failed), `Ok(false)` on deadline, and
    /// [`TrackerError::Cancelled`] when the engine shuts down mid-wait.
    /// `None` waits without a deadline.
    pub fn wait_for_resources(
        &self,
        locations: &[Url],
        timeout: Option<Duration>,
    ) -> TrackerResult<bool> {
        let resources = {
            let tracked = self.shared.resources.lock();
            let mut out = Vec::with_capacity(locations.len());
            for location in locations {
                let resource = tracked
                    .iter()
                    .find(|r| urls_equal(r.location(), location))
                    .cloned()
                    .ok_or_else(|| TrackerError::InvalidDescriptor(location.clone()))?;
                out.push(resource);
            }
            out
        };

        if resources.is_empty() {
            return Ok(true);
        }
        self.engine.wait(&resources, timeout)
    }

    /// Single-resource form of [`Tracker::wait_for_resources`].
    pub fn wait_for_resource(
        &self,
        location: &Url,
        timeout: Option<Duration>,
    ) -> TrackerResult<bool> {
        let resource = self.get_resource(location)?;
        self.engine.wait(std::slice::from_ref(&resource), timeout)
    }

    /// Local file holding the resource, blocking until it is terminal.
    /// `None` when the download failed or the resource is a non-cacheable
    /// non-file resource.
    pub fn get_cache_file(&self, location: &Url) -> TrackerResult<Option<PathBuf>> {
        let resource = self.get_resource(location)?;
        if !resource.is_set(Status::DOWNLOADED | Status::ERROR) {
            self.engine.wait(std::slice::from_ref(&resource), None)?;
        }

        if resource.is_set(Status::ERROR) {
            return Ok(None);
        }
        if let Some(file) = resource.local_file() {
            return Ok(Some(file));
        }

        if location.scheme().eq_ignore_ascii_case("file") {
            // decoded path first; descriptors sometimes arrive with the
            // path already encoded, so fall back to the raw form
            if let Ok(path) = location.to_file_path() {
                if path.exists() {
                    return Ok(Some(path));
                }
            }
            let raw = PathBuf::from(location.path());
            if raw.exists() {
                return Ok(Some(raw));
            }
        }

        Ok(None)
    }

    /// `file://` URL of the cached artifact, or the location itself when
    /// nothing local exists.
    pub fn get_cache_url(&self, location: &Url) -> TrackerResult<Url> {
        Ok(self
            .get_cache_file(location)?
            .and_then(|path| Url::from_file_path(path).ok())
            .unwrap_or_else(|| location.clone()))
    }

    /// Bytes transferred so far for the resource.
    pub fn amount_read(&self, location: &Url) -> TrackerResult<u64> {
        Ok(self.get_resource(location)?.transferred())
    }

    /// Total size in bytes, or -1 while unknown.
    pub fn total_size(&self, location: &Url) -> TrackerResult<i64> {
        Ok(self.get_resource(location)?.size())
    }

    /// Whether the resource can be handed out, i.e. it is terminal either
    /// way.
    pub fn check_resource(&self, location: &Url) -> TrackerResult<bool> {
        Ok(self
            .get_resource(location)?
            .is_set(Status::DOWNLOADED | Status::ERROR))
    }

    /// Kick off connect/download without waiting. Returns `true` when
    /// nothing needed starting (already terminal or in flight).
    pub fn start_resource(&self, location: &Url) -> TrackerResult<bool> {
        let resource = self.get_resource(location)?;
        Ok(self.engine.start_resource(&resource))
    }

    pub fn add_download_listener(&self, listener: Arc<dyn DownloadListener>) {
        let mut listeners = self.shared.listeners.lock();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove_download_listener(&self, listener: &Arc<dyn DownloadListener>) {
        self.shared
            .listeners
            .lock()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }
}
