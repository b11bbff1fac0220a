//! Resource entities and their state machine.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use capstan_core::{UpdatePolicy, Version};
use parking_lot::Mutex;
use tracing::trace;
use url::Url;

use crate::status::Status;
use crate::tracker::TrackerShared;

/// Interning key: normalized location plus requested version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ResourceKey {
    url: String,
    version: Option<Version>,
}

impl ResourceKey {
    pub(crate) fn new(location: &Url, version: Option<&Version>) -> Self {
        Self {
            url: location.as_str().to_string(),
            version: version.cloned(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ResourceInner {
    pub(crate) status: Status,
    /// Total bytes, -1 while unknown.
    pub(crate) size: i64,
    /// Bytes moved so far; never decreases.
    pub(crate) transferred: u64,
    pub(crate) download_location: Option<Url>,
    pub(crate) local_file: Option<PathBuf>,
    pub(crate) update_policy: UpdatePolicy,
    pub(crate) trackers: Vec<Weak<TrackerShared>>,
}

/// One tracked artifact, shared engine-wide.
///
/// Identity is `(normalized location, version)`; the engine interns
/// resources, so every tracker holding "the same" resource holds the same
/// allocation and observes the same state. All mutable state sits behind
/// the resource's own monitor.
#[derive(Debug)]
pub struct Resource {
    location: Url,
    request_version: Option<Version>,
    inner: Mutex<ResourceInner>,
}

impl Resource {
    pub(crate) fn new(
        location: Url,
        request_version: Option<Version>,
        update_policy: UpdatePolicy,
    ) -> Self {
        Self {
            location,
            request_version,
            inner: Mutex::new(ResourceInner {
                status: Status::empty(),
                size: -1,
                transferred: 0,
                download_location: None,
                local_file: None,
                update_policy,
                trackers: Vec::new(),
            }),
        }
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn request_version(&self) -> Option<&Version> {
        self.request_version.as_ref()
    }

    pub(crate) fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.location, self.request_version.as_ref())
    }

    /// Run `f` under the resource monitor, for compound state updates.
    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&mut ResourceInner) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn status(&self) -> Status {
        self.inner.lock().status
    }

    /// Whether any of `flags` is currently set.
    pub fn is_set(&self, flags: Status) -> bool {
        self.inner.lock().status.intersects(flags)
    }

    /// The single state-transition primitive: drop `clear`, then add `set`.
    pub(crate) fn change_status(&self, clear: Status, set: Status) {
        let mut inner = self.inner.lock();
        inner.status.remove(clear);
        inner.status.insert(set);
        trace!(url = %self.location, status = ?inner.status, "status changed");
    }

    pub(crate) fn reset_status(&self) {
        self.inner.lock().status = Status::empty();
    }

    pub fn size(&self) -> i64 {
        self.inner.lock().size
    }

    pub fn transferred(&self) -> u64 {
        self.inner.lock().transferred
    }

    pub(crate) fn increment_transferred(&self, bytes: u64) {
        self.inner.lock().transferred += bytes;
    }

    /// Monotonic: a stale smaller value never rolls the counter back.
    pub(crate) fn set_transferred(&self, bytes: u64) {
        let mut inner = self.inner.lock();
        inner.transferred = inner.transferred.max(bytes);
    }

    pub fn local_file(&self) -> Option<PathBuf> {
        self.inner.lock().local_file.clone()
    }

    pub fn download_location(&self) -> Option<Url> {
        self.inner.lock().download_location.clone()
    }

    pub(crate) fn set_download_location(&self, url: Url) {
        self.inner.lock().download_location = Some(url);
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        self.inner.lock().update_policy
    }

    pub(crate) fn add_tracker(&self, tracker: &Arc<TrackerShared>) {
        let mut inner = self.inner.lock();
        inner.trackers.retain(|weak| weak.strong_count() > 0);
        let attached = inner
            .trackers
            .iter()
            .any(|weak| weak.upgrade().is_some_and(|t| Arc::ptr_eq(&t, tracker)));
        if !attached {
            inner.trackers.push(Arc::downgrade(tracker));
        }
    }

    pub(crate) fn remove_tracker(&self, tracker: &Arc<TrackerShared>) {
        self.inner.lock().trackers.retain(|weak| match weak.upgrade() {
            Some(t) => !Arc::ptr_eq(&t, tracker),
            None => false,
        });
    }

    pub(crate) fn first_tracker(&self) -> Option<Arc<TrackerShared>> {
        self.inner.lock().trackers.iter().find_map(Weak::upgrade)
    }

    fn trackers_snapshot(&self) -> Vec<Arc<TrackerShared>> {
        self.inner
            .lock()
            .trackers
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Notify every attached tracker of the current state. The tracker list
    /// is snapshotted first; listener callbacks run with no locks held.
    pub(crate) fn fire_download_event(&self) {
        for tracker in self.trackers_snapshot() {
            tracker.fire_download_event(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> Resource {
        Resource::new(
            Url::parse("http://h/a.jar").unwrap(),
            None,
            UpdatePolicy::Always,
        )
    }

    #[test]
    fn change_status_clears_then_sets() {
        let r = resource();
        r.change_status(Status::empty(), Status::PRECONNECT | Status::PROCESSING);
        r.change_status(Status::PRECONNECT, Status::CONNECTING);
        assert_eq!(r.status(), Status::CONNECTING | Status::PROCESSING);
    }

    #[test]
    fn transferred_never_decreases() {
        let r = resource();
        r.increment_transferred(10);
        r.set_transferred(4);
        assert_eq!(r.transferred(), 10);
        r.set_transferred(25);
        assert_eq!(r.transferred(), 25);
    }

    #[test]
    fn size_starts_unknown() {
        assert_eq!(resource().size(), -1);
    }
}
