//! Shared download machinery: demand queue, prefetch registry, worker
//! pool, interning, and the completion condition.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use capstan_cache::CacheStore;
use capstan_core::{Env, UpdatePolicy, Version};
use capstan_net::{DownloadOptions, HttpTransport, NetOptions};
use capstan_unpack::Unpacker;
use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::error;
use url::Url;

use crate::error::{TrackerError, TrackerResult};
use crate::resource::{Resource, ResourceKey};
use crate::status::Status;
use crate::tracker::TrackerShared;
use crate::worker;

/// Engine configuration.
#[derive(Clone)]
pub struct EngineOptions {
    pub cache_dir: PathBuf,
    pub net: NetOptions,
    pub offline_forced: bool,
    /// Redirect following during URL probing is opt-in.
    pub allow_redirect: bool,
    /// Transfer buffer size per read.
    pub chunk_size: usize,
    /// Upper bound on concurrent download workers.
    pub max_workers: usize,
    /// Decoder for pack200-gzip payloads. Without one, such payloads fail
    /// to decode.
    pub unpacker: Option<Arc<dyn Unpacker>>,
}

impl EngineOptions {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            net: NetOptions::default(),
            offline_forced: false,
            allow_redirect: false,
            chunk_size: 32 * 1024,
            max_workers: 6,
            unpacker: None,
        }
    }

    #[must_use]
    pub fn with_net(mut self, net: NetOptions) -> Self {
        self.net = net;
        self
    }

    #[must_use]
    pub fn with_offline_forced(mut self, offline_forced: bool) -> Self {
        self.offline_forced = offline_forced;
        self
    }

    #[must_use]
    pub fn with_allow_redirect(mut self, allow_redirect: bool) -> Self {
        self.allow_redirect = allow_redirect;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    #[must_use]
    pub fn with_unpacker(mut self, unpacker: Arc<dyn Unpacker>) -> Self {
        self.unpacker = Some(unpacker);
        self
    }
}

struct SchedState {
    /// Demand queue: resources explicitly requested by a waiter.
    queue: VecDeque<Arc<Resource>>,
    live_workers: usize,
}

/// Shared download machinery behind an `Arc`.
///
/// Every tracker created from the same engine shares its cache store,
/// interned resources, worker pool, and completion condition. Embedders
/// that want process-wide behavior share one engine; tests get isolated
/// ones.
pub struct Engine {
    me: Weak<Engine>,
    store: CacheStore,
    env: Env,
    transport: HttpTransport,
    chunk_size: usize,
    max_workers: usize,
    unpacker: Option<Arc<dyn Unpacker>>,
    session_start: SystemTime,
    cancel: CancellationToken,
    sched: Mutex<SchedState>,
    completed: Condvar,
    prefetch: Mutex<Vec<Weak<TrackerShared>>>,
    interned: Mutex<HashMap<ResourceKey, Weak<Resource>>>,
    download_options: Mutex<HashMap<ResourceKey, DownloadOptions>>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> TrackerResult<Arc<Self>> {
        let transport = HttpTransport::new(&options.net)?;
        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store: CacheStore::new(options.cache_dir),
            env: Env::new(options.offline_forced, options.allow_redirect),
            transport,
            chunk_size: options.chunk_size.max(1),
            max_workers: options.max_workers.max(1),
            unpacker: options.unpacker,
            session_start: SystemTime::now(),
            cancel: CancellationToken::new(),
            sched: Mutex::new(SchedState {
                queue: VecDeque::new(),
                live_workers: 0,
            }),
            completed: Condvar::new(),
            prefetch: Mutex::new(Vec::new()),
            interned: Mutex::new(HashMap::new()),
            download_options: Mutex::new(HashMap::new()),
        }))
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub(crate) fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub(crate) fn unpacker(&self) -> Option<&Arc<dyn Unpacker>> {
        self.unpacker.as_ref()
    }

    pub fn session_start(&self) -> SystemTime {
        self.session_start
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel waiters and stop handing out work. Blocked waiters surface
    /// [`TrackerError::Cancelled`]; workers abandon their current resource
    /// at the next chunk boundary.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.broadcast_completion();
    }

    /// One shared `Resource` per identity, created on first use. The table
    /// holds weak references and sweeps dead ones lazily, so a resource
    /// dies once the last tracker detaches and no worker holds it.
    pub(crate) fn intern(
        &self,
        location: Url,
        version: Option<Version>,
        update_policy: UpdatePolicy,
    ) -> Arc<Resource> {
        let key = ResourceKey::new(&location, version.as_ref());
        let mut interned = self.interned.lock();
        interned.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = interned.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        let resource = Arc::new(Resource::new(location, version, update_policy));
        interned.insert(key, Arc::downgrade(&resource));
        resource
    }

    pub(crate) fn set_download_options(&self, resource: &Resource, options: DownloadOptions) {
        self.download_options.lock().insert(resource.key(), options);
    }

    pub(crate) fn download_options_for(&self, resource: &Resource) -> DownloadOptions {
        self.download_options
            .lock()
            .get(&resource.key())
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn register_prefetch(&self, tracker: &Arc<TrackerShared>) {
        let mut registry = self.prefetch.lock();
        registry.retain(|weak| weak.strong_count() > 0);
        registry.push(Arc::downgrade(tracker));
    }

    /// Set the connect/download pre-states and enqueue if this call is the
    /// one that put the resource in play. Returns `true` when nothing
    /// needed starting (terminal or already in flight).
    pub(crate) fn start_resource(&self, resource: &Arc<Resource>) -> bool {
        let enqueue = resource.with_inner(|inner| {
            if inner.status.contains(Status::ERROR) {
                return false;
            }
            let mut enqueue = !inner.status.contains(Status::PROCESSING);
            if !inner.status.intersects(Status::CONNECTED | Status::CONNECTING) {
                inner.status.insert(Status::PRECONNECT | Status::PROCESSING);
            }
            if !inner.status.intersects(Status::DOWNLOADED | Status::DOWNLOADING) {
                inner.status.insert(Status::PREDOWNLOAD | Status::PROCESSING);
            }
            if !inner.status.intersects(Status::PREDOWNLOAD | Status::PRECONNECT) {
                enqueue = false;
            }
            enqueue
        });
        if enqueue {
            self.enqueue(resource.clone());
        }
        !enqueue
    }

    /// Append to the demand queue and make sure a worker exists.
    pub(crate) fn enqueue(&self, resource: Arc<Resource>) {
        {
            let mut sched = self.sched.lock();
            if !resource.is_set(Status::PRECONNECT | Status::PREDOWNLOAD) {
                error!(url = %resource.location(), status = ?resource.status(),
                    "refusing to queue resource in invalid state");
                return;
            }
            sched.queue.push_back(resource);
        }
        self.spawn_worker();
    }

    /// Spawn a download worker unless the pool is at its bound. Workers
    /// retire as soon as no work remains, so the pool is elastic.
    pub(crate) fn spawn_worker(&self) {
        let Some(engine) = self.me.upgrade() else {
            return;
        };
        {
            let mut sched = self.sched.lock();
            if sched.live_workers >= self.max_workers {
                return;
            }
            sched.live_workers += 1;
        }
        let spawned = std::thread::Builder::new()
            .name("capstan-worker".into())
            .spawn(move || worker::run(engine));
        if let Err(err) = spawned {
            error!(error = %err, "failed to spawn download worker");
            self.sched.lock().live_workers -= 1;
        }
    }

    /// Hand the next unit of work to a worker, or retire the worker when
    /// neither demand nor prefetch has anything.
    pub(crate) fn take_next(&self) -> Option<Arc<Resource>> {
        let mut sched = self.sched.lock();
        if self.cancel.is_cancelled() {
            sched.live_workers -= 1;
            return None;
        }
        match self.select_next(&mut sched) {
            Some(resource) => Some(resource),
            None => {
                sched.live_workers -= 1;
                None
            }
        }
    }

    /// Pick the next resource: demand connects first, then demand
    /// downloads, then prefetch. Connects drain before downloads so total
    /// sizes are known as early as possible. The pick is advanced
    /// (`PRECONNECT → CONNECTING` or `PREDOWNLOAD → DOWNLOADING`) before
    /// it is returned.
    fn select_next(&self, sched: &mut SchedState) -> Option<Arc<Resource>> {
        let mut found = take_matching(&mut sched.queue, |status| {
            status.contains(Status::PRECONNECT) && !status.contains(Status::ERROR)
        });
        if found.is_none() {
            found = take_matching(&mut sched.queue, |status| {
                status.contains(Status::PREDOWNLOAD)
                    && !status.intersects(Status::ERROR | Status::PRECONNECT | Status::CONNECTING)
            });
        }

        let resource = found.or_else(|| self.pick_prefetch())?;

        resource.with_inner(|inner| {
            if inner.status.contains(Status::PRECONNECT) {
                inner.status.remove(Status::PRECONNECT);
                inner.status.insert(Status::CONNECTING);
            } else if inner.status.contains(Status::PREDOWNLOAD) {
                inner.status.remove(Status::PREDOWNLOAD);
                inner.status.insert(Status::DOWNLOADING);
            }
        });

        Some(resource)
    }

    /// One prefetch pick across all live prefetch trackers: first a
    /// resource nobody has touched (to run its connect), otherwise a
    /// connected one (to run its download).
    ///
    /// The pick is marked `PROCESSING` under its monitor before
    /// `start_resource` runs, so the start can never enqueue it; that also
    /// keeps this safe to call while the scheduler lock is held.
    fn pick_prefetch(&self) -> Option<Arc<Resource>> {
        let mut untouched: Option<Arc<Resource>> = None;
        let mut alternate: Option<Arc<Resource>> = None;
        {
            let mut registry = self.prefetch.lock();
            registry.retain(|weak| weak.strong_count() > 0);
            for weak in registry.iter() {
                let Some(tracker) = weak.upgrade() else {
                    continue;
                };
                let resources = tracker.resources.lock();
                for resource in resources.iter() {
                    let status = resource.status();
                    if status.is_empty() {
                        untouched = Some(Arc::clone(resource));
                        break;
                    }
                    if alternate.is_none()
                        && status.contains(Status::CONNECTED)
                        && !status.intersects(
                            Status::ERROR
                                | Status::DOWNLOADED
                                | Status::DOWNLOADING
                                | Status::PREDOWNLOAD,
                        )
                    {
                        alternate = Some(Arc::clone(resource));
                    }
                }
                if untouched.is_some() {
                    break;
                }
            }
        }

        let resource = untouched.or(alternate)?;
        // the owning tracker may have died between the scan and here
        resource.first_tracker()?;
        resource.change_status(Status::empty(), Status::PROCESSING);
        self.start_resource(&resource);
        Some(resource)
    }

    /// Block until every resource is terminal, the deadline passes, or the
    /// engine is cancelled. `None` waits indefinitely.
    pub(crate) fn wait(
        &self,
        resources: &[Arc<Resource>],
        timeout: Option<Duration>,
    ) -> TrackerResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);

        // start them connecting/downloading in the background
        for resource in resources {
            self.start_resource(resource);
        }

        let mut sched = self.sched.lock();
        loop {
            if self.cancel.is_cancelled() {
                return Err(TrackerError::Cancelled);
            }

            let finished = resources
                .iter()
                .all(|r| r.is_set(Status::DOWNLOADED | Status::ERROR));
            if finished {
                return Ok(true);
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(false);
                    }
                    let _ = self.completed.wait_until(&mut sched, deadline);
                }
                None => self.completed.wait(&mut sched),
            }
        }
    }

    /// Wake every blocked waiter to re-check completion.
    pub(crate) fn broadcast_completion(&self) {
        let _sched = self.sched.lock();
        self.completed.notify_all();
    }
}

fn take_matching(
    queue: &mut VecDeque<Arc<Resource>>,
    matches: impl Fn(Status) -> bool,
) -> Option<Arc<Resource>> {
    let index = queue.iter().position(|r| matches(r.status()))?;
    queue.remove(index)
}
