//! Download worker: runs the connect and download phases for scheduled
//! resources.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use capstan_cache::{CacheEntry, CacheError};
use capstan_core::{run_privileged, UpdatePolicy, Version};
use capstan_net::{candidate_urls, ByteStream, ContentKind, NetError, UrlProber};
use capstan_unpack::{gunzip_file, unpack_packgz_file, UnpackError};
use thiserror::Error;
use tracing::{debug, trace, warn};
use url::Url;

use crate::engine::Engine;
use crate::resource::Resource;
use crate::status::Status;

#[derive(Debug, Error)]
enum WorkerError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Unpack(#[from] UnpackError),
    #[error("download cache key is not a valid URL: {0}")]
    Key(#[from] url::ParseError),
    #[error("transfer failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cancelled while transferring")]
    Cancelled,
}

/// Worker body: keep pulling work until the engine has none, then retire.
pub(crate) fn run(engine: Arc<Engine>) {
    trace!("download worker started");
    while let Some(resource) = engine.take_next() {
        // cache entry bookkeeping and artifact writes happen on behalf of
        // callers whose ambient permissions may be narrower
        run_privileged(|| process_resource(&engine, &resource));
    }
    trace!("download worker stopped");
}

fn process_resource(engine: &Arc<Engine>, resource: &Arc<Resource>) {
    if resource.is_set(Status::CONNECTING) {
        initialize_resource(engine, resource);
    }

    // A connect that found stale or missing cache leaves PREDOWNLOAD set;
    // hand the download slot back so remaining connects drain first.
    if resource.is_set(Status::PREDOWNLOAD) {
        engine.enqueue(Arc::clone(resource));
    }

    if resource.is_set(Status::DOWNLOADING) {
        download_resource(engine, resource);
    }
}

/// Terminal failure: flag, wake waiters, tell listeners.
fn fail(engine: &Engine, resource: &Resource, err: &WorkerError) {
    warn!(url = %resource.location(), error = %err, "resource failed");
    resource.change_status(Status::empty(), Status::ERROR);
    engine.broadcast_completion();
    resource.fire_download_event();
}

fn initialize_resource(engine: &Arc<Engine>, resource: &Arc<Resource>) {
    if let Err(err) = try_initialize(engine, resource) {
        fail(engine, resource, &err);
    }
}

/// Connect phase: resolve the best remote URL, read its metadata, decide
/// whether the cached copy is current, and refresh the entry bookkeeping.
fn try_initialize(engine: &Arc<Engine>, resource: &Arc<Resource>) -> Result<(), WorkerError> {
    let env = engine.env();
    if !env.is_offline_forced() {
        env.detect_online(resource.location());
    }
    resource.fire_download_event(); // CONNECTING

    let store = engine.store();
    let location = resource.location().clone();
    let version = resource.request_version().cloned();

    let mut entry = CacheEntry::open(store, &location, version.as_ref())?;
    let mut entry_lock = entry.lock()?;

    let cache_path = store.cache_file_for(&location, version.as_ref());
    let cached_len = std::fs::metadata(&cache_path).map(|m| m.len()).ok();
    let mut local_file = Some(cache_path);
    let mut size = cached_len.map_or(0, |len| len as i64);
    let mut current = true;
    let mut remote = None;

    if cached_len.is_none() && !env.is_online() {
        warn!(url = %location, "offline and not cached, continuing without a local copy");
        local_file = None;
    }

    if env.is_online() {
        let candidates =
            candidate_urls(&location, version.as_ref(), engine.download_options_for(resource));
        let prober = UrlProber::new(engine.transport(), env.is_allow_redirect());
        let best = prober.find_best_url(&candidates)?;
        let meta = engine.transport().fetch_meta(&best)?;
        resource.set_download_location(best);

        size = meta.content_length.map_or(-1, |len| len as i64);
        current = store.is_current(&location, version.as_ref(), meta.last_modified)
            && resource.update_policy() != UpdatePolicy::Force;

        if !current && entry.is_cached() {
            // Tombstone the stale generation and swap to a fresh one. The
            // old lock is released only once the new one is held.
            entry.mark_for_delete();
            entry.store()?;
            let fresh = store.make_new_cache_file(&location, version.as_ref())?;
            let new_entry = CacheEntry::open(store, &location, version.as_ref())?;
            let new_lock = new_entry.lock()?;
            drop(entry_lock);
            entry_lock = new_lock;
            entry = new_entry;
            local_file = Some(fresh);
        }
        remote = Some(meta);
    }

    resource.with_inner(|inner| {
        inner.local_file = local_file;
        inner.size = size;
        inner.status.remove(Status::PRECONNECT | Status::CONNECTING);
        inner.status.insert(Status::CONNECTED);
        if current {
            // up to date: the download phase has nothing left to do
            inner.status.remove(Status::PREDOWNLOAD | Status::DOWNLOADING);
            inner.status.insert(Status::DOWNLOADED);
        }
    });

    if !current {
        if let Some(meta) = &remote {
            entry.set_remote_content_length(meta.content_length);
            entry.set_last_modified(meta.last_modified);
        }
    }
    entry.set_last_updated(SystemTime::now());
    entry.store()?;

    engine.broadcast_completion();
    resource.fire_download_event(); // CONNECTED
    drop(entry_lock);
    Ok(())
}

fn download_resource(engine: &Arc<Engine>, resource: &Arc<Resource>) {
    resource.fire_download_event(); // DOWNLOADING
    match try_download(engine, resource) {
        Ok(()) => resource.fire_download_event(), // DOWNLOADED
        Err(err) => fail(engine, resource, &err),
    }
}

/// Download phase: stream the payload into the cache under its
/// encoding-specific key, decode if needed, and publish the artifact.
fn try_download(engine: &Arc<Engine>, resource: &Arc<Resource>) -> Result<(), WorkerError> {
    let store = engine.store();
    let location = resource.location().clone();
    let version = resource.request_version().cloned();

    let mut origin_entry = CacheEntry::open(store, &location, version.as_ref())?;
    let _origin_lock = origin_entry.lock()?;

    let real_location = resource
        .download_location()
        .unwrap_or_else(|| location.clone());
    let (meta, body) = engine.transport().open(&real_location)?;

    let kind = ContentKind::classify(meta.content_encoding.as_deref(), real_location.path());
    debug!(
        url = %location,
        via = %real_location,
        encoding = ?meta.content_encoding,
        kind = ?kind,
        "downloading"
    );

    // We asked for a.jar, but the server may have sent a.jar.pack.gz or
    // a.jar.gz; the payload is stored under the matching synthetic key,
    // beside the decoded artifact.
    let download_location = match kind.key_suffix() {
        Some(suffix) => Url::parse(&format!("{location}{suffix}"))?,
        None => location.clone(),
    };

    let download_file = store.cache_file_for(&download_location, version.as_ref());
    let mut download_entry = CacheEntry::open(store, &download_location, version.as_ref())?;
    let final_file = store.cache_file_for(&location, version.as_ref());

    if !download_entry.is_current(meta.last_modified) {
        transfer(engine, resource, body, &download_location, version.as_ref())?;

        if kind != ContentKind::Plain {
            download_entry.set_remote_content_length(meta.content_length);
            download_entry.set_last_modified(meta.last_modified);
        }

        match kind {
            ContentKind::PackGz => {
                let unpacker = engine.unpacker().ok_or(UnpackError::NoUnpacker)?;
                unpack_packgz_file(unpacker.as_ref(), &download_file, &final_file)?;
            }
            ContentKind::Gzip => {
                gunzip_file(&download_file, &final_file)?;
            }
            ContentKind::Plain => {}
        }
    } else {
        // same payload already on disk; count it as moved and skip the wire
        drop(body);
        let len = std::fs::metadata(&download_file).map(|m| m.len()).unwrap_or(0);
        resource.set_transferred(len);
    }

    if download_file != final_file {
        let decoded_len = std::fs::metadata(&final_file).map(|m| m.len()).ok();
        origin_entry.set_original_content_length(decoded_len);
        origin_entry.store()?;
        download_entry.mark_for_delete();
        download_entry.store()?;
    }

    resource.change_status(Status::DOWNLOADING, Status::DOWNLOADED);
    engine.broadcast_completion();
    Ok(())
}

/// Stream the body into the cache in fixed-size chunks, bumping the
/// resource's transfer counter per chunk. Dropping the stream at the end
/// disconnects.
fn transfer(
    engine: &Engine,
    resource: &Resource,
    mut body: ByteStream,
    download_location: &Url,
    version: Option<&Version>,
) -> Result<(), WorkerError> {
    let mut out = engine
        .store()
        .open_output_stream(download_location, version)?;
    let mut buf = vec![0u8; engine.chunk_size()];
    loop {
        if engine.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        let read = body.read(&mut buf)?;
        if read == 0 {
            break;
        }
        resource.increment_transferred(read as u64);
        out.write_all(&buf[..read])?;
    }
    out.flush()?;
    Ok(())
}
