//! End-to-end download scenarios against live servers.

mod common;

use std::fs;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use capstan_cache::CacheEntry;
use capstan_core::UpdatePolicy;
use capstan_net::DownloadOptions;
use capstan_tracker::{EngineOptions, Tracker};
use capstan_unpack::{UnpackResult, Unpacker};
use common::{artifact_router, engine, engine_with, gzip, http_date, serve, url};
use tempfile::tempdir;
use url::Url;

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

/// Test decoder standing in for a pack200 implementation.
struct PrefixUnpacker;

impl Unpacker for PrefixUnpacker {
    fn unpack(&self, input: &mut dyn Read, output: &mut dyn Write) -> UnpackResult<()> {
        output.write_all(b"JAR:")?;
        std::io::copy(input, output)?;
        Ok(())
    }
}

#[test]
fn plain_download_end_to_end() {
    common::init_tracing();
    let dir = tempdir().unwrap();
    let base = serve(artifact_router(
        "/a.jar",
        b"0123456789".to_vec(),
        Some(http_date(1_700_000_000)),
        None,
    ));
    let tracker = Tracker::new(engine(dir.path()));
    let location = url(&base, "/a.jar");

    tracker
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Always)
        .unwrap();
    assert!(tracker
        .wait_for_resources(std::slice::from_ref(&location), WAIT)
        .unwrap());

    assert!(tracker.check_resource(&location).unwrap());
    assert_eq!(tracker.amount_read(&location).unwrap(), 10);
    assert_eq!(tracker.total_size(&location).unwrap(), 10);

    let file = tracker.get_cache_file(&location).unwrap().expect("cache file");
    assert_eq!(fs::read(&file).unwrap(), b"0123456789");

    let cache_url = tracker.get_cache_url(&location).unwrap();
    assert_eq!(cache_url.scheme(), "file");
}

#[test]
fn fresh_cache_is_reused_without_transfer() {
    let dir = tempdir().unwrap();
    let stamp = http_date(1_700_000_000);
    let base = serve(artifact_router(
        "/a.jar",
        b"0123456789".to_vec(),
        Some(stamp),
        None,
    ));
    let location = url(&base, "/a.jar");

    // first session populates the cache
    let first = Tracker::new(engine(dir.path()));
    first
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Always)
        .unwrap();
    assert!(first.wait_for_resource(&location, WAIT).unwrap());
    let cached = first.get_cache_file(&location).unwrap().expect("cache file");

    // second session revalidates: same Last-Modified, so no body moves
    let second = Tracker::new(engine(dir.path()));
    second
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Session)
        .unwrap();
    assert!(second.wait_for_resource(&location, WAIT).unwrap());

    assert_eq!(second.amount_read(&location).unwrap(), 0);
    assert_eq!(second.total_size(&location).unwrap(), 10);
    assert_eq!(
        second.get_cache_file(&location).unwrap().expect("cache file"),
        cached
    );
}

#[test]
fn never_policy_serves_the_cache_without_network() {
    let dir = tempdir().unwrap();
    // nothing listens on this port; any network attempt would fail loudly
    let location = Url::parse("http://127.0.0.1:9/offline.jar").unwrap();

    let engine = engine(dir.path());
    let store = engine.store();
    let mut out = store.open_output_stream(&location, None).unwrap();
    out.write_all(b"cached").unwrap();
    out.flush().unwrap();
    drop(out);
    let mut entry = CacheEntry::for_artifact(store.cache_file_for(&location, None)).unwrap();
    entry.set_last_updated(std::time::SystemTime::now());
    entry.store().unwrap();

    let tracker = Tracker::new(engine);
    tracker
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Never)
        .unwrap();

    // terminal straight out of add_resource
    assert!(tracker.check_resource(&location).unwrap());
    assert_eq!(tracker.amount_read(&location).unwrap(), 6);
    assert_eq!(tracker.total_size(&location).unwrap(), 6);
    let file = tracker.get_cache_file(&location).unwrap().expect("cache file");
    assert_eq!(fs::read(file).unwrap(), b"cached");
}

#[test]
fn force_refetches_into_a_new_generation() {
    let dir = tempdir().unwrap();
    let base = serve(artifact_router(
        "/a.jar",
        b"0123456789".to_vec(),
        Some(http_date(1_700_000_000)),
        None,
    ));
    let location = url(&base, "/a.jar");

    let first = Tracker::new(engine(dir.path()));
    first
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Always)
        .unwrap();
    assert!(first.wait_for_resource(&location, WAIT).unwrap());
    let old_file = first.get_cache_file(&location).unwrap().expect("cache file");

    let second = Tracker::new(engine(dir.path()));
    second
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Force)
        .unwrap();
    assert!(second.wait_for_resource(&location, WAIT).unwrap());
    let new_file = second.get_cache_file(&location).unwrap().expect("cache file");

    assert_ne!(old_file, new_file);
    assert_eq!(second.amount_read(&location).unwrap(), 10);
    assert_eq!(fs::read(&new_file).unwrap(), b"0123456789");

    let old_entry = CacheEntry::for_artifact(old_file).unwrap();
    assert!(old_entry.is_marked_for_delete());
}

#[test]
fn gzip_payload_is_stored_and_decoded() {
    let dir = tempdir().unwrap();
    let compressed = gzip(b"hello");
    let compressed_len = compressed.len() as u64;
    let base = serve(artifact_router(
        "/a.jar",
        compressed.clone(),
        Some(http_date(1_700_000_000)),
        Some("gzip"),
    ));
    let engine = engine(dir.path());
    let tracker = Tracker::new(Arc::clone(&engine));
    let location = url(&base, "/a.jar");

    tracker
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Always)
        .unwrap();
    assert!(tracker.wait_for_resource(&location, WAIT).unwrap());

    // the decoded artifact is what callers see
    let final_file = tracker.get_cache_file(&location).unwrap().expect("cache file");
    assert_eq!(fs::read(&final_file).unwrap(), b"hello");
    assert_eq!(tracker.amount_read(&location).unwrap(), compressed_len);

    // the compressed payload sits under the synthetic .gz key, tombstoned
    let gz_location = Url::parse(&format!("{location}.gz")).unwrap();
    let gz_file = engine.store().cache_file_for(&gz_location, None);
    assert_eq!(fs::read(&gz_file).unwrap(), compressed);
    let gz_entry = CacheEntry::for_artifact(gz_file).unwrap();
    assert!(gz_entry.is_marked_for_delete());

    // the origin entry records the decoded length
    let origin_entry = CacheEntry::for_artifact(final_file).unwrap();
    assert_eq!(origin_entry.original_content_length(), Some(5));
}

#[test]
fn packgz_payload_runs_the_unpacker() {
    let dir = tempdir().unwrap();
    let base = serve(artifact_router(
        "/a.jar",
        gzip(b"pack-payload"),
        Some(http_date(1_700_000_000)),
        Some("pack200-gzip"),
    ));
    let engine = engine_with(
        EngineOptions::new(dir.path()).with_unpacker(Arc::new(PrefixUnpacker)),
    );
    let tracker = Tracker::new(engine);
    let location = url(&base, "/a.jar");

    tracker
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Always)
        .unwrap();
    assert!(tracker.wait_for_resource(&location, WAIT).unwrap());

    let file = tracker.get_cache_file(&location).unwrap().expect("cache file");
    assert_eq!(fs::read(file).unwrap(), b"JAR:pack-payload");
}

#[test]
fn packgz_without_an_unpacker_fails_the_resource() {
    let dir = tempdir().unwrap();
    let base = serve(artifact_router(
        "/a.jar",
        gzip(b"pack-payload"),
        None,
        Some("pack200-gzip"),
    ));
    let tracker = Tracker::new(engine(dir.path()));
    let location = url(&base, "/a.jar");

    tracker
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Always)
        .unwrap();
    assert!(tracker.wait_for_resource(&location, WAIT).unwrap());
    assert_eq!(tracker.get_cache_file(&location).unwrap(), None);
}

#[test]
fn pack_suffix_candidate_is_probed_first() {
    let dir = tempdir().unwrap();
    // only the pre-packed form exists on the server
    let base = serve(artifact_router(
        "/a.jar.pack.gz",
        gzip(b"pack-payload"),
        Some(http_date(1_700_000_000)),
        None,
    ));
    let engine = engine_with(
        EngineOptions::new(dir.path()).with_unpacker(Arc::new(PrefixUnpacker)),
    );
    let tracker = Tracker::new(engine);
    let location = url(&base, "/a.jar");

    tracker
        .add_resource(
            &location,
            None,
            DownloadOptions::new(false, true),
            UpdatePolicy::Always,
        )
        .unwrap();
    assert!(tracker.wait_for_resource(&location, WAIT).unwrap());

    let file = tracker.get_cache_file(&location).unwrap().expect("cache file");
    assert_eq!(fs::read(file).unwrap(), b"JAR:pack-payload");
}

#[test]
fn versioned_candidate_is_used_when_enabled() {
    let dir = tempdir().unwrap();
    let app = Router::new()
        .route("/a.jar", get(|| async { axum::http::StatusCode::NOT_FOUND }))
        .merge(artifact_router(
            "/a__V1.0.jar",
            b"versioned".to_vec(),
            Some(http_date(1_700_000_000)),
            None,
        ));
    let base = serve(app);
    let tracker = Tracker::new(engine(dir.path()));
    let location = url(&base, "/a.jar");

    tracker
        .add_resource(
            &location,
            Some("1.0".into()),
            DownloadOptions::new(true, false),
            UpdatePolicy::Always,
        )
        .unwrap();
    assert!(tracker.wait_for_resource(&location, WAIT).unwrap());

    let file = tracker.get_cache_file(&location).unwrap().expect("cache file");
    assert_eq!(fs::read(file).unwrap(), b"versioned");
}

#[test]
fn allowed_redirect_downloads_the_target() {
    let dir = tempdir().unwrap();
    let app = Router::new()
        .route(
            "/a.jar",
            get(|| async {
                axum::response::Response::builder()
                    .status(axum::http::StatusCode::FOUND)
                    .header("Location", "/b.jar")
                    .body(axum::body::Body::empty())
                    .unwrap()
            }),
        )
        .merge(artifact_router(
            "/b.jar",
            b"redirected".to_vec(),
            Some(http_date(1_700_000_000)),
            None,
        ));
    let base = serve(app);
    let engine = engine_with(EngineOptions::new(dir.path()).with_allow_redirect(true));
    let tracker = Tracker::new(engine);
    let location = url(&base, "/a.jar");

    tracker
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Always)
        .unwrap();
    assert!(tracker.wait_for_resource(&location, WAIT).unwrap());

    let file = tracker.get_cache_file(&location).unwrap().expect("cache file");
    assert_eq!(fs::read(file).unwrap(), b"redirected");
}

#[test]
fn disallowed_redirect_ends_in_error() {
    let dir = tempdir().unwrap();
    let app = Router::new()
        .route(
            "/a.jar",
            get(|| async {
                axum::response::Response::builder()
                    .status(axum::http::StatusCode::FOUND)
                    .header("Location", "/b.jar")
                    .body(axum::body::Body::empty())
                    .unwrap()
            }),
        )
        .merge(artifact_router("/b.jar", b"redirected".to_vec(), None, None));
    let base = serve(app);
    let tracker = Tracker::new(engine(dir.path()));
    let location = url(&base, "/a.jar");

    tracker
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Always)
        .unwrap();
    // the wait finishes: error states are terminal
    assert!(tracker.wait_for_resource(&location, WAIT).unwrap());
    assert!(tracker.check_resource(&location).unwrap());
    assert_eq!(tracker.get_cache_file(&location).unwrap(), None);
}

#[test]
fn wait_deadline_expires_on_a_stalled_server() {
    let dir = tempdir().unwrap();
    let app = Router::new().route(
        "/slow.jar",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }),
    );
    let base = serve(app);
    let tracker = Tracker::new(engine(dir.path()));
    let location = url(&base, "/slow.jar");

    tracker
        .add_resource(&location, None, DownloadOptions::default(), UpdatePolicy::Always)
        .unwrap();
    let done = tracker
        .wait_for_resource(&location, Some(Duration::from_millis(300)))
        .unwrap();
    assert!(!done);
    assert!(!tracker.check_resource(&location).unwrap());
}
