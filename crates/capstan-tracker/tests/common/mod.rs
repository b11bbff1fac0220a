//! Shared scaffolding for tracker integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use capstan_tracker::{Engine, EngineOptions};
use url::Url;

/// Opt-in tracing for debugging test failures: `CAPSTAN_LOG=debug cargo test`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("CAPSTAN_LOG"))
        .try_init();
}

/// Serve an axum router from a background thread owning its own runtime;
/// the blocking engine is exercised from the test thread.
pub fn serve(app: Router) -> String {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    let addr: SocketAddr = rx.recv().unwrap();
    format!("http://{addr}")
}

pub fn engine(cache_dir: &Path) -> Arc<Engine> {
    Engine::new(EngineOptions::new(cache_dir)).unwrap()
}

pub fn engine_with(options: EngineOptions) -> Arc<Engine> {
    Engine::new(options).unwrap()
}

pub fn url(base: &str, path: &str) -> Url {
    Url::parse(&format!("{base}{path}")).unwrap()
}

/// Router serving one artifact with optional `Last-Modified` and
/// `Content-Encoding` headers.
pub fn artifact_router(
    path: &'static str,
    body: Vec<u8>,
    last_modified: Option<String>,
    encoding: Option<&'static str>,
) -> Router {
    Router::new().route(
        path,
        get(move || {
            let body = body.clone();
            let last_modified = last_modified.clone();
            async move {
                let mut builder = Response::builder().status(StatusCode::OK);
                if let Some(stamp) = last_modified {
                    builder = builder.header("Last-Modified", stamp);
                }
                if let Some(encoding) = encoding {
                    builder = builder.header("Content-Encoding", encoding);
                }
                builder.body(Body::from(body)).unwrap()
            }
        }),
    )
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn http_date(secs_since_epoch: u64) -> String {
    httpdate::fmt_http_date(std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs_since_epoch))
}
