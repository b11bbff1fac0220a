//! Ambient network environment.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

/// Connectivity state and network policy consulted by the engine.
///
/// The `online` flag starts optimistic and is refreshed by
/// [`Env::detect_online`] before each connect phase. Redirect following is
/// opt-in and disabled by default.
#[derive(Debug)]
pub struct Env {
    offline_forced: bool,
    allow_redirect: bool,
    online: AtomicBool,
    probe_timeout: Duration,
}

impl Default for Env {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl Env {
    pub fn new(offline_forced: bool, allow_redirect: bool) -> Self {
        Self {
            offline_forced,
            allow_redirect,
            online: AtomicBool::new(true),
            probe_timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn is_offline_forced(&self) -> bool {
        self.offline_forced
    }

    pub fn is_online(&self) -> bool {
        !self.offline_forced && self.online.load(Ordering::Relaxed)
    }

    pub fn is_allow_redirect(&self) -> bool {
        self.allow_redirect
    }

    /// Probe reachability of the URL's origin and refresh the online flag.
    ///
    /// Non-network schemes (no host) count as reachable. The probe is a bare
    /// TCP connect; HTTP-level failures are left to the prober.
    pub fn detect_online(&self, url: &Url) {
        if self.offline_forced {
            return;
        }
        let Some(host) = url.host_str() else {
            self.online.store(true, Ordering::Relaxed);
            return;
        };
        let port = url.port_or_known_default().unwrap_or(80);
        let reachable = (host, port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(|addr| TcpStream::connect_timeout(&addr, self.probe_timeout).is_ok())
            .unwrap_or(false);
        if reachable {
            debug!(url = %url, "origin reachable");
        } else {
            warn!(url = %url, "origin unreachable, treating environment as offline");
        }
        self.online.store(reachable, Ordering::Relaxed);
    }
}
