use std::time::{Duration, SystemTime};

/// `Accept-Encoding` sent with every request: the server may answer a plain
/// artifact request with a pack-gzip or gzip payload.
pub const ACCEPT_ENCODING: &str = "pack200-gzip, gzip";

#[derive(Clone, Debug)]
pub struct NetOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl NetOptions {
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Metadata observed on a remote artifact.
#[derive(Clone, Debug, Default)]
pub struct RemoteMeta {
    pub content_length: Option<u64>,
    pub last_modified: Option<SystemTime>,
    pub content_encoding: Option<String>,
}

/// How a downloaded payload is encoded, decided from the response headers
/// and the resolved path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    /// Tabular-pack container, gzip-wrapped. Decodes to a jar.
    PackGz,
    /// Plain gzip wrapper around the artifact.
    Gzip,
    /// The artifact itself.
    Plain,
}

impl ContentKind {
    /// Classify a response. Pack-gzip is checked first: a pack stream is
    /// itself gzip-wrapped and some servers report only the outer coding.
    pub fn classify(content_encoding: Option<&str>, resolved_path: &str) -> Self {
        let encoding = content_encoding.map(str::to_ascii_lowercase);
        if encoding.as_deref() == Some("pack200-gzip") || resolved_path.ends_with(".pack.gz") {
            ContentKind::PackGz
        } else if encoding.as_deref() == Some("gzip") {
            ContentKind::Gzip
        } else {
            ContentKind::Plain
        }
    }

    /// Suffix appended to the origin location to form the download cache
    /// key, when the stored payload differs from the final artifact.
    pub fn key_suffix(self) -> Option<&'static str> {
        match self {
            ContentKind::PackGz => Some(".pack.gz"),
            ContentKind::Gzip => Some(".gz"),
            ContentKind::Plain => None,
        }
    }
}
