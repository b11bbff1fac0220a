//! Deterministic mapping from resource identity to cache paths.

use capstan_core::Version;
use sha2::{Digest, Sha256};
use url::Url;

/// Directory name for a `(url, version)` identity.
///
/// SHA-256 over the URL string plus the version, truncated to 16 bytes and
/// hex-encoded, stable across runs. Synthetic compressed-variant URLs
/// (`…jar.pack.gz`) hash to their own directories.
pub(crate) fn identity_hash(url: &Url, version: Option<&Version>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    if let Some(version) = version {
        hasher.update(b"|");
        hasher.update(version.as_str().as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// File name for the cached artifact: the URL's last path segment,
/// ignoring the query string.
pub(crate) fn artifact_name(url: &Url) -> String {
    let path = url.path();
    let base = path.rsplit('/').next().unwrap_or(path);
    if base.is_empty() {
        "resource".to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn hash_is_stable_and_version_sensitive() {
        let u = url("http://h/a.jar");
        assert_eq!(identity_hash(&u, None), identity_hash(&u, None));
        assert_ne!(
            identity_hash(&u, None),
            identity_hash(&u, Some(&Version::new("1.0")))
        );
    }

    #[test]
    fn compressed_variant_hashes_apart() {
        assert_ne!(
            identity_hash(&url("http://h/a.jar"), None),
            identity_hash(&url("http://h/a.jar.pack.gz"), None)
        );
    }

    #[test]
    fn artifact_name_ignores_query() {
        assert_eq!(artifact_name(&url("http://h/dir/a.jar?version-id=1")), "a.jar");
        assert_eq!(artifact_name(&url("http://h/")), "resource");
    }
}
