//! URL normalization and equality for resource identity.

use url::Url;

use crate::error::{CoreError, CoreResult};

/// Normalize a URL into the form used for resource identity.
///
/// Lowercases the scheme and host, strips default ports and the fragment,
/// and keeps the query (versioned requests ride in the query string).
/// Idempotent: normalizing an already-normalized URL is a no-op.
pub fn normalize_url(url: &Url) -> CoreResult<Url> {
    let mut normal = url.clone();

    normal.set_fragment(None);

    let scheme = normal.scheme();
    let scheme_lower = scheme.to_ascii_lowercase();
    if scheme != scheme_lower {
        normal
            .set_scheme(&scheme_lower)
            .map_err(|()| CoreError::Normalization(url.to_string()))?;
    }

    if let Some(host) = normal.host_str() {
        let host_lower = host.to_ascii_lowercase();
        if host != host_lower {
            normal
                .set_host(Some(&host_lower))
                .map_err(|e| CoreError::Normalization(format!("{url}: {e}")))?;
        }
    }

    match (normal.scheme(), normal.port()) {
        ("http", Some(80)) | ("https", Some(443)) => {
            let _ = normal.set_port(None);
        }
        _ => {}
    }

    Ok(normal)
}

/// Equivalence used for interning: equality of the normalized forms.
///
/// Falls back to raw equality when either URL refuses normalization.
pub fn urls_equal(a: &Url, b: &Url) -> bool {
    match (normalize_url(a), normalize_url(b)) {
        (Ok(na), Ok(nb)) => na == nb,
        _ => a == b,
    }
}
