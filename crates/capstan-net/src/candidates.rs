//! Candidate URL generation.
//!
//! Servers publishing launcher artifacts may carry version-suffixed files
//! (`a__V1.0.jar`), pre-packed files (`a.jar.pack.gz`), both, or only the
//! plain artifact. The prober tries the most specific form first and falls
//! back toward the plain location.

use capstan_core::Version;
use url::Url;

/// Per-resource toggles consulted when generating candidate URLs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    pub use_version_suffix: bool,
    pub use_pack_suffix: bool,
}

impl DownloadOptions {
    pub fn new(use_version_suffix: bool, use_pack_suffix: bool) -> Self {
        Self {
            use_version_suffix,
            use_pack_suffix,
        }
    }
}

/// Enumerate download candidates for a resource, most specific first:
/// version+pack suffixed, pack suffixed, version suffixed, the location
/// itself, then the `?version-id=` query form. Duplicates are dropped so a
/// probe never visits the same candidate twice.
pub fn candidate_urls(
    location: &Url,
    version: Option<&Version>,
    options: DownloadOptions,
) -> Vec<Url> {
    let mut urls = Vec::new();
    let versioned = if options.use_version_suffix {
        version
    } else {
        None
    };

    if options.use_pack_suffix {
        if let Some(v) = versioned {
            push_unique(&mut urls, rewritten(location, Some(v), true));
        }
        push_unique(&mut urls, rewritten(location, None, true));
    }
    if let Some(v) = versioned {
        push_unique(&mut urls, rewritten(location, Some(v), false));
    }

    push_unique(&mut urls, Some(location.clone()));

    if let Some(v) = version {
        let mut query_form = location.clone();
        query_form
            .query_pairs_mut()
            .append_pair("version-id", v.as_str());
        push_unique(&mut urls, Some(query_form));
    }

    urls
}

fn push_unique(urls: &mut Vec<Url>, candidate: Option<Url>) {
    if let Some(url) = candidate {
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
}

/// Rewrite the last path segment: `a.jar` becomes `a__V1.0.jar` when
/// versioned, with `.pack.gz` appended when packed.
fn rewritten(location: &Url, version: Option<&Version>, pack: bool) -> Option<Url> {
    let name = location.path().rsplit('/').next().unwrap_or("");
    if name.is_empty() {
        return None;
    }

    let mut file = match version {
        Some(v) => match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}__V{v}.{ext}"),
            None => format!("{name}__V{v}"),
        },
        None => name.to_string(),
    };
    if pack {
        file.push_str(".pack.gz");
    }

    let mut out = location.clone();
    {
        let mut segments = out.path_segments_mut().ok()?;
        segments.pop();
        segments.push(&file);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn strings(urls: &[Url]) -> Vec<&str> {
        urls.iter().map(Url::as_str).collect()
    }

    #[test]
    fn plain_location_only() {
        let urls = candidate_urls(&url("http://h/a.jar"), None, DownloadOptions::default());
        assert_eq!(strings(&urls), ["http://h/a.jar"]);
    }

    #[test]
    fn version_without_suffix_still_adds_query_form() {
        let urls = candidate_urls(
            &url("http://h/a.jar"),
            Some(&Version::new("1.0")),
            DownloadOptions::default(),
        );
        assert_eq!(
            strings(&urls),
            ["http://h/a.jar", "http://h/a.jar?version-id=1.0"]
        );
    }

    #[test]
    fn pack_suffix_comes_first() {
        let urls = candidate_urls(
            &url("http://h/a.jar"),
            None,
            DownloadOptions::new(false, true),
        );
        assert_eq!(strings(&urls), ["http://h/a.jar.pack.gz", "http://h/a.jar"]);
    }

    #[test]
    fn all_forms_in_specificity_order() {
        let urls = candidate_urls(
            &url("http://h/dir/a.jar"),
            Some(&Version::new("1.0")),
            DownloadOptions::new(true, true),
        );
        assert_eq!(
            strings(&urls),
            [
                "http://h/dir/a__V1.0.jar.pack.gz",
                "http://h/dir/a.jar.pack.gz",
                "http://h/dir/a__V1.0.jar",
                "http://h/dir/a.jar",
                "http://h/dir/a.jar?version-id=1.0",
            ]
        );
    }

    #[test]
    fn extensionless_names_get_version_appended() {
        let urls = candidate_urls(
            &url("http://h/artifact"),
            Some(&Version::new("2")),
            DownloadOptions::new(true, false),
        );
        assert_eq!(
            strings(&urls),
            [
                "http://h/artifact__V2",
                "http://h/artifact",
                "http://h/artifact?version-id=2",
            ]
        );
    }
}
