//! Best-URL selection.

use std::fmt;

use tracing::debug;
use url::Url;

use crate::error::{NetError, NetResult};
use crate::transport::HttpTransport;

/// Request methods used when probing candidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestMethod {
    Head,
    Get,
}

/// Probe order: HEAD answers fastest, GET is the fallback for servers that
/// reject HEAD.
pub const REQUEST_METHODS: [RequestMethod; 2] = [RequestMethod::Head, RequestMethod::Get];

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMethod::Head => f.write_str("HEAD"),
            RequestMethod::Get => f.write_str("GET"),
        }
    }
}

impl From<RequestMethod> for reqwest::Method {
    fn from(method: RequestMethod) -> Self {
        match method {
            RequestMethod::Head => reqwest::Method::HEAD,
            RequestMethod::Get => reqwest::Method::GET,
        }
    }
}

/// Selects the first candidate URL that answers success.
pub struct UrlProber<'a> {
    transport: &'a HttpTransport,
    allow_redirect: bool,
}

impl<'a> UrlProber<'a> {
    pub fn new(transport: &'a HttpTransport, allow_redirect: bool) -> Self {
        Self {
            transport,
            allow_redirect,
        }
    }

    /// Iterate `methods × candidates` and return the first URL answering a
    /// success status.
    ///
    /// Redirect targets join the end of the candidate list, unless redirect
    /// following is disallowed, in which case the whole probe fails.
    /// Candidates are kept unique, so within one invocation no URL is tried
    /// twice with the same method. Per-candidate transport errors move on to
    /// the next candidate; `NoUsableUrl` means every candidate failed.
    pub fn find_best_url(&self, candidates: &[Url]) -> NetResult<Url> {
        let mut urls: Vec<Url> = Vec::with_capacity(candidates.len());
        for url in candidates {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }

        for method in REQUEST_METHODS {
            let mut index = 0;
            while index < urls.len() {
                let url = urls[index].clone();
                index += 1;

                match self.transport.probe(method, &url) {
                    Ok(outcome) if outcome.is_redirect() => match outcome.redirect {
                        None => {
                            debug!(
                                method = %method,
                                url = %url,
                                status = outcome.status,
                                "redirect without usable target, not following"
                            );
                        }
                        Some(target) => {
                            if !self.allow_redirect {
                                return Err(NetError::RedirectDisallowed {
                                    url,
                                    status: outcome.status,
                                    target,
                                });
                            }
                            debug!(
                                method = %method,
                                url = %url,
                                status = outcome.status,
                                target = %target,
                                "following redirect, adding target to candidates"
                            );
                            if !urls.contains(&target) {
                                urls.push(target);
                            }
                        }
                    },
                    Ok(outcome) if outcome.is_invalid() => {
                        debug!(
                            method = %method,
                            url = %url,
                            status = outcome.status,
                            "candidate rejected"
                        );
                    }
                    Ok(outcome) => {
                        debug!(
                            method = %method,
                            url = %url,
                            status = outcome.status,
                            "best URL selected"
                        );
                        return Ok(url);
                    }
                    Err(err) => {
                        debug!(method = %method, url = %url, error = %err, "candidate failed");
                    }
                }
            }
        }

        Err(NetError::NoUsableUrl)
    }
}
