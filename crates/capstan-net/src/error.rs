use thiserror::Error;
use url::Url;

pub type NetResult<T> = Result<T, NetError>;

/// Centralized error type for capstan-net
#[derive(Debug, Error)]
pub enum NetError {
    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    InvalidStatus { url: Url, status: u16 },
    #[error("{url} redirects ({status}) to {target}, and redirect following is disabled")]
    RedirectDisallowed { url: Url, status: u16, target: Url },
    #[error("no candidate URL answered")]
    NoUsableUrl,
}
