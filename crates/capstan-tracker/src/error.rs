use capstan_core::CoreError;
use thiserror::Error;
use url::Url;

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Centralized error type for capstan-tracker
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("location does not name a tracked resource: {0}")]
    InvalidDescriptor(Url),
    #[error("cannot normalize resource URL: {0}")]
    IllegalUrl(#[from] CoreError),
    #[error("wait cancelled")]
    Cancelled,
    #[error(transparent)]
    Net(#[from] capstan_net::NetError),
}
