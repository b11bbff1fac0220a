use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Centralized error type for capstan-core
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("URL normalization failed: {0}")]
    Normalization(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}
