use thiserror::Error;

pub type UnpackResult<T> = Result<T, UnpackError>;

/// Centralized error type for capstan-unpack
#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("I/O during decode: {0}")]
    Io(#[from] std::io::Error),
    #[error("pack decode failed: {0}")]
    Pack(String),
    #[error("no unpacker configured for pack200-gzip content")]
    NoUnpacker,
}
