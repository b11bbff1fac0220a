#![forbid(unsafe_code)]

pub mod error;
pub mod gzip;
pub mod pack;

pub use error::{UnpackError, UnpackResult};
pub use gzip::gunzip_file;
pub use pack::{unpack_packgz_file, Unpacker};
