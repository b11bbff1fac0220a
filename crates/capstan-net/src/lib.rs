#![forbid(unsafe_code)]

pub mod candidates;
pub mod error;
pub mod probe;
pub mod transport;
pub mod types;

pub use candidates::{candidate_urls, DownloadOptions};
pub use error::{NetError, NetResult};
pub use probe::{RequestMethod, UrlProber, REQUEST_METHODS};
pub use transport::{ByteStream, HttpTransport, ProbeOutcome};
pub use types::{ContentKind, NetOptions, RemoteMeta, ACCEPT_ENCODING};
