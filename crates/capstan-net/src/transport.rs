//! Blocking HTTP transport.
//!
//! A thin wrapper over `reqwest`'s blocking client, configured so the engine
//! sees the wire as-is: redirects are never followed automatically (the
//! prober classifies 3xx itself) and response bodies are never transparently
//! decompressed (content encoding drives the cache key).

use std::io::{self, Read};

use reqwest::blocking::{Client, Response};
use reqwest::header;
use reqwest::redirect::Policy;
use tracing::trace;
use url::Url;

use crate::error::{NetError, NetResult};
use crate::probe::RequestMethod;
use crate::types::{NetOptions, RemoteMeta, ACCEPT_ENCODING};

/// Status and redirect target of a single probe request.
#[derive(Clone, Debug)]
pub struct ProbeOutcome {
    pub status: u16,
    pub redirect: Option<Url>,
}

impl ProbeOutcome {
    /// Whether the status asks for a redirect. 303 is kept in the set: it is
    /// GET-after-POST semantically, harmless for HEAD/GET probing.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// Whether the status is outside the success range.
    pub fn is_invalid(&self) -> bool {
        self.status < 200 || self.status >= 300
    }
}

/// Streaming response body. Dropping it disconnects.
#[derive(Debug)]
pub struct ByteStream {
    response: Response,
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.response.read(buf)
    }
}

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(options: &NetOptions) -> NetResult<Self> {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Send a probe request and report status plus redirect target.
    ///
    /// The body is drained and dropped so the connection can be reused.
    pub fn probe(&self, method: RequestMethod, url: &Url) -> NetResult<ProbeOutcome> {
        let mut response = self
            .client
            .request(method.into(), url.clone())
            .header(header::ACCEPT_ENCODING, ACCEPT_ENCODING)
            .send()?;

        let status = response.status().as_u16();
        let redirect = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| url.join(v).ok());

        let _ = io::copy(&mut response, &mut io::sink());
        trace!(method = %method, url = %url, status, "probe");

        Ok(ProbeOutcome { status, redirect })
    }

    /// Fetch only the response headers of a GET, dropping the body unread.
    pub fn fetch_meta(&self, url: &Url) -> NetResult<RemoteMeta> {
        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT_ENCODING, ACCEPT_ENCODING)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetError::InvalidStatus {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(meta_from(&response))
    }

    /// Open a GET to the URL and return the response metadata plus the raw
    /// byte stream.
    pub fn open(&self, url: &Url) -> NetResult<(RemoteMeta, ByteStream)> {
        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT_ENCODING, ACCEPT_ENCODING)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetError::InvalidStatus {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        let meta = meta_from(&response);
        Ok((meta, ByteStream { response }))
    }
}

fn meta_from(response: &Response) -> RemoteMeta {
    let headers = response.headers();
    RemoteMeta {
        content_length: headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()),
        last_modified: headers
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| httpdate::parse_http_date(v).ok()),
        content_encoding: headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase()),
    }
}
