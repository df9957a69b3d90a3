//! Range-capable HTTP fetching.
//!
//! [`RangeFetch`] is the seam between the download engine and the network:
//! the engine asks for a body starting at a byte offset and interprets the
//! returned status and headers itself. [`HttpClient`] is the reqwest-backed
//! implementation with basic-auth credentials.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;

/// Streamed response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DownloadError>> + Send>>;

/// Parsed `Content-Range: bytes start-end/total` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte position in the body.
    pub start: u64,
    /// Last byte position in the body (inclusive).
    pub end: u64,
    /// Complete resource length, unless the server sent `*`.
    pub total: Option<u64>,
}

/// Status, headers of interest, and body of a successful fetch.
pub struct FetchResponse {
    /// HTTP status code (2xx).
    pub status: u16,
    /// `Content-Length` of this response body.
    pub content_length: Option<u64>,
    /// `Content-Range`, for partial responses.
    pub content_range: Option<ContentRange>,
    /// The body.
    pub body: ByteStream,
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

impl FetchResponse {
    /// Whether the server answered with partial content.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }
}

/// Byte-range capable fetch used by the download engine.
#[async_trait]
pub trait RangeFetch: Send + Sync {
    /// Opens `url`, asking for bytes from `start_offset` onwards when it is
    /// non-zero.
    ///
    /// Non-2xx responses are returned as [`DownloadError::HttpStatus`].
    async fn open(&self, url: &str, start_offset: u64) -> Result<FetchResponse, DownloadError>;

    /// Asks the server for the resource size without downloading it.
    ///
    /// Returns `None` when the server does not advertise a length or the probe
    /// fails; callers treat that as "size unknown".
    async fn probe_size(&self, url: &str) -> Option<u64>;
}

/// HTTP client for listing and file downloads, with optional basic auth.
///
/// Created once per run and reused for every request (connection pooling).
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    credentials: Option<(String, String)>,
}

impl HttpClient {
    /// Creates a client with the default timeouts (10s connect, 30s read).
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot initialize.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a client with explicit timeouts.
    ///
    /// The read timeout applies per read, so large files are never cut off by
    /// a total-request deadline.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot initialize.
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(concat!("filesync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            credentials: None,
        })
    }

    /// Attaches basic-auth credentials to every request.
    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Fetches a page (the directory listing) as text.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for network failures, timeouts and non-2xx
    /// statuses.
    #[instrument(skip(self))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.send(self.client.get(url), url).await?;
        response
            .text()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, DownloadError> {
        let request = match &self.credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl RangeFetch for HttpClient {
    #[instrument(skip(self))]
    async fn open(&self, url: &str, start_offset: u64) -> Result<FetchResponse, DownloadError> {
        reqwest::Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(url);
        if start_offset > 0 {
            request = request.header(RANGE, format!("bytes={start_offset}-"));
        }
        let response = self.send(request, url).await?;

        let headers = response.headers();
        let status = response.status().as_u16();
        let content_length = header_u64(headers, CONTENT_LENGTH.as_str());
        let content_range = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let accepts_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
        debug!(status, ?content_length, ?content_range, accepts_ranges, "response headers");

        let stream_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| DownloadError::from_reqwest(stream_url.clone(), e)));

        Ok(FetchResponse {
            status,
            content_length,
            content_range,
            body: Box::pin(body),
        })
    }

    #[instrument(skip(self))]
    async fn probe_size(&self, url: &str) -> Option<u64> {
        match self.send(self.client.head(url), url).await {
            Ok(response) => header_u64(response.headers(), CONTENT_LENGTH.as_str()),
            Err(e) => {
                debug!(error = %e, "size probe failed");
                None
            }
        }
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Parses a `Content-Range` value such as `bytes 100-199/200` or
/// `bytes 100-199/*`.
#[must_use]
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        digits => Some(digits.parse::<u64>().ok()?),
    };
    Some(ContentRange { start, end, total })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_with_total() {
        assert_eq!(
            parse_content_range("bytes 1000-50000/50001"),
            Some(ContentRange {
                start: 1000,
                end: 50000,
                total: Some(50001)
            })
        );
    }

    #[test]
    fn test_parse_content_range_unknown_total() {
        let range = parse_content_range("bytes 3-5/*").unwrap();
        assert_eq!(range.start, 3);
        assert_eq!(range.total, None);
    }

    #[test]
    fn test_parse_content_range_rejects_garbage() {
        assert_eq!(parse_content_range(""), None);
        assert_eq!(parse_content_range("bytes */100"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("bytes 9-3/10"), None);
    }

    #[test]
    fn test_http_client_builds() {
        let client = HttpClient::new().unwrap().with_basic_auth("user", "pass");
        assert!(client.credentials.is_some());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_url() {
        let client = HttpClient::new().unwrap();
        let result = client.open("not a url", 0).await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }
}
