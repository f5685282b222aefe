//! HTTP range fetcher.
//!
//! Resume uses the standard `Range: bytes=N-` request header. Servers that
//! ignore the header answer `200 OK` with the whole body, which the scheduler
//! treats as a restart from offset 0.

use std::io;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, CONTENT_RANGE, RANGE, USER_AGENT};
use reqwest::StatusCode;

use super::error::{DownloadError, DownloadResult};
use super::fetch::{RangeBody, RangeFetcher};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// User agent the content servers expect.
pub const DEFAULT_USER_AGENT: &str = "BestHTTP";

/// Blocking HTTP implementation of [`RangeFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    user_agent: String,
}

impl HttpFetcher {
    /// Create a fetcher with default timeout and user agent.
    pub fn new() -> DownloadResult<Self> {
        Self::with_settings(Duration::from_secs(DEFAULT_TIMEOUT_SECS), DEFAULT_USER_AGENT)
    }

    /// Create a fetcher with a custom timeout and user agent.
    pub fn with_settings(timeout: Duration, user_agent: impl Into<String>) -> DownloadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            user_agent: user_agent.into(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Underlying client, shared with manifest and server lookups.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            DownloadError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl RangeFetcher for HttpFetcher {
    fn fetch(&self, url: &str, offset: u64) -> DownloadResult<RangeBody> {
        // Build request with optional Range header
        let mut request = self.client.get(url).header(USER_AGENT, &self.user_agent);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = request.send().map_err(|e| self.map_send_error(url, e))?;
        let status = response.status();
        let range = content_range(response.headers());

        match status {
            StatusCode::PARTIAL_CONTENT => {
                let start = range.and_then(|r| r.start).unwrap_or(offset);
                let total = range
                    .and_then(|r| r.total)
                    .or_else(|| response.content_length().map(|len| len + start));
                Ok(RangeBody {
                    start,
                    total,
                    reader: Box::new(response),
                })
            }
            // Asking for bytes past the end of a finished item
            StatusCode::RANGE_NOT_SATISFIABLE
                if range.and_then(|r| r.total) == Some(offset) && offset > 0 =>
            {
                Ok(RangeBody {
                    start: offset,
                    total: Some(offset),
                    reader: Box::new(io::empty()),
                })
            }
            s if s.is_success() => {
                if offset > 0 {
                    tracing::debug!(url = %url, offset, "Server ignored range request, restarting");
                }
                let total = response.content_length();
                Ok(RangeBody {
                    start: 0,
                    total,
                    reader: Box::new(response),
                })
            }
            _ => Err(DownloadError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

/// Parsed `Content-Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    pub start: Option<u64>,
    pub total: Option<u64>,
}

fn content_range(headers: &HeaderMap) -> Option<ContentRange> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

/// Parse `bytes 100-199/200`, `bytes 100-199/*` or `bytes */200`.
pub(crate) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;

    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    let start = match span.trim() {
        "*" => None,
        s => Some(s.split_once('-')?.0.trim().parse::<u64>().ok()?),
    };

    Some(ContentRange { start, total })
}
