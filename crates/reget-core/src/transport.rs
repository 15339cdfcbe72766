//! Raw HTTP transport
//!
//! [`HttpTransport`] is the narrow seam between the engine and the network:
//! one call per request, no retries, no knowledge of files. The production
//! implementation is [`ReqwestTransport`].

use crate::error::RegetError;
use async_trait::async_trait;
use futures::TryStreamExt;
use reget_types::{ByteRange, ResourceMetadata, Settings};
use reqwest::{Client, Response, StatusCode};
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Response body handed to the engine as a plain byte reader
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// One-shot HTTP operations used by the download engine
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Probe the resource for its size and range support
    async fn fetch_metadata(&self, url: &str) -> Result<ResourceMetadata, RegetError>;

    /// Request the whole resource
    async fn fetch_full(&self, url: &str) -> Result<BodyReader, RegetError>;

    /// Request the bytes of `range` only
    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<BodyReader, RegetError>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client from engine settings
    pub fn new(settings: &Settings) -> Result<Self, RegetError> {
        let mut builder = Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs));
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| RegetError::Unknown(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch_metadata(&self, url: &str) -> Result<ResourceMetadata, RegetError> {
        let response = self.client.head(url).send().await?;
        let response = ensure_success(response, "metadata probe")?;

        // Read the header directly; the body size hint of a HEAD response is empty.
        let content_length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let accepts_bytes = response
            .headers()
            .get_all(reqwest::header::ACCEPT_RANGES)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));

        if accepts_bytes && content_length.is_none() {
            debug!("{} accepts ranges but sent no Content-Length; streaming in full", url);
        }

        Ok(ResourceMetadata {
            content_length: content_length.unwrap_or(0),
            supports_ranges: accepts_bytes && content_length.is_some(),
        })
    }

    async fn fetch_full(&self, url: &str) -> Result<BodyReader, RegetError> {
        let response = self.client.get(url).send().await?;
        let response = ensure_success(response, "full download")?;
        Ok(Box::pin(body_reader(response)))
    }

    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<BodyReader, RegetError> {
        let header = range_header(range);
        debug!("Requesting {} with Range: {}", url, header);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::RANGE, header)
            .send()
            .await?;
        let response = ensure_success(response, "range download")?;

        // A plain 200 carries the body from byte 0, which only lines up with a range starting there.
        if response.status() != StatusCode::PARTIAL_CONTENT && range.from != 0 {
            return Err(RegetError::ServerError {
                status: response.status().as_u16(),
                message: format!("server ignored range {}", range),
            });
        }

        Ok(Box::pin(body_reader(response)))
    }
}

/// Wire form of a half-open range: `[from, to)` becomes `bytes=from-(to-1)`
fn range_header(range: ByteRange) -> String {
    format!("bytes={}-{}", range.from, range.to.saturating_sub(1))
}

fn ensure_success(response: Response, what: &str) -> Result<Response, RegetError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RegetError::ServerError {
            status: status.as_u16(),
            message: format!("{} failed for {}", what, response.url()),
        })
    }
}

fn body_reader(response: Response) -> impl AsyncRead + Send {
    StreamReader::new(
        response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
    )
}
