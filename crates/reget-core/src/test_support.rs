//! In-memory transport for engine and retry tests

use crate::error::RegetError;
use crate::transport::{BodyReader, HttpTransport};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reget_types::{ByteRange, ResourceMetadata};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio_util::io::StreamReader;

/// A request the engine made, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Metadata(String),
    Full(String),
    Range(String, ByteRange),
}

/// Serves one fixed resource and records every call.
pub struct MockTransport {
    data: Bytes,
    supports_ranges: bool,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<String, u32>>,
    broken_bodies: AtomicU32,
    hung: AtomicBool,
}

impl MockTransport {
    pub fn new(data: Vec<u8>, supports_ranges: bool) -> Self {
        Self {
            data: Bytes::from(data),
            supports_ranges,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            broken_bodies: AtomicU32::new(0),
            hung: AtomicBool::new(false),
        }
    }

    /// Fail the next `count` calls for `url` with a server error
    pub fn fail_next(&self, url: &str, count: u32) {
        self.failures.lock().insert(url.to_string(), count);
    }

    /// Make the next `count` bodies stop with a read error halfway through
    pub fn break_next_bodies(&self, count: u32) {
        self.broken_bodies.store(count, Ordering::SeqCst);
    }

    /// Never answer any further call
    pub fn hang(&self) {
        self.hung.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn range_calls(&self) -> Vec<ByteRange> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Range(_, range) => Some(*range),
                _ => None,
            })
            .collect()
    }

    async fn enter(&self, call: Call) -> Result<(), RegetError> {
        let url = match &call {
            Call::Metadata(url) | Call::Full(url) | Call::Range(url, _) => url.clone(),
        };
        self.calls.lock().push(call);

        if self.hung.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }

        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RegetError::ServerError {
                    status: 503,
                    message: "scripted failure".to_string(),
                });
            }
        }
        Ok(())
    }

    fn body(&self, bytes: Bytes) -> BodyReader {
        let broken = self
            .broken_bodies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let chunks: Vec<Result<Bytes, std::io::Error>> = if broken {
            let half = bytes.slice(..bytes.len() / 2);
            vec![
                Ok(half),
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset mid-body",
                )),
            ]
        } else {
            vec![Ok(bytes)]
        };

        Box::pin(StreamReader::new(futures::stream::iter(chunks)))
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn fetch_metadata(&self, url: &str) -> Result<ResourceMetadata, RegetError> {
        self.enter(Call::Metadata(url.to_string())).await?;
        Ok(ResourceMetadata {
            content_length: self.data.len() as u64,
            supports_ranges: self.supports_ranges,
        })
    }

    async fn fetch_full(&self, url: &str) -> Result<BodyReader, RegetError> {
        self.enter(Call::Full(url.to_string())).await?;
        Ok(self.body(self.data.clone()))
    }

    async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<BodyReader, RegetError> {
        self.enter(Call::Range(url.to_string(), range)).await?;
        let end = (range.to as usize).min(self.data.len());
        let start = (range.from as usize).min(end);
        Ok(self.body(self.data.slice(start..end)))
    }
}

/// Deterministic, non-repeating-per-chunk test payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
