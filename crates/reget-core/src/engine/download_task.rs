//! Download task - drives one download session
//!
//! Probes the resource, then either streams the whole body into a fresh file
//! or fetches it in sequential byte ranges, resuming after whatever is
//! already on disk. Ranges are fetched strictly in ascending order, one at a
//! time, so every byte below the write position is final before the next
//! request goes out.

use crate::engine::progress::ProgressTracker;
use crate::error::RegetError;
use crate::retry::{wait_or_cancel, RetryingTransport};
use crate::transport::BodyReader;
use reget_types::{
    ByteRange, DownloadEvent, DownloadOutcome, DownloadState, ProgressSnapshot, ResourceMetadata,
};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Callback receiving every progress snapshot of a session
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Upper bound on the read buffer regardless of the configured chunk size
const MAX_BUFFER_SIZE: u64 = 1024 * 1024;

/// One download session, owned by the task that runs it
pub struct DownloadTask {
    id: Uuid,
    url: String,
    local_path: PathBuf,
    transport: RetryingTransport,
    chunk_size: u64,
    token: CancellationToken,
    on_progress: ProgressCallback,
    event_tx: broadcast::Sender<DownloadEvent>,
    state: DownloadState,
}

impl DownloadTask {
    /// Create a new download task
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        url: String,
        local_path: PathBuf,
        transport: RetryingTransport,
        chunk_size: u64,
        token: CancellationToken,
        on_progress: ProgressCallback,
        event_tx: broadcast::Sender<DownloadEvent>,
    ) -> Self {
        Self {
            id,
            url,
            local_path,
            transport,
            chunk_size: chunk_size.max(1),
            token,
            on_progress,
            event_tx,
            state: DownloadState::Pending,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Run the session to its terminal state
    pub async fn run(mut self) -> DownloadOutcome {
        info!(
            "Starting download {}: {} -> {:?}",
            self.id, self.url, self.local_path
        );
        self.set_state(DownloadState::InProgress, None);

        let outcome = match self.execute().await {
            Ok(()) => {
                info!("Download {} completed: {:?}", self.id, self.local_path);
                DownloadOutcome::Completed
            }
            Err(RegetError::Cancelled) => {
                info!("Download {} cancelled", self.id);
                DownloadOutcome::Cancelled
            }
            Err(e) => {
                error!("Download {} failed: {}", self.id, e);
                DownloadOutcome::Failed(e.into())
            }
        };

        let error = match &outcome {
            DownloadOutcome::Failed(message) => Some(message.clone()),
            _ => None,
        };
        self.set_state(outcome.state(), error);
        outcome
    }

    async fn execute(&mut self) -> Result<(), RegetError> {
        url::Url::parse(&self.url).map_err(|_| RegetError::InvalidUrl(self.url.clone()))?;

        let metadata = self.transport.fetch_metadata(&self.url, &self.token).await?;
        info!(
            "Download {}: content_length={}, supports_ranges={}",
            self.id, metadata.content_length, metadata.supports_ranges
        );

        if let Some(parent) = self.local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        if metadata.supports_ranges {
            self.download_ranged(metadata).await
        } else {
            self.download_full(metadata).await
        }
    }

    /// Stream the whole body into a fresh file.
    ///
    /// Without range support a broken body cannot be continued, so it is
    /// fetched again from the start after a backoff.
    async fn download_full(&self, metadata: ResourceMetadata) -> Result<(), RegetError> {
        if remove_if_exists(&self.local_path).await? {
            info!(
                "Download {}: deleted existing file, server does not support ranges",
                self.id
            );
        }
        self.emit_strategy(metadata, 0);

        let mut file = File::create(&self.local_path).await?;
        let mut progress = ProgressTracker::new(metadata.content_length, 0);

        let limit = (metadata.content_length > 0).then_some(metadata.content_length);

        let result = async {
            let mut interruptions: u32 = 0;
            loop {
                let mut body = self.transport.fetch_full(&self.url, &self.token).await?;
                let mut written = 0;
                match self
                    .copy_body(&mut body, &mut file, &mut progress, limit, &mut written)
                    .await
                {
                    Err(e @ RegetError::Stream(_)) => {
                        interruptions = interruptions.saturating_add(1);
                        let delay = self.transport.schedule().delay_for_retry(interruptions);
                        warn!(
                            download = %self.id,
                            written,
                            retry = interruptions,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Body interrupted, will download again from the start"
                        );
                        wait_or_cancel(delay, &self.token).await?;

                        file.set_len(0).await?;
                        file.seek(SeekFrom::Start(0)).await?;
                        progress.restart();
                    }
                    other => return other,
                }
            }
        }
        .await;

        close_file(&mut file, result).await
    }

    /// Fetch `[resume_offset, content_length)` range by range
    async fn download_ranged(&self, metadata: ResourceMetadata) -> Result<(), RegetError> {
        let total = metadata.content_length;
        let mut resume_offset = local_length(&self.local_path).await?;

        if resume_offset > total {
            warn!(
                "Download {}: local file is {} bytes but the resource is {}; starting over",
                self.id, resume_offset, total
            );
            tokio::fs::remove_file(&self.local_path).await?;
            resume_offset = 0;
        } else if resume_offset > 0 {
            info!(
                "Download {}: resuming from byte {} of {}",
                self.id, resume_offset, total
            );
        }
        self.emit_strategy(metadata, resume_offset);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.local_path)
            .await?;
        file.seek(SeekFrom::Start(resume_offset)).await?;

        let mut progress = ProgressTracker::new(total, resume_offset);
        let result = async {
            for range in ByteRange::split(resume_offset, total, self.chunk_size) {
                self.fetch_range_into(range, &mut file, &mut progress).await?;
            }
            Ok::<(), RegetError>(())
        }
        .await;

        close_file(&mut file, result).await
    }

    /// Write exactly the bytes of `range` at the current file position.
    ///
    /// A body that breaks off early is re-requested from the first byte
    /// that has not been written yet, after the same backoff the transport uses.
    async fn fetch_range_into(
        &self,
        range: ByteRange,
        file: &mut File,
        progress: &mut ProgressTracker,
    ) -> Result<(), RegetError> {
        let mut pending = range;
        let mut interruptions: u32 = 0;

        loop {
            debug!("Download {}: fetching range {}", self.id, pending);
            let mut body = self
                .transport
                .fetch_range(&self.url, pending, &self.token)
                .await?;

            let mut written = 0;
            match self
                .copy_body(&mut body, file, progress, Some(pending.len()), &mut written)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e @ RegetError::Stream(_)) => {
                    pending = ByteRange::new(pending.from + written, pending.to);
                    interruptions = interruptions.saturating_add(1);
                    let delay = self.transport.schedule().delay_for_retry(interruptions);
                    warn!(
                        download = %self.id,
                        remaining = %pending,
                        retry = interruptions,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Range body interrupted, will re-request the rest"
                    );
                    wait_or_cancel(delay, &self.token).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Copy `body` into `file` one buffer at a time, reporting progress after each.
    ///
    /// With a `limit`, stops after that many bytes and treats an earlier end
    /// of stream as an interrupted body. `written` counts bytes that reached
    /// the file, also when an error is returned.
    async fn copy_body(
        &self,
        body: &mut BodyReader,
        file: &mut File,
        progress: &mut ProgressTracker,
        limit: Option<u64>,
        written: &mut u64,
    ) -> Result<(), RegetError> {
        let mut buffer = vec![0u8; self.chunk_size.min(MAX_BUFFER_SIZE) as usize];

        loop {
            let want = match limit {
                Some(limit) => (limit - *written).min(buffer.len() as u64) as usize,
                None => buffer.len(),
            };
            if want == 0 {
                return Ok(());
            }

            let read = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(RegetError::Cancelled),
                read = body.read(&mut buffer[..want]) => read.map_err(RegetError::Stream)?,
            };

            if read == 0 {
                return match limit {
                    Some(limit) if *written < limit => Err(RegetError::Stream(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("body ended after {} of {} bytes", *written, limit),
                    ))),
                    _ => Ok(()),
                };
            }

            file.write_all(&buffer[..read]).await?;
            *written += read as u64;
            if let Some(snapshot) = progress.advance(read as u64) {
                (self.on_progress)(snapshot);
            }
        }
    }

    fn set_state(&mut self, state: DownloadState, error: Option<String>) {
        self.state = state;
        let _ = self.event_tx.send(DownloadEvent::StateChanged {
            id: self.id,
            state,
            error,
        });
    }

    fn emit_strategy(&self, metadata: ResourceMetadata, resume_offset: u64) {
        let _ = self.event_tx.send(DownloadEvent::StrategyChosen {
            id: self.id,
            metadata,
            resume_offset,
        });
    }
}

/// Length of the file at `path`, or 0 if there is none
async fn local_length(path: &Path) -> Result<u64, RegetError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Delete the file at `path`; returns whether one existed
async fn remove_if_exists(path: &Path) -> Result<bool, RegetError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Flush and sync `file` whatever `result` is; the session's own error wins.
async fn close_file(file: &mut File, result: Result<(), RegetError>) -> Result<(), RegetError> {
    let closed = async {
        file.flush().await?;
        file.sync_all().await
    }
    .await;

    match (result, closed) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_error)) => {
            warn!("Failed to flush partial file: {}", close_error);
            Err(e)
        }
    }
}
