//! Download Manager - entry point for starting and cancelling downloads
//!
//! Every `download_file` call spawns its own session task immediately and
//! returns a [`DownloadHandle`]. Sessions share the retrying transport and the
//! cancellation registry and nothing else.

use crate::engine::{CancellationRegistry, DownloadTask, ProgressCallback};
use crate::error::RegetError;
use crate::retry::{RetrySchedule, RetryingTransport};
use crate::transport::{HttpTransport, ReqwestTransport};
use reget_types::{DownloadEvent, DownloadOutcome, ProgressSnapshot, ResourceMetadata, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Coordinates all download sessions of one process
#[derive(Clone)]
pub struct DownloadManager {
    /// Retrying wrapper around the raw transport, shared by every session
    transport: RetryingTransport,
    /// Live sessions, for bulk cancellation
    registry: CancellationRegistry,
    settings: Arc<Settings>,
    /// Event broadcaster
    event_tx: broadcast::Sender<DownloadEvent>,
}

impl DownloadManager {
    /// Create a manager backed by a reqwest client built from `settings`
    pub fn new(settings: Settings) -> Result<Self, RegetError> {
        let transport = ReqwestTransport::new(&settings)?;
        Ok(Self::with_transport(Arc::new(transport), settings))
    }

    /// Create a manager on top of any raw transport
    pub fn with_transport(transport: Arc<dyn HttpTransport>, settings: Settings) -> Self {
        let schedule = RetrySchedule::from(&settings.retry);
        Self::with_schedule(transport, settings, schedule)
    }

    /// Like [`with_transport`](Self::with_transport) with an explicit backoff schedule
    pub fn with_schedule(
        transport: Arc<dyn HttpTransport>,
        settings: Settings,
        schedule: RetrySchedule,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1000);

        Self {
            transport: RetryingTransport::new(transport, schedule),
            registry: CancellationRegistry::new(),
            settings: Arc::new(settings),
            event_tx,
        }
    }

    /// Subscribe to session state events
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.event_tx.subscribe()
    }

    /// Start downloading `url` into `local_path`.
    ///
    /// The session is already running when this returns. `on_progress` is
    /// called on the session task after every buffer written to disk.
    pub fn download_file<F>(
        &self,
        url: impl Into<String>,
        local_path: impl Into<PathBuf>,
        on_progress: F,
    ) -> DownloadHandle
    where
        F: Fn(ProgressSnapshot) + Send + Sync + 'static,
    {
        let registration = self.registry.register();
        let id = registration.id();
        let token = registration.token().clone();
        let on_progress: ProgressCallback = Arc::new(on_progress);

        let task = DownloadTask::new(
            id,
            url.into(),
            local_path.into(),
            self.transport.clone(),
            self.settings.chunk_size,
            token.clone(),
            on_progress,
            self.event_tx.clone(),
        );

        let join = tokio::spawn(async move {
            let outcome = task.run().await;
            drop(registration);
            outcome
        });

        DownloadHandle { id, token, join }
    }

    /// Signal every running session to stop. Does not wait for them.
    ///
    /// Returns the number of sessions signalled.
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// Number of sessions that have not reached a terminal state
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Probe a URL for its size and range support, retrying like a download would
    pub async fn probe(&self, url: &str) -> Result<ResourceMetadata, RegetError> {
        url::Url::parse(url).map_err(|_| RegetError::InvalidUrl(url.to_string()))?;
        info!("Probing URL: {}", url);

        let registration = self.registry.register();
        self.transport
            .fetch_metadata(url, registration.token())
            .await
    }
}

/// Handle to a running download session
pub struct DownloadHandle {
    id: Uuid,
    token: CancellationToken,
    join: JoinHandle<DownloadOutcome>,
}

impl DownloadHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask this session to stop; the partial file is kept for a later resume
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the session's terminal outcome
    pub async fn wait(self) -> DownloadOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Download task {} ended abnormally: {}", self.id, e);
                DownloadOutcome::Failed(format!("download task ended abnormally: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{payload, MockTransport};
    use parking_lot::Mutex;
    use reget_types::{ByteRange, DownloadState};
    use std::time::Duration;

    const URL: &str = "https://example.com/file.bin";

    fn manager(mock: &Arc<MockTransport>) -> DownloadManager {
        DownloadManager::with_transport(mock.clone(), Settings::default())
    }

    #[tokio::test]
    async fn download_runs_without_explicit_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let data = payload(20000);
        let mock = Arc::new(MockTransport::new(data.clone(), true));
        let manager = manager(&mock);

        let handle = manager.download_file(URL, &path, |_| {});
        let outcome = handle.wait().await;

        assert_eq!(outcome, DownloadOutcome::Completed);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), data);
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn cancel_all_stops_session_and_next_call_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let data = payload(50000);
        let mock = Arc::new(MockTransport::new(data.clone(), true));
        let manager = manager(&mock);

        let handle = {
            let bulk = manager.clone();
            manager.download_file(URL, &path, move |snapshot: ProgressSnapshot| {
                if snapshot.downloaded_bytes >= 16384 {
                    bulk.cancel_all();
                }
            })
        };
        assert_eq!(handle.wait().await, DownloadOutcome::Cancelled);
        let partial = tokio::fs::metadata(&path).await.unwrap().len();
        assert!(partial < data.len() as u64);

        let resumed = Arc::new(MockTransport::new(data.clone(), true));
        let outcome = DownloadManager::with_transport(resumed.clone(), Settings::default())
            .download_file(URL, &path, |_| {})
            .wait()
            .await;

        assert_eq!(outcome, DownloadOutcome::Completed);
        assert_eq!(resumed.range_calls()[0], ByteRange::new(partial, partial + 8192));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), data);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_cancel_interrupts_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::new(payload(100), true));
        mock.fail_next(URL, u32::MAX);
        let manager = manager(&mock);

        let handle = manager.download_file(URL, dir.path().join("file.bin"), |_| {});
        assert_eq!(manager.active_count(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!handle.is_finished());
        handle.cancel();

        assert_eq!(handle.wait().await, DownloadOutcome::Cancelled);
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn cancel_all_with_nothing_running_is_a_no_op() {
        let mock = Arc::new(MockTransport::new(payload(10), true));
        assert_eq!(manager(&mock).cancel_all(), 0);
    }

    #[tokio::test]
    async fn sessions_run_independently() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(30000);
        let mock = Arc::new(MockTransport::new(data.clone(), true));
        let manager = manager(&mock);

        let handles: Vec<_> = (0..4)
            .map(|i| manager.download_file(URL, dir.path().join(format!("copy-{i}.bin")), |_| {}))
            .collect();
        let ids: std::collections::HashSet<_> = handles.iter().map(|h| h.id()).collect();
        assert_eq!(ids.len(), 4);

        for handle in handles {
            assert_eq!(handle.wait().await, DownloadOutcome::Completed);
        }
        for i in 0..4 {
            let copy = tokio::fs::read(dir.path().join(format!("copy-{i}.bin"))).await.unwrap();
            assert_eq!(copy, data);
        }
    }

    #[tokio::test]
    async fn subscribers_see_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::new(payload(1000), false));
        let manager = manager(&mock);
        let mut events = manager.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = manager.download_file(URL, dir.path().join("file.bin"), |_| {});
        let id = handle.id();
        handle.wait().await;

        while let Ok(event) = events.try_recv() {
            if let DownloadEvent::StateChanged { id: event_id, state, .. } = event {
                assert_eq!(event_id, id);
                seen.lock().push(state);
            }
        }
        assert_eq!(
            *seen.lock(),
            vec![DownloadState::InProgress, DownloadState::Completed]
        );
    }

    #[tokio::test]
    async fn probe_returns_metadata() {
        let mock = Arc::new(MockTransport::new(payload(4321), true));
        let metadata = manager(&mock).probe(URL).await.unwrap();

        assert_eq!(metadata.content_length, 4321);
        assert!(metadata.supports_ranges);
    }

    #[tokio::test]
    async fn probe_rejects_invalid_url() {
        let mock = Arc::new(MockTransport::new(payload(10), true));
        let result = manager(&mock).probe("::not a url::").await;

        assert!(matches!(result, Err(RegetError::InvalidUrl(_))));
        assert!(mock.calls().is_empty());
    }
}
