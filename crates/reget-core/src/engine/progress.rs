//! Progress accounting for one download session

use reget_types::ProgressSnapshot;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks bytes on disk for one session and turns them into snapshots.
///
/// `resume_offset` bytes were already on disk when the session started;
/// they count towards the percentage but not towards the transfer rate.
/// Snapshots never go backwards: after [`restart`](Self::restart) nothing is
/// reported until the previous high-water mark is passed.
#[derive(Debug)]
pub struct ProgressTracker {
    total_bytes: u64,
    resume_offset: u64,
    downloaded_bytes: u64,
    reported_bytes: u64,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64, resume_offset: u64) -> Self {
        Self {
            total_bytes,
            resume_offset,
            downloaded_bytes: resume_offset,
            reported_bytes: resume_offset,
            started: Instant::now(),
        }
    }

    /// Record `bytes` more written to disk.
    ///
    /// Returns a snapshot only when it is ahead of every earlier one.
    pub fn advance(&mut self, bytes: u64) -> Option<ProgressSnapshot> {
        self.downloaded_bytes = self.downloaded_bytes.saturating_add(bytes);
        if self.downloaded_bytes <= self.reported_bytes {
            return None;
        }
        self.reported_bytes = self.downloaded_bytes;
        Some(self.snapshot(self.started.elapsed()))
    }

    /// Start counting from byte 0 again, for a body that is re-fetched in full
    pub fn restart(&mut self) {
        self.resume_offset = 0;
        self.downloaded_bytes = 0;
        self.started = Instant::now();
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes
    }

    fn snapshot(&self, elapsed: Duration) -> ProgressSnapshot {
        ProgressSnapshot {
            total_bytes: self.total_bytes,
            downloaded_bytes: self.downloaded_bytes,
            percent: percent(self.downloaded_bytes, self.total_bytes),
            estimated_remaining: estimate_remaining(
                elapsed,
                self.total_bytes,
                self.downloaded_bytes,
                self.resume_offset,
            ),
        }
    }
}

/// `floor(downloaded * 100 / total)`, clamped to 100; 0 when the size is unknown
pub fn percent(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (downloaded as u128 * 100) / total as u128;
    pct.min(100) as u8
}

/// Remaining time extrapolated from this session's transfer rate.
///
/// Computed as `elapsed * total / transferred - elapsed` where `transferred`
/// excludes bytes already on disk from a previous run. `None` until the
/// session has transferred anything.
pub fn estimate_remaining(
    elapsed: Duration,
    total: u64,
    downloaded: u64,
    resume_offset: u64,
) -> Option<Duration> {
    let transferred = downloaded.saturating_sub(resume_offset) as u128;
    if transferred == 0 || total == 0 {
        return None;
    }

    let elapsed_ms = elapsed.as_millis();
    let projected_ms = (elapsed_ms * total as u128).div_ceil(transferred);
    let remaining_ms = projected_ms.saturating_sub(elapsed_ms);
    Some(Duration::from_millis(
        u64::try_from(remaining_ms).unwrap_or(u64::MAX),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_floors_and_clamps() {
        assert_eq!(percent(0, 20000), 0);
        assert_eq!(percent(8192, 20000), 40);
        assert_eq!(percent(19999, 20000), 99);
        assert_eq!(percent(20000, 20000), 100);
        assert_eq!(percent(30000, 20000), 100);
        assert_eq!(percent(500, 0), 0);
    }

    #[test]
    fn estimate_is_unknown_before_first_session_byte() {
        assert_eq!(
            estimate_remaining(Duration::from_secs(3), 20000, 10000, 10000),
            None
        );
        assert_eq!(estimate_remaining(Duration::ZERO, 20000, 0, 0), None);
    }

    #[test]
    fn estimate_extrapolates_session_rate() {
        // A quarter of the file in 1s: the whole file takes 4s, so 3s remain.
        let remaining = estimate_remaining(Duration::from_secs(1), 20000, 5000, 0);
        assert_eq!(remaining, Some(Duration::from_secs(3)));
    }

    #[test]
    fn estimate_ignores_bytes_from_a_previous_run() {
        // 5000 bytes this session in 1s against a 20000 byte file.
        let remaining = estimate_remaining(Duration::from_secs(1), 20000, 15000, 10000);
        assert_eq!(remaining, Some(Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn tracker_starts_at_resume_offset() {
        let mut tracker = ProgressTracker::new(20000, 12000);
        assert_eq!(tracker.downloaded_bytes(), 12000);

        tokio::time::advance(Duration::from_secs(2)).await;
        let snapshot = tracker.advance(8000).unwrap();

        assert_eq!(snapshot.downloaded_bytes, 20000);
        assert_eq!(snapshot.percent, 100);
        assert_eq!(snapshot.total_bytes, 20000);
        // 8000 bytes in 2s against 20000 total: 5s projected, 3s remaining.
        assert_eq!(snapshot.estimated_remaining, Some(Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_stays_silent_until_past_previous_high_water_mark() {
        let mut tracker = ProgressTracker::new(20000, 0);
        assert_eq!(tracker.advance(10000).map(|s| s.percent), Some(50));

        tracker.restart();
        assert_eq!(tracker.downloaded_bytes(), 0);
        assert!(tracker.advance(8192).is_none());
        assert!(tracker.advance(1808).is_none());

        tokio::time::advance(Duration::from_secs(1)).await;
        let snapshot = tracker.advance(6384).unwrap();
        assert_eq!(snapshot.downloaded_bytes, 16384);
        assert_eq!(snapshot.percent, 81);
        assert!(snapshot.estimated_remaining.is_some());
    }
}
