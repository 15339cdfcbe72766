//! Shared types for reget
//!
//! This crate contains the data structures shared between the
//! download engine and the CLI.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Default size of one range request and of the read buffer, in bytes.
pub const DEFAULT_CHUNK_SIZE: u64 = 8192;

// ============================================================================
// Resource Types
// ============================================================================

/// What a metadata probe learned about a remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub content_length: u64,
    pub supports_ranges: bool,
}

/// A half-open byte interval `[from, to)` of a remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub from: u64,
    pub to: u64,
}

impl ByteRange {
    pub fn new(from: u64, to: u64) -> Self {
        debug_assert!(from <= to, "range start past its end");
        Self { from, to }
    }

    /// Number of bytes covered by this range
    pub fn len(&self) -> u64 {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split `[start, end)` into consecutive ranges of `chunk_size` bytes.
    ///
    /// The last range is shorter when the span does not divide evenly.
    /// Yields nothing when `start >= end`.
    pub fn split(start: u64, end: u64, chunk_size: u64) -> impl Iterator<Item = ByteRange> {
        let chunk_size = chunk_size.max(1);
        let mut from = start;
        std::iter::from_fn(move || {
            if from >= end {
                return None;
            }
            let to = from.saturating_add(chunk_size).min(end);
            let range = ByteRange { from, to };
            from = to;
            Some(range)
        })
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Lifecycle state of a download session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Failed | DownloadState::Cancelled
        )
    }
}

/// How a download session ended, as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "error", rename_all = "lowercase")]
pub enum DownloadOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl DownloadOutcome {
    /// The terminal session state matching this outcome
    pub fn state(&self) -> DownloadState {
        match self {
            DownloadOutcome::Completed => DownloadState::Completed,
            DownloadOutcome::Failed(_) => DownloadState::Failed,
            DownloadOutcome::Cancelled => DownloadState::Cancelled,
        }
    }
}

/// Point-in-time progress of one session, handed to the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    /// Whole percent, always within 0..=100
    pub percent: u8,
    /// `None` until the session has transferred its first byte
    pub estimated_remaining: Option<Duration>,
}

// ============================================================================
// Event Types
// ============================================================================

/// Events broadcast by the engine to observers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DownloadEvent {
    StateChanged {
        id: Uuid,
        state: DownloadState,
        error: Option<String>,
    },
    StrategyChosen {
        id: Uuid,
        metadata: ResourceMetadata,
        resume_offset: u64,
    },
}

// ============================================================================
// Settings Types
// ============================================================================

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Size of one range request and of the read buffer
    pub chunk_size: u64,
    pub retry: RetrySettings,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// Whole-request timeout; unset lets large bodies stream indefinitely
    pub request_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetrySettings::default(),
            user_agent: concat!("reget/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 30,
            request_timeout_secs: None,
        }
    }
}

/// Backoff applied between attempts of one network call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Wait before each of the first `short_retries` retries
    pub short_wait_secs: u64,
    pub short_retries: u32,
    /// Wait before every later retry
    pub long_wait_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            short_wait_secs: 2,
            short_retries: 2,
            long_wait_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_span_with_short_tail() {
        let ranges: Vec<_> = ByteRange::split(0, 20000, 8192).collect();
        assert_eq!(
            ranges,
            vec![
                ByteRange::new(0, 8192),
                ByteRange::new(8192, 16384),
                ByteRange::new(16384, 20000),
            ]
        );
    }

    #[test]
    fn split_seams_neither_skip_nor_overlap() {
        let ranges: Vec<_> = ByteRange::split(1234, 50_001, 4096).collect();
        assert_eq!(ranges.first().map(|r| r.from), Some(1234));
        assert_eq!(ranges.last().map(|r| r.to), Some(50_001));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        let covered: u64 = ranges.iter().map(ByteRange::len).sum();
        assert_eq!(covered, 50_001 - 1234);
    }

    #[test]
    fn split_exact_multiple_has_no_empty_tail() {
        let ranges: Vec<_> = ByteRange::split(8192, 24576, 8192).collect();
        assert_eq!(ranges.len(), 2);
        assert!(ranges.iter().all(|r| r.len() == 8192));
    }

    #[test]
    fn split_empty_span_yields_nothing() {
        assert_eq!(ByteRange::split(500, 500, 8192).count(), 0);
        assert_eq!(ByteRange::split(600, 500, 8192).count(), 0);
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "chunk_size": 4096, "retry": { "long_wait_secs": 30 } }"#)
                .unwrap();
        assert_eq!(settings.chunk_size, 4096);
        assert_eq!(settings.retry.short_wait_secs, 2);
        assert_eq!(settings.retry.short_retries, 2);
        assert_eq!(settings.retry.long_wait_secs, 30);
        assert_eq!(settings.connect_timeout_secs, 30);
    }

    #[test]
    fn outcome_maps_to_terminal_state() {
        assert!(DownloadOutcome::Completed.state().is_terminal());
        assert_eq!(
            DownloadOutcome::Failed("disk full".into()).state(),
            DownloadState::Failed
        );
        assert!(!DownloadState::InProgress.is_terminal());
    }
}
