//! reget Core - Download Engine
//!
//! This crate downloads one HTTP resource per session into a local file,
//! resuming from whatever is already on disk when the server supports byte
//! ranges. Every network call is retried on a fixed backoff until it succeeds
//! or the session is cancelled.
//!
//! ```no_run
//! # async fn demo() -> Result<(), reget_core::RegetError> {
//! use reget_core::{DownloadManager, Settings};
//!
//! let manager = DownloadManager::new(Settings::default())?;
//! let handle = manager.download_file("https://example.com/file.bin", "file.bin", |p| {
//!     println!("{}%", p.percent);
//! });
//! let outcome = handle.wait().await;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod retry;
mod transport;

#[cfg(test)]
mod test_support;

pub use engine::*;
pub use error::*;
pub use retry::*;
pub use transport::*;

pub use reget_types::{
    ByteRange, DownloadEvent, DownloadOutcome, DownloadState, ProgressSnapshot, ResourceMetadata,
    RetrySettings, Settings,
};
