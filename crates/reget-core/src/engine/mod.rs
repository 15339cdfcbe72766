//! Download Engine
//!
//! Sequential, resumable downloads:
//! - Probe once, then ranged resume or a single full stream
//! - Fixed-size ranges fetched in ascending order
//! - Cooperative cancellation at every suspension point
//! - Registry of live sessions for bulk cancel

mod download_task;
mod manager;
mod progress;
mod registry;

pub use download_task::*;
pub use manager::*;
pub use progress::*;
pub use registry::*;
