//! Settings loading

use anyhow::{bail, Context, Result};
use reget_types::Settings;
use std::path::Path;

/// Read settings from an optional JSON file, then apply flag overrides.
///
/// Fields missing from the file keep their defaults.
pub fn load_settings(path: Option<&Path>, chunk_size: Option<u64>) -> Result<Settings> {
    let mut settings = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => Settings::default(),
    };

    if let Some(chunk_size) = chunk_size {
        settings.chunk_size = chunk_size;
    }
    if settings.chunk_size == 0 {
        bail!("chunk size must be at least 1 byte");
    }

    Ok(settings)
}
