//! Output formatting utilities

use std::path::PathBuf;
use std::time::Duration;

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Format a remaining-time estimate as human-readable
pub fn format_eta(remaining: Option<Duration>) -> String {
    let Some(remaining) = remaining else {
        return "-".to_string();
    };
    let seconds = remaining.as_secs();

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Local file name for `url`: its last non-empty path segment, or `download`
pub fn default_file_name(url: &str) -> PathBuf {
    let name = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| "download".to_string());

    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_formats() {
        assert_eq!(format_eta(None), "-");
        assert_eq!(format_eta(Some(Duration::from_secs(42))), "42s");
        assert_eq!(format_eta(Some(Duration::from_secs(125))), "2m 5s");
        assert_eq!(format_eta(Some(Duration::from_secs(3725))), "1h 2m 5s");
    }

    #[test]
    fn file_name_from_url() {
        assert_eq!(
            default_file_name("https://example.com/pub/file.tar.gz"),
            PathBuf::from("file.tar.gz")
        );
        assert_eq!(default_file_name("https://example.com/"), PathBuf::from("download"));
        assert_eq!(default_file_name("not a url"), PathBuf::from("download"));
    }
}
