//! Progress bar for a CLI download

use crate::output::format_eta;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use reget_types::{DownloadOutcome, ProgressSnapshot};

/// Terminal progress bar fed from engine snapshots
#[derive(Clone)]
pub struct DownloadProgress {
    bar: ProgressBar,
}

impl DownloadProgress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {msg})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        bar.set_prefix(label.to_string());
        Self { bar }
    }

    /// A bar that draws nothing, for machine-readable output
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Apply one snapshot
    pub fn update(&self, snapshot: &ProgressSnapshot) {
        if snapshot.total_bytes > 0 && self.bar.length() != Some(snapshot.total_bytes) {
            self.bar.set_length(snapshot.total_bytes);
        }
        self.bar.set_position(snapshot.downloaded_bytes);
        self.bar
            .set_message(format!("{} left", format_eta(snapshot.estimated_remaining)));
    }

    /// Leave the bar on screen with a final status line
    pub fn finish(&self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Completed => {
                self.bar
                    .finish_with_message(format!("{} Download complete", style("✓").green().bold()));
            }
            DownloadOutcome::Failed(error) => {
                self.bar.abandon_with_message(format!(
                    "{} Failed: {}",
                    style("✗").red().bold(),
                    error
                ));
            }
            DownloadOutcome::Cancelled => {
                self.bar
                    .abandon_with_message(format!("{} Cancelled", style("○").dim()));
            }
        }
    }
}
