//! CLI command implementations

use crate::output::{default_file_name, format_bytes};
use crate::progress::DownloadProgress;
use crate::OutputFormat;
use anyhow::Result;
use console::style;
use reget_core::DownloadManager;
use reget_types::{DownloadOutcome, ResourceMetadata};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Conventional exit status after an interrupt
const EXIT_CANCELLED: u8 = 130;

// ============================================================================
// Download
// ============================================================================

#[derive(Serialize)]
struct GetReport<'a> {
    url: &'a str,
    path: &'a PathBuf,
    outcome: &'a DownloadOutcome,
}

pub async fn get(
    manager: &DownloadManager,
    url: &str,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let path = output.unwrap_or_else(|| default_file_name(url));

    let progress = match format {
        OutputFormat::Human => DownloadProgress::new(&path.display().to_string()),
        OutputFormat::Json => DownloadProgress::hidden(),
    };

    let handle = {
        let progress = progress.clone();
        manager.download_file(url, &path, move |snapshot| progress.update(&snapshot))
    };
    info!("Started download {} -> {}", handle.id(), path.display());

    let interrupt = spawn_interrupt_watcher(manager);
    let outcome = handle.wait().await;
    interrupt.abort();

    progress.finish(&outcome);

    match format {
        OutputFormat::Json => {
            let report = GetReport {
                url,
                path: &path,
                outcome: &outcome,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Human => match &outcome {
            DownloadOutcome::Completed => {
                println!(
                    "{} Saved {}",
                    style("✓").green().bold(),
                    style(path.display()).cyan()
                );
            }
            DownloadOutcome::Cancelled => {
                println!(
                    "{} Stopped; run the same command again to resume {}",
                    style("○").dim(),
                    style(path.display()).cyan()
                );
            }
            DownloadOutcome::Failed(error) => {
                eprintln!("{} {}", style("✗").red().bold(), style(error).red());
            }
        },
    }

    Ok(ExitCode::from(exit_status(&outcome)))
}

fn exit_status(outcome: &DownloadOutcome) -> u8 {
    match outcome {
        DownloadOutcome::Completed => 0,
        DownloadOutcome::Cancelled => EXIT_CANCELLED,
        DownloadOutcome::Failed(_) => 1,
    }
}

/// Turn Ctrl-C into a bulk cancel of everything the manager runs
fn spawn_interrupt_watcher(manager: &DownloadManager) -> tokio::task::JoinHandle<()> {
    let manager = manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let signalled = manager.cancel_all();
            info!("Interrupted, cancelling {} session(s)", signalled);
        }
    })
}

// ============================================================================
// Probe
// ============================================================================

#[derive(Debug, Serialize)]
struct ProbeReport {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<ResourceMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn probe_urls(
    manager: &DownloadManager,
    urls: Vec<String>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let interrupt = spawn_interrupt_watcher(manager);

    let mut reports = Vec::with_capacity(urls.len());
    for url in urls {
        let report = match manager.probe(&url).await {
            Ok(metadata) => ProbeReport {
                url,
                metadata: Some(metadata),
                error: None,
            },
            Err(e) => ProbeReport {
                url,
                metadata: None,
                error: Some(e.to_string()),
            },
        };
        reports.push(report);
    }
    interrupt.abort();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        OutputFormat::Human => {
            for report in &reports {
                print_probe(report);
            }
        }
    }

    let all_ok = reports.iter().all(|r| r.error.is_none());
    Ok(if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_probe(report: &ProbeReport) {
    match (&report.metadata, &report.error) {
        (Some(metadata), _) => {
            println!("{} {}", style("✓").green(), report.url);
            if metadata.content_length > 0 {
                println!("    Size: {}", format_bytes(metadata.content_length));
            } else {
                println!("    Size: {}", style("unknown").yellow());
            }
            println!(
                "    Resumable: {}",
                if metadata.supports_ranges {
                    style("Yes").green()
                } else {
                    style("No").yellow()
                }
            );
        }
        (None, error) => {
            println!(
                "{} {}: {}",
                style("✗").red(),
                report.url,
                style(error.as_deref().unwrap_or("unknown error")).red()
            );
        }
    }
}
