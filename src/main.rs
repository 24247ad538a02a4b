//! Main entry point for the rootscan CLI application.
//!
//! Reads one tree's entry count from each given ROOT file, local or
//! remote, and prints one line per file.

use anyhow::{Result, bail};
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rootscan::{
    BatchResults, ByteRangeSource, Cli, HttpRangeSource, LocalFileSource, TreeRequest, scan_trees,
};

/// Application entry point.
///
/// Picks the HTTP or local source depending on the inputs, runs the batch,
/// and cancels it on Ctrl-C.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.all_remote() {
        let source = Arc::new(HttpRangeSource::new(Duration::from_secs(cli.timeout))?);
        run(source.clone(), &cli).await?;

        // Display network transfer statistics for HTTP sources
        if !cli.quiet {
            eprintln!("Total bytes transferred: {}", format_size(source.transferred_bytes()));
        }
    } else if cli.any_remote() {
        bail!("Cannot mix local paths and HTTP URLs in one run");
    } else {
        run(Arc::new(LocalFileSource::new()), &cli).await?;
    }

    Ok(())
}

/// Scan every file on the command line and print the outcomes.
async fn run<R: ByteRangeSource + 'static>(source: Arc<R>, cli: &Cli) -> Result<()> {
    let requests: Vec<_> = cli
        .files
        .iter()
        .map(|f| TreeRequest::new(f.as_str(), cli.tree.as_str()))
        .collect();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let started = Instant::now();
    let results = scan_trees(source, requests, &cli.scan_options(), Some(cancel)).await?;
    print_results(&results);

    if !cli.quiet {
        eprintln!(
            "{} files, {} failed, elapsed {:.2} s",
            results.len(),
            results.failures().count(),
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

/// Print one line per file: entry count and branch count, or the error.
fn print_results(results: &BatchResults) {
    for (path, outcome) in results.iter() {
        match outcome {
            Ok(meta) => println!("{path}\t{}\t{} branches", meta.entries, meta.branches),
            Err(err) => println!("{path}\terror: {err}"),
        }
    }
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
