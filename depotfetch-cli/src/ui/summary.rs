//! Job header and result report.

use std::path::Path;

use console::style;
use depotfetch::coordinator::{FileStatus, JobResult};
use depotfetch::manifest::Manifest;
use indicatif::HumanBytes;

use crate::error::CliError;

/// Failed chunks listed before the report is truncated.
const MAX_LISTED_FAILURES: usize = 20;

pub fn print_job_header(manifest: &Manifest, output: &Path, servers: usize, threads: usize) {
    println!(
        "{} depot {} (manifest {})",
        style("Downloading").bold(),
        manifest.depot_id,
        manifest.manifest_id
    );
    println!("  Files:   {}", manifest.files.len());
    println!(
        "  Size:    {} in {} distinct chunks",
        HumanBytes(manifest.total_size()),
        manifest.distinct_chunks()
    );
    println!("  Servers: {}", servers);
    println!("  Threads: {}", threads);
    println!("  Output:  {}", output.display());
    println!();
}

pub fn print_job_result(result: &JobResult) {
    println!();
    for file in result.files.iter().filter(|f| f.status != FileStatus::Complete) {
        let label = match file.status {
            FileStatus::Failed => style(file.status.to_string()).red(),
            FileStatus::PartiallyFailed => style(file.status.to_string()).yellow(),
            _ => style(file.status.to_string()).dim(),
        };
        match &file.error {
            Some(error) => println!("  {:<16} {} ({})", label, file.path.display(), error),
            None => println!(
                "  {:<16} {} ({}/{} chunks)",
                label,
                file.path.display(),
                file.chunks_done,
                file.chunks_total
            ),
        }
    }

    for failure in result.failures.iter().take(MAX_LISTED_FAILURES) {
        println!(
            "  {} {} @ {} [{}] {}",
            style("chunk").dim(),
            failure.chunk,
            failure.offset,
            failure.kind,
            failure.file.display()
        );
    }
    if result.failures.len() > MAX_LISTED_FAILURES {
        println!(
            "  ... and {} more failed chunks",
            result.failures.len() - MAX_LISTED_FAILURES
        );
    }

    for warning in &result.warnings {
        println!("{} {}", style("warning:").yellow().bold(), warning);
    }

    let stats = &result.stats;
    println!(
        "{} {} complete, {} partially failed, {} failed, {} incomplete",
        style("Files:").bold(),
        result.count(FileStatus::Complete),
        result.count(FileStatus::PartiallyFailed),
        result.count(FileStatus::Failed),
        result.count(FileStatus::Incomplete)
    );
    println!(
        "{} {} fetched, {} resumed, {} copied locally ({} requests, {} received, {} written)",
        style("Chunks:").bold(),
        stats.chunks_fetched,
        stats.chunks_resumed,
        stats.chunks_copied,
        stats.fetch_requests,
        HumanBytes(stats.bytes_downloaded),
        HumanBytes(stats.bytes_written)
    );

    if result.is_success() {
        println!("{}", style("All files complete").green().bold());
    } else if result.cancelled {
        println!("{}", style("Cancelled; re-run to resume").yellow().bold());
    } else {
        println!("{}", style("Some files are incomplete; re-run to retry").red().bold());
    }
}

pub fn print_error(error: &CliError) {
    eprintln!("{} {}", style("error:").red().bold(), error);
}
