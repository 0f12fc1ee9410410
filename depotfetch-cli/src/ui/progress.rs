//! Download progress bar.

use std::time::Duration;

use depotfetch::coordinator::{ProgressCallback, ProgressSnapshot};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

const TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}";

/// Byte progress bar driven by [`ProgressSnapshot`]s.
pub struct DownloadProgress {
    bar: ProgressBar,
}

impl DownloadProgress {
    pub fn new(total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        let style = ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(200));
        Self { bar }
    }

    /// Callback for [`DownloadCoordinator::with_progress`](depotfetch::coordinator::DownloadCoordinator::with_progress).
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Box::new(move |snapshot| update(&bar, snapshot))
    }

    pub fn finish(self, success: bool) {
        if success {
            self.bar.finish_with_message("done");
        } else {
            self.bar.abandon_with_message("incomplete");
        }
    }
}

fn update(bar: &ProgressBar, snapshot: ProgressSnapshot) {
    bar.set_length(snapshot.total_bytes);
    bar.set_position(snapshot.bytes_done);
    bar.set_message(status_message(&snapshot));
}

fn status_message(snapshot: &ProgressSnapshot) -> String {
    format!(
        "{}/{} chunks, {} received",
        snapshot.chunks_done,
        snapshot.total_chunks,
        HumanBytes(snapshot.bytes_downloaded)
    )
}
