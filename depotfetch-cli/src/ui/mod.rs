//! Terminal output for depotfetch.
//!
//! - `progress` - byte progress bar fed by the coordinator's progress callback
//! - `summary` - job header and per-file result report

pub mod progress;
pub mod summary;
