//! Download command - fetch a depot and reconstruct its files.

use std::path::PathBuf;
use std::sync::Arc;

use depotfetch::coordinator::{CoordinatorConfig, DownloadCoordinator};
use depotfetch::fetch::ReqwestClient;
use depotfetch::host::HostPool;
use depotfetch::manifest::load_manifest;
use depotfetch::DepotError;
use tracing::{info, warn};

use super::common::{
    resolve_keys, resolve_output, resolve_retries, resolve_servers, resolve_threads,
    resolve_timeout,
};
use super::Context;
use crate::error::CliError;
use crate::ui::progress::DownloadProgress;
use crate::ui::summary;

/// Arguments for the download command.
pub struct DownloadArgs {
    pub depot: u32,
    pub manifest: PathBuf,
    pub key: Option<String>,
    pub servers: Vec<String>,
    pub threads: Option<usize>,
    pub retries: Option<u32>,
    pub output: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub progress: bool,
}

/// Run the download command. Returns the process exit status.
pub fn run(ctx: &Context, args: DownloadArgs) -> Result<i32, CliError> {
    let config = ctx.config();

    let manifest = load_manifest(&args.manifest).map_err(DepotError::from)?;
    if manifest.depot_id != args.depot {
        return Err(CliError::Config(format!(
            "Manifest {} belongs to depot {}, not {}",
            args.manifest.display(),
            manifest.depot_id,
            args.depot
        )));
    }

    // Resolve settings from CLI and config
    let servers = resolve_servers(&args.servers, config)?;
    let keys = resolve_keys(args.key.as_deref(), args.depot, config)?;
    let threads = resolve_threads(args.threads, config)?;
    let retries = resolve_retries(args.retries, config)?;
    let timeout = resolve_timeout(args.timeout, config);
    let output = resolve_output(args.output, args.depot, config);

    let hosts = HostPool::new(&servers, config.hosts.pool_config()).map_err(DepotError::from)?;
    let client = ReqwestClient::with_timeout(timeout).map_err(DepotError::from)?;

    let coordinator_config = CoordinatorConfig::new(output.clone())
        .with_concurrency(threads)
        .with_max_attempts(retries);
    let mut coordinator = DownloadCoordinator::new(coordinator_config, Arc::new(client));

    let progress = if args.progress {
        let bar = DownloadProgress::new(manifest.total_size());
        coordinator = coordinator.with_progress(bar.callback());
        Some(bar)
    } else {
        None
    };

    // Cancel outstanding work on Ctrl+C; files keep whatever was written
    let token = coordinator.cancellation_token();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping after in-flight chunks...");
        token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    summary::print_job_header(&manifest, &output, hosts.len(), threads);
    info!(
        depot = args.depot,
        manifest = manifest.manifest_id,
        servers = hosts.len(),
        threads,
        retries,
        timeout_secs = timeout.as_secs(),
        output = %output.display(),
        "Starting download"
    );

    let result = coordinator.run(&manifest, &keys, &hosts);

    if let Some(bar) = progress {
        bar.finish(result.as_ref().is_ok_and(|r| r.is_success()));
    }

    let result = result?;
    if result.cancelled {
        warn!("Download cancelled");
    }
    summary::print_job_result(&result);
    Ok(result.exit_code())
}
