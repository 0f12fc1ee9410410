//! Verify command - check reconstructed files against a manifest.

use std::path::PathBuf;
use std::sync::Arc;

use depotfetch::coordinator::{CoordinatorConfig, DownloadCoordinator};
use depotfetch::fetch::ReqwestClient;
use depotfetch::manifest::load_manifest;
use depotfetch::DepotError;

use super::common::{resolve_output, resolve_threads};
use super::Context;
use crate::error::CliError;
use crate::ui::summary;

/// Arguments for the verify command.
pub struct VerifyArgs {
    pub manifest: PathBuf,
    pub output: Option<PathBuf>,
    pub depot: Option<u32>,
}

/// Run the verify command. Returns the process exit status.
pub fn run(ctx: &Context, args: VerifyArgs) -> Result<i32, CliError> {
    let config = ctx.config();

    let manifest = load_manifest(&args.manifest).map_err(DepotError::from)?;
    if let Some(depot) = args.depot {
        if depot != manifest.depot_id {
            return Err(CliError::Config(format!(
                "Manifest {} belongs to depot {}, not {}",
                args.manifest.display(),
                manifest.depot_id,
                depot
            )));
        }
    }

    let output = resolve_output(args.output, manifest.depot_id, config);
    let threads = resolve_threads(None, config)?;

    // Verification never touches the network; the client only satisfies the
    // coordinator's constructor.
    let client = ReqwestClient::new().map_err(DepotError::from)?;
    let coordinator = DownloadCoordinator::new(
        CoordinatorConfig::new(output.clone()).with_concurrency(threads),
        Arc::new(client),
    );

    println!("Verifying {} against {}", output.display(), args.manifest.display());
    let result = coordinator.verify(&manifest)?;
    summary::print_job_result(&result);
    Ok(result.exit_code())
}
