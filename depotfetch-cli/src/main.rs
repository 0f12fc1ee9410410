//! depotfetch CLI
//!
//! Downloads a depot described by a manifest from chunked content servers and
//! reconstructs its files on disk.

mod commands;
mod error;
mod ui;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::download::DownloadArgs;
use commands::verify::VerifyArgs;
use commands::{Context, GlobalArgs};

#[derive(Parser)]
#[command(name = "depotfetch")]
#[command(version, about = "Download and reconstruct depots from chunked content servers", long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir/depotfetch/config.ini)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(short = 'l', long = "level", value_name = "LEVEL", global = true)]
    level: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a depot and reconstruct its files
    Download {
        /// Depot id
        #[arg(short = 'd', long = "depot", value_name = "DEPOT_ID")]
        depot: u32,

        /// Manifest JSON file
        #[arg(short = 'm', long = "manifest", value_name = "PATH")]
        manifest: PathBuf,

        /// Depot decryption key (64 hex characters)
        #[arg(short = 'k', long = "key", value_name = "HEX_KEY")]
        key: Option<String>,

        /// Content server base URL (repeat or separate with commas)
        #[arg(short = 's', long = "server", value_name = "URL", value_delimiter = ',')]
        servers: Vec<String>,

        /// Concurrent chunk workers [default: 32]
        #[arg(short = 't', long = "threads", value_name = "THREADS")]
        threads: Option<usize>,

        /// Attempts per chunk [default: 3]
        #[arg(short = 'r', long = "retries", value_name = "RETRIES")]
        retries: Option<u32>,

        /// Output directory [default: ./<DEPOT_ID>]
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,

        /// Request timeout in seconds [default: 10]
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Check files on disk against a manifest without downloading
    Verify {
        /// Manifest JSON file
        #[arg(short = 'm', long = "manifest", value_name = "PATH")]
        manifest: PathBuf,

        /// Output directory [default: ./<DEPOT_ID>]
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,

        /// Expected depot id
        #[arg(short = 'd', long = "depot", value_name = "DEPOT_ID")]
        depot: Option<u32>,
    },
}

fn main() {
    let cli = Cli::parse();

    let globals = GlobalArgs {
        config: cli.config,
        level: cli.level,
        log_file: cli.log_file,
    };

    let result = Context::new(globals).and_then(|ctx| match cli.command {
        Commands::Download {
            depot,
            manifest,
            key,
            servers,
            threads,
            retries,
            output,
            timeout,
            no_progress,
        } => commands::download::run(
            &ctx,
            DownloadArgs {
                depot,
                manifest,
                key,
                servers,
                threads,
                retries,
                output,
                timeout,
                progress: !no_progress,
            },
        ),
        Commands::Verify {
            manifest,
            output,
            depot,
        } => commands::verify::run(
            &ctx,
            VerifyArgs {
                manifest,
                output,
                depot,
            },
        ),
    });

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            ui::summary::print_error(&e);
            process::exit(e.exit_code());
        }
    }
}
