//! txd CLI
//!
//! Command-line tools for running and administering a txd transaction service.
//!
//! # Commands
//!
//! - `serve` - Run the transaction service
//! - `check` - Run one short transaction against a service
//! - `status` - Print the service status
//! - `snapshot` - Download a state snapshot
//! - `inspect-snapshot` - Print the contents of a snapshot file
//! - `invalid-size` - Print the size of the invalid list
//! - `truncate-invalid` - Remove entries from the invalid list

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// txd transaction service tools.
#[derive(Parser)]
#[command(name = "txd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address of the transaction service
    #[arg(global = true, short, long, default_value = "127.0.0.1:15165")]
    address: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the transaction service
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:15165")]
        bind: SocketAddr,

        /// Directory for snapshot files
        #[arg(short, long)]
        snapshot_dir: Option<PathBuf>,

        /// Seconds between snapshots
        #[arg(long, default_value = "300")]
        snapshot_interval: u64,

        /// Snapshot files to keep
        #[arg(long, default_value = "10")]
        snapshots_retained: usize,

        /// Seconds between timeout sweeps
        #[arg(long, default_value = "10")]
        cleanup_interval: u64,

        /// Default short transaction timeout in seconds
        #[arg(long, default_value = "30")]
        short_timeout: u64,
    },

    /// Start, check and commit one empty transaction
    Check,

    /// Print the service status
    Status,

    /// Download a state snapshot
    Snapshot {
        /// File to write the snapshot to
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Print the contents of a snapshot file
    InspectSnapshot {
        /// Snapshot file
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the number of invalid transactions
    InvalidSize,

    /// Remove entries from the invalid list
    TruncateInvalid {
        /// Write pointers to remove
        #[arg(long, value_delimiter = ',', conflicts_with = "before")]
        ids: Vec<i64>,

        /// Remove every entry started before this time (epoch ms)
        #[arg(long)]
        before: Option<i64>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            snapshot_dir,
            snapshot_interval,
            snapshots_retained,
            cleanup_interval,
            short_timeout,
        } => {
            let options = commands::serve::ServeOptions {
                bind,
                snapshot_dir,
                snapshot_interval,
                snapshots_retained,
                cleanup_interval,
                short_timeout,
            };
            commands::serve::run(options)?;
        }
        Commands::Check => commands::check::run(&cli.address)?,
        Commands::Status => commands::admin::status(&cli.address)?,
        Commands::Snapshot { out } => commands::snapshot::download(&cli.address, &out)?,
        Commands::InspectSnapshot { file, format } => commands::snapshot::inspect(&file, &format)?,
        Commands::InvalidSize => commands::admin::invalid_size(&cli.address)?,
        Commands::TruncateInvalid { ids, before } => {
            commands::admin::truncate_invalid(&cli.address, &ids, before)?;
        }
        Commands::Version => {
            println!("txd CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
