//! possyncd
//!
//! POS sync middleware daemon and maintenance tools.
//!
//! # Commands
//!
//! - `serve` - Run the terminal API with the periodic reconciler
//! - `reconcile-once` - Run a single reconciliation cycle and exit
//! - `pending` - List staged records still waiting for the upstream
//! - `compact` - Rewrite the staging journal to one line per record

mod commands;

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// POS sync middleware daemon.
#[derive(Parser)]
#[command(name = "possyncd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Staging journal file (in-memory staging when absent)
    #[arg(global = true, short, long, env = "POSSYNC_JOURNAL")]
    journal: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Upstream connection flags.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// Base URL of the upstream record API
    #[arg(long, env = "POSSYNC_UPSTREAM_URL", default_value = "http://127.0.0.1:3000/api")]
    pub upstream_url: String,

    /// Per-call upstream timeout in seconds
    #[arg(long, env = "POSSYNC_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

/// Reconciliation flags.
#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    /// Records taken per cycle
    #[arg(long, env = "POSSYNC_BATCH_SIZE", default_value_t = 10)]
    pub batch_size: usize,

    /// Worker threads per cycle
    #[arg(long, env = "POSSYNC_CONCURRENCY", default_value_t = 1)]
    pub concurrency: usize,

    /// Only reconcile this store
    #[arg(long, env = "POSSYNC_STORE")]
    pub store: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the terminal API and the periodic reconciler
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "POSSYNC_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Seconds between reconciliation cycles
        #[arg(long, env = "POSSYNC_INTERVAL_SECS", default_value_t = 300)]
        interval_secs: u64,

        /// Do not attempt a push right after each submission
        #[arg(long, env = "POSSYNC_NO_INLINE_SYNC")]
        no_inline_sync: bool,

        #[command(flatten)]
        upstream: UpstreamArgs,

        #[command(flatten)]
        reconcile: ReconcileArgs,
    },

    /// Run a single reconciliation cycle and exit
    ReconcileOnce {
        #[command(flatten)]
        upstream: UpstreamArgs,

        #[command(flatten)]
        reconcile: ReconcileArgs,
    },

    /// List staged records still waiting for the upstream
    Pending {
        /// Only list this store
        #[arg(short, long)]
        store: Option<String>,

        /// Maximum number of records
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Rewrite the staging journal to one line per record
    Compact,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins unless --verbose asks for debug
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            interval_secs,
            no_inline_sync,
            upstream,
            reconcile,
        } => {
            let options = commands::serve::ServeOptions {
                bind,
                interval: Duration::from_secs(interval_secs.max(1)),
                inline_sync: !no_inline_sync,
                upstream,
                reconcile,
            };
            commands::serve::run(cli.journal.as_deref(), options)?;
        }
        Commands::ReconcileOnce {
            upstream,
            reconcile,
        } => {
            commands::reconcile_once::run(cli.journal.as_deref(), &upstream, &reconcile)?;
        }
        Commands::Pending {
            store,
            limit,
            format,
        } => {
            let path = cli.journal.ok_or("Journal path required for pending")?;
            commands::pending::run(&path, store.as_deref(), limit, &format)?;
        }
        Commands::Compact => {
            let path = cli.journal.ok_or("Journal path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("possyncd v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
