use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookfleet::config::{Config, LogFormat};
use bookfleet::worker::ProtocolVersion;

mod commands;

use commands::{coordinator, stats, worker, CoordinatorParams, WorkerParams};

#[derive(Parser)]
#[command(
    name = "bookfleet",
    version,
    about = "Distributed opening-book builder: one coordinator, many analysis workers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the master book to workers
    Coordinator {
        /// Address to bind (host:port)
        #[arg(short, long)]
        bind: Option<String>,

        /// Master book file
        #[arg(long)]
        book: Option<PathBuf>,

        /// Lifetime cap in seconds
        #[arg(long)]
        lifetime: Option<u64>,

        /// Create an empty master book if none exists
        #[arg(long, default_value = "false")]
        init_book: bool,
    },

    /// Fetch, analyze and upload batches
    Worker {
        /// Coordinator address (host:port)
        #[arg(short = 'a', long)]
        coordinator: Option<String>,

        /// Worker identity (defaults to $HOSTNAME)
        #[arg(long)]
        id: Option<String>,

        /// Local book file
        #[arg(long)]
        book: Option<PathBuf>,

        /// Protocol version (v1, v2, v3)
        #[arg(short, long)]
        protocol: Option<ProtocolVersion>,

        /// Lifetime cap in seconds
        #[arg(long)]
        lifetime: Option<u64>,
    },

    /// Show per-worker contribution counters
    Stats {
        /// Stats directory (defaults to the coordinator's)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let format = cli.log_format.unwrap_or(config.logging.format);
    setup_tracing(format, &config.logging.level, cli.verbose)?;

    if let Err(e) = bookfleet::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "bookfleet starting");

    match cli.command {
        Commands::Coordinator {
            bind,
            book,
            lifetime,
            init_book,
        } => {
            tracing::info!(bind = ?bind, book = ?book, init_book, "Starting coordinator command");
            coordinator(CoordinatorParams {
                config: config.coordinator,
                bind,
                book,
                lifetime_secs: lifetime,
                init_book,
            })
            .await?;
        }

        Commands::Worker {
            coordinator: address,
            id,
            book,
            protocol,
            lifetime,
        } => {
            tracing::info!(coordinator = ?address, id = ?id, "Starting worker command");
            worker(WorkerParams {
                config: config.worker,
                coordinator: address,
                worker_id: id,
                book,
                protocol,
                lifetime_secs: lifetime,
            })
            .await?;
        }

        Commands::Stats { dir } => {
            stats(dir.unwrap_or(config.coordinator.stats_dir)).await?;
        }
    }

    tracing::info!("bookfleet finished");
    Ok(())
}

fn setup_tracing(format: LogFormat, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("bookfleet=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new(format!("bookfleet={level},warn"))
    };

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
