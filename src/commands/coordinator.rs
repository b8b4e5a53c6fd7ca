use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

use bookfleet::book::{self, Book, MemoryBook, MemoryEngine};
use bookfleet::coordinator::{CoordinatorConfig, CoordinatorServer, CoordinatorState};
use bookfleet::utils::format_duration;

/// Command-line overrides for the coordinator
pub struct CoordinatorParams {
    pub config: CoordinatorConfig,
    pub bind: Option<String>,
    pub book: Option<PathBuf>,
    pub lifetime_secs: Option<u64>,
    pub init_book: bool,
}

/// Run the coordinator until quit, Ctrl-C or its lifetime cap
pub async fn coordinator(params: CoordinatorParams) -> Result<()> {
    let CoordinatorParams {
        mut config,
        bind,
        book: book_path,
        lifetime_secs,
        init_book,
    } = params;

    if let Some(bind) = bind {
        config.bind_address = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address {bind}"))?;
    }
    if let Some(path) = book_path {
        config.book_path = path;
    }
    if let Some(secs) = lifetime_secs {
        config.lifetime_secs = secs;
    }
    config.validate()?;

    println!("Starting Coordinator");
    println!("====================");
    println!("  Bind: {}", config.bind_address);
    println!("  Book: {}", config.book_path.display());
    println!("  Queue size: {}", config.max_variations);
    println!("  Start count: {}", config.start_count);
    println!("  Lifetime: {}", format_duration(config.lifetime()));
    println!();

    if init_book && !config.book_path.exists() {
        let empty = MemoryBook::new();
        book::persist(&empty, &config.book_path).context("Failed to create empty master book")?;
        tracing::info!(path = %config.book_path.display(), "Created empty master book");
    }

    let state = CoordinatorState::<MemoryBook, _>::open(config, MemoryEngine::default())?;
    let server = CoordinatorServer::bind(state).await?;
    let (state, reason) = server.run().await?;

    println!();
    println!("Coordinator stopped ({reason:?})");
    println!("  Positions: {}", state.book().position_count());
    println!("  Queued lines: {}", state.queue().len());
    println!("  Batch size: {}", state.controller().var_to_send());

    Ok(())
}
