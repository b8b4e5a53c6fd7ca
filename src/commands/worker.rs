use anyhow::Result;
use std::path::PathBuf;

use bookfleet::book::{MemoryBook, MemoryEngine};
use bookfleet::utils::format_duration;
use bookfleet::worker::{ProtocolVersion, WorkerConfig, WorkerSession};

/// Command-line overrides for a worker
pub struct WorkerParams {
    pub config: WorkerConfig,
    pub coordinator: Option<String>,
    pub worker_id: Option<String>,
    pub book: Option<PathBuf>,
    pub protocol: Option<ProtocolVersion>,
    pub lifetime_secs: Option<u64>,
}

/// Run a worker session until its lifetime cap
pub async fn worker(params: WorkerParams) -> Result<()> {
    let WorkerParams {
        mut config,
        coordinator,
        worker_id,
        book,
        protocol,
        lifetime_secs,
    } = params;

    if let Some(address) = coordinator {
        config.coordinator_address = address;
    }
    if let Some(id) = worker_id {
        config.worker_id = id;
    }
    if let Some(path) = book {
        config.book_path = path;
    }
    if let Some(protocol) = protocol {
        config.protocol = protocol;
    }
    if let Some(secs) = lifetime_secs {
        config.lifetime_secs = secs;
    }
    config.validate()?;

    println!("Starting Worker");
    println!("===============");
    println!("  Coordinator: {}", config.coordinator_address);
    println!("  Worker id: {}", config.worker_id);
    println!("  Local book: {}", config.book_path.display());
    println!("  Protocol: {}", config.protocol);
    println!("  Lifetime: {}", format_duration(config.lifetime()));
    println!();

    let session = WorkerSession::<MemoryBook, _>::open(config, MemoryEngine::default())?;
    let summary = session.run().await?;

    println!();
    println!("Worker finished");
    println!("  Batches fetched: {}", summary.fetches);
    println!("  Uploads: {}", summary.syncs);
    println!("  Lines analyzed: {}", summary.lines);
    println!("  Failed exchanges: {}", summary.failures);

    Ok(())
}
