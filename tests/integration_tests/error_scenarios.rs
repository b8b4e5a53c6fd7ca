//! Error scenario integration tests
//!
//! Tests various failure modes and error handling:
//! 1. Garbage and truncated payloads on the coordinator
//! 2. Empty fetches
//! 3. A worker whose coordinator is gone
//! 4. Restart from the recovery dump and controller snapshot

use bookfleet::book::{MemoryBook, MemoryEngine};
use bookfleet::coordinator::CoordinatorState;
use bookfleet::error::{BookfleetErrorTrait, ErrorCategory};
use bookfleet::protocol::{ProtocolError, Sync3Payload};
use bookfleet::utils::{Backoff, BackoffConfig, Lifetime};
use bookfleet::variation::Variation;
use bookfleet::worker::{CoordinatorClient, ProtocolVersion, WorkerSession};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use super::fixtures::{coordinator_config, join, master_book, moves, spawn_coordinator, worker_config};

// ============================================================================
// Coordinator Side
// ============================================================================

#[tokio::test]
async fn test_garbage_lines_do_not_stop_coordinator() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;

    for junk in ["sync4 node-1\n", "\n", "fetch2\n", "GET / HTTP/1.1\r\n"] {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(junk.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    // Still serving
    let client = CoordinatorClient::new(addr.to_string(), "node-1");
    let reply = client.fetch2::<MemoryBook>().await.unwrap();
    assert_eq!(reply.variations.len(), 3);

    client.quit().await.unwrap();
    join(handle).await;
}

#[tokio::test]
async fn test_truncated_sync3_leaves_master_untouched() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;

    let mut delta = MemoryBook::new();
    delta.insert(moves("c4c3"), Default::default());
    let payload = Sync3Payload {
        book: delta,
        variations: vec![Variation::from_moves(moves("f5d6"))],
    };
    let bytes = bincode::serialize(&payload).unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"sync3 node-1\n").await.unwrap();
    stream.write_all(&bytes[..bytes.len() / 2]).await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    let client = CoordinatorClient::new(addr.to_string(), "node-1");
    let master: MemoryBook = client.merge().await.unwrap();
    assert!(!master.contains(&moves("c4c3")));

    client.quit().await.unwrap();
    let (state, _) = join(handle).await;
    assert_eq!(state.stats().get("node-1").unwrap(), 0);
}

#[tokio::test]
async fn test_fetch_from_finished_book_is_empty() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, MemoryBook::new()).await;
    let client = CoordinatorClient::new(addr.to_string(), "node-1");

    let err = client.fetch2::<MemoryBook>().await.unwrap_err();
    assert!(matches!(err, ProtocolError::EmptyFetch));
    assert_eq!(err.category(), ErrorCategory::TransientIo);

    let legacy = client.fetch_legacy().await.unwrap_err();
    assert!(matches!(legacy, ProtocolError::EmptyFetch));

    client.quit().await.unwrap();
    join(handle).await;
}

// ============================================================================
// Worker Side
// ============================================================================

#[tokio::test]
async fn test_worker_outlives_missing_coordinator() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = worker_config(&dir, addr, ProtocolVersion::V3);
    let book_path = config.book_path.clone();
    let session = WorkerSession::<MemoryBook, _>::open(config, MemoryEngine::default())
        .unwrap()
        .with_backoff(Backoff::seeded(
            BackoffConfig {
                min_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
            },
            1,
        ))
        .with_lifetime(Lifetime::new(Duration::from_millis(200)));

    let summary = session.run().await.unwrap();

    assert!(summary.failures > 0);
    assert_eq!(summary.fetches, 0);
    // Nothing uploaded, so nothing rotated
    assert!(!book_path.exists());
}

// ============================================================================
// Restart
// ============================================================================

#[tokio::test]
async fn test_restart_restores_queue_and_controller() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;

    let client = CoordinatorClient::new(addr.to_string(), "node-1");
    client.fetch2::<MemoryBook>().await.unwrap();
    client.quit().await.unwrap();
    let (first, _) = join(handle).await;
    let start_count = first.controller().start_count();

    let restarted =
        CoordinatorState::<MemoryBook, _>::open(coordinator_config(&dir), MemoryEngine::default())
            .unwrap();

    assert_eq!(restarted.queue().len(), first.queue().len());
    assert_eq!(restarted.controller().start_count(), start_count);
    assert_eq!(restarted.book().get(&moves("f5d6")), first.book().get(&moves("f5d6")));
}
