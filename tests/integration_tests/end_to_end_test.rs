//! Coordinator and worker talking over loopback
//!
//! 1. Client fetch2, partial sync3, queue keeps only the unfinished line
//! 2. A worker session walking IDENTITY, FETCH2, SYNC against the server
//! 3. Legacy fetch/sync and the merge download

use bookfleet::book::{self, Book, Engine, MemoryBook, MemoryEngine};
use bookfleet::coordinator::StopReason;
use bookfleet::storage::WorkerStats;
use bookfleet::variation::Variation;
use bookfleet::worker::{CoordinatorClient, ProtocolVersion, WorkerSession, WorkerState};
use std::time::Duration;
use tempfile::TempDir;

use super::fixtures::{join, master_book, moves, spawn_coordinator, worker_config, OPEN_LINES};

// ============================================================================
// Client Exchanges
// ============================================================================

#[tokio::test]
async fn test_fetch2_then_partial_sync3() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;
    let client = CoordinatorClient::new(addr.to_string(), "node-1");

    let reply = client.fetch2::<MemoryBook>().await.unwrap();
    assert_eq!(reply.variations.len(), 3);
    assert_eq!(reply.transcripts.len(), 3);
    for line in OPEN_LINES {
        assert!(reply.book.contains(&moves(line)), "{line} missing from sub-book");
    }

    // Analyze two of the three lines
    let mut local = reply.book.clone();
    let mut engine = MemoryEngine::default();
    let done: Vec<Variation> = ["f5d6", "f5f6"]
        .iter()
        .map(|line| Variation::from_moves(moves(line)))
        .collect();
    for line in &done {
        engine
            .analyze_line(&mut local, line.moves(), Duration::from_secs(1))
            .unwrap();
    }
    client.sync3(&local, &done).await.unwrap();
    client.quit().await.unwrap();

    let (state, reason) = join(handle).await;
    assert_eq!(reason, StopReason::Quit);

    let left: Vec<&Variation> = state.queue().iter().collect();
    assert_eq!(left, vec![&Variation::from_moves(moves("f5f4"))]);
    assert!(state.book().get(&moves("f5d6")).unwrap().depth > 0);
    assert_eq!(state.book().get(&moves("f5f4")).unwrap().depth, 0);

    // The master book is persisted on the way out
    let saved: MemoryBook = book::load(&state.config().book_path).unwrap();
    assert_eq!(saved.position_count(), state.book().position_count());
}

#[tokio::test]
async fn test_sync2_counts_toward_worker_stats() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;
    let client = CoordinatorClient::new(addr.to_string(), "rack-2");

    let reply = client.fetch2::<MemoryBook>().await.unwrap();
    let mut local = reply.book.clone();
    let mut engine = MemoryEngine::default();
    let line = Variation::from_moves(moves("f5d6c3"));
    engine
        .analyze_line(&mut local, line.moves(), Duration::from_secs(1))
        .unwrap();

    client.sync2(&local, &[line]).await.unwrap();
    client.quit().await.unwrap();
    let (state, _) = join(handle).await;

    assert!(state.book().contains(&moves("f5d6c3")));
    let stats = WorkerStats::new(state.config().stats_dir.clone());
    assert_eq!(stats.get("rack-2").unwrap(), 1);
}

#[tokio::test]
async fn test_legacy_fetch_and_merge_download() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;
    let client = CoordinatorClient::new(addr.to_string(), "old-node");

    let batch = client.fetch_legacy().await.unwrap();
    assert_eq!(batch.len(), 3);
    assert!(batch.contains(&Variation::from_moves(moves("f5f4"))));

    let mut delta = MemoryBook::new();
    delta.insert(moves("c4"), Default::default());
    client.sync(&delta).await.unwrap();

    let master: MemoryBook = client.merge().await.unwrap();
    assert!(master.contains(&moves("c4")));
    assert!(master.contains(&moves("f5d6")));

    client.quit().await.unwrap();
    let (state, _) = join(handle).await;

    // Legacy sync leaves the contribution counters alone
    let stats = WorkerStats::new(state.config().stats_dir.clone());
    assert_eq!(stats.get("old-node").unwrap(), 0);
}

// ============================================================================
// Worker Session
// ============================================================================

#[tokio::test]
async fn test_session_round_trip_resolves_every_line() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;
    let config = worker_config(&dir, addr, ProtocolVersion::V3);
    let book_path = config.book_path.clone();

    let mut session = WorkerSession::<MemoryBook, _>::open(config, MemoryEngine::default()).unwrap();
    assert_eq!(session.state(), WorkerState::Identity);

    session.step().await.unwrap();
    assert_eq!(session.state(), WorkerState::Default);
    session.step().await.unwrap();
    assert_eq!(session.state(), WorkerState::Fetch2);

    session.step().await.unwrap();
    assert_eq!(session.state(), WorkerState::Sync);
    assert_eq!(session.pending_results().len(), 3);
    assert_eq!(session.engine().unwrap().lines_analyzed(), 3);

    session.step().await.unwrap();
    assert_eq!(session.state(), WorkerState::Default);
    assert!(session.pending_results().is_empty());
    assert_eq!(session.summary().syncs, 1);

    // The local book was rotated to disk after the upload
    let local: MemoryBook = book::load(&book_path).unwrap();
    assert_eq!(local.position_count(), session.book().position_count());

    CoordinatorClient::new(addr.to_string(), "admin")
        .quit()
        .await
        .unwrap();
    let (state, _) = join(handle).await;

    assert!(state.queue().is_empty());
    for line in OPEN_LINES {
        assert!(state.book().get(&moves(line)).unwrap().depth > 0, "{line} not merged");
    }
}

#[tokio::test]
async fn test_legacy_session_round_trip() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;
    let config = worker_config(&dir, addr, ProtocolVersion::V1);

    let mut session = WorkerSession::new(config, master_book(), MemoryEngine::default())
        .with_state(WorkerState::Default);

    session.step().await.unwrap();
    assert_eq!(session.state(), WorkerState::Fetch);
    session.step().await.unwrap();
    assert_eq!(session.state(), WorkerState::Sync);
    session.step().await.unwrap();
    assert_eq!(session.state(), WorkerState::Default);

    CoordinatorClient::new(addr.to_string(), "admin")
        .quit()
        .await
        .unwrap();
    let (state, _) = join(handle).await;

    assert!(state.book().get(&moves("f5f6")).unwrap().depth > 0);
}
