//! Test fixtures for integration tests
//!
//! Provides a small master book and helpers to run a coordinator on a
//! loopback port.

use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use bookfleet::book::{MemoryBook, MemoryEngine, Position};
use bookfleet::coordinator::{CoordinatorConfig, CoordinatorServer, CoordinatorState, StopReason};
use bookfleet::error::Result;
use bookfleet::variation::{parse_moves, Move};
use bookfleet::worker::{ProtocolVersion, WorkerConfig};

/// The three lines left open in [`master_book`]
pub const OPEN_LINES: [&str; 3] = ["f5d6", "f5f6", "f5f4"];

pub type ServerHandle = JoinHandle<Result<(CoordinatorState<MemoryBook, MemoryEngine>, StopReason)>>;

pub fn moves(text: &str) -> Vec<Move> {
    parse_moves(text).unwrap()
}

/// Solved root and `f5`, with three unanalyzed replies below `f5`
pub fn master_book() -> MemoryBook {
    let mut book = MemoryBook::new();
    book.insert(vec![], Position::solved(0, 0));
    book.insert(moves("f5"), Position::solved(0, 0));
    for line in OPEN_LINES {
        book.insert(moves(line), Position::new(0, 1));
    }
    book
}

pub fn coordinator_config(dir: &TempDir) -> CoordinatorConfig {
    CoordinatorConfig::builder()
        .bind_address_str("127.0.0.1:0")
        .unwrap()
        .data_dir(dir.path())
        .build()
        .unwrap()
}

pub fn worker_config(dir: &TempDir, addr: SocketAddr, protocol: ProtocolVersion) -> WorkerConfig {
    WorkerConfig::builder()
        .coordinator_address(addr.to_string())
        .worker_id("node-1")
        .book_path(dir.path().join("local.book"))
        .protocol(protocol)
        .build()
        .unwrap()
}

/// Start a coordinator around `book` and return its address
pub async fn spawn_coordinator(dir: &TempDir, book: MemoryBook) -> (SocketAddr, ServerHandle) {
    let state = CoordinatorState::new(coordinator_config(dir), book, MemoryEngine::default());
    let server = CoordinatorServer::bind(state).await.unwrap();
    let addr = server.local_addr().unwrap();
    (addr, tokio::spawn(server.run()))
}

/// Wait for a coordinator to stop, failing the test after ten seconds
pub async fn join(handle: ServerHandle) -> (CoordinatorState<MemoryBook, MemoryEngine>, StopReason) {
    tokio::time::timeout(std::time::Duration::from_secs(10), handle)
        .await
        .expect("coordinator did not stop")
        .unwrap()
        .unwrap()
}
