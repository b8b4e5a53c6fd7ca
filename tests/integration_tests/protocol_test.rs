//! Hand-written command lines against a running coordinator
//!
//! Checks the byte-level framing: a command line, then either a counted
//! block of game records or one binary payload running to end of stream.

use bookfleet::book::{MemoryBook, Position};
use bookfleet::coordinator::StopReason;
use bookfleet::protocol::{Fetch2Reply, Sync3Payload};
use bookfleet::variation::{parse_transcript, Variation};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tempfile::TempDir;

use super::fixtures::{join, master_book, moves, spawn_coordinator};

async fn send_line(addr: std::net::SocketAddr, line: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(line.as_bytes()).await.unwrap();
    stream
}

async fn read_to_end(stream: &mut TcpStream) -> Vec<u8> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await.unwrap();
    bytes
}

async fn quit(addr: std::net::SocketAddr) {
    let mut stream = send_line(addr, "quit admin\n").await;
    stream.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_legacy_fetch_framing() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;

    let mut stream = send_line(addr, "fetch node-1\n").await;
    stream.shutdown().await.unwrap();
    let text = String::from_utf8(read_to_end(&mut stream).await).unwrap();

    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("3"));
    let records: Vec<&str> = lines.collect();
    assert_eq!(records.len(), 3);
    for record in records {
        assert!(record.starts_with("(;GM[Othello]"), "unexpected record {record}");
        assert_eq!(parse_transcript(record).unwrap().len(), 2);
    }

    quit(addr).await;
    join(handle).await;
}

#[tokio::test]
async fn test_fetch2_payload_is_bincode_to_eof() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;

    let mut stream = send_line(addr, "fetch2 node-1\n").await;
    stream.shutdown().await.unwrap();
    let bytes = read_to_end(&mut stream).await;

    let reply: Fetch2Reply<MemoryBook> = bincode::deserialize(&bytes).unwrap();
    assert_eq!(reply.variations.len(), 3);
    for (record, variation) in reply.transcripts.iter().zip(&reply.variations) {
        assert_eq!(parse_transcript(record).unwrap(), variation.moves());
    }

    quit(addr).await;
    join(handle).await;
}

#[tokio::test]
async fn test_sync3_with_handwritten_payload() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;

    // Fill the queue first
    let mut fetch = send_line(addr, "fetch2 node-1\n").await;
    fetch.shutdown().await.unwrap();
    read_to_end(&mut fetch).await;

    let mut analyzed = MemoryBook::new();
    analyzed.insert(
        moves("f5d6"),
        Position {
            depth: 16,
            ..Position::new(0, 1)
        },
    );
    let payload = Sync3Payload {
        book: analyzed,
        variations: vec![Variation::from_moves(moves("f5d6"))],
    };
    let mut sync = send_line(addr, "sync3 node-1\n").await;
    sync.write_all(&bincode::serialize(&payload).unwrap())
        .await
        .unwrap();
    sync.shutdown().await.unwrap();
    assert!(read_to_end(&mut sync).await.is_empty());

    quit(addr).await;
    let (state, reason) = join(handle).await;

    assert_eq!(reason, StopReason::Quit);
    assert_eq!(state.queue().len(), 2);
    assert!(!state.queue().iter().any(|v| v.moves() == moves("f5d6").as_slice()));
}

#[tokio::test]
async fn test_identity_carries_no_reply() {
    let dir = TempDir::new().unwrap();
    let (addr, handle) = spawn_coordinator(&dir, master_book()).await;

    let mut stream = send_line(addr, "identity rack-7\n").await;
    stream.shutdown().await.unwrap();
    assert!(read_to_end(&mut stream).await.is_empty());

    quit(addr).await;
    let (state, _) = join(handle).await;
    assert!(state.queue().is_empty());
}
