//! Client side of the coordinator protocol
//!
//! Every call opens a fresh connection, sends one command line, exchanges
//! its payload and closes. Nothing is retried here; the session loop owns
//! retries.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::{
    Command, Connection, Fetch2Reply, ProtocolError, ProtocolResult, Request, Sync2Payload,
    Sync3Payload, SyncPayload,
};
use crate::variation::{parse_transcript, Variation};

use super::config::WorkerConfig;

/// Connection factory for one coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    address: String,
    worker_id: String,
}

impl CoordinatorClient {
    pub fn new(address: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            worker_id: worker_id.into(),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.coordinator_address.clone(), config.worker_id.clone())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    async fn open(&self, command: Command) -> ProtocolResult<Connection<TcpStream>> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        let mut conn = Connection::new(stream);
        conn.send_request(&Request::new(command, self.worker_id.as_str()))
            .await?;
        debug!(address = %self.address, %command, "Command sent");
        Ok(conn)
    }

    /// Announce this worker
    pub async fn identity(&self) -> ProtocolResult<()> {
        self.open(Command::Identity).await?.finish().await
    }

    /// Ask the coordinator to stop after this connection
    pub async fn quit(&self) -> ProtocolResult<()> {
        self.open(Command::Quit).await?.finish().await
    }

    /// Legacy fetch: a batch of game records
    ///
    /// A zero count is reported as [`ProtocolError::EmptyFetch`].
    pub async fn fetch_legacy(&self) -> ProtocolResult<Vec<Variation>> {
        let mut conn = self.open(Command::Fetch).await?;
        conn.finish().await?;
        let records = conn.read_lines().await?;
        records
            .iter()
            .map(|record| Ok(Variation::from_moves(parse_transcript(record)?)))
            .collect()
    }

    /// Fetch a batch together with the sub-book needed to analyze it
    ///
    /// An empty batch is reported as [`ProtocolError::EmptyFetch`].
    pub async fn fetch2<B: DeserializeOwned>(&self) -> ProtocolResult<Fetch2Reply<B>> {
        let mut conn = self.open(Command::Fetch2).await?;
        conn.finish().await?;
        let reply: Fetch2Reply<B> = conn.read_message().await?;
        if reply.variations.is_empty() && reply.transcripts.is_empty() {
            return Err(ProtocolError::EmptyFetch);
        }
        Ok(reply)
    }

    /// Legacy sync: the local book only
    pub async fn sync<B: Serialize>(&self, book: &B) -> ProtocolResult<()> {
        let mut conn = self.open(Command::Sync).await?;
        conn.write_message(&SyncPayload { book }).await
    }

    /// Local book plus completed lines as game records
    pub async fn sync2<B: Serialize>(&self, book: &B, completed: &[Variation]) -> ProtocolResult<()> {
        let payload = Sync2Payload {
            book,
            transcripts: completed.iter().map(Variation::to_transcript).collect(),
        };
        let mut conn = self.open(Command::Sync2).await?;
        conn.write_message(&payload).await
    }

    /// Local book plus completed lines as variations
    pub async fn sync3<B: Serialize>(&self, book: &B, completed: &[Variation]) -> ProtocolResult<()> {
        let payload = Sync3Payload {
            book,
            variations: completed.to_vec(),
        };
        let mut conn = self.open(Command::Sync3).await?;
        conn.write_message(&payload).await
    }

    /// Download the full master book
    pub async fn merge<B: DeserializeOwned>(&self) -> ProtocolResult<B> {
        let mut conn = self.open(Command::Merge).await?;
        conn.finish().await?;
        conn.read_message().await
    }
}
