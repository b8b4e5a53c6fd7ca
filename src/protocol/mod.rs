//! Coordinator/worker wire protocol
//!
//! Every exchange uses a fresh TCP connection. The caller writes one
//! command line, `<token> <worker-id>\n`, and the payload that follows
//! depends on the token:
//!
//! | Token      | Direction         | Payload                                          |
//! |------------|-------------------|--------------------------------------------------|
//! | `fetch`    | server → worker   | decimal line count, then that many game records  |
//! | `fetch2`   | server → worker   | [`Fetch2Reply`]                                  |
//! | `sync`     | worker → server   | [`SyncPayload`]                                  |
//! | `sync2`    | worker → server   | [`Sync2Payload`] (completed lines as records)    |
//! | `sync3`    | worker → server   | [`Sync3Payload`] (completed lines as variations) |
//! | `merge`    | server → worker   | the full master book                             |
//! | `identity` | -                 | none                                             |
//! | `quit`     | -                 | none; server stops after this connection         |
//!
//! Binary payloads are a single bincode message filling the rest of the
//! stream. The sender shuts down its write half once the message is out.

pub mod codec;

pub use codec::Connection;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::variation::{parse_transcript, TranscriptError, Variation};

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Stream failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream before a complete frame arrived
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// First line did not name a known command
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// First line was not `<token> <worker-id>`
    #[error("malformed command line: {0:?}")]
    MalformedCommandLine(String),

    /// Legacy fetch count line was not a number
    #[error("invalid line count: {0:?}")]
    InvalidCount(String),

    /// Coordinator had nothing to hand out
    #[error("coordinator returned no lines")]
    EmptyFetch,

    /// Binary payload could not be encoded or decoded
    #[error("payload codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Payload exceeded the size limit
    #[error("payload larger than {limit} bytes")]
    MessageTooLarge { limit: u64 },

    /// A game record in a payload could not be read
    #[error("bad game record: {0}")]
    Transcript(#[from] TranscriptError),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Commands
// ============================================================================

/// Command tokens understood by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Identity,
    Sync,
    Sync2,
    Sync3,
    Fetch,
    Fetch2,
    Merge,
    Quit,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::Identity,
        Command::Sync,
        Command::Sync2,
        Command::Sync3,
        Command::Fetch,
        Command::Fetch2,
        Command::Merge,
        Command::Quit,
    ];

    /// Wire spelling
    pub fn token(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Sync => "sync",
            Self::Sync2 => "sync2",
            Self::Sync3 => "sync3",
            Self::Fetch => "fetch",
            Self::Fetch2 => "fetch2",
            Self::Merge => "merge",
            Self::Quit => "quit",
        }
    }

    /// Exact token lookup
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.token() == token)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A decoded command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub worker: String,
}

impl Request {
    pub fn new(command: Command, worker: impl Into<String>) -> Self {
        Self {
            command,
            worker: worker.into(),
        }
    }

    /// Decode `<token> <worker-id>`
    ///
    /// The token is everything before the first space and must match
    /// exactly, so `sync3 host` can never be read as `sync`.
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (token, worker) = line
            .split_once(' ')
            .ok_or_else(|| ProtocolError::MalformedCommandLine(line.to_string()))?;
        let command = Command::from_token(token)
            .ok_or_else(|| ProtocolError::UnknownCommand(token.to_string()))?;
        Ok(Self::new(command, worker.trim()))
    }

    /// Encode as a command line (without the trailing newline)
    pub fn to_line(&self) -> String {
        format!("{} {}", self.command.token(), self.worker)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Reply to `fetch2`: the sub-book needed for the batch, plus the batch itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fetch2Reply<B> {
    pub book: B,
    pub transcripts: Vec<String>,
    pub variations: Vec<Variation>,
}

/// Body of `sync`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPayload<B> {
    pub book: B,
}

/// Body of `sync2`: completed lines as game records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sync2Payload<B> {
    pub book: B,
    pub transcripts: Vec<String>,
}

/// Body of `sync3`: completed lines as variations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sync3Payload<B> {
    pub book: B,
    pub variations: Vec<Variation>,
}

/// Payloads carrying a worker's local book
pub trait HasBookDelta<B> {
    fn book_mut(&mut self) -> &mut B;
}

/// Payloads reporting which lines a worker finished
pub trait HasVariations {
    fn completed(&self) -> ProtocolResult<Vec<Variation>>;
}

impl<B> HasBookDelta<B> for SyncPayload<B> {
    fn book_mut(&mut self) -> &mut B {
        &mut self.book
    }
}

impl<B> HasBookDelta<B> for Sync2Payload<B> {
    fn book_mut(&mut self) -> &mut B {
        &mut self.book
    }
}

impl<B> HasBookDelta<B> for Sync3Payload<B> {
    fn book_mut(&mut self) -> &mut B {
        &mut self.book
    }
}

impl<B> HasVariations for Sync2Payload<B> {
    fn completed(&self) -> ProtocolResult<Vec<Variation>> {
        self.transcripts
            .iter()
            .map(|record| Ok(Variation::from_moves(parse_transcript(record)?)))
            .collect()
    }
}

impl<B> HasVariations for Sync3Payload<B> {
    fn completed(&self) -> ProtocolResult<Vec<Variation>> {
        Ok(self.variations.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variation::parse_moves;

    #[test]
    fn test_parse_every_token() {
        for command in Command::ALL {
            let request = Request::parse(&format!("{} node-3\n", command.token())).unwrap();
            assert_eq!(request.command, command);
            assert_eq!(request.worker, "node-3");
        }
    }

    #[test]
    fn test_sync_tokens_do_not_collide() {
        assert_eq!(Request::parse("sync3 a").unwrap().command, Command::Sync3);
        assert_eq!(Request::parse("sync2 a").unwrap().command, Command::Sync2);
        assert_eq!(Request::parse("sync a").unwrap().command, Command::Sync);
        assert_eq!(Request::parse("fetch2 a").unwrap().command, Command::Fetch2);
        assert_eq!(Request::parse("fetch a").unwrap().command, Command::Fetch);
    }

    #[test]
    fn test_token_requires_space() {
        assert!(matches!(
            Request::parse("sync3"),
            Err(ProtocolError::MalformedCommandLine(_))
        ));
        assert!(matches!(
            Request::parse("sync4 host"),
            Err(ProtocolError::UnknownCommand(_))
        ));
        assert!(matches!(
            Request::parse("syncx host"),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_worker_id_keeps_inner_spaces() {
        let request = Request::parse("identity build box 7\r\n").unwrap();
        assert_eq!(request.worker, "build box 7");
        assert_eq!(request.to_line(), "identity build box 7");
    }

    #[test]
    fn test_sync2_completed_parses_records() {
        let line = Variation::from_moves(parse_moves("f5d6").unwrap());
        let payload = Sync2Payload {
            book: (),
            transcripts: vec![line.to_transcript()],
        };
        assert_eq!(payload.completed().unwrap(), vec![line]);

        let broken = Sync2Payload {
            book: (),
            transcripts: vec!["junk".to_string()],
        };
        assert!(matches!(broken.completed(), Err(ProtocolError::Transcript(_))));
    }

    #[test]
    fn test_fetch2_reply_field_order() {
        let reply = Fetch2Reply {
            book: 7u8,
            transcripts: vec![],
            variations: vec![],
        };
        let bytes = bincode::serialize(&reply).unwrap();
        assert_eq!(bytes[0], 7);
        assert_eq!(bytes.len(), 1 + 8 + 8);
    }
}
