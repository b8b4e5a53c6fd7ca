//! Framing over a byte stream
//!
//! A [`Connection`] wraps one stream for the lifetime of one exchange:
//! newline-terminated text lines for commands and legacy payloads, then at
//! most one binary message that runs to the end of the stream.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::{ProtocolError, ProtocolResult, Request};

/// Upper bound on a single binary message
pub const MAX_MESSAGE_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Upper bound on a single text line
pub const MAX_LINE_BYTES: u64 = 64 * 1024;

/// One exchange over a byte stream
pub struct Connection<S> {
    stream: BufReader<S>,
    max_message_bytes: u64,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }

    /// Lower the binary message limit
    pub fn with_max_message_bytes(mut self, limit: u64) -> Self {
        self.max_message_bytes = limit;
        self
    }

    /// Write one line, appending the newline
    pub async fn write_line(&mut self, line: &str) -> ProtocolResult<()> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read one line without its terminator
    pub async fn read_line(&mut self) -> ProtocolResult<String> {
        let mut buf = Vec::new();
        let read = (&mut self.stream)
            .take(MAX_LINE_BYTES)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        if buf.last() != Some(&b'\n') && read as u64 >= MAX_LINE_BYTES {
            return Err(ProtocolError::MalformedCommandLine(format!(
                "line longer than {MAX_LINE_BYTES} bytes"
            )));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Send a command line
    pub async fn send_request(&mut self, request: &Request) -> ProtocolResult<()> {
        self.write_line(&request.to_line()).await
    }

    /// Receive and decode a command line
    pub async fn read_request(&mut self) -> ProtocolResult<Request> {
        let line = self.read_line().await?;
        Request::parse(&line)
    }

    /// Send the legacy `fetch` reply: a count line, then the records
    pub async fn write_lines(&mut self, lines: &[String]) -> ProtocolResult<()> {
        self.write_line(&lines.len().to_string()).await?;
        for line in lines {
            self.write_line(line).await?;
        }
        self.finish().await
    }

    /// Receive the legacy `fetch` reply
    pub async fn read_lines(&mut self) -> ProtocolResult<Vec<String>> {
        let header = self.read_line().await?;
        let count: usize = header
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidCount(header.clone()))?;
        if count == 0 {
            return Err(ProtocolError::EmptyFetch);
        }
        let mut lines = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            lines.push(self.read_line().await?);
        }
        Ok(lines)
    }

    /// Send one binary message and close the write half
    pub async fn write_message<T: Serialize + ?Sized>(&mut self, message: &T) -> ProtocolResult<()> {
        let bytes = bincode::serialize(message)?;
        if bytes.len() as u64 > self.max_message_bytes {
            return Err(ProtocolError::MessageTooLarge {
                limit: self.max_message_bytes,
            });
        }
        self.stream.get_mut().write_all(&bytes).await?;
        self.finish().await?;
        tracing::debug!(bytes = bytes.len(), "Message sent");
        Ok(())
    }

    /// Read the rest of the stream as one binary message
    pub async fn read_message<T: DeserializeOwned>(&mut self) -> ProtocolResult<T> {
        let mut bytes = Vec::new();
        (&mut self.stream)
            .take(self.max_message_bytes + 1)
            .read_to_end(&mut bytes)
            .await?;
        if bytes.len() as u64 > self.max_message_bytes {
            return Err(ProtocolError::MessageTooLarge {
                limit: self.max_message_bytes,
            });
        }
        if bytes.is_empty() {
            return Err(ProtocolError::ConnectionClosed);
        }
        tracing::debug!(bytes = bytes.len(), "Message received");
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Flush and close the write half
    pub async fn finish(&mut self) -> ProtocolResult<()> {
        let stream = self.stream.get_mut();
        stream.flush().await?;
        stream.shutdown().await?;
        Ok(())
    }
}
