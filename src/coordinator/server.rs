//! Coordinator server implementation
//!
//! One TCP connection carries one exchange. Connections are accepted and
//! served strictly one after another: the next `accept` is only issued once
//! the previous stream is closed. The loop ends on `quit`, on Ctrl-C, or
//! when the lifetime cap runs out, and the master book is persisted on the
//! way out whatever the reason.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::book::{Book, Engine};
use crate::config::ConfigError;
use crate::error::{BookfleetErrorTrait, Result};
use crate::metrics;
use crate::protocol::{Command, Connection, Request, Sync2Payload, Sync3Payload, SyncPayload};
use crate::utils::{format_duration, Lifetime};

use super::state::CoordinatorState;

/// Why the accept loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A worker or operator sent `quit`
    Quit,

    /// Wall-clock cap reached
    LifetimeExpired,

    /// Ctrl-C
    Interrupted,
}

/// Sequential accept loop around [`CoordinatorState`]
pub struct CoordinatorServer<B, E> {
    listener: TcpListener,
    state: CoordinatorState<B, E>,
    lifetime: Lifetime,
}

impl<B, E> CoordinatorServer<B, E>
where
    B: Book,
    E: Engine<B>,
{
    /// Bind the configured address
    ///
    /// A bind failure is a configuration error.
    pub async fn bind(state: CoordinatorState<B, E>) -> Result<Self> {
        let addr = state.config().bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ConfigError::invalid("bind_address", format!("cannot bind {addr}: {e}")))?;
        let lifetime = Lifetime::new(state.config().lifetime());

        info!(
            address = %listener.local_addr().unwrap_or(addr),
            lifetime = %format_duration(lifetime.cap()),
            "Coordinator listening"
        );
        Ok(Self {
            listener,
            state,
            lifetime,
        })
    }

    /// Replace the lifetime tracker
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &CoordinatorState<B, E> {
        &self.state
    }

    /// Serve until quit, interrupt or lifetime expiry, then persist
    ///
    /// Returns the final state once it has been written to disk.
    pub async fn run(mut self) -> Result<(CoordinatorState<B, E>, StopReason)> {
        let reason = self.serve().await;

        info!(
            ?reason,
            elapsed = %format_duration(self.lifetime.elapsed()),
            positions = self.state.book().position_count(),
            queue = self.state.queue().len(),
            "Coordinator stopping"
        );
        if let Err(e) = self.state.persist() {
            error!(error = %e, "Final persist failed");
            return Err(e);
        }
        Ok((self.state, reason))
    }

    async fn serve(&mut self) -> StopReason {
        loop {
            if self.state.quit_requested() {
                return StopReason::Quit;
            }
            if self.lifetime.expired() {
                return StopReason::LifetimeExpired;
            }

            let remaining = self.lifetime.remaining();
            let accepted = tokio::select! {
                result = tokio::time::timeout(remaining, self.listener.accept()) => result,
                _ = tokio::signal::ctrl_c() => return StopReason::Interrupted,
            };

            let (stream, peer) = match accepted {
                Err(_) => return StopReason::LifetimeExpired,
                Ok(Err(e)) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
                Ok(Ok(pair)) => pair,
            };

            let remaining = self.lifetime.remaining();
            match tokio::time::timeout(remaining, self.handle_connection(stream, peer)).await {
                Err(_) => {
                    warn!(%peer, "Lifetime cap reached mid-exchange, abandoning connection");
                    return StopReason::LifetimeExpired;
                }
                Ok(Err(e)) => {
                    metrics::record_command_error();
                    warn!(
                        %peer,
                        category = %e.category(),
                        error = %e,
                        "Connection abandoned"
                    );
                }
                Ok(Ok(())) => {}
            }
        }
    }

    async fn handle_connection(&mut self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut conn = Connection::new(stream);
        let Request { command, worker } = conn.read_request().await?;
        metrics::record_command(command.token());
        debug!(%peer, %command, worker, "Command received");

        match command {
            Command::Identity => self.state.record_identity(&worker),
            Command::Quit => self.state.request_quit(&worker),
            Command::Fetch => {
                let records = self.state.fetch_legacy();
                conn.write_lines(&records).await?;
            }
            Command::Fetch2 => {
                let reply = self.state.prepare_fetch2();
                conn.write_message(&reply).await?;
                self.state.complete_fetch2();
            }
            Command::Sync => {
                let payload: SyncPayload<B> = conn.read_message().await?;
                self.state.apply_legacy_sync(&worker, payload);
            }
            Command::Sync2 => {
                let payload: Sync2Payload<B> = conn.read_message().await?;
                self.state.apply_sync(&worker, payload)?;
            }
            Command::Sync3 => {
                let payload: Sync3Payload<B> = conn.read_message().await?;
                self.state.apply_sync(&worker, payload)?;
            }
            Command::Merge => {
                conn.write_message(self.state.book()).await?;
                info!(worker, positions = self.state.book().position_count(), "Master book sent");
            }
        }
        Ok(())
    }
}
