//! Connection Handler
//!
//! One handler task per admitted client connection. The handler owns an
//! admission permit and a pooled read buffer for its whole lifetime and
//! runs requests strictly one after another.
//!
//! ## State Machine
//!
//! ```text
//!   Admitted
//!      │
//!      ▼
//!   RateGating ──timeout──────────────────────────┐
//!      │ token                                    │
//!      ▼                                          │
//!   Reading ────EOF / read error──────────────────┤
//!      │ bytes             (empty line: back      │
//!      ▼                    to RateGating)        │
//!   Dispatching                                   │
//!      │ payload                                  │
//!      ▼                                          │
//!   Responding ──write error / exec failure ──────┤
//!      │          (with on_exec_failure=close)    │
//!      └──> RateGating                            ▼
//!                                              Closed
//! ```
//!
//! Entering `Closed` drops the handler: the buffer goes back to the pool,
//! the admission slot is freed and the socket is closed, on every path.

use crate::connection::pool::PooledBuffer;
use crate::dispatch::{DispatchOutcome, ExecFailurePolicy};
use crate::limits::AdmissionPermit;
use crate::protocol::{CommandInvocation, FrameError, Framing, LineFramer};
use crate::server::ServerContext;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Connections accepted but still waiting for an admission slot
    pub waiting_for_admission: AtomicU64,
    /// Currently admitted connections
    pub active_connections: AtomicU64,
    /// Commands that ran successfully
    pub commands_executed: AtomicU64,
    /// Commands refused by the whitelist
    pub commands_rejected: AtomicU64,
    /// Commands whose execution failed
    pub commands_failed: AtomicU64,
    /// Connections dropped because no token arrived in time
    pub rate_limited: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admission_wait_started(&self) {
        self.waiting_for_admission.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admission_wait_finished(&self) {
        self.waiting_for_admission.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_dispatched(&self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Output(_) => &self.commands_executed,
            DispatchOutcome::Rejected(_) => &self.commands_rejected,
            DispatchOutcome::Failed(_) => &self.commands_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Where a handler is in its request loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Admitted,
    RateGating,
    Reading,
    Dispatching,
    Responding,
    Closed,
}

/// Errors that end a connection. None of them affect other connections.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// No rate-limit token became available before the wait timeout
    #[error("Rate limit wait timed out")]
    RateLimited,

    /// A pending line exceeded the configured maximum (line framing only)
    #[error("Line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },

    /// The command failed and the policy is to close afterwards
    #[error("Command execution failed")]
    ExecutionFailed,
}

impl From<FrameError> for ConnectionError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::LineTooLong { size, max } => ConnectionError::LineTooLong { size, max },
        }
    }
}

/// Handles a single client connection.
///
/// Generic over the stream so tests can drive it with in-memory mocks.
pub struct ConnectionHandler<S> {
    /// The client stream
    stream: S,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Shared server state
    ctx: Arc<ServerContext>,

    /// Read buffer checked out for the lifetime of the connection
    buffer: PooledBuffer,

    /// Present in line framing mode
    framer: Option<LineFramer>,

    state: ConnectionState,

    /// Held until the handler is dropped
    _permit: AdmissionPermit,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a handler for an admitted connection.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        permit: AdmissionPermit,
        ctx: Arc<ServerContext>,
    ) -> Self {
        ctx.stats.connection_opened();

        let buffer = ctx.buffer_pool.get();
        let framer = match ctx.config.connection.framing {
            Framing::Read => None,
            Framing::Line => Some(LineFramer::new(ctx.config.connection.max_line_length)),
        };

        Self {
            stream,
            addr,
            ctx,
            buffer,
            framer,
            state: ConnectionState::Admitted,
            _permit: permit,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the request loop until the connection closes.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Connection admitted");

        let result = self.main_loop().await;
        self.transition(ConnectionState::Closed);

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                ConnectionError::RateLimited => {
                    warn!(client = %self.addr, "Rate limit wait timed out, dropping connection")
                }
                ConnectionError::ExecutionFailed => {
                    info!(client = %self.addr, "Closing connection after execution failure")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.ctx.stats.connection_closed();
        result
    }

    /// The gate-read-dispatch-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.rate_gate().await?;

            let command = match self.next_request().await? {
                Some(command) => command,
                None => {
                    trace!(client = %self.addr, "Empty request ignored");
                    continue;
                }
            };

            self.dispatch_and_respond(command).await?;
        }
    }

    /// Waits for a rate-limit token.
    async fn rate_gate(&mut self) -> Result<(), ConnectionError> {
        self.transition(ConnectionState::RateGating);

        let limits = &self.ctx.config.limits;
        let admitted = self
            .ctx
            .rate_limiter
            .wait_for_token(limits.rate_poll_interval(), limits.rate_wait_timeout())
            .await;

        if !admitted {
            self.ctx.stats.rate_limited();
            return Err(ConnectionError::RateLimited);
        }
        Ok(())
    }

    /// Reads the next request and parses it. `None` means it was blank.
    async fn next_request(&mut self) -> Result<Option<CommandInvocation>, ConnectionError> {
        if self.framer.is_some() {
            let line = self.next_line().await?;
            return Ok(CommandInvocation::parse(&line));
        }

        let n = self.read_once().await?;
        Ok(CommandInvocation::parse(&self.buffer[..n]))
    }

    /// Returns the next complete line, reading more data as needed.
    async fn next_line(&mut self) -> Result<Bytes, ConnectionError> {
        loop {
            if let Some(framer) = self.framer.as_mut() {
                if let Some(line) = framer.next_line()? {
                    return Ok(line);
                }
            }

            let n = self.read_once().await?;
            if let Some(framer) = self.framer.as_mut() {
                framer.extend(&self.buffer[..n]);
            }
        }
    }

    /// One read into the pooled buffer.
    async fn read_once(&mut self) -> Result<usize, ConnectionError> {
        self.transition(ConnectionState::Reading);

        let n = self.stream.read(&mut self.buffer[..]).await?;
        if n == 0 {
            return Err(ConnectionError::ClientDisconnected);
        }

        self.ctx.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(n)
    }

    async fn dispatch_and_respond(
        &mut self,
        command: CommandInvocation,
    ) -> Result<(), ConnectionError> {
        self.transition(ConnectionState::Dispatching);
        debug!(client = %self.addr, command = %command.name, "Dispatching command");

        let outcome = self.ctx.dispatcher.dispatch(&command).await;
        self.ctx.stats.command_dispatched(&outcome);

        self.transition(ConnectionState::Responding);
        self.send_response(outcome.payload()).await?;

        if outcome.is_failure()
            && self.ctx.config.dispatch.on_exec_failure == ExecFailurePolicy::Close
        {
            return Err(ConnectionError::ExecutionFailed);
        }
        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, payload: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        self.ctx.stats.bytes_written(payload.len());
        trace!(
            client = %self.addr,
            bytes = payload.len(),
            "Sent response"
        );
        Ok(())
    }

    fn transition(&mut self, next: ConnectionState) {
        trace!(client = %self.addr, from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }
}

/// Handles an admitted client connection.
///
/// Creates a [`ConnectionHandler`] and runs it to completion. Errors are
/// connection-scoped and only logged.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    permit: AdmissionPermit,
    ctx: Arc<ServerContext>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, permit, ctx);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
