//! TCP Listener
//!
//! The accept loop is a single sequential loop. It never waits on rate
//! limits or command execution; depending on [`AdmissionMode`] it either
//! takes an admission slot before accepting (excess clients stay in the
//! kernel's listen backlog) or spawns a task per connection that waits for
//! a slot itself.

use crate::connection::handle_connection;
use crate::limits::{AdmissionClosed, AdmissionMode, AdmissionPermit};
use crate::server::ServerContext;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

/// A bound listener plus the shared context.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    /// Binds the configured address.
    pub async fn bind(ctx: Arc<ServerContext>) -> io::Result<Self> {
        let listener = TcpListener::bind(ctx.config.bind_address()).await?;
        Ok(Self { listener, ctx })
    }

    /// Wraps an already bound listener.
    pub fn from_listener(listener: TcpListener, ctx: Arc<ServerContext>) -> Self {
        Self { listener, ctx }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Runs the accept loop. Only returns if admission is shut down.
    pub async fn run(self) -> Result<(), AdmissionClosed> {
        let mode = self.ctx.config.connection.admission_mode;
        info!(
            max_connections = self.ctx.admission.max(),
            ?mode,
            "Accepting connections"
        );

        loop {
            let permit = match mode {
                AdmissionMode::Accept => Some(self.ctx.admission.acquire().await?),
                AdmissionMode::Handler => None,
            };

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    self.ctx.stats.connection_accepted();
                    info!(client = %addr, "Client connected");
                    spawn_handler(stream, addr, permit, Arc::clone(&self.ctx));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Spawns the handler task, acquiring a slot inside the task when the
/// listener did not.
fn spawn_handler(
    stream: TcpStream,
    addr: SocketAddr,
    permit: Option<AdmissionPermit>,
    ctx: Arc<ServerContext>,
) {
    tokio::spawn(async move {
        let permit = match permit {
            Some(permit) => permit,
            None => {
                ctx.stats.admission_wait_started();
                let acquired = ctx.admission.acquire().await;
                ctx.stats.admission_wait_finished();
                match acquired {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(client = %addr, error = %e, "Connection not admitted");
                        return;
                    }
                }
            }
        };

        handle_connection(stream, addr, permit, ctx).await;
    });
}
