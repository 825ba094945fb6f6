//! # shellgate - Rate-Limited Remote Command Execution over TCP
//!
//! shellgate accepts TCP connections, reads whitespace-separated command
//! lines, checks the command name against a whitelist and runs an external
//! executable with the command as its argument vector. The executable's
//! stdout is written back on the same connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              shellgate                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────┐                 │
//! │  │ TCP Server  │───>│  Admission   │───>│ Connection  │                 │
//! │  │ (Listener)  │    │  Controller  │    │  Handler    │                 │
//! │  └─────────────┘    └──────────────┘    └──────┬──────┘                 │
//! │                                                │ per request            │
//! │                          ┌─────────────────────┼─────────────┐          │
//! │                          ▼                     ▼             ▼          │
//! │                   ┌─────────────┐      ┌─────────────┐ ┌──────────┐     │
//! │                   │ TokenBucket │      │  Command    │ │ Buffer   │     │
//! │                   │ (global)    │      │  Dispatcher │ │ Pool     │     │
//! │                   └─────────────┘      └──────┬──────┘ └──────────┘     │
//! │                                               │                         │
//! │                                               ▼                         │
//! │                                     ./shell name args...                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use shellgate::config::ServerConfig;
//! use shellgate::server::{Server, ServerContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_file("./Server.toml")?;
//!     shellgate::logging::init(&config.logging)?;
//!
//!     let ctx = ServerContext::new(config);
//!     let server = Server::bind(ctx).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol
//!
//! - Request: one command line per read (or per `\n` in line framing mode)
//! - Success: the raw stdout of the executable
//! - Not whitelisted: `command <name> not permitted\n`
//! - Execution failure: `command execution error\n`
//!
//! ## Module Overview
//!
//! - [`config`]: TOML configuration for server and client
//! - [`logging`]: console + file tracing subscriber
//! - [`limits`]: token bucket and admission controller
//! - [`protocol`]: request parsing, framing and response literals
//! - [`dispatch`]: whitelist and external process invocation
//! - [`connection`]: per-connection state machine and buffer pool
//! - [`server`]: shared context and accept loop
//! - [`client`]: one-shot client used by `shellgate-client`

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod limits;
pub mod logging;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use connection::{handle_connection, BufferPool, ConnectionHandler, ConnectionStats};
pub use dispatch::{CommandDispatcher, DispatchOutcome, Whitelist};
pub use limits::{AdmissionController, TokenBucket};
pub use protocol::CommandInvocation;
pub use server::{Server, ServerContext};

/// Version of shellgate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
