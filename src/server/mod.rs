//! Server
//!
//! - `context`: the shared [`ServerContext`] built once at startup
//! - `listener`: the accept loop ([`Server`])
//!
//! ## Example
//!
//! ```ignore
//! use shellgate::config::ServerConfig;
//! use shellgate::server::{Server, ServerContext};
//!
//! let config = ServerConfig::from_file("./Server.toml")?;
//! let ctx = ServerContext::new(config);
//! let server = Server::bind(ctx).await?;
//! server.run().await?;
//! ```

pub mod context;
pub mod listener;

pub use context::ServerContext;
pub use listener::Server;
