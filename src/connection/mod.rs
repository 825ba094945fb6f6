//! Connection Handling
//!
//! Each admitted client connection is served by its own async task.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server module)                          │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ admission permit + accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐           │
//! │  │ Rate gate  │──>│ Read bytes │──>│ Dispatch   │           │
//! │  └────────────┘   └────────────┘   └─────┬──────┘           │
//! │        ▲                                 │                  │
//! │        │          ┌────────────┐         │                  │
//! │        └──────────│ Send resp  │<────────┘                  │
//! │                   └────────────┘                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - `handler`: the per-connection state machine and statistics
//! - `pool`: reusable fixed-size read buffers

pub mod handler;
pub mod pool;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionState, ConnectionStats,
};
pub use pool::{BufferPool, PoolStats, PooledBuffer, DEFAULT_BUFFER_SIZE};
