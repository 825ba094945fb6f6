//! Shared Server Context
//!
//! Everything the connection handlers share lives in one value, built once
//! at startup and handed out as `Arc<ServerContext>`. Mutable parts are
//! individually synchronized: the token bucket and buffer pool behind their
//! own mutexes, admission behind a semaphore, statistics as atomics.

use crate::config::ServerConfig;
use crate::connection::{BufferPool, ConnectionStats};
use crate::dispatch::{CommandDispatcher, Whitelist};
use crate::limits::{AdmissionController, TokenBucket};
use std::sync::Arc;

/// Process-wide state shared by the listener and every handler.
#[derive(Debug)]
pub struct ServerContext {
    /// Startup configuration (read-only)
    pub config: ServerConfig,
    /// Global request rate limiter
    pub rate_limiter: TokenBucket,
    /// Caps concurrently admitted connections
    pub admission: AdmissionController,
    /// Read buffers recycled across connections
    pub buffer_pool: Arc<BufferPool>,
    /// Whitelist check and process invocation
    pub dispatcher: CommandDispatcher,
    /// Connection and command counters
    pub stats: ConnectionStats,
}

impl ServerContext {
    /// Builds the context from a configuration. The configuration is taken
    /// as-is; validate it first.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let limits = &config.limits;
        let rate_limiter = TokenBucket::new(limits.bucket_capacity, limits.refill_per_second);
        let admission = AdmissionController::new(limits.max_connections);
        let buffer_pool = BufferPool::new(limits.buffer_size, limits.max_idle_buffers);

        let whitelist = Whitelist::new(config.dispatch.whitelist.iter().cloned());
        let dispatcher = CommandDispatcher::new(whitelist, config.dispatch.executable.clone());

        Arc::new(Self {
            config,
            rate_limiter,
            admission,
            buffer_pool,
            dispatcher,
            stats: ConnectionStats::new(),
        })
    }
}
