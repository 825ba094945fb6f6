//! Token Bucket Rate Limiter
//!
//! A single, process-wide token bucket throttles how fast requests are
//! processed across every connection.
//!
//! ## Refill Model
//!
//! ```text
//!   take() ──> lock ──> elapsed >= 1s? ──yes──> tokens += floor(secs) * rate
//!                           │                    tokens  = min(tokens, capacity)
//!                           │                    last_refill = now
//!                           ▼
//!                      tokens > 0? ──yes──> tokens -= 1, return true
//!                           │
//!                           no ──> return false
//! ```
//!
//! Only whole elapsed seconds are credited. The fractional remainder is
//! dropped when `last_refill` advances, so under irregular call timing the
//! sustained rate can trail the configured one slightly.
//!
//! Refill and consume happen inside one critical section, so two callers
//! can never both spend a token that was only refilled once.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Interval at which whole-second refills are credited.
pub const REFILL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct BucketState {
    /// Current number of tokens (`0..=capacity`)
    tokens: u64,
    /// When tokens were last credited
    last_refill: Instant,
}

/// A global token bucket.
///
/// The bucket starts full. Wrap it in an `Arc` (or embed it in the shared
/// server context) and call [`TokenBucket::take`] once per request.
///
/// # Example
///
/// ```
/// use shellgate::limits::TokenBucket;
///
/// let bucket = TokenBucket::new(2, 1);
/// assert!(bucket.take());
/// assert!(bucket.take());
/// assert!(!bucket.take());
/// ```
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u64,
    refill_per_second: u64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(capacity: u64, refill_per_second: u64) -> Self {
        Self::new_at(capacity, refill_per_second, Instant::now())
    }

    /// Creates a full bucket whose refill clock starts at `now`.
    pub fn new_at(capacity: u64, refill_per_second: u64, now: Instant) -> Self {
        Self {
            capacity,
            refill_per_second,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    /// Tries to consume one token. Returns `true` if a token was consumed.
    pub fn take(&self) -> bool {
        self.take_at(Instant::now())
    }

    /// Same as [`take`](Self::take) with an explicit clock reading.
    pub fn take_at(&self, now: Instant) -> bool {
        let mut state = self.lock_state();

        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed >= REFILL_INTERVAL {
            let credited = elapsed.as_secs().saturating_mul(self.refill_per_second);
            state.tokens = state.tokens.saturating_add(credited).min(self.capacity);
            state.last_refill = now;
            trace!(credited, tokens = state.tokens, "Token bucket refilled");
        }

        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Waits for a token, polling every `poll_interval` until `timeout` elapses.
    ///
    /// Returns `false` if no token became available in time. A timeout too
    /// large to represent as an instant waits without a deadline.
    pub async fn wait_for_token(&self, poll_interval: Duration, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if self.take() {
                return true;
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    poll_interval.min(deadline - now)
                }
                None => poll_interval,
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// Tokens currently in the bucket (no refill is applied).
    pub fn available(&self) -> u64 {
        self.lock_state().tokens
    }

    /// Maximum number of tokens.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tokens credited per whole elapsed second.
    pub fn refill_per_second(&self) -> u64 {
        self.refill_per_second
    }

    fn lock_state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
