//! Request Limits
//!
//! Two independent gates sit in front of command execution:
//!
//! ```text
//!   accepted connection
//!          │
//!          ▼
//!   ┌──────────────────────┐
//!   │ AdmissionController  │   at most `max_connections` handlers at once
//!   └──────────┬───────────┘
//!              │  (per request)
//!              ▼
//!   ┌──────────────────────┐
//!   │ TokenBucket          │   global request rate, whole-second refill
//!   └──────────┬───────────┘
//!              ▼
//!        read + dispatch
//! ```

pub mod admission;
pub mod rate_limiter;

pub use admission::{
    AdmissionClosed, AdmissionMode, AdmissionController, AdmissionPermit, DEFAULT_MAX_CONNECTIONS,
};
pub use rate_limiter::{TokenBucket, REFILL_INTERVAL};
