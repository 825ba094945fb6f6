//! Wire Protocol
//!
//! Plain text over a stream socket.
//!
//! ```text
//! client ──> "getpath /tmp"                  (one command line)
//! server <── <stdout of ./shell getpath /tmp> (success)
//!        <── "command rm not permitted\n"    (not whitelisted)
//!        <── "command execution error\n"     (executable failed)
//! ```
//!
//! - `request`: command line parsing and the optional line framer
//! - `response`: fixed response payloads

pub mod request;
pub mod response;

pub use request::{CommandInvocation, FrameError, Framing, LineFramer};
