//! Response Payloads
//!
//! Responses carry no status code or length prefix. A successful command
//! returns the executable's raw stdout; the two failure cases are fixed
//! text lines.

use bytes::Bytes;

/// Sent when an internal dispatch failure occurs.
pub const EXECUTION_ERROR: &[u8] = b"command execution error\n";

/// Builds the rejection line for a command that is not whitelisted.
///
/// ```
/// use shellgate::protocol::response::not_permitted;
///
/// assert_eq!(&not_permitted("rm")[..], b"command rm not permitted\n");
/// ```
pub fn not_permitted(name: &str) -> Bytes {
    Bytes::from(format!("command {} not permitted\n", name))
}

/// The execution failure line as an owned payload.
pub fn execution_error() -> Bytes {
    Bytes::from_static(EXECUTION_ERROR)
}
