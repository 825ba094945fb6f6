//! Command Dispatch
//!
//! Whitelist check plus external process invocation.
//!
//! - `whitelist`: the immutable set of permitted command names
//! - `dispatcher`: runs permitted commands and formats the response

pub mod dispatcher;
pub mod whitelist;

pub use dispatcher::{
    CommandDispatcher, DispatchError, DispatchOutcome, ExecFailurePolicy, DEFAULT_EXECUTABLE,
};
pub use whitelist::{Whitelist, DEFAULT_COMMANDS};
