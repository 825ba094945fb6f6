//! Request Parsing and Framing
//!
//! A request is a whitespace-separated command line: the first token is the
//! command name, the rest are its arguments. No terminator is required.
//!
//! ## Framing
//!
//! The wire format itself has no framing. Two modes are supported:
//!
//! - [`Framing::Read`]: every successful socket read is one command line.
//!   A line split across TCP segments arrives truncated and back-to-back
//!   lines may be merged. This is what existing clients expect.
//! - [`Framing::Line`]: bytes are accumulated and every `\n`-terminated line
//!   is one command line. Partial lines wait for more data.

use bytes::{Buf, Bytes, BytesMut};
use serde::Deserialize;
use thiserror::Error;

/// How command lines are delimited on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One read call yields one command line
    #[default]
    Read,
    /// Newline-delimited command lines
    Line,
}

/// A parsed command line. Lives for a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// The command name (first token)
    pub name: String,
    /// Remaining tokens, in order
    pub args: Vec<String>,
}

impl CommandInvocation {
    /// Parses raw bytes into a command.
    ///
    /// Returns `None` when the input holds no tokens (empty or all
    /// whitespace). Invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Example
    ///
    /// ```
    /// use shellgate::protocol::CommandInvocation;
    ///
    /// let cmd = CommandInvocation::parse(b"  getpath  /tmp \r\n").unwrap();
    /// assert_eq!(cmd.name, "getpath");
    /// assert_eq!(cmd.args, vec!["/tmp".to_string()]);
    ///
    /// assert!(CommandInvocation::parse(b" \n ").is_none());
    /// ```
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(raw);
        let mut tokens = text.split_whitespace().map(str::to_owned);

        let name = tokens.next()?;
        Some(Self {
            name,
            args: tokens.collect(),
        })
    }

    /// The full argument vector handed to the executable: name, then args.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

/// Errors raised by the line framer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A line grew past the configured limit without a terminator
    #[error("line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Accumulates bytes and splits them into `\n`-terminated lines.
#[derive(Debug)]
pub struct LineFramer {
    pending: BytesMut,
    max_line_length: usize,
}

impl LineFramer {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(1024),
            max_line_length,
        }
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Pops the next complete line, without its terminator.
    ///
    /// Returns `Ok(None)` when only a partial line (or nothing) is buffered.
    pub fn next_line(&mut self) -> Result<Option<Bytes>, FrameError> {
        match self.pending.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if pos > self.max_line_length {
                    return Err(FrameError::LineTooLong {
                        size: pos,
                        max: self.max_line_length,
                    });
                }
                let line = self.pending.split_to(pos).freeze();
                self.pending.advance(1);
                Ok(Some(line))
            }
            None if self.pending.len() > self.max_line_length => Err(FrameError::LineTooLong {
                size: self.pending.len(),
                max: self.max_line_length,
            }),
            None => Ok(None),
        }
    }

    /// Bytes buffered but not yet returned as a line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
