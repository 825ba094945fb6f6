//! One-Shot Client
//!
//! Connects to the server (retrying a few times), sends a single command
//! line and returns the first chunk of the response.

use crate::config::ClientConfig;
use bytes::Bytes;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::warn;

/// Connection attempts before giving up.
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Pause between connection attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Size of the response read.
pub const RESPONSE_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr} after {attempts} attempts: {source}")]
    Connect {
        addr: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("server closed the connection without responding")]
    Closed,
}

/// Connects using the configured address, timeout and retry policy.
///
/// `on_failure` is called with `(attempt, attempts, error)` after every
/// failed attempt.
pub async fn connect<F>(config: &ClientConfig, on_failure: F) -> Result<TcpStream, ClientError>
where
    F: FnMut(u32, u32, &io::Error),
{
    connect_with_retry(
        &config.server_address(),
        config.timeout(),
        CONNECT_ATTEMPTS,
        RETRY_DELAY,
        on_failure,
    )
    .await
}

/// Tries `attempts` times, each bounded by `timeout`, sleeping `delay`
/// between failures.
pub async fn connect_with_retry<F>(
    addr: &str,
    timeout: Duration,
    attempts: u32,
    delay: Duration,
    mut on_failure: F,
) -> Result<TcpStream, ClientError>
where
    F: FnMut(u32, u32, &io::Error),
{
    let mut last_error = io::Error::new(io::ErrorKind::Other, "no connection attempt made");

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
        };

        match result {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                warn!(addr, attempt, attempts, error = %e, "Connection attempt failed");
                on_failure(attempt, attempts, &e);
                last_error = e;
            }
        }

        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    Err(ClientError::Connect {
        addr: addr.to_string(),
        attempts,
        source: last_error,
    })
}

/// Sends `message` and reads one response chunk.
pub async fn send(stream: &mut TcpStream, message: &str) -> Result<Bytes, ClientError> {
    stream.write_all(message.as_bytes()).await?;

    let mut buf = vec![0u8; RESPONSE_BUFFER_SIZE];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(ClientError::Closed);
    }

    buf.truncate(n);
    Ok(Bytes::from(buf))
}
