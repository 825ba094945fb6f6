//! Logging Setup
//!
//! All components log through `tracing` macros with structured fields.
//! This module installs the global subscriber:
//!
//! ```text
//!   info!(client = %addr, "...")
//!            │
//!            ▼
//!      EnvFilter (config level, RUST_LOG wins)
//!        │                 │
//!        ▼                 ▼
//!   console layer     file layer ── Mutex<File> (append)
//! ```
//!
//! The file writer is a `Mutex<File>`: each event is formatted and written
//! while holding the lock, so lines from concurrent connections never
//! interleave. There is no rotation.

use crate::config::LoggingConfig;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Opens `path` for appending, creating it if needed.
pub fn file_writer(path: &Path) -> std::io::Result<Mutex<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Mutex::new(file))
}

/// Installs the global subscriber described by `config`.
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level '{}'", config.level))?;

    let console_layer = config
        .console
        .then(|| fmt::layer().with_target(false).with_thread_ids(false));

    let file_layer = match &config.file {
        Some(path) => {
            let writer = file_writer(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing::info;

    fn file_subscriber(path: &Path) -> impl tracing::Subscriber + Send + Sync {
        fmt()
            .with_ansi(false)
            .with_target(false)
            .with_writer(file_writer(path).unwrap())
            .finish()
    }

    #[test]
    fn test_file_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        std::fs::write(&path, "existing line\n").unwrap();

        tracing::subscriber::with_default(file_subscriber(&path), || {
            info!(client = "127.0.0.1:5000", "Client connected");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "existing line");
        assert!(lines[1].contains("Client connected"));
        assert!(lines[1].contains("127.0.0.1:5000"));
    }

    #[test]
    fn test_concurrent_lines_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        let subscriber = Arc::new(file_subscriber(&path));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let subscriber = Arc::clone(&subscriber);
            handles.push(std::thread::spawn(move || {
                tracing::subscriber::with_default(subscriber, || {
                    for seq in 0..50 {
                        info!(worker, seq, "Unauthorized command attempt");
                    }
                });
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 400);
        for line in lines {
            assert!(line.contains("Unauthorized command attempt"), "{line}");
            assert_eq!(line.matches("worker=").count(), 1, "{line}");
        }
    }

    #[test]
    fn test_init_rejects_unwritable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "info".into(),
            file: Some(dir.path().join("missing-dir").join("server.log")),
            console: false,
        };

        assert!(init(&config).is_err());
    }
}
