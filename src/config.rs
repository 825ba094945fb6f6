//! Configuration
//!
//! Server and client settings are read once at startup from TOML files.
//!
//! ```toml
//! [socket]
//! ipaddress = "127.0.0.1"
//! port = 9000
//!
//! [limits]
//! bucket_capacity = 10
//! refill_per_second = 5
//! max_connections = 100
//!
//! [dispatch]
//! executable = "./shell"
//! whitelist = ["getpath", "readIPaddress", "ViewOnline"]
//! ```
//!
//! Only `[socket]` is required; every other section falls back to defaults.
//! A `[logging]` section without `file` still logs to the binary's default
//! file (`./server.log` or `./client_error.log`); `file = ""` disables it.
//! A missing or empty address, or a zero port, is a startup error.

use crate::connection::pool::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_IDLE};
use crate::dispatch::{ExecFailurePolicy, DEFAULT_COMMANDS, DEFAULT_EXECUTABLE};
use crate::limits::{AdmissionMode, DEFAULT_MAX_CONNECTIONS};
use crate::protocol::Framing;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default server configuration file.
pub const DEFAULT_SERVER_CONFIG: &str = "./Server.toml";

/// Default client configuration file.
pub const DEFAULT_CLIENT_CONFIG: &str = "./Client.toml";

/// Upper bound for `rate_wait_timeout_secs` (one day).
pub const MAX_RATE_WAIT_TIMEOUT_SECS: u64 = 24 * 60 * 60;

const SERVER_LOG_FILE: &str = "./server.log";
const CLIENT_LOG_FILE: &str = "./client_error.log";

/// Errors raised while loading configuration. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("listen address is missing or empty")]
    MissingAddress,

    #[error("listen port is missing or zero")]
    MissingPort,

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Listen (or connect) endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SocketConfig {
    #[serde(default)]
    pub ipaddress: String,
    #[serde(default)]
    pub port: u16,
}

impl SocketConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ipaddress.trim().is_empty() {
            return Err(ConfigError::MissingAddress);
        }
        if self.port == 0 {
            return Err(ConfigError::MissingPort);
        }
        Ok(())
    }

    /// `host:port`, as passed to bind/connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ipaddress.trim(), self.port)
    }
}

/// Rate limiting, admission and buffer sizes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum tokens in the global bucket
    pub bucket_capacity: u64,
    /// Tokens credited per whole elapsed second
    pub refill_per_second: u64,
    /// Concurrently admitted connections
    pub max_connections: usize,
    /// How long a request waits for a token before the connection is dropped
    pub rate_wait_timeout_secs: u64,
    /// Retry interval while waiting for a token
    pub rate_poll_interval_ms: u64,
    /// Size of each pooled read buffer
    pub buffer_size: usize,
    /// Idle buffers retained by the pool
    pub max_idle_buffers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: 10,
            refill_per_second: 5,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            rate_wait_timeout_secs: 5,
            rate_poll_interval_ms: 1000,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_idle_buffers: DEFAULT_MAX_IDLE,
        }
    }
}

impl LimitsConfig {
    pub fn rate_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.rate_wait_timeout_secs)
    }

    pub fn rate_poll_interval(&self) -> Duration {
        Duration::from_millis(self.rate_poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_capacity == 0 {
            return Err(ConfigError::Invalid("bucket_capacity cannot be 0".into()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections cannot be 0".into()));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size cannot be 0".into()));
        }
        if self.rate_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "rate_poll_interval_ms cannot be 0".into(),
            ));
        }
        if self.rate_wait_timeout_secs > MAX_RATE_WAIT_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "rate_wait_timeout_secs cannot exceed {}",
                MAX_RATE_WAIT_TIMEOUT_SECS
            )));
        }
        Ok(())
    }
}

/// Whitelist and executable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub executable: PathBuf,
    pub whitelist: Vec<String>,
    pub on_exec_failure: ExecFailurePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            whitelist: DEFAULT_COMMANDS.iter().map(|s| s.to_string()).collect(),
            on_exec_failure: ExecFailurePolicy::default(),
        }
    }
}

/// Per-connection behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub framing: Framing,
    pub admission_mode: AdmissionMode,
    /// Longest pending line accepted in line framing mode
    pub max_line_length: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            admission_mode: AdmissionMode::default(),
            max_line_length: 64 * 1024,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level; `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Append-only log file. Left out, it defaults per binary; `file = ""`
    /// turns file logging off.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Also log to stdout
    #[serde(default = "default_true")]
    pub console: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_server_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        file: Some(PathBuf::from(SERVER_LOG_FILE)),
        console: true,
    }
}

fn default_client_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        file: Some(PathBuf::from(CLIENT_LOG_FILE)),
        console: false,
    }
}

impl LoggingConfig {
    /// Fills in `default` when no file was given; an empty path disables it.
    fn resolve_file(&mut self, default: &str) {
        self.file = match self.file.take() {
            None => Some(PathBuf::from(default)),
            Some(path) if path.as_os_str().is_empty() => None,
            Some(path) => Some(path),
        };
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "invalid log level '{}', must be one of: {}",
                self.level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default = "default_server_logging")]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Loads and validates a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = read_file(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: ServerConfig = toml::from_str(content)?;
        config.logging.resolve_file(SERVER_LOG_FILE);
        config.validate()?;
        Ok(config)
    }

    /// A loopback configuration on `port` with default limits.
    pub fn local(port: u16) -> Self {
        Self {
            socket: SocketConfig {
                ipaddress: "127.0.0.1".to_string(),
                port,
            },
            limits: LimitsConfig::default(),
            dispatch: DispatchConfig::default(),
            connection: ConnectionConfig::default(),
            logging: default_server_logging(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket.validate()?;
        self.limits.validate()?;
        self.logging.validate()?;

        if self.dispatch.executable.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("executable cannot be empty".into()));
        }
        if self.connection.max_line_length == 0 {
            return Err(ConfigError::Invalid("max_line_length cannot be 0".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        self.socket.address()
    }
}

/// Client endpoint plus connect timeout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientSocketConfig {
    #[serde(flatten)]
    pub endpoint: SocketConfig,
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u64,
}

fn default_client_timeout() -> u64 {
    5
}

/// Complete client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub socket: ClientSocketConfig,
    #[serde(default = "default_client_logging")]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = read_file(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: ClientConfig = toml::from_str(content)?;
        config.logging.resolve_file(CLIENT_LOG_FILE);
        config.socket.endpoint.validate()?;
        config.logging.validate()?;
        Ok(config)
    }

    pub fn server_address(&self) -> String {
        self.socket.endpoint.address()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.socket.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
        [socket]
        ipaddress = "0.0.0.0"
        port = 9000

        [limits]
        bucket_capacity = 5
        refill_per_second = 1
        max_connections = 10
        rate_wait_timeout_secs = 8
        rate_poll_interval_ms = 250
        buffer_size = 4096

        [dispatch]
        executable = "/opt/shell"
        whitelist = ["ls"]
        on_exec_failure = "continue"

        [connection]
        framing = "line"
        admission_mode = "handler"
        max_line_length = 128

        [logging]
        level = "debug"
        file = "/tmp/shellgate.log"
        console = false
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = ServerConfig::from_toml_str(FULL).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.limits.bucket_capacity, 5);
        assert_eq!(config.limits.refill_per_second, 1);
        assert_eq!(config.limits.max_connections, 10);
        assert_eq!(config.limits.rate_wait_timeout(), Duration::from_secs(8));
        assert_eq!(config.limits.rate_poll_interval(), Duration::from_millis(250));
        assert_eq!(config.limits.buffer_size, 4096);
        assert_eq!(config.dispatch.executable, PathBuf::from("/opt/shell"));
        assert_eq!(config.dispatch.whitelist, vec!["ls"]);
        assert_eq!(config.dispatch.on_exec_failure, ExecFailurePolicy::Continue);
        assert_eq!(config.connection.framing, Framing::Line);
        assert_eq!(config.connection.admission_mode, AdmissionMode::Handler);
        assert_eq!(config.connection.max_line_length, 128);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.console);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = ServerConfig::from_toml_str(
            r#"
            [socket]
            ipaddress = "127.0.0.1"
            port = 7000
            "#,
        )
        .unwrap();

        assert_eq!(config.limits.max_connections, 100);
        assert_eq!(config.limits.buffer_size, 2048);
        assert_eq!(config.limits.rate_wait_timeout(), Duration::from_secs(5));
        assert_eq!(config.limits.rate_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.dispatch.executable, PathBuf::from("./shell"));
        assert_eq!(config.dispatch.whitelist.len(), 3);
        assert_eq!(config.dispatch.on_exec_failure, ExecFailurePolicy::Close);
        assert_eq!(config.connection.framing, Framing::Read);
        assert_eq!(config.connection.admission_mode, AdmissionMode::Accept);
        assert_eq!(config.logging.file, Some(PathBuf::from("./server.log")));
    }

    #[test]
    fn test_missing_address_is_fatal() {
        let err = ServerConfig::from_toml_str("[socket]\nport = 9000\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingAddress));

        let err =
            ServerConfig::from_toml_str("[socket]\nipaddress = \"  \"\nport = 9000\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingAddress));
    }

    #[test]
    fn test_missing_port_is_fatal() {
        let err = ServerConfig::from_toml_str("[socket]\nipaddress = \"127.0.0.1\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingPort));
    }

    #[test]
    fn test_empty_file_is_fatal() {
        assert!(matches!(
            ServerConfig::from_toml_str("").unwrap_err(),
            ConfigError::MissingAddress
        ));
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let mut config = ServerConfig::local(9000);
        config.limits.bucket_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ServerConfig::local(9000);
        config.limits.max_connections = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ServerConfig::local(9000);
        config.logging.level = "loud".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_oversized_rate_wait_timeout_rejected() {
        let err = ServerConfig::from_toml_str(
            r#"
            [socket]
            ipaddress = "127.0.0.1"
            port = 9000
            [limits]
            rate_wait_timeout_secs = 9223372036854775807
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut config = ServerConfig::local(9000);
        config.limits.rate_wait_timeout_secs = MAX_RATE_WAIT_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_section_without_file_keeps_default_file() {
        let config = ServerConfig::from_toml_str(
            r#"
            [socket]
            ipaddress = "127.0.0.1"
            port = 9000
            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.file, Some(PathBuf::from("./server.log")));

        let config = ClientConfig::from_toml_str(
            "[socket]\nipaddress = \"127.0.0.1\"\nport = 1\n[logging]\nlevel = \"warn\"\n",
        )
        .unwrap();
        assert_eq!(config.logging.file, Some(PathBuf::from("./client_error.log")));
    }

    #[test]
    fn test_empty_log_file_disables_file_logging() {
        let config = ServerConfig::from_toml_str(
            r#"
            [socket]
            ipaddress = "127.0.0.1"
            port = 9000
            [logging]
            file = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.file, None);
    }

    #[test]
    fn test_unknown_enum_value_is_parse_error() {
        let err = ServerConfig::from_toml_str(
            r#"
            [socket]
            ipaddress = "127.0.0.1"
            port = 9000
            [connection]
            framing = "length-prefixed"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.socket.port, 9000);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::from_file(dir.path().join("Server.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_client_config() {
        let config = ClientConfig::from_toml_str(
            r#"
            [socket]
            ipaddress = "10.0.0.2"
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.server_address(), "10.0.0.2:9000");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.file, Some(PathBuf::from("./client_error.log")));
        assert!(!config.logging.console);
    }

    #[test]
    fn test_client_config_timeout_and_missing_port() {
        let config = ClientConfig::from_toml_str(
            "[socket]\nipaddress = \"127.0.0.1\"\nport = 1\ntimeout_secs = 2\n",
        )
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(2));

        let err = ClientConfig::from_toml_str("[socket]\nipaddress = \"127.0.0.1\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingPort));
    }
}
