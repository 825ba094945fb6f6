//! shellgate - Rate-Limited Remote Command Execution Server
//!
//! Loads the configuration, sets up logging, binds the listener and runs
//! the accept loop until the process is killed.

use anyhow::Context;
use clap::Parser;
use shellgate::config::{ServerConfig, DEFAULT_SERVER_CONFIG};
use shellgate::server::{Server, ServerContext};
use std::path::PathBuf;
use tracing::info;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "shellgate", version, about = "Rate-limited remote command execution server")]
struct Args {
    /// Path to the server configuration file
    #[arg(short, long, default_value = DEFAULT_SERVER_CONFIG)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
shellgate v{} - Rate-Limited Remote Command Execution
──────────────────────────────────────────────────────
Listening on {}
Executable:  {}
Rate limit:  {} tokens, +{}/s
Max clients: {}
"#,
        shellgate::VERSION,
        config.bind_address(),
        config.dispatch.executable.display(),
        config.limits.bucket_capacity,
        config.limits.refill_per_second,
        config.limits.max_connections,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
        config.validate()?;
    }

    shellgate::logging::init(&config.logging)?;

    print_banner(&config);

    let bind_address = config.bind_address();
    let ctx = ServerContext::new(config);
    info!(
        whitelist = ?ctx.dispatcher.whitelist().sorted(),
        executable = %ctx.dispatcher.executable().display(),
        "Command dispatcher initialized"
    );

    let server = Server::bind(ctx)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    info!("Listening on {}", bind_address);

    server.run().await?;
    Ok(())
}
