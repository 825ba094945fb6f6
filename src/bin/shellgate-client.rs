//! shellgate-client - send one command line and print the response.

use clap::Parser;
use shellgate::client;
use shellgate::config::{ClientConfig, DEFAULT_CLIENT_CONFIG};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "shellgate-client", version, about = "Send a command to a shellgate server")]
struct Args {
    /// Path to the client configuration file
    #[arg(short, long, default_value = DEFAULT_CLIENT_CONFIG)]
    config: PathBuf,

    /// Command line to send, e.g. `readIPaddress`
    message: String,
}

/// Logs to the error log and prints to the terminal.
fn report(msg: &str) {
    error!("{}", msg);
    eprintln!("{}", msg);
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match ClientConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = shellgate::logging::init(&config.logging) {
        eprintln!("Failed to set up logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    let on_failure = |attempt: u32, attempts: u32, e: &std::io::Error| {
        eprintln!("Connection attempt {}/{} failed: {}", attempt, attempts, e);
        if attempt < attempts {
            eprintln!("Retrying in {}s...", client::RETRY_DELAY.as_secs());
        }
    };

    let mut stream = match client::connect(&config, on_failure).await {
        Ok(stream) => stream,
        Err(e) => {
            report(&format!(
                "{}. Check the server address in the config and that the server is running",
                e
            ));
            return ExitCode::FAILURE;
        }
    };

    match client::send(&mut stream, &args.message).await {
        Ok(response) => {
            println!("Server response: {}", String::from_utf8_lossy(&response));
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&format!("Request failed: {}", e));
            ExitCode::FAILURE
        }
    }
}
