//! CLI for inspecting gantry capability configuration.
//!
//! Reads the capability document configured via `~/.gantry/config.json` (or
//! the `GANTRY_CAPABILITIES` environment variable) and prints what the
//! harness would resolve, so device matrices can be checked without opening
//! a session.
//!
//! # Usage
//!
//! ```bash
//! # Device names for a platform, in document order
//! gantry devices android
//!
//! # Full resolved capability set for one device
//! gantry resolve android Pixel_4
//! gantry -f json resolve android Pixel_4
//!
//! # A cloud provider's capability block
//! gantry cloud browserstack
//!
//! # Ping the automation server's /status endpoint
//! gantry status
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gantry_core::settings::Settings;
use gantry_core::store;
use gantry_core::transport::WebDriverTransport;
use tracing_subscriber::EnvFilter;

/// CLI for inspecting gantry device capabilities and the automation server.
#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Inspect device capability configuration and the automation server")]
#[command(version)]
struct Cli {
    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List device names declared for a platform, in document order
    Devices {
        /// Platform identifier, e.g. "android" or "ios"
        platform: String,
    },

    /// Resolve the full capability set for a device
    Resolve {
        /// Platform identifier, e.g. "android" or "ios"
        platform: String,
        /// Device name as declared in the capability document
        device: String,
    },

    /// Show a cloud provider's capability block
    Cloud {
        /// Provider name, e.g. "browserstack"
        provider: String,
    },

    /// Query the automation server's status endpoint
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Devices { platform } => {
            let names = store::shared()?.device_names(&platform)?;
            match cli.format {
                OutputFormat::Text => {
                    for name in names {
                        println!("{name}");
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&names)?),
            }
        }
        Command::Resolve { platform, device } => {
            let caps = store::shared()?.resolve_capabilities(&platform, &device)?;
            match cli.format {
                OutputFormat::Text => {
                    for (key, value) in caps.iter() {
                        println!("{key} = {value}");
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&caps)?),
            }
        }
        Command::Cloud { provider } => {
            let caps = store::shared()?.cloud_capabilities(&provider)?;
            match cli.format {
                OutputFormat::Text => {
                    for (key, value) in &caps {
                        println!("{key} = {value}");
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&caps)?),
            }
        }
        Command::Status => {
            let transport = WebDriverTransport::new(Settings::load().server_url())?;
            tracing::debug!(endpoint = transport.base_url(), "querying server status");
            let status = transport.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
