//! Tipimate entry point.
//!
//! Watches a Runtipi server for app updates and sends a Discord, Ntfy or
//! Gotify notification when one shows up.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::error;
use serde::Serialize;

use tipimate::config::{CheckConfig, LogLevel, ServerConfig};
use tipimate::{check, server};

#[derive(Parser)]
#[command(name = "tipimate")]
#[command(about = "App update notifications for your Runtipi server", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TIPIMATE_CONFIG", default_value = "tipimate.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check for updates on your Runtipi server
    Check(CheckArgs),
    /// Watch your Runtipi server and send a notification for every update
    Server(ServerArgs),
    /// Print the version number
    Version,
}

// Only flags that were actually given are serialized, so they override the
// config file and environment without clobbering them with defaults.
#[derive(Args, Serialize)]
struct CheckArgs {
    /// Runtipi server URL
    #[arg(long, env = "RUNTIPI_URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    runtipi_url: Option<String>,

    /// Runtipi JWT secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    jwt_secret: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "INSECURE", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    insecure: Option<bool>,

    #[arg(long, env = "LOG_LEVEL", value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<LogLevel>,
}

#[derive(Args, Serialize)]
struct ServerArgs {
    /// Notification URL (discord://, ntfy:// or gotify://)
    #[arg(long, env = "NOTIFICATION_URL", hide_env_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<String>,

    /// Runtipi server URL, used for links in notifications
    #[arg(long, env = "RUNTIPI_URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    runtipi_url: Option<String>,

    /// Runtipi URL used for API calls (when running on the same host)
    #[arg(long, env = "RUNTIPI_INTERNAL_URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    runtipi_internal_url: Option<String>,

    /// Runtipi JWT secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    jwt_secret: Option<String>,

    /// Database path
    #[arg(long, env = "DATABASE_PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    database_path: Option<PathBuf>,

    /// Minutes between checks
    #[arg(short, long, env = "INTERVAL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<u64>,

    #[arg(long, env = "LOG_LEVEL", value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<LogLevel>,

    /// Use plain HTTP for Ntfy/Gotify and skip TLS verification for Runtipi
    #[arg(long, env = "INSECURE", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    insecure: Option<bool>,

    /// Server name shown in notification titles
    #[arg(long, env = "SERVER_NAME")]
    #[serde(skip_serializing_if = "Option::is_none")]
    server_name: Option<String>,
}

fn init_logging(level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(level.as_filter())
        .parse_default_env()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("Tipimate {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Command::Check(args) => {
            let result = match CheckConfig::load(&cli.config, &args) {
                Ok(config) => {
                    init_logging(config.log_level);
                    check::run(&config).await
                }
                Err(e) => Err(anyhow::anyhow!("Invalid config: {}", e)),
            };
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("{} {:#}", "✘".red(), e);
                    ExitCode::FAILURE
                }
            }
        }
        Command::Server(args) => {
            let config = match ServerConfig::load(&cli.config, &args) {
                Ok(config) => config,
                Err(e) => {
                    init_logging(LogLevel::Info);
                    error!("Invalid config: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            init_logging(config.log_level);

            match server::run(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{:#}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
