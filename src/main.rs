//! hostmqtt - Main Entry Point
//!
//! Loads the configuration, connects the MQTT session and serves host metric
//! requests until a shutdown signal arrives.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use hostmqtt::config::{BridgeConfig, ConfigError};
use hostmqtt::dispatch::{DispatchOutcome, DispatchSettings, TaskDispatcher};
use hostmqtt::error::BridgeResult;
use hostmqtt::observability::init_default_logging;
use hostmqtt::protocol::PublishCommand;
use hostmqtt::resolver::SystemResolver;
use hostmqtt::transport::mqtt::Session;
use hostmqtt::transport::{MqttError, Publisher};
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal;
use tracing::{error, info, warn};

/// Default configuration locations, searched in order
const DEFAULT_CONFIG_PATHS: &[&str] = &["hostmqtt.toml", "config/hostmqtt.toml"];

/// Publish host metrics over MQTT on request
#[derive(Parser)]
#[command(name = "hostmqtt")]
#[command(about = "Publish host metrics over MQTT on request")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and answer requests
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Resolve one task locally and print what would be published
    Query {
        /// Task name, e.g. `virtual_memory/*`
        task: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    info!("Starting hostmqtt v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Query { task } => handle_query_command(config, &task).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return BridgeConfig::load_from_file(path);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return BridgeConfig::load_from_file(path);
        }
    }

    Err(ConfigError::InvalidConfig(format!(
        "No configuration file found in {}; pass one with -c/--config",
        DEFAULT_CONFIG_PATHS.join(", ")
    )))
}

async fn run_bridge(config: BridgeConfig) -> BridgeResult<()> {
    let resolver = SystemResolver::with_wildcard(config.topics.wildcard);
    let dispatcher = TaskDispatcher::new(resolver, DispatchSettings::from_config(&config));

    let host = config.mqtt.broker_host.clone();
    let port = config.mqtt.broker_port;
    let username = config.get_mqtt_username().unwrap_or_default();
    let password = config.get_mqtt_password();

    let (mut session, events) = Session::new(config)?;
    session.connect(&host, port, &username, password.as_deref())?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Waiting for requests on MQTT...");

    tokio::select! {
        _ = session.run(events, dispatcher) => {
            warn!("Session event loop ended");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }

    Ok(())
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> BridgeResult<()> {
    if show {
        match toml::to_string_pretty(config) {
            Ok(rendered) => {
                println!("Current configuration:");
                println!("{rendered}");
            }
            Err(e) => warn!("Could not render configuration: {}", e),
        }
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Prints each publish as `topic payload`
struct StdoutPublisher;

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, command: PublishCommand) -> Result<(), MqttError> {
        println!("{} {}", command.topic, command.payload);
        Ok(())
    }
}

async fn handle_query_command(config: BridgeConfig, task: &str) -> BridgeResult<()> {
    let settings = DispatchSettings::from_config(&config);
    let request_topic = format!("{}{}", settings.request_prefix, task);
    let resolver = SystemResolver::with_wildcard(config.topics.wildcard);
    let dispatcher = TaskDispatcher::new(resolver, settings);

    match dispatcher.dispatch(&request_topic, &[], &StdoutPublisher).await {
        DispatchOutcome::Ignored => warn!("Nothing to resolve for '{}'", task),
        DispatchOutcome::Published(count) => info!("Resolved '{}' into {} value(s)", task, count),
        DispatchOutcome::ErrorReported => warn!("Task '{}' failed", task),
    }
    Ok(())
}
