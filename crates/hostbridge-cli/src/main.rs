//! Hostbridge CLI
//!
//! MCP tool server that forwards tool calls to a host application's
//! automation WebSocket. Also offers one-shot subcommands for listing tools
//! and invoking a single tool from the shell.

use clap::{Parser, Subcommand};
use hostbridge_core::config::defaults::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TOOL_PREFIX,
};
use hostbridge_core::config::parse_toggle;
use hostbridge_core::{
    BridgeConfig, CommandGateway, CommandRegistry, EventKind, TracingHandler,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod serve;

/// Hostbridge - MCP tools for a running host application
///
/// Serves MCP over stdio by default. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "hostbridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Host WebSocket address
    #[arg(long, env = "HOSTBRIDGE_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Host WebSocket port
    #[arg(long, env = "HOSTBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Expose suppressed and disabled commands too
    #[arg(
        long,
        env = "HOSTBRIDGE_ENABLE_ALL_TOOLS",
        action = clap::ArgAction::Set,
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = toggle
    )]
    enable_all_tools: bool,

    /// Seconds to wait for the WebSocket handshake
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout: u64,

    /// Seconds to wait for each command response
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,

    /// Prefix prepended to every tool name
    #[arg(long, default_value = DEFAULT_TOOL_PREFIX)]
    tool_prefix: String,

    /// Alternate command catalog (JSON)
    #[arg(long, env = "HOSTBRIDGE_CATALOG")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Run the MCP server over stdio (default)
    Serve,
    /// Print the visible tool list as JSON
    Tools,
    /// Invoke one tool and print its result
    Call {
        /// Tool name, including the prefix
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
    },
}

fn toggle(value: &str) -> Result<bool, String> {
    Ok(parse_toggle(value))
}

impl Args {
    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig::new()
            .with_endpoint(self.host.clone(), self.port)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_request_timeout(Duration::from_secs(self.request_timeout))
            .with_tool_prefix(self.tool_prefix.clone())
            .with_expose_all(self.enable_all_tools)
            .with_catalog_path(self.catalog.clone())
    }
}

fn load_registry(config: &BridgeConfig) -> Result<CommandRegistry, String> {
    let registry = match &config.catalog_path {
        Some(path) => CommandRegistry::from_path(path, config.expose_all),
        None => CommandRegistry::builtin(config.expose_all),
    };
    registry.map_err(|e| format!("Failed to load command catalog: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.bridge_config();

    let registry = match load_registry(&config) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        "Loaded {} commands ({} visible) for host at {}",
        registry.len(),
        registry.visible_commands(false).len(),
        config.endpoint
    );
    if config.expose_all {
        tracing::info!("All commands exposed, including suppressed ones");
    }

    let gateway = Arc::new(CommandGateway::new(Arc::new(registry), config));
    for kind in EventKind::ALL {
        gateway
            .subscribe_each_session(kind.key(), Arc::new(TracingHandler))
            .await;
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => match serve::run_stdio_server(gateway).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
        Command::Tools => match serde_json::to_string_pretty(&gateway.list_tools()) {
            Ok(tools) => {
                println!("{tools}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
        Command::Call { tool, args } => {
            let arguments = match serde_json::from_str::<serde_json::Value>(&args) {
                Ok(arguments) => arguments,
                Err(e) => {
                    eprintln!("Error: invalid JSON arguments: {e}");
                    return ExitCode::FAILURE;
                }
            };
            let result = gateway.call_tool(&tool, arguments).await;
            println!("{}", result.to_pretty_json());
            gateway.disconnect().await;
            if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
