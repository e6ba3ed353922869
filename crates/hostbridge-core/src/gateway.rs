//! Command Gateway
//!
//! Outward-facing tool surface. Turns registry entries into callable tools,
//! handles the connection meta-tools locally, and converts every outcome
//! (host reply, connectivity failure, usage error) into the uniform
//! [`InvocationResult`] shape. Nothing escapes as a Rust error.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::client::HostClient;
use crate::config::{BridgeConfig, Endpoint};
use crate::dispatcher::EventHandler;
use crate::error::{codes, BridgeError};
use crate::protocol::{ErrorBody, HostReply};
use crate::registry::CommandRegistry;

/// Meta-tool reporting connection status
pub const META_STATUS: &str = "connection_status";
/// Meta-tool opening a connection, optionally to another endpoint
pub const META_CONNECT: &str = "connect";
/// Meta-tool closing the connection
pub const META_DISCONNECT: &str = "disconnect";

/// Uniform result of every gateway operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl InvocationResult {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_error(error: &BridgeError) -> Self {
        Self::failure(ErrorBody::new(error.code(), error.to_string()))
    }

    /// Error code, if this is a failure
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|error| error.code.as_str())
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success": false, "error": {{"code": "{}", "message": "{}"}}}}"#,
                codes::TOOL_ERROR,
                e
            )
        })
    }
}

/// Terminal state of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The host answered (successfully or with a host error)
    Resolved,
    TimedOut,
    ConnectionLost,
    /// Refused before reaching the host
    Rejected,
}

impl InvocationOutcome {
    pub fn of(result: &InvocationResult) -> Self {
        match result.error_code() {
            None => InvocationOutcome::Resolved,
            Some(codes::TIMEOUT) => InvocationOutcome::TimedOut,
            Some(codes::CONNECTION_CLOSED) | Some(codes::SEND_ERROR) => {
                InvocationOutcome::ConnectionLost
            }
            Some(codes::NOT_CONNECTED)
            | Some(codes::CONNECTION_FAILED)
            | Some(codes::UNKNOWN_COMMAND)
            | Some(codes::UNKNOWN_TOOL)
            | Some(codes::INVALID_ARGUMENTS)
            | Some(codes::TOOL_ERROR) => InvocationOutcome::Rejected,
            // Any other code came from the host verbatim
            Some(_) => InvocationOutcome::Resolved,
        }
    }
}

impl fmt::Display for InvocationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationOutcome::Resolved => write!(f, "resolved"),
            InvocationOutcome::TimedOut => write!(f, "timed out"),
            InvocationOutcome::ConnectionLost => write!(f, "connection lost"),
            InvocationOutcome::Rejected => write!(f, "rejected"),
        }
    }
}

/// Tool definition as advertised to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub struct CommandGateway {
    registry: Arc<CommandRegistry>,
    config: BridgeConfig,
    client: RwLock<Arc<HostClient>>,
    /// Installed on every fresh host client
    standing_subscriptions: Mutex<Vec<(String, Arc<dyn EventHandler>)>>,
}

impl CommandGateway {
    pub fn new(registry: Arc<CommandRegistry>, config: BridgeConfig) -> Self {
        let client = Arc::new(HostClient::new(config.endpoint.clone()));
        Self {
            registry,
            config,
            client: RwLock::new(client),
            standing_subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Current host client
    pub async fn client(&self) -> Arc<HostClient> {
        self.client.read().await.clone()
    }

    /// Subscribe `handler` on the current client and on every client created later
    pub async fn subscribe_each_session(
        &self,
        event_key: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) {
        let event_key = event_key.into();
        self.client()
            .await
            .events()
            .subscribe(event_key.clone(), handler.clone())
            .await;
        self.standing_subscriptions
            .lock()
            .await
            .push((event_key, handler));
    }

    /// Meta-tools followed by every visible command
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let prefix = &self.config.tool_prefix;
        let endpoint = &self.config.endpoint;

        let mut tools = vec![
            ToolDefinition {
                name: format!("{prefix}{META_STATUS}"),
                description: "Check if connected to the host and get connection status"
                    .to_string(),
                input_schema: json!({"type": "object", "properties": {}, "required": []}),
            },
            ToolDefinition {
                name: format!("{prefix}{META_CONNECT}"),
                description: "Connect to the host application. Must be called before using other tools unless the bridge reconnects on its own.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "host": {
                            "type": "string",
                            "description": format!("Host WebSocket address (default: {})", endpoint.host),
                            "default": endpoint.host,
                        },
                        "port": {
                            "type": "integer",
                            "description": format!("Host WebSocket port (default: {})", endpoint.port),
                            "default": endpoint.port,
                        },
                    },
                    "required": [],
                }),
            },
            ToolDefinition {
                name: format!("{prefix}{META_DISCONNECT}"),
                description: "Disconnect from the host application".to_string(),
                input_schema: json!({"type": "object", "properties": {}, "required": []}),
            },
        ];

        tools.extend(
            self.registry
                .visible_commands(false)
                .into_iter()
                .map(|descriptor| ToolDefinition {
                    name: format!("{prefix}{}", descriptor.name),
                    description: descriptor.description.clone(),
                    input_schema: descriptor.parameter_schema.to_json(),
                }),
        );
        tools
    }

    /// Route a prefixed tool name to a meta-tool or a registry command
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> InvocationResult {
        info!("Tool called: {} with args: {}", tool_name, arguments);

        let Some(command) = tool_name.strip_prefix(self.config.tool_prefix.as_str()) else {
            return InvocationResult::from_error(&BridgeError::UnknownTool(tool_name.to_string()));
        };

        match command {
            META_STATUS => self.connection_status().await,
            META_CONNECT => {
                let (host, port) = match endpoint_override(&arguments) {
                    Ok(parts) => parts,
                    Err(e) => return InvocationResult::from_error(&e),
                };
                self.connect(host, port).await
            }
            META_DISCONNECT => self.disconnect().await,
            _ => self.invoke(command, arguments).await,
        }
    }

    /// Invoke a registry command with the default timeout
    pub async fn invoke(&self, name: &str, arguments: Value) -> InvocationResult {
        self.invoke_with_timeout(name, arguments, self.config.request_timeout())
            .await
    }

    pub async fn invoke_with_timeout(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> InvocationResult {
        let result = self.dispatch_command(name, arguments, timeout).await;
        let outcome = InvocationOutcome::of(&result);
        match outcome {
            InvocationOutcome::Resolved => debug!("Command {} {}", name, outcome),
            _ => warn!(
                "Command {} {}: {}",
                name,
                outcome,
                result
                    .error
                    .as_ref()
                    .map(|e| e.message.as_str())
                    .unwrap_or_default()
            ),
        }
        result
    }

    async fn dispatch_command(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> InvocationResult {
        let descriptor = match self.registry.resolve(name) {
            Ok(descriptor) if self.registry.is_exposed(name) => descriptor,
            _ => {
                return InvocationResult::from_error(&BridgeError::UnknownCommand(
                    name.to_string(),
                ))
            }
        };

        let params = match into_params(arguments) {
            Ok(params) => params,
            Err(e) => return InvocationResult::from_error(&e),
        };

        let missing = descriptor.parameter_schema.missing_required(&params);
        if !missing.is_empty() {
            return InvocationResult::from_error(&BridgeError::InvalidArguments(format!(
                "Missing required argument(s) for '{}': {}",
                name,
                missing.join(", ")
            )));
        }

        let mut client = self.client().await;
        if client.is_spent() {
            client = self.renew_client(&client).await;
        }
        if !client.is_connected().await {
            debug!("Not connected; attempting one reconnect to {}", client.endpoint());
            if let Err(e) = client.connect(self.config.connect_timeout()).await {
                return InvocationResult::failure(ErrorBody::new(
                    codes::NOT_CONNECTED,
                    format!(
                        "Not connected to host ({e}). Use {}{} first, or make sure the host is running with its bridge plugin enabled.",
                        self.config.tool_prefix, META_CONNECT
                    ),
                ));
            }
        }

        match client.call(descriptor.wire_name(), params, timeout).await {
            Ok(envelope) => match HostReply::from_envelope(envelope) {
                HostReply::Success(result) => InvocationResult::ok(result),
                HostReply::Failure(error) => InvocationResult::failure(error),
            },
            Err(e) => InvocationResult::from_error(&e),
        }
    }

    pub async fn connection_status(&self) -> InvocationResult {
        let client = self.client().await;
        let endpoint = client.endpoint();
        InvocationResult::ok(json!({
            "connected": client.is_connected().await,
            "state": client.state().await.to_string(),
            "host": endpoint.host,
            "port": endpoint.port,
            "connected_since": client.connected_since().await.map(|at| at.to_rfc3339()),
            "pending_requests": client.pending_count().await,
        }))
    }

    /// Replace the host client with a fresh one and connect it
    pub async fn connect(&self, host: Option<String>, port: Option<u16>) -> InvocationResult {
        let current = self.client().await.endpoint().clone();
        let endpoint = Endpoint::new(host.unwrap_or(current.host), port.unwrap_or(current.port));

        let fresh = self.replace_client(endpoint.clone()).await;
        match fresh.connect(self.config.connect_timeout()).await {
            Ok(()) => InvocationResult::ok(json!({
                "message": format!("Connected to host at {endpoint}"),
                "host": endpoint.host,
                "port": endpoint.port,
            })),
            Err(e) => InvocationResult::failure(ErrorBody::new(
                codes::CONNECTION_FAILED,
                format!(
                    "Failed to connect to host at {endpoint}: {e}. Make sure the host is running with its bridge plugin enabled."
                ),
            )),
        }
    }

    /// Tear down the current client; the next call starts from a fresh one
    pub async fn disconnect(&self) -> InvocationResult {
        let endpoint = self.client().await.endpoint().clone();
        self.replace_client(endpoint).await;
        InvocationResult::ok(json!({"message": "Disconnected from host"}))
    }

    async fn replace_client(&self, endpoint: Endpoint) -> Arc<HostClient> {
        let fresh = self.fresh_client(endpoint).await;
        let previous = {
            let mut client = self.client.write().await;
            std::mem::replace(&mut *client, fresh.clone())
        };
        previous.disconnect().await;
        fresh
    }

    /// Swap a spent client for a fresh one on the same endpoint
    async fn renew_client(&self, spent: &Arc<HostClient>) -> Arc<HostClient> {
        let fresh = self.fresh_client(spent.endpoint().clone()).await;
        let previous = {
            let mut client = self.client.write().await;
            if !Arc::ptr_eq(&*client, spent) {
                // Another caller already renewed it
                return Arc::clone(&*client);
            }
            std::mem::replace(&mut *client, fresh.clone())
        };
        debug!("Host session at {} ended; starting a new one", fresh.endpoint());
        previous.disconnect().await;
        fresh
    }

    /// New client carrying the standing subscriptions
    async fn fresh_client(&self, endpoint: Endpoint) -> Arc<HostClient> {
        let fresh = Arc::new(HostClient::new(endpoint));
        for (event_key, handler) in self.standing_subscriptions.lock().await.iter() {
            fresh
                .events()
                .subscribe(event_key.clone(), handler.clone())
                .await;
        }
        fresh
    }
}

/// Accept an object or null as command parameters
fn into_params(arguments: Value) -> Result<Map<String, Value>, BridgeError> {
    match arguments {
        Value::Object(params) => Ok(params),
        Value::Null => Ok(Map::new()),
        other => Err(BridgeError::InvalidArguments(format!(
            "Arguments must be an object, got {other}"
        ))),
    }
}

/// Optional `host`/`port` overrides of the connect meta-tool
fn endpoint_override(arguments: &Value) -> Result<(Option<String>, Option<u16>), BridgeError> {
    let host = match arguments.get("host") {
        None | Some(Value::Null) => None,
        Some(Value::String(host)) => Some(host.clone()),
        Some(other) => {
            return Err(BridgeError::InvalidArguments(format!(
                "host must be a string, got {other}"
            )))
        }
    };

    let port = match arguments.get("port") {
        None | Some(Value::Null) => None,
        Some(port) => {
            let port = port
                .as_u64()
                .or_else(|| port.as_str().and_then(|s| s.parse().ok()))
                .and_then(|port| u16::try_from(port).ok())
                .ok_or_else(|| BridgeError::InvalidArguments(format!("invalid port {port}")))?;
            Some(port)
        }
    };

    Ok((host, port))
}
