use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults;

/// Bridge configuration
///
/// Provides centralized configuration management with:
/// - Serde support for loading from files/env
/// - Builder pattern for customization
/// - Sensible defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host endpoint to connect to
    pub endpoint: Endpoint,

    /// Connection timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Default response timeout for a single command (milliseconds)
    pub request_timeout_ms: u64,

    /// Prefix used when exposing commands as tools
    pub tool_prefix: String,

    /// Expose every registered command, ignoring enablement and suppression
    pub expose_all: bool,

    /// Alternate command catalog; the embedded catalog is used when unset
    pub catalog_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            connect_timeout_ms: defaults::DEFAULT_CONNECT_TIMEOUT_SECS * 1000,
            request_timeout_ms: defaults::DEFAULT_REQUEST_TIMEOUT_SECS * 1000,
            tool_prefix: defaults::DEFAULT_TOOL_PREFIX.to_string(),
            expose_all: false,
            catalog_path: None,
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoint = Endpoint::new(host, port);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_millis(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_millis(timeout);
        self
    }

    pub fn with_tool_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tool_prefix = prefix.into();
        self
    }

    pub fn with_expose_all(mut self, expose_all: bool) -> Self {
        self.expose_all = expose_all;
        self
    }

    pub fn with_catalog_path(mut self, path: Option<PathBuf>) -> Self {
        self.catalog_path = path;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Milliseconds in `duration`, saturating at `u64::MAX`
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Host address of the WebSocket server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// WebSocket URI, e.g. `ws://127.0.0.1:6850`
    pub fn uri(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(defaults::DEFAULT_HOST, defaults::DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Interpret an environment toggle such as `ENABLE_ALL_TOOLS=yes`
pub fn parse_toggle(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    defaults::TRUTHY_VALUES.contains(&value.as_str())
}
