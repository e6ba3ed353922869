/// Default host WebSocket address
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default host WebSocket port
pub const DEFAULT_PORT: u16 = 6850;

/// Default connection timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default per-request response timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Prefix prepended to command names on the tool surface
pub const DEFAULT_TOOL_PREFIX: &str = "godot_";

/// Values accepted as "on" for boolean environment toggles
pub const TRUTHY_VALUES: &[&str] = &["1", "true", "yes"];
