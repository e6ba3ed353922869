//! Bridge configuration
//!
//! This module defines configuration types and default values:
//! - `bridge_config`: Configuration structure
//! - `defaults`: Default configuration values

pub mod bridge_config;
pub mod defaults;

pub use bridge_config::{parse_toggle, BridgeConfig, Endpoint};
