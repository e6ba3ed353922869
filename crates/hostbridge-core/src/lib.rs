//! Hostbridge Core Library
//!
//! Bridge between tool-calling clients and a host application that exposes
//! its automation commands over a local WebSocket. This crate holds
//! everything except the process entry point.
//!
//! # Modules
//!
//! - [`registry`] - Command descriptors, parameter schemas and suppression rules
//! - [`catalog`] - Embedded and on-disk command catalogs
//! - [`session`] - WebSocket session to the host
//! - [`router`] - Pending-request table, subscriptions and inbound frame routing
//! - [`correlator`] - Request/response correlation with per-call timeouts
//! - [`dispatcher`] - Unsolicited event subscriptions and delivery
//! - [`client`] - One session bundled with its router, correlator and dispatcher
//! - [`gateway`] - Tool surface with uniform success/error results
//! - [`mcp`] - Model Context Protocol JSON-RPC handler
//! - [`protocol`] - Host wire envelopes
//! - [`config`] - Bridge configuration
//! - [`error`] - Error types and stable error codes

pub mod catalog;
pub mod client;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod session;

// Re-export commonly used types
pub use catalog::CatalogFile;
pub use client::HostClient;
pub use config::{BridgeConfig, Endpoint};
pub use dispatcher::{EventDispatcher, EventHandler, FnHandler, SubscriptionId, TracingHandler};
pub use error::{codes, BridgeError, Result};
pub use gateway::{CommandGateway, InvocationOutcome, InvocationResult, ToolDefinition};
pub use mcp::McpServer;
pub use protocol::{ErrorBody, EventKind, HostReply};
pub use registry::{CommandDescriptor, CommandRegistry, ParameterSchema, RegistryError};
pub use router::{MessageRouter, Routed};
pub use session::{ConnectionState, FrameSink, HostSession};
