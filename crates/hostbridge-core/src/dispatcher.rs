//! Event Dispatcher
//!
//! Routes unsolicited host messages to listeners registered under an event
//! key. Handlers for one dispatch run sequentially in subscription order on
//! a background task; a failing or panicking handler is logged and skipped.
//! Events arriving from the host go through the router's delivery queue and
//! reach handlers in arrival order.

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::router::MessageRouter;

/// Listener for host events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event_key: &str, payload: &Value) -> Result<(), String>;
}

/// Adapter turning a plain closure into an [`EventHandler`]
pub struct FnHandler<F>(pub F);

impl<F> FnHandler<F>
where
    F: Fn(&str, &Value) -> Result<(), String> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self(handler)
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&str, &Value) -> Result<(), String> + Send + Sync,
{
    async fn handle(&self, event_key: &str, payload: &Value) -> Result<(), String> {
        (self.0)(event_key, payload)
    }
}

/// Logs every host event through `tracing`
#[derive(Debug, Default, Clone)]
pub struct TracingHandler;

#[async_trait]
impl EventHandler for TracingHandler {
    async fn handle(&self, event_key: &str, payload: &Value) -> Result<(), String> {
        match payload.get("message").and_then(Value::as_str) {
            Some(message) => info!("[host {}] {}", event_key, message),
            None => info!("[host {}] {}", event_key, payload),
        }
        Ok(())
    }
}

/// Handle returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) handler: Arc<dyn EventHandler>,
}

/// Subscribe/dispatch facade over the shared router tables
#[derive(Clone)]
pub struct EventDispatcher {
    router: Arc<MessageRouter>,
}

impl EventDispatcher {
    pub fn new(router: Arc<MessageRouter>) -> Self {
        Self { router }
    }

    /// Register `handler` for `event_key`; handlers run in registration order
    pub async fn subscribe(
        &self,
        event_key: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        self.router.subscribe(event_key.into(), handler).await
    }

    /// Remove a subscription; returns false if it was not registered
    pub async fn unsubscribe(&self, event_key: &str, id: SubscriptionId) -> bool {
        self.router.unsubscribe(event_key, id).await
    }

    /// Fire-and-forget delivery of `payload` to every handler of `event_key`
    ///
    /// The returned handle may be awaited to wait for all handlers to finish.
    pub async fn dispatch(&self, event_key: &str, payload: Value) -> JoinHandle<()> {
        let handlers = self.router.handlers_for(event_key).await;
        deliver(event_key.to_string(), payload, handlers)
    }

    pub async fn subscriber_count(&self, event_key: &str) -> usize {
        self.router.handlers_for(event_key).await.len()
    }
}

/// Run `handlers` one after another on a background task
pub(crate) fn deliver(
    event_key: String,
    payload: Value,
    handlers: Vec<Arc<dyn EventHandler>>,
) -> JoinHandle<()> {
    tokio::spawn(async move { run_handlers(&event_key, &payload, handlers).await })
}

/// Run `handlers` in order, logging and skipping any that fail or panic
pub(crate) async fn run_handlers(
    event_key: &str,
    payload: &Value,
    handlers: Vec<Arc<dyn EventHandler>>,
) {
    for handler in handlers {
        match AssertUnwindSafe(handler.handle(event_key, payload))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Event handler for '{}' failed: {}", event_key, e),
            Err(_) => error!("Event handler for '{}' panicked", event_key),
        }
    }
}
