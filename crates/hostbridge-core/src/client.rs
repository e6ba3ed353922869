//! Host Client
//!
//! Bundles one host session with its router, correlator and event
//! dispatcher. A client is bound to a single endpoint; pointing the bridge
//! somewhere else means building a fresh client, so subscriptions and
//! pending requests never leak from one host to the next. The same holds
//! after a connection ends: a spent client cannot reconnect.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::Endpoint;
use crate::correlator::Correlator;
use crate::dispatcher::EventDispatcher;
use crate::error::Result;
use crate::router::MessageRouter;
use crate::session::{ConnectionState, HostSession};

pub struct HostClient {
    session: Arc<HostSession>,
    router: Arc<MessageRouter>,
    correlator: Correlator,
    events: EventDispatcher,
}

impl HostClient {
    pub fn new(endpoint: Endpoint) -> Self {
        let router = Arc::new(MessageRouter::new());
        let session = Arc::new(HostSession::new(endpoint, router.clone()));
        Self {
            correlator: Correlator::new(session.clone(), router.clone()),
            events: EventDispatcher::new(router.clone()),
            session,
            router,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.session.endpoint()
    }

    pub async fn connect(&self, timeout: Duration) -> Result<()> {
        self.session.connect(timeout).await
    }

    /// Whether this client's connection has ended; a new client is needed
    pub fn is_spent(&self) -> bool {
        self.session.is_spent()
    }

    /// Disconnect and discard every event subscription
    pub async fn disconnect(&self) {
        self.session.disconnect().await;
        let dropped = self.router.clear_subscriptions().await;
        if dropped > 0 {
            debug!("Discarded {} event subscription(s)", dropped);
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session.is_connected().await
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.state().await
    }

    pub async fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.session.connected_since().await
    }

    /// Send a command and wait for its raw response envelope
    pub async fn call(
        &self,
        wire_name: &str,
        params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.correlator.call(wire_name, params, timeout).await
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub async fn pending_count(&self) -> usize {
        self.router.pending_count().await
    }

    pub async fn has_receive_loop(&self) -> bool {
        self.session.has_receive_loop().await
    }
}
