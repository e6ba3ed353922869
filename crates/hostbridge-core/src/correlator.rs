//! Request Correlator
//!
//! Multiplexes any number of concurrent calls over the single host session.
//! Each call gets a fresh UUID, a pending slot in the router, and waits on a
//! oneshot channel until the receive loop answers it, the timeout fires, or
//! the connection closes. A slot is settled at most once: whichever of the
//! three paths removes it from the router wins.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::protocol::RequestEnvelope;
use crate::router::{MessageRouter, Resolution};
use crate::session::HostSession;

pub struct Correlator {
    session: Arc<HostSession>,
    router: Arc<MessageRouter>,
}

impl Correlator {
    pub fn new(session: Arc<HostSession>, router: Arc<MessageRouter>) -> Self {
        Self { session, router }
    }

    /// Send `wire_name` with `params` and wait for the matching response envelope
    pub async fn call(
        &self,
        wire_name: &str,
        params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if !self.session.is_connected().await {
            return Err(BridgeError::NotConnected);
        }

        let id = Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&RequestEnvelope::new(id.clone(), wire_name, params))?;

        let mut receiver = self
            .router
            .register(id.clone(), wire_name.to_string())
            .await;

        if let Err(e) = self.session.send_frame(frame).await {
            self.router.forget(&id).await;
            return Err(e);
        }
        debug!("Sent command: {} (id: {})", wire_name, id);

        match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(resolution)) => settle(resolution),
            // Responder dropped without settling: the router went away
            Ok(Err(_)) => Err(BridgeError::ConnectionClosed),
            Err(_) => {
                if self.router.forget(&id).await {
                    debug!("Command {} timed out (id: {})", wire_name, id);
                    return Err(BridgeError::Timeout {
                        command: wire_name.to_string(),
                        timeout,
                    });
                }
                // Settled concurrently with the deadline; the value is already queued
                match receiver.try_recv() {
                    Ok(resolution) => settle(resolution),
                    Err(_) => Err(BridgeError::Timeout {
                        command: wire_name.to_string(),
                        timeout,
                    }),
                }
            }
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.router.pending_count().await
    }
}

fn settle(resolution: Resolution) -> Result<Value> {
    match resolution {
        Resolution::Reply(envelope) => Ok(envelope),
        Resolution::Closed => Err(BridgeError::ConnectionClosed),
    }
}
