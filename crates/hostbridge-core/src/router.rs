//! Message Router
//!
//! Owns the two tables touched by every inbound frame: pending requests
//! keyed by correlation id, and event subscriptions keyed by event key.
//! Both live behind a single lock so resolution, timeout cleanup and
//! teardown can never interleave inconsistently.
//!
//! Routing precedence: an envelope whose `id` matches a pending request is
//! a response, whatever its `type`. Otherwise a known event `type` is
//! queued for delivery. Anything else is dropped.
//!
//! Events are delivered by a single task per router, so handlers see them
//! in the order the host sent them. When the connection closes, pending
//! requests are failed and every subscription is discarded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::dispatcher::{run_handlers, EventHandler, Subscription, SubscriptionId};
use crate::protocol::{frame_event, frame_id, preview};
use crate::session::FrameSink;

/// How a pending request was settled
#[derive(Debug)]
pub(crate) enum Resolution {
    /// The matching response envelope, verbatim
    Reply(Value),
    /// The connection closed before a response arrived
    Closed,
}

/// An outstanding call awaiting its response
#[derive(Debug)]
pub struct PendingRequest {
    pub id: String,
    pub command: String,
    pub created_at: DateTime<Utc>,
    responder: oneshot::Sender<Resolution>,
}

/// What happened to an inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Resolved the pending request with this id
    Response(String),
    /// Handed to this many handlers of an event key
    Event { key: &'static str, handlers: usize },
    /// Malformed, unmatched or of unknown type
    Dropped,
}

#[derive(Default)]
struct RouterTables {
    pending: HashMap<String, PendingRequest>,
    subscriptions: HashMap<String, Vec<Subscription>>,
    next_subscription: u64,
}

/// A routed event waiting for the delivery task
struct QueuedEvent {
    key: &'static str,
    payload: Value,
    handlers: Vec<Arc<dyn EventHandler>>,
}

/// Shared pending-request and subscription tables
#[derive(Default)]
pub struct MessageRouter {
    tables: Mutex<RouterTables>,
    /// Started on the first routed event
    delivery: OnceLock<mpsc::UnboundedSender<QueuedEvent>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending slot for `id`
    pub(crate) async fn register(&self, id: String, command: String) -> oneshot::Receiver<Resolution> {
        let (responder, receiver) = oneshot::channel();
        let pending = PendingRequest {
            id: id.clone(),
            command,
            created_at: Utc::now(),
            responder,
        };
        self.tables.lock().await.pending.insert(id, pending);
        receiver
    }

    /// Drop the slot for `id`; false if it was already settled
    pub(crate) async fn forget(&self, id: &str) -> bool {
        self.tables.lock().await.pending.remove(id).is_some()
    }

    pub async fn pending_count(&self) -> usize {
        self.tables.lock().await.pending.len()
    }

    /// Creation time of the oldest outstanding request
    pub async fn oldest_pending(&self) -> Option<DateTime<Utc>> {
        self.tables
            .lock()
            .await
            .pending
            .values()
            .map(|pending| pending.created_at)
            .min()
    }

    /// Settle every pending request with `Closed`; returns how many there were
    pub async fn fail_all(&self) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut tables = self.tables.lock().await;
            tables.pending.drain().map(|(_, pending)| pending).collect()
        };

        let count = drained.len();
        for pending in drained {
            debug!("Cancelling pending '{}' (id: {})", pending.command, pending.id);
            let _ = pending.responder.send(Resolution::Closed);
        }
        if count > 0 {
            info!("Cancelled {} pending request(s) after connection closed", count);
        }
        count
    }

    pub(crate) async fn subscribe(
        &self,
        event_key: String,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let mut tables = self.tables.lock().await;
        tables.next_subscription += 1;
        let id = SubscriptionId(tables.next_subscription);
        tables
            .subscriptions
            .entry(event_key)
            .or_default()
            .push(Subscription { id, handler });
        id
    }

    pub(crate) async fn unsubscribe(&self, event_key: &str, id: SubscriptionId) -> bool {
        let mut tables = self.tables.lock().await;
        let Some(subscriptions) = tables.subscriptions.get_mut(event_key) else {
            return false;
        };
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        let removed = subscriptions.len() != before;
        if subscriptions.is_empty() {
            tables.subscriptions.remove(event_key);
        }
        removed
    }

    /// Snapshot of the handlers for `event_key`, in subscription order
    pub(crate) async fn handlers_for(&self, event_key: &str) -> Vec<Arc<dyn EventHandler>> {
        self.tables
            .lock()
            .await
            .subscriptions
            .get(event_key)
            .map(|subscriptions| {
                subscriptions
                    .iter()
                    .map(|subscription| subscription.handler.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Discard every subscription; returns how many were removed
    pub async fn clear_subscriptions(&self) -> usize {
        let mut tables = self.tables.lock().await;
        let count: usize = tables.subscriptions.values().map(Vec::len).sum();
        tables.subscriptions.clear();
        count
    }

    /// Decode one inbound text frame and route it
    pub async fn route_frame(&self, frame: &str) -> Routed {
        let envelope: Value = match serde_json::from_str(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Received invalid JSON from host: {} - {}", e, preview(frame));
                return Routed::Dropped;
            }
        };

        let mut tables = self.tables.lock().await;

        if let Some(id) = frame_id(&envelope) {
            if let Some(pending) = tables.pending.remove(id) {
                drop(tables);
                debug!("Received response for '{}' (id: {})", pending.command, pending.id);
                // The caller may have given up already; nothing to do then
                let _ = pending.responder.send(Resolution::Reply(envelope));
                return Routed::Response(pending.id);
            }
        }

        if let Some((kind, data)) = frame_event(&envelope) {
            let handlers: Vec<Arc<dyn EventHandler>> = tables
                .subscriptions
                .get(kind.key())
                .map(|subscriptions| subscriptions.iter().map(|s| s.handler.clone()).collect())
                .unwrap_or_default();
            drop(tables);

            let count = handlers.len();
            debug!("Dispatching host event '{}' to {} handler(s)", kind, count);
            if count > 0 {
                self.enqueue(QueuedEvent {
                    key: kind.key(),
                    payload: data,
                    handlers,
                });
            }
            return Routed::Event {
                key: kind.key(),
                handlers: count,
            };
        }
        drop(tables);

        match frame_id(&envelope) {
            Some(id) => warn!("Dropping response with unknown id {}", id),
            None => debug!("Dropping unrecognized frame: {}", envelope),
        }
        Routed::Dropped
    }

    /// Hand an event to the delivery task, starting it if needed
    fn enqueue(&self, event: QueuedEvent) {
        let queue = self.delivery.get_or_init(|| {
            let (queue, mut events) = mpsc::unbounded_channel::<QueuedEvent>();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    run_handlers(event.key, &event.payload, event.handlers).await;
                }
            });
            queue
        });
        if let Err(e) = queue.send(event) {
            warn!("Event delivery task is gone; dropping '{}' event", e.0.key);
        }
    }
}

#[async_trait]
impl FrameSink for MessageRouter {
    async fn on_frame(&self, frame: &str) {
        self.route_frame(frame).await;
    }

    async fn on_closed(&self) {
        self.fail_all().await;
        let dropped = self.clear_subscriptions().await;
        if dropped > 0 {
            debug!("Discarded {} event subscription(s) of the closed session", dropped);
        }
    }
}
