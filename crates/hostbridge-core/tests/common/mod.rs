//! Shared test utilities
//!
//! An in-process host: a WebSocket server on an ephemeral port that records
//! every request it receives and either answers through a responder closure
//! or waits for the test to push frames by hand.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use hostbridge_core::config::Endpoint;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

type Responder = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

enum HostAction {
    Send(Value),
    Close,
}

pub struct MockHost {
    pub endpoint: Endpoint,
    requests: mpsc::UnboundedReceiver<Value>,
    actions: mpsc::UnboundedSender<HostAction>,
    connections: Arc<AtomicUsize>,
}

impl MockHost {
    /// Host that never answers on its own
    pub async fn manual() -> Self {
        Self::spawn(None).await
    }

    /// Host that answers each request with whatever `responder` returns
    pub async fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self::spawn(Some(Arc::new(responder))).await
    }

    /// Host answering every request with `{success: true, result: {pong: true}}`
    pub async fn echo() -> Self {
        Self::with_responder(|request| Some(success(request, json!({"pong": true})))).await
    }

    async fn spawn(responder: Option<Responder>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (actions, mut actions_rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = connections.clone();
        tokio::spawn(async move {
            // One connection at a time, like the real host
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                serve_connection(stream, &requests_tx, &mut actions_rx, responder.as_ref()).await;
            }
        });

        Self {
            endpoint: Endpoint::new("127.0.0.1", port),
            requests,
            actions,
            connections,
        }
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    /// Next request the host received, failing the test after five seconds
    pub async fn next_request(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("host received no request")
            .expect("mock host stopped")
    }

    /// Request received within `wait`, if any
    pub async fn try_next_request(&mut self, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, self.requests.recv())
            .await
            .ok()
            .flatten()
    }

    /// Push a frame to the connected client
    pub fn send(&self, frame: Value) {
        self.actions.send(HostAction::Send(frame)).unwrap();
    }

    /// Close the current connection from the host side
    pub fn close(&self) {
        self.actions.send(HostAction::Close).unwrap();
    }

    /// Number of WebSocket connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve_connection(
    stream: TcpStream,
    requests: &mpsc::UnboundedSender<Value>,
    actions: &mut mpsc::UnboundedReceiver<HostAction>,
    responder: Option<&Responder>,
) {
    let Ok(socket) = accept_async(stream).await else {
        return;
    };
    let (mut writer, mut reader) = socket.split();

    loop {
        tokio::select! {
            message = reader.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let request: Value = serde_json::from_str(&text).unwrap();
                    if let Some(reply) = responder.and_then(|respond| respond(&request)) {
                        let _ = writer.send(Message::Text(reply.to_string())).await;
                    }
                    let _ = requests.send(request);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            action = actions.recv() => match action {
                Some(HostAction::Send(frame)) => {
                    let _ = writer.send(Message::Text(frame.to_string())).await;
                }
                Some(HostAction::Close) => {
                    let _ = writer.send(Message::Close(None)).await;
                    break;
                }
                None => break,
            },
        }
    }
}

/// Success envelope answering `request`
pub fn success(request: &Value, result: Value) -> Value {
    json!({"id": request["id"], "success": true, "result": result})
}

/// Failure envelope answering `request`
pub fn failure(request: &Value, code: &str, message: &str) -> Value {
    json!({
        "id": request["id"],
        "success": false,
        "error": {"code": code, "message": message},
    })
}

/// A port nothing listens on
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
