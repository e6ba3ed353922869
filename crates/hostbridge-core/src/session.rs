//! Host Session - WebSocket transport to the host application
//!
//! Owns the single physical connection to the host:
//! - `connect` opens the socket and spawns exactly one receive loop
//! - `send_frame` writes a text frame, failing fast when disconnected
//! - `disconnect` stops the receive loop and waits for it to finish
//!
//! The receive loop is the only place that tears a connection down. Whether
//! the host closed the socket or `disconnect` asked the loop to stop, the
//! same cleanup runs: the writer is closed and cleared, the state goes back
//! to `Disconnected`, and the frame sink is told the connection is gone.
//!
//! A session carries at most one connection. Once that connection has been
//! torn down the session is spent and `connect` refuses; reconnecting means
//! building a new session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::Endpoint;
use crate::error::{BridgeError, Result};
use crate::protocol::preview;

type HostStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type HostWriter = SplitSink<HostStream, Message>;
type HostReader = SplitStream<HostStream>;

/// Receiver of inbound frames and connection-loss notifications
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// A text frame arrived from the host
    async fn on_frame(&self, frame: &str);

    /// The connection is gone; called exactly once per connection
    async fn on_closed(&self);
}

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// State shared between the session handle and its receive loop
struct SessionShared {
    endpoint: Endpoint,
    sink: Arc<dyn FrameSink>,
    state: RwLock<ConnectionState>,
    writer: Mutex<Option<HostWriter>>,
    connected_since: RwLock<Option<DateTime<Utc>>>,
    /// Set once the connection has been torn down
    spent: AtomicBool,
}

impl SessionShared {
    /// Common teardown for both paths into `Disconnected`
    async fn teardown(&self) {
        self.spent.store(true, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Disconnected;
        *self.connected_since.write().await = None;

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.close().await {
                debug!("Error closing host socket: {}", e);
            }
        }

        self.sink.on_closed().await;
        info!("Disconnected from host at {}", self.endpoint.uri());
    }
}

/// Running receive loop plus the means to stop it
struct ReceiveTask {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

/// One WebSocket connection to the host
pub struct HostSession {
    shared: Arc<SessionShared>,
    receiver: Mutex<Option<ReceiveTask>>,
    /// Serializes connect and disconnect
    lifecycle: Mutex<()>,
}

impl HostSession {
    pub fn new(endpoint: Endpoint, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                endpoint,
                sink,
                state: RwLock::new(ConnectionState::Disconnected),
                writer: Mutex::new(None),
                connected_since: RwLock::new(None),
                spent: AtomicBool::new(false),
            }),
            receiver: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn connected_since(&self) -> Option<DateTime<Utc>> {
        *self.shared.connected_since.read().await
    }

    /// Whether this session's connection has already been torn down
    pub fn is_spent(&self) -> bool {
        self.shared.spent.load(Ordering::SeqCst)
    }

    /// Open the connection; a no-op when already connected
    pub async fn connect(&self, timeout: Duration) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.is_connected().await {
            return Ok(());
        }
        if self.is_spent() {
            return Err(BridgeError::SessionClosed);
        }

        let uri = self.shared.endpoint.uri();
        *self.shared.state.write().await = ConnectionState::Connecting;
        debug!("Connecting to host at {}", uri);

        let stream = match tokio::time::timeout(timeout, connect_async(uri.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                *self.shared.state.write().await = ConnectionState::Disconnected;
                let err = classify_connect_error(&uri, e);
                warn!("{}", err);
                return Err(err);
            }
            Err(_) => {
                *self.shared.state.write().await = ConnectionState::Disconnected;
                let err = BridgeError::ConnectTimeout {
                    endpoint: uri,
                    timeout,
                };
                warn!("{}", err);
                return Err(err);
            }
        };

        let (writer, reader) = stream.split();
        *self.shared.writer.lock().await = Some(writer);
        *self.shared.connected_since.write().await = Some(Utc::now());
        *self.shared.state.write().await = ConnectionState::Connected;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(receive_loop(reader, shutdown_rx, self.shared.clone()));
        *self.receiver.lock().await = Some(ReceiveTask { handle, shutdown });

        info!("Connected to host at {}", uri);
        Ok(())
    }

    /// Close the connection and wait for the receive loop to stop
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let Some(task) = self.receiver.lock().await.take() else {
            return;
        };

        // The loop may already be gone after a remote close
        let _ = task.shutdown.send(());
        if let Err(e) = task.handle.await {
            error!("Receive loop failed during disconnect: {}", e);
        }
    }

    /// Write one text frame to the host
    pub async fn send_frame(&self, frame: String) -> Result<()> {
        if !self.is_connected().await {
            return Err(BridgeError::NotConnected);
        }

        let mut writer = self.shared.writer.lock().await;
        let writer = writer.as_mut().ok_or(BridgeError::NotConnected)?;
        writer.send(Message::Text(frame)).await.map_err(|e| match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                BridgeError::ConnectionClosed
            }
            other => BridgeError::Send(other.to_string()),
        })
    }

    /// Whether a receive loop is currently alive
    pub async fn has_receive_loop(&self) -> bool {
        self.receiver
            .lock()
            .await
            .as_ref()
            .map_or(false, |task| !task.handle.is_finished())
    }
}

fn classify_connect_error(uri: &str, err: tungstenite::Error) -> BridgeError {
    match err {
        tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            BridgeError::ConnectionRefused {
                endpoint: uri.to_string(),
            }
        }
        other => BridgeError::ConnectionFailed {
            endpoint: uri.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Background task reading frames until the socket closes or shutdown is requested
async fn receive_loop(
    mut reader: HostReader,
    mut shutdown: oneshot::Receiver<()>,
    shared: Arc<SessionShared>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Receive loop stopping on request");
                break;
            }
            message = reader.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Host → bridge: {}", preview(&text));
                        shared.sink.on_frame(&text).await;
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => shared.sink.on_frame(&text).await,
                        Err(e) => warn!("Dropping non UTF-8 binary frame: {}", e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!("Host closed the connection: {:?}", frame);
                        break;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!("Error reading from host: {}", e);
                        break;
                    }
                    None => {
                        info!("Host connection ended");
                        break;
                    }
                }
            }
        }
    }

    shared.teardown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        frames: AtomicUsize,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl FrameSink for CountingSink {
        async fn on_frame(&self, _frame: &str) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_closed(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn unused_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }

    #[tokio::test]
    async fn test_send_without_connection_fails_fast() {
        let session = HostSession::new(
            Endpoint::new("127.0.0.1", 1),
            Arc::new(CountingSink::default()),
        );
        let err = session.send_frame("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
        assert_eq!(session.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let port = unused_port().await;
        let sink = Arc::new(CountingSink::default());
        let session = HostSession::new(Endpoint::new("127.0.0.1", port), sink.clone());

        let err = session.connect(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, BridgeError::ConnectionRefused { .. }), "{err}");
        assert_eq!(session.state().await, ConnectionState::Disconnected);
        assert!(!session.has_receive_loop().await);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // Accepts TCP but never answers the WebSocket handshake
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let session = HostSession::new(
            Endpoint::new("127.0.0.1", port),
            Arc::new(CountingSink::default()),
        );
        let err = session.connect(Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, BridgeError::ConnectTimeout { .. }), "{err}");
        assert_eq!(session.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let session = HostSession::new(
            Endpoint::new("127.0.0.1", 1),
            Arc::new(CountingSink::default()),
        );
        session.disconnect().await;
        assert_eq!(session.state().await, ConnectionState::Disconnected);
    }
}
