//! The bundled hub client: JSON hub frames over any [`Transport`].
//!
//! The flow per connection is:
//!   1. Connect the transport
//!   2. Send `{"protocol":"json","version":1}` and wait for `{}`
//!   3. Spawn a reader task that routes pushes to handlers and
//!      completions to pending invocations
//!   4. On transport loss: fail pending invocations, raise `on_closed`
//!      (unless the stop was deliberate)
//!
//! Frames are JSON text terminated by the ASCII record separator. HTTP
//! negotiation and transport fallback are not attempted; the transport
//! must already point at the hub's socket endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use hubfeed_protocol::{
    Codec, DEFAULT_MAX_PARTIAL_FRAME, FrameBuffer, HandshakeRequest, HandshakeResponse,
    HubMessage, JsonCodec, ProtocolError, encode_frame,
};
use hubfeed_supervisor::{ClosedHandler, HubClient, HubConnector, HubError, PushHandler};
use hubfeed_transport::{Connection, Transport};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, trace, warn};

/// Timeouts and limits for the JSON hub client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonHubConfig {
    /// How long to wait for the handshake response.
    pub handshake_timeout: Duration,
    /// How long one invocation may wait for its completion.
    pub invoke_timeout: Duration,
    /// Largest unfinished frame the reader buffers before dropping the
    /// connection.
    pub max_frame_size: usize,
}

impl Default for JsonHubConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            invoke_timeout: Duration::from_secs(10),
            max_frame_size: DEFAULT_MAX_PARTIAL_FRAME,
        }
    }
}

/// Creates [`JsonHubClient`]s over a shared transport.
pub struct JsonHubConnector<T: Transport> {
    transport: Arc<T>,
    config: JsonHubConfig,
}

impl<T: Transport> JsonHubConnector<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, JsonHubConfig::default())
    }

    pub fn with_config(transport: T, config: JsonHubConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> HubConnector for JsonHubConnector<T> {
    type Client = JsonHubClient<T>;

    fn create(&self, on_closed: ClosedHandler) -> JsonHubClient<T> {
        JsonHubClient {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            shared: Arc::new(Shared {
                handlers: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                connection: Mutex::new(None),
                reader: Mutex::new(None),
                next_id: AtomicU64::new(1),
                closing: AtomicBool::new(false),
                closed_raised: AtomicBool::new(false),
                on_closed,
            }),
        }
    }
}

struct PendingInvocation {
    method: String,
    reply: oneshot::Sender<Result<Value, HubError>>,
}

/// State shared between the client and its reader task.
struct Shared<C> {
    /// Keyed by lowercased event name.
    handlers: RwLock<HashMap<String, PushHandler>>,
    pending: Mutex<HashMap<String, PendingInvocation>>,
    connection: Mutex<Option<Arc<C>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
    /// Set by `stop`/`dispose`; suppresses the closed notification.
    closing: AtomicBool,
    closed_raised: AtomicBool,
    on_closed: ClosedHandler,
}

/// A single-use hub connection speaking JSON hub frames.
pub struct JsonHubClient<T: Transport> {
    transport: Arc<T>,
    config: JsonHubConfig,
    shared: Arc<Shared<T::Connection>>,
}

impl<T: Transport> JsonHubClient<T> {
    /// Returns `true` between a successful `start` and the connection's end.
    pub fn is_connected(&self) -> bool {
        self.shared.connection.lock().is_some()
    }

    fn connection(&self) -> Result<Arc<T::Connection>, HubError> {
        self.shared
            .connection
            .lock()
            .clone()
            .ok_or(HubError::NotConnected)
    }

    async fn handshake(
        &self,
        conn: &T::Connection,
        frames: &mut FrameBuffer,
    ) -> Result<Vec<Vec<u8>>, HubError> {
        let request = frame_text(&HandshakeRequest::json())
            .map_err(|e| HubError::Connect(e.to_string()))?;
        conn.send_text(&request)
            .await
            .map_err(|e| HubError::Connect(e.to_string()))?;

        loop {
            let bytes = match conn.recv().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return Err(HubError::Connect("closed during handshake".into())),
                Err(e) => return Err(HubError::Connect(e.to_string())),
            };
            let mut received = frames
                .push(&bytes)
                .map_err(|e| HubError::Connect(e.to_string()))?;
            if received.is_empty() {
                continue;
            }
            let response: HandshakeResponse = JsonCodec
                .decode(&received.remove(0))
                .map_err(|e| HubError::Connect(format!("bad handshake response: {e}")))?;
            if let Some(error) = response.error {
                return Err(HubError::Connect(format!("handshake rejected: {error}")));
            }
            // Anything after the response belongs to the reader.
            return Ok(received);
        }
    }
}

impl<T: Transport> HubClient for JsonHubClient<T> {
    fn on(&self, event: &str, handler: PushHandler) {
        self.shared
            .handlers
            .write()
            .insert(event.to_lowercase(), handler);
    }

    async fn start(&self) -> Result<(), HubError> {
        if self.shared.closing.load(Ordering::SeqCst) || self.is_connected() {
            return Err(HubError::Connect("client is single-use".into()));
        }

        let conn = self
            .transport
            .connect()
            .await
            .map_err(|e| HubError::Connect(e.to_string()))?;
        let conn = Arc::new(conn);
        let conn_id = conn.id();

        let mut frames = FrameBuffer::with_limit(self.config.max_frame_size);
        let timeout = self.config.handshake_timeout;
        let backlog = match time::timeout(timeout, self.handshake(&conn, &mut frames)).await {
            Ok(result) => result?,
            Err(_) => return Err(HubError::Timeout(timeout)),
        };

        *self.shared.connection.lock() = Some(Arc::clone(&conn));
        let reader = tokio::spawn(read_loop(Arc::clone(&self.shared), conn, frames, backlog));
        *self.shared.reader.lock() = Some(reader);
        info!(%conn_id, "hub handshake complete");
        Ok(())
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, HubError> {
        let conn = self.connection()?;
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst).to_string();

        let frame = HubMessage::Invocation {
            invocation_id: Some(id.clone()),
            target: method.to_string(),
            arguments: args,
        };
        let text = frame_text(&frame).map_err(|e| HubError::Invocation {
            method: method.to_string(),
            reason: e.to_string(),
        })?;

        let (reply, rx) = oneshot::channel();
        self.shared.pending.lock().insert(
            id.clone(),
            PendingInvocation {
                method: method.to_string(),
                reply,
            },
        );

        if let Err(e) = conn.send_text(&text).await {
            self.shared.pending.lock().remove(&id);
            debug!(%method, error = %e, "invocation send failed");
            return Err(HubError::Closed);
        }
        trace!(%method, invocation_id = %id, "invocation sent");

        let timeout = self.config.invoke_timeout;
        match time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::Closed),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                Err(HubError::Timeout(timeout))
            }
        }
    }

    async fn stop(&self, timeout: Duration) {
        self.shared.closing.store(true, Ordering::SeqCst);
        let conn = self.shared.connection.lock().take();
        if let Some(conn) = conn {
            match time::timeout(timeout, conn.close()).await {
                Ok(Ok(())) => debug!(conn_id = %conn.id(), "hub connection closed"),
                Ok(Err(e)) => debug!(conn_id = %conn.id(), error = %e, "hub close failed"),
                Err(_) => debug!(conn_id = %conn.id(), "hub close timed out"),
            }
        }
        self.dispose();
    }

    fn dispose(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.connection.lock().take();
        if let Some(reader) = self.shared.reader.lock().take() {
            reader.abort();
        }
        self.shared.fail_pending();
    }
}

impl<C: Connection> Shared<C> {
    /// Routes one frame. Returns `false` when the hub asked to close.
    fn handle_frame(&self, frame: &[u8]) -> bool {
        let message: HubMessage = match JsonCodec.decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "unreadable hub frame skipped");
                return true;
            }
        };

        match message {
            HubMessage::Invocation {
                invocation_id: None,
                target,
                arguments,
            } => {
                let handler = self.handlers.read().get(&target.to_lowercase()).cloned();
                match handler {
                    Some(handler) => handler(arguments),
                    None => trace!(%target, "push without handler dropped"),
                }
            }
            HubMessage::Invocation {
                invocation_id: Some(id),
                target,
                ..
            } => {
                debug!(%target, invocation_id = %id, "server-to-client invocation ignored");
            }
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                let Some(pending) = self.pending.lock().remove(&invocation_id) else {
                    debug!(%invocation_id, "completion for unknown invocation");
                    return true;
                };
                let outcome = match error {
                    Some(reason) => Err(HubError::Invocation {
                        method: pending.method,
                        reason,
                    }),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = pending.reply.send(outcome);
            }
            HubMessage::Ping => trace!("hub ping"),
            HubMessage::Close { error } => {
                info!(error = ?error, "hub sent close");
                return false;
            }
            HubMessage::Unsupported { kind } => debug!(kind, "unsupported hub frame skipped"),
        }
        true
    }

    /// Resolves every pending invocation with `Closed`.
    fn fail_pending(&self) {
        let pending: Vec<_> = self.pending.lock().drain().map(|(_, p)| p).collect();
        for invocation in pending {
            let _ = invocation.reply.send(Err(HubError::Closed));
        }
    }

    fn connection_lost(&self, reason: &str) {
        self.connection.lock().take();
        self.fail_pending();
        if self.closing.load(Ordering::SeqCst) || self.closed_raised.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(%reason, "hub connection lost");
        (self.on_closed)();
    }
}

async fn read_loop<C: Connection>(
    shared: Arc<Shared<C>>,
    conn: Arc<C>,
    mut frames: FrameBuffer,
    backlog: Vec<Vec<u8>>,
) {
    for frame in &backlog {
        if !shared.handle_frame(frame) {
            shared.connection_lost("closed by hub");
            return;
        }
    }

    let reason = 'read: loop {
        match conn.recv().await {
            Ok(Some(bytes)) => {
                let received = match frames.push(&bytes) {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(error = %e, "dropping connection");
                        break e.to_string();
                    }
                };
                for frame in received {
                    if !shared.handle_frame(&frame) {
                        break 'read "closed by hub".to_string();
                    }
                }
            }
            Ok(None) => break "transport closed".to_string(),
            Err(e) => break e.to_string(),
        }
    };
    shared.connection_lost(&reason);
}

fn frame_text<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    let bytes = encode_frame(&JsonCodec, value)?;
    String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
}
