//! `RpcBridge`: discrete calls multiplexed over one backend socket.
//!
//! ```text
//!  call() ──┐                          ┌──→ waiter[id=1] (oneshot)
//!  call() ──┼─→ RpcRequest{id} ─→ WS ─→ reader task ─→ waiter[id=2]
//!  call() ──┘                          └──→ waiter[id=3]
//! ```
//!
//! Every call registers a waiter under a fresh correlation id before the
//! request is written. A single reader task owns the receive half and
//! hands each reply to the waiter with the same id, so concurrent calls
//! never resolve each other's replies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use waypost_protocol::{
    CallResult, Codec, JsonCodec, Operation, ProtocolError, RemoteCall,
    RpcReply, RpcRequest,
};
use waypost_transport::{
    Connection, DEFAULT_CONNECT_TIMEOUT, WebSocketConnection,
};

use crate::{BridgeError, Surface};

/// Timeouts applied by the bridge.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Deadline for opening the socket.
    pub connect_timeout: Duration,
    /// Deadline for a reply once a request has been written.
    pub call_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// A waiter receives its reply, or the reason its reply could not be read.
type ReplySlot = oneshot::Sender<Result<RpcReply, ProtocolError>>;

type Waiters = std::sync::Mutex<HashMap<u64, ReplySlot>>;

/// One open socket plus the reader task that drains it.
struct Link {
    conn: Arc<WebSocketConnection>,
    waiters: Arc<Waiters>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl Link {
    fn spawn<C: Codec>(conn: WebSocketConnection, codec: Arc<C>) -> Self {
        let conn = Arc::new(conn);
        let waiters = Arc::new(Waiters::default());
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_replies(
            Arc::clone(&conn),
            Arc::clone(&waiters),
            Arc::clone(&alive),
            codec,
        ));
        Self {
            conn,
            waiters,
            alive,
            reader,
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Marks the link unusable and fails every outstanding waiter.
    fn shut(&self) {
        self.alive.store(false, Ordering::SeqCst);
        lock(&self.waiters).clear();
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a call's waiter when the call finishes, however it finishes
/// (reply, timeout, send error, or the caller dropping the future).
struct PendingCall<'a> {
    link: &'a Link,
    id: u64,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        lock(&self.link.waiters).remove(&self.id);
    }
}

fn lock(waiters: &Waiters) -> MutexGuard<'_, HashMap<u64, ReplySlot>> {
    waiters.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reader task: routes replies to waiters until the socket ends.
async fn read_replies<C: Codec>(
    conn: Arc<WebSocketConnection>,
    waiters: Arc<Waiters>,
    alive: Arc<AtomicBool>,
    codec: Arc<C>,
) {
    let conn_id = conn.id();
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "backend closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "backend read failed");
                break;
            }
        };

        let (id, reply) = match codec.decode::<RpcReply>(&data) {
            Ok(reply) => (reply.id, Ok(reply)),
            Err(e) => match reply_id(codec.as_ref(), &data) {
                // Fail the call now rather than letting it run into the deadline.
                Some(id) => {
                    tracing::warn!(%conn_id, id, error = %e, "malformed reply");
                    (id, Err(e))
                }
                None => {
                    tracing::debug!(%conn_id, error = %e, "undecodable backend frame");
                    continue;
                }
            },
        };

        let waiter = lock(&waiters).remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => {
                tracing::debug!(%conn_id, id, "reply for abandoned call");
            }
        }
    }

    // Order matters: callers check `alive` after registering, so anyone
    // registering after the clear below sees the flag already down.
    alive.store(false, Ordering::SeqCst);
    lock(&waiters).clear();
}

/// The correlation id of a frame that failed to decode as a reply.
fn reply_id<C: Codec>(codec: &C, data: &[u8]) -> Option<u64> {
    codec
        .decode::<Value>(data)
        .ok()?
        .get("id")
        .and_then(Value::as_u64)
}

/// Exposes a declared set of backend operations as async calls over a
/// single persistent WebSocket.
///
/// The socket is opened lazily on the first call and reopened on the next
/// call after it drops. The bridge never retries: one failure, one error.
pub struct RpcBridge<C: Codec = JsonCodec> {
    url: String,
    surface: Surface,
    options: BridgeOptions,
    codec: Arc<C>,
    /// Held across connect so concurrent first calls open one socket.
    link: Mutex<Option<Arc<Link>>>,
    next_id: AtomicU64,
}

impl RpcBridge<JsonCodec> {
    /// Creates a bridge speaking JSON to `url`.
    pub fn new(
        url: impl Into<String>,
        surface: Surface,
        options: BridgeOptions,
    ) -> Self {
        Self::with_codec(url, surface, options, JsonCodec)
    }
}

impl<C: Codec> RpcBridge<C> {
    pub fn with_codec(
        url: impl Into<String>,
        surface: Surface,
        options: BridgeOptions,
        codec: C,
    ) -> Self {
        let url = url.into();
        tracing::info!(
            backend = %url,
            operations = surface.operations().len(),
            "RPC bridge configured"
        );
        tracing::debug!(surface = ?surface.describe(), "declared operations");
        Self {
            url,
            surface,
            options,
            codec: Arc::new(codec),
            link: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolves a route to a declared operation without touching the socket.
    pub fn resolve(&self, domain: &str, method: &str) -> Option<Operation> {
        self.surface.resolve(domain, method)
    }

    /// Whether a live socket is currently open.
    pub async fn is_connected(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .is_some_and(|link| link.is_alive())
    }

    /// Calls a typed operation.
    pub async fn call_typed<R: RemoteCall>(
        &self,
        request: &R::Request,
    ) -> Result<CallResult, BridgeError> {
        let params = R::params(request)?;
        self.call(R::OPERATION, params).await
    }

    /// Sends one call and waits for its correlated reply.
    ///
    /// Opens the socket first if needed.
    ///
    /// # Errors
    /// - [`BridgeError::NotDeclared`] — `operation` is outside the surface
    /// - [`BridgeError::Connect`] / [`BridgeError::Send`] /
    ///   [`BridgeError::Disconnected`] / [`BridgeError::Timeout`] — the
    ///   backend could not be reached or did not answer
    pub async fn call(
        &self,
        operation: Operation,
        params: Vec<Value>,
    ) -> Result<CallResult, BridgeError> {
        if !self.surface.contains(operation) {
            return Err(BridgeError::NotDeclared(operation));
        }

        let link = self.live_link().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            id,
            method: operation.to_string(),
            params,
        };
        let bytes = self.codec.encode(&request)?;

        let (tx, rx) = oneshot::channel();
        lock(&link.waiters).insert(id, tx);
        let _pending = PendingCall { link: &link, id };
        if !link.is_alive() {
            return Err(BridgeError::Disconnected);
        }

        if let Err(e) = link.conn.send(&bytes).await {
            link.shut();
            return Err(BridgeError::Send(e));
        }
        tracing::debug!(id, %operation, conn_id = %link.conn.id(), "call sent");

        match tokio::time::timeout(self.options.call_timeout, rx).await {
            Ok(Ok(reply)) => {
                let result = reply?.into_result()?;
                tracing::debug!(id, %operation, status = %result.status, "call answered");
                Ok(result)
            }
            Ok(Err(_)) => Err(BridgeError::Disconnected),
            Err(_) => {
                tracing::warn!(id, %operation, "call timed out");
                Err(BridgeError::Timeout(self.options.call_timeout))
            }
        }
    }

    /// Closes the socket. Outstanding calls fail with
    /// [`BridgeError::Disconnected`]; the next call reconnects.
    pub async fn close(&self) {
        let link = self.link.lock().await.take();
        if let Some(link) = link {
            link.shut();
            if let Err(e) = link.conn.close().await {
                tracing::debug!(error = %e, "error closing backend socket");
            }
            tracing::info!(conn_id = %link.conn.id(), "backend link closed");
        }
    }

    /// Returns the live link, connecting if there is none.
    async fn live_link(&self) -> Result<Arc<Link>, BridgeError> {
        let mut slot = self.link.lock().await;
        if let Some(link) = slot.as_ref() {
            if link.is_alive() {
                return Ok(Arc::clone(link));
            }
            tracing::debug!(conn_id = %link.conn.id(), "discarding dead backend link");
        }
        *slot = None;

        let conn = WebSocketConnection::connect(
            &self.url,
            self.options.connect_timeout,
        )
        .await
        .map_err(|e| {
            tracing::warn!(backend = %self.url, error = %e, "backend connect failed");
            BridgeError::Connect(e)
        })?;
        tracing::info!(backend = %self.url, conn_id = %conn.id(), "backend link open");

        let link = Arc::new(Link::spawn(conn, Arc::clone(&self.codec)));
        *slot = Some(Arc::clone(&link));
        Ok(link)
    }
}
