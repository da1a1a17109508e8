//! DDP over WebSocket, using `tokio-tungstenite`.
//!
//! One connection runs two background tasks:
//!
//! ```text
//!            ┌──────────── writer task ◄── outbound mpsc ◄── send_frame()
//! socket ────┤
//!            └──────────── reader task ──► handle_frame() ──► pending calls
//!                                                          ├─► pending subs
//!                                                          └─► subscription events
//! ```
//!
//! Callers never touch the socket directly. A method call registers a
//! `oneshot` under its id, queues a frame, and waits; the reader task
//! completes the `oneshot` when the matching `result` frame arrives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatwire_protocol::{
    Codec, Credentials, Frame, JsonCodec, LoginResult, ProtocolError, SubscriptionId,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::{Subscription, Transport, TransportError};

type CallReply = oneshot::Sender<Result<Value, TransportError>>;
type SubReply = oneshot::Sender<Result<(), TransportError>>;

/// Locks a std mutex, recovering the data if a panicking thread poisoned it.
///
/// These locks only guard map inserts/removes and are never held across
/// an `.await`.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ActiveSubscription {
    name: String,
    events: mpsc::UnboundedSender<Value>,
}

/// State shared between the transport handle and its reader task.
#[derive(Default)]
struct Shared {
    codec: JsonCodec,
    connected: AtomicBool,
    next_method_id: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    handshake: Mutex<Option<oneshot::Sender<Result<String, TransportError>>>>,
    pending_calls: Mutex<HashMap<String, (String, CallReply)>>,
    pending_subs: Mutex<HashMap<String, (String, SubReply)>>,
    subscriptions: Mutex<HashMap<SubscriptionId, ActiveSubscription>>,
}

impl Shared {
    fn send_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        let bytes = self.codec.encode(frame)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
        let outbound = lock(&self.outbound);
        let tx = outbound.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(WsMessage::Text(text.into()))
            .map_err(|_| TransportError::ConnectionClosed("writer task stopped".into()))
    }

    fn handle_frame(&self, data: &[u8]) {
        let frame: Frame = match self.codec.decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::trace!(error = %e, "ignoring undecodable frame");
                return;
            }
        };

        match frame {
            Frame::Connected { session } => {
                if let Some(tx) = lock(&self.handshake).take() {
                    let _ = tx.send(Ok(session));
                }
            }
            Frame::Failed { version } => {
                if let Some(tx) = lock(&self.handshake).take() {
                    let _ = tx.send(Err(TransportError::ConnectFailed(format!(
                        "server requires DDP version {version}"
                    ))));
                }
            }
            Frame::Ping { id } => {
                if let Err(e) = self.send_frame(&Frame::Pong { id }) {
                    tracing::debug!(error = %e, "failed to answer ping");
                }
            }
            Frame::Result { id, result, error } => {
                let Some((method, reply)) = lock(&self.pending_calls).remove(&id) else {
                    tracing::debug!(%id, "result for unknown method call");
                    return;
                };
                let outcome = match error {
                    Some(err) => Err(TransportError::MethodFailed {
                        method,
                        reason: err.describe(),
                    }),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = reply.send(outcome);
            }
            Frame::Ready { subs } => {
                let mut pending = lock(&self.pending_subs);
                for id in subs {
                    if let Some((_, reply)) = pending.remove(&id) {
                        let _ = reply.send(Ok(()));
                    }
                }
            }
            Frame::Nosub { id, error } => {
                let reason = error
                    .map(|e| e.describe())
                    .unwrap_or_else(|| "stopped by server".into());
                lock(&self.subscriptions).remove(&SubscriptionId::new(id.clone()));
                if let Some((name, reply)) = lock(&self.pending_subs).remove(&id) {
                    let _ = reply.send(Err(TransportError::SubscriptionFailed { name, reason }));
                } else {
                    tracing::info!(%id, %reason, "subscription ended by server");
                }
            }
            Frame::Changed {
                collection,
                fields: Some(fields),
                ..
            } => {
                let subscriptions = lock(&self.subscriptions);
                for sub in subscriptions.values().filter(|s| s.name == collection) {
                    let _ = sub.events.send(fields.clone());
                }
            }
            Frame::Error { reason, .. } => {
                tracing::warn!(%reason, "server reported a protocol error");
            }
            other => {
                tracing::trace!(frame = ?other, "unhandled frame");
            }
        }
    }

    /// Fails everything in flight. Called once the socket is gone.
    fn on_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
        lock(&self.outbound).take();

        if let Some(tx) = lock(&self.handshake).take() {
            let _ = tx.send(Err(TransportError::ConnectionClosed(
                "closed during handshake".into(),
            )));
        }
        for (_, (_, reply)) in lock(&self.pending_calls).drain() {
            let _ = reply.send(Err(TransportError::ConnectionClosed(
                "closed before result".into(),
            )));
        }
        for (_, (_, reply)) in lock(&self.pending_subs).drain() {
            let _ = reply.send(Err(TransportError::ConnectionClosed(
                "closed before ready".into(),
            )));
        }
        // Dropping the senders ends every subscription's event stream.
        lock(&self.subscriptions).clear();
    }
}

struct ConnectionTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// A DDP client connection over WebSocket.
///
/// Connects to `ws[s]://{host}/websocket`, the endpoint Meteor-based chat
/// servers expose.
#[derive(Default)]
pub struct DdpTransport {
    shared: Arc<Shared>,
    tasks: Mutex<Option<ConnectionTasks>>,
}

impl DdpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn abort_tasks(&self) {
        if let Some(tasks) = lock(&self.tasks).take() {
            tasks.reader.abort();
            // The writer exits on its own once `outbound` is dropped,
            // flushing a close frame on the way out.
            drop(tasks.writer);
        }
    }
}

impl Transport for DdpTransport {
    async fn open(&self, host: &str, use_ssl: bool) -> Result<(), TransportError> {
        let scheme = if use_ssl { "wss" } else { "ws" };
        let url = format!("{scheme}://{host}/websocket");

        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        tracing::debug!(%url, "WebSocket connected, starting DDP handshake");

        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (handshake_tx, handshake_rx) = oneshot::channel();
        *lock(&self.shared.outbound) = Some(outbound_tx);
        *lock(&self.shared.handshake) = Some(handshake_tx);

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    tracing::debug!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let shared = Arc::clone(&self.shared);
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => shared.handle_frame(text.as_bytes()),
                    Ok(WsMessage::Binary(data)) => shared.handle_frame(&data),
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue, // skip ping/pong/frame
                    Err(e) => {
                        tracing::debug!(error = %e, "WebSocket receive failed");
                        break;
                    }
                }
            }
            tracing::info!("DDP connection closed");
            shared.on_closed();
        });

        *lock(&self.tasks) = Some(ConnectionTasks { reader, writer });

        self.shared.send_frame(&Frame::connect())?;
        match handshake_rx.await {
            Ok(Ok(session)) => {
                self.shared.connected.store(true, Ordering::SeqCst);
                tracing::info!(%host, %session, "DDP session established");
                Ok(())
            }
            Ok(Err(e)) => {
                self.abort_tasks();
                self.shared.on_closed();
                Err(e)
            }
            Err(_) => {
                self.abort_tasks();
                self.shared.on_closed();
                Err(TransportError::ConnectionClosed("closed during handshake".into()))
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shared.on_closed();
        self.abort_tasks();
        Ok(())
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResult, TransportError> {
        let result = self
            .call("login", vec![credentials.login_params()])
            .await
            .map_err(|e| match e {
                TransportError::MethodFailed { reason, .. } => TransportError::LoginRejected(reason),
                other => other,
            })?;
        serde_json::from_value(result).map_err(|e| ProtocolError::Decode(e).into())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.call("logout", Vec::new()).await.map(|_| ())
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let id = self
            .shared
            .next_method_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.shared.pending_calls).insert(id.clone(), (method.to_string(), reply_tx));

        let frame = Frame::Method {
            method: method.to_string(),
            params,
            id: id.clone(),
        };
        if let Err(e) = self.shared.send_frame(&frame) {
            lock(&self.shared.pending_calls).remove(&id);
            return Err(e);
        }
        tracing::trace!(method, %id, "method call sent");

        reply_rx
            .await
            .map_err(|_| TransportError::ConnectionClosed("closed before result".into()))?
    }

    async fn subscribe(&self, name: &str, params: Vec<Value>) -> Result<Subscription, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let id = SubscriptionId::random();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        lock(&self.shared.pending_subs).insert(id.to_string(), (name.to_string(), ready_tx));
        lock(&self.shared.subscriptions).insert(
            id.clone(),
            ActiveSubscription {
                name: name.to_string(),
                events: events_tx,
            },
        );

        let frame = Frame::Sub {
            id: id.to_string(),
            name: name.to_string(),
            params,
        };
        let ready = match self.shared.send_frame(&frame) {
            Ok(()) => ready_rx
                .await
                .unwrap_or_else(|_| Err(TransportError::ConnectionClosed("closed before ready".into()))),
            Err(e) => Err(e),
        };

        if let Err(e) = ready {
            lock(&self.shared.pending_subs).remove(id.as_str());
            lock(&self.shared.subscriptions).remove(&id);
            return Err(e);
        }

        tracing::debug!(%id, name, "subscription ready");
        Ok(Subscription {
            id,
            name: name.to_string(),
            events: events_rx,
        })
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), TransportError> {
        if lock(&self.shared.subscriptions).remove(id).is_none() {
            tracing::debug!(%id, "unsubscribe for unknown subscription");
            return Ok(());
        }
        if self.is_connected() {
            self.shared.send_frame(&Frame::Unsub { id: id.to_string() })?;
        }
        tracing::debug!(%id, "unsubscribed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn active_subscriptions(&self) -> Vec<SubscriptionId> {
        lock(&self.shared.subscriptions).keys().cloned().collect()
    }
}
