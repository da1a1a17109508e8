//! Transport abstraction layer for chatwire.
//!
//! Provides the [`Transport`] trait: the primitives the driver needs from a
//! realtime connection (open, login, method calls, subscriptions), without
//! tying it to one wire protocol.
//!
//! # Feature Flags
//!
//! - `websocket` (default): DDP over WebSocket via `tokio-tungstenite`
//! - `memory`: an in-process, scriptable transport for tests and offline
//!   development

mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryTransport, MethodCall, OpenBehavior};
#[cfg(feature = "websocket")]
pub use websocket::DdpTransport;

use std::future::Future;

use chatwire_protocol::{Credentials, LoginResult, SubscriptionId};
use serde_json::Value;
use tokio::sync::mpsc;

/// A live subscription handed out by [`Transport::subscribe`].
///
/// `events` yields the `fields` payload of every data event the server
/// publishes for this subscription, in arrival order. The channel closes
/// when the subscription is torn down or the connection drops.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub name: String,
    pub events: mpsc::UnboundedReceiver<Value>,
}

/// A client-side realtime connection.
///
/// Every async method returns a `Send` future so the driver can run them
/// inside spawned tasks (the connect-timeout race depends on that).
///
/// # Trait bounds
///
/// - `Send + Sync` → one transport is shared by every task of a driver.
/// - `'static` → it lives as long as the driver that owns it.
pub trait Transport: Send + Sync + 'static {
    /// Opens the connection to `host` (no scheme, e.g. `chat.example.com`)
    /// and completes the protocol handshake.
    fn open(
        &self,
        host: &str,
        use_ssl: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection. Active subscriptions end with it.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Authenticates the connection.
    ///
    /// # Errors
    /// [`TransportError::LoginRejected`] when the server refuses the
    /// credentials.
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<LoginResult, TransportError>> + Send;

    /// Ends the authenticated session, keeping the connection open.
    fn logout(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Invokes a remote method and waits for its result.
    fn call(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;

    /// Starts a subscription and waits until the server reports it ready.
    fn subscribe(
        &self,
        name: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<Subscription, TransportError>> + Send;

    /// Stops one subscription.
    fn unsubscribe(
        &self,
        id: &SubscriptionId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stops every active subscription.
    ///
    /// Keeps going after a failure and reports the first error at the end,
    /// so one bad subscription can't keep the others alive.
    fn unsubscribe_all(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            let mut first_error = None;
            for id in self.active_subscriptions() {
                if let Err(e) = self.unsubscribe(&id).await {
                    tracing::warn!(%id, error = %e, "unsubscribe failed");
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        }
    }

    /// Returns `true` while the connection is open.
    fn is_connected(&self) -> bool;

    /// Ids of the subscriptions currently active.
    fn active_subscriptions(&self) -> Vec<SubscriptionId>;
}
