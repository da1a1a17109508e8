//! The driver: one connection, its caches, rooms and message stream.

use std::sync::Arc;

use chatwire_cache::MethodCache;
use chatwire_protocol::{Credentials, MESSAGE_STREAM, SubscriptionId, UserId, message_stream_params};
use chatwire_session::{ConnectOptions, ConnectionEvent, ConnectionManager, Session, SessionError};
use chatwire_transport::{Subscription, Transport};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};

use crate::messaging::{CREATE_DIRECT_MESSAGE, GET_ROOM_ID, GET_ROOM_NAME};
use crate::{DriverConfig, DriverError, MessageReceiver, MessageStream, RoomMembership};

/// Shared driver state. Every `Driver` clone points at the same one.
pub(crate) struct DriverInner<T: Transport> {
    pub(crate) config: DriverConfig,
    pub(crate) session: ConnectionManager<T>,
    pub(crate) cache: Mutex<MethodCache>,
    pub(crate) membership: Mutex<RoomMembership>,
    /// The message-stream slot. Held across the subscribe call so
    /// concurrent callers end up sharing one subscription.
    pub(crate) messages: Mutex<Option<Arc<MessageStream>>>,
}

/// A client for one chat server.
///
/// Cheap to clone; clones share the connection and all state.
///
/// ```rust,no_run
/// use chatwire::prelude::*;
///
/// # async fn run() -> Result<(), DriverError> {
/// let driver = Driver::new(DdpTransport::new(), DriverConfig::from_env());
/// driver.login(None).await?;
/// driver.send_to_room("hello", "general").await?;
/// # Ok(())
/// # }
/// ```
pub struct Driver<T: Transport> {
    pub(crate) inner: Arc<DriverInner<T>>,
}

impl<T: Transport> Clone for Driver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> Driver<T> {
    /// Creates a driver over `transport`. Nothing is connected yet.
    ///
    /// Room lookups and direct-message lookups are cached with the
    /// configured settings.
    pub fn new(transport: T, config: DriverConfig) -> Self {
        let mut cache = MethodCache::new();
        cache.create(GET_ROOM_ID, config.room_cache);
        cache.create(GET_ROOM_NAME, config.room_cache);
        cache.create(CREATE_DIRECT_MESSAGE, config.dm_cache);

        let session = ConnectionManager::new(Arc::new(transport), config.session_config());

        Self {
            inner: Arc::new(DriverInner {
                config,
                session,
                cache: Mutex::new(cache),
                membership: Mutex::new(RoomMembership::new()),
                messages: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Arc<T> {
        self.inner.session.transport()
    }

    pub fn session(&self) -> Session {
        self.inner.session.session()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.inner.session.user_id()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    /// Lifecycle notifications: connected, logged in, logged out, disconnected.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.session.subscribe_events()
    }

    // -- Lifecycle ---------------------------------------------------------

    pub async fn connect(&self, options: ConnectOptions) -> Result<Session, DriverError> {
        Ok(self.inner.session.connect(options).await?)
    }

    /// Connects and reports the outcome to `callback` as well as returning it.
    pub async fn connect_with_callback<F>(
        &self,
        options: ConnectOptions,
        callback: F,
    ) -> Result<Session, DriverError>
    where
        F: FnOnce(Result<&Session, &SessionError>) + Send,
    {
        Ok(self
            .inner
            .session
            .connect_with_callback(options, callback)
            .await?)
    }

    /// Logs in with `credentials`, or the configured ones when `None`.
    /// Connects with default options first if necessary.
    pub async fn login(&self, credentials: Option<Credentials>) -> Result<UserId, DriverError> {
        Ok(self.inner.session.login(credentials).await?)
    }

    pub async fn logout(&self) -> Result<(), DriverError> {
        self.clear_message_stream().await;
        Ok(self.inner.session.logout().await?)
    }

    pub async fn disconnect(&self) -> Result<(), DriverError> {
        self.clear_message_stream().await;
        Ok(self.inner.session.disconnect().await?)
    }

    // -- Method calls ------------------------------------------------------

    /// Calls a server method.
    ///
    /// When `method` has a cache and `params` is exactly one string, a live
    /// cached result is returned without touching the transport, and a
    /// successful call is stored. Anything else always goes to the server.
    pub async fn call_method(&self, method: &str, params: Vec<Value>) -> Result<Value, DriverError> {
        let cache_key = match params.as_slice() {
            [Value::String(key)] => {
                let mut cache = self.inner.cache.lock().await;
                if !cache.has(method) {
                    None
                } else if let Some(hit) = cache.get(method, key) {
                    return Ok(hit);
                } else {
                    Some(key.clone())
                }
            }
            _ => None,
        };

        tracing::debug!(method, "calling method");
        let result = self.transport().call(method, params).await?;

        if let Some(key) = cache_key {
            self.inner.cache.lock().await.insert(method, &key, result.clone());
        }
        Ok(result)
    }

    /// Drops cached results: one key, or all of `method` when `key` is `None`.
    pub async fn reset_cache(&self, method: &str, key: Option<&str>) {
        self.inner.cache.lock().await.reset(method, key);
    }

    pub async fn reset_all_caches(&self) {
        self.inner.cache.lock().await.reset_all();
    }

    // -- Subscriptions -----------------------------------------------------

    /// Opens an arbitrary subscription. The caller owns its events.
    pub async fn subscribe(&self, name: &str, params: Vec<Value>) -> Result<Subscription, DriverError> {
        let subscription = self.transport().subscribe(name, params).await?;
        tracing::info!(name, id = %subscription.id, "subscribed");
        Ok(subscription)
    }

    /// Returns the message stream, subscribing first if there is none.
    ///
    /// A stream the transport no longer carries (its connection dropped
    /// and was opened again, say) counts as none: it is stopped and
    /// replaced, since subscription ids don't survive a reconnect.
    pub async fn subscribe_to_messages(&self) -> Result<Arc<MessageStream>, DriverError> {
        let mut slot = self.inner.messages.lock().await;
        if let Some(stream) = slot.take() {
            if self.carries(&stream) {
                *slot = Some(Arc::clone(&stream));
                return Ok(stream);
            }
            tracing::info!(id = %stream.id(), "message stream went stale, resubscribing");
            stream.stop();
        }

        let subscription = self
            .transport()
            .subscribe(MESSAGE_STREAM, message_stream_params())
            .await?;
        tracing::info!(id = %subscription.id, "subscribed to message stream");

        let stream = MessageStream::start(subscription);
        *slot = Some(Arc::clone(&stream));
        Ok(stream)
    }

    /// Tears the message stream down. The next
    /// [`subscribe_to_messages`](Self::subscribe_to_messages) starts a new one.
    pub async fn unsubscribe_from_messages(&self) -> Result<(), DriverError> {
        let Some(stream) = self.inner.messages.lock().await.take() else {
            return Ok(());
        };
        stream.stop();
        self.transport().unsubscribe(stream.id()).await?;
        tracing::info!(id = %stream.id(), "unsubscribed from message stream");
        Ok(())
    }

    /// Cancels a subscription by id. Cancelling the message stream this way
    /// also clears it.
    pub async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), DriverError> {
        {
            let mut slot = self.inner.messages.lock().await;
            if slot.as_ref().is_some_and(|stream| stream.id() == id) {
                if let Some(stream) = slot.take() {
                    stream.stop();
                }
            }
        }
        self.transport().unsubscribe(id).await?;
        Ok(())
    }

    /// Registers a raw reactor on the message stream, subscribing if needed.
    /// Events arrive unfiltered.
    pub async fn react_to_messages(&self) -> Result<MessageReceiver, DriverError> {
        Ok(self.subscribe_to_messages().await?.react())
    }

    fn carries(&self, stream: &MessageStream) -> bool {
        stream.is_live() && self.transport().active_subscriptions().contains(stream.id())
    }

    async fn clear_message_stream(&self) {
        if let Some(stream) = self.inner.messages.lock().await.take() {
            stream.stop();
        }
    }
}
