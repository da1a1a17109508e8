//! The connection manager: one session, driven through its lifecycle.
//!
//! # Concurrency note
//!
//! The session snapshot lives behind a plain `std::sync::Mutex`. It is only
//! ever held for a field update, never across an `.await`, so an async
//! mutex would buy nothing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatwire_protocol::{Credentials, UserId};
use chatwire_transport::{Transport, TransportError};
use tokio::sync::{broadcast, oneshot};

use crate::{
    ConnectOptions, ConnectTarget, ConnectionEvent, Session, SessionConfig, SessionError,
    SessionState,
};

/// Capacity of the lifecycle event channel. Slow listeners see `Lagged`.
const EVENT_CAPACITY: usize = 32;

/// Owns the transport's connection and the logged-in identity.
///
/// ## Lifecycle
///
/// ```text
/// connect() ──→ login() ──→ logout() ──→ disconnect()
///     │            │                          │
///     ▼            ▼                          ▼
/// [Connected]  user_id = Some            [Disconnected]
/// ```
///
/// `login` connects with defaults first if needed, and `disconnect`
/// logs out on the way down.
pub struct ConnectionManager<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    session: Mutex<Session>,
    events: broadcast::Sender<ConnectionEvent>,
    /// Bumped by every connect attempt. A late open only closes the
    /// transport if no newer attempt has started since.
    attempts: Arc<AtomicU64>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            config,
            session: Mutex::new(Session::new()),
            events,
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A snapshot of the current session.
    pub fn session(&self) -> Session {
        self.lock().clone()
    }

    /// The logged-in user, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.lock().user_id.clone()
    }

    /// True when the session is connected and the transport agrees.
    pub fn is_connected(&self) -> bool {
        self.lock().is_connected() && self.transport.is_connected()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    fn emit(&self, event: ConnectionEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }

    // -- Connect -----------------------------------------------------------

    /// Opens the transport, giving up after the resolved timeout.
    ///
    /// The open and the timer race; whichever settles first decides the
    /// outcome, and the loser is ignored. A transport that finishes
    /// opening after the timer fired is closed again, unless a newer
    /// attempt has started in the meantime.
    ///
    /// Dropping the returned future before it settles abandons the
    /// attempt: the state goes back to `Disconnected` and a late open is
    /// treated like one that lost to the timer.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyConnecting`] if another attempt is in flight
    /// - [`SessionError::Timeout`] if the timer wins
    /// - [`SessionError::Transport`] if the open fails
    pub async fn connect(&self, options: ConnectOptions) -> Result<Session, SessionError> {
        let target = ConnectTarget::resolve(&self.config, &options);

        {
            let mut session = self.lock();
            let state = session.state;
            match state {
                SessionState::Connecting => return Err(SessionError::AlreadyConnecting),
                SessionState::Connected if self.transport.is_connected() => {
                    tracing::debug!(host = %target.host, "already connected");
                    return Ok(session.clone());
                }
                _ => session.state = SessionState::Connecting,
            }
        }

        tracing::info!(
            host = %target.host,
            use_ssl = target.use_ssl,
            timeout_ms = target.timeout.as_millis() as u64,
            "connecting"
        );

        let mut pending = PendingConnect {
            session: &self.session,
            settled: Arc::new(AtomicBool::new(false)),
            finished: false,
        };
        let outcome = self.race_open(&target, &pending.settled).await;
        pending.finished = true;

        let snapshot = {
            let mut session = self.lock();
            session.state = match &outcome {
                Ok(()) => SessionState::Connected,
                Err(SessionError::Timeout(_)) => SessionState::TimedOut,
                Err(_) => SessionState::Disconnected,
            };
            session.user_id = None;
            session.clone()
        };

        match outcome {
            Ok(()) => {
                tracing::info!(host = %target.host, "connected");
                self.emit(ConnectionEvent::Connected);
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!(host = %target.host, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Like [`connect`](Self::connect), but also hands the outcome to
    /// `callback` exactly once before returning it.
    pub async fn connect_with_callback<F>(
        &self,
        options: ConnectOptions,
        callback: F,
    ) -> Result<Session, SessionError>
    where
        F: FnOnce(Result<&Session, &SessionError>) + Send,
    {
        let result = self.connect(options).await;
        callback(result.as_ref());
        result
    }

    async fn race_open(
        &self,
        target: &ConnectTarget,
        settled: &Arc<AtomicBool>,
    ) -> Result<(), SessionError> {
        let (result_tx, mut result_rx) = oneshot::channel();
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let transport = Arc::clone(&self.transport);
        let attempts = Arc::clone(&self.attempts);
        let open_settled = Arc::clone(settled);
        let host = target.host.clone();
        let use_ssl = target.use_ssl;
        tokio::spawn(async move {
            let result = transport.open(&host, use_ssl).await;
            if open_settled.swap(true, Ordering::SeqCst) {
                // The timer (or a dropped caller) already settled this attempt.
                if result.is_ok() {
                    if attempts.load(Ordering::SeqCst) != attempt {
                        tracing::debug!(%host, attempt, "late open superseded by a newer attempt");
                    } else {
                        tracing::warn!(%host, attempt, "transport opened after timeout, closing it");
                        if let Err(e) = transport.close().await {
                            tracing::debug!(%host, error = %e, "close after late open failed");
                        }
                    }
                }
                return;
            }
            let _ = result_tx.send(result);
        });

        let raced = tokio::time::timeout(target.timeout, &mut result_rx).await;
        match raced {
            Ok(received) => Self::flatten(received),
            Err(_) => {
                if settled.swap(true, Ordering::SeqCst) {
                    // The open settled first; its result is already on the way.
                    Self::flatten(result_rx.await)
                } else {
                    Err(SessionError::Timeout(target.timeout))
                }
            }
        }
    }

    fn flatten(
        received: Result<Result<(), TransportError>, oneshot::error::RecvError>,
    ) -> Result<(), SessionError> {
        match received {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(TransportError::ConnectionClosed("connect task ended".into()).into()),
        }
    }

    // -- Login / logout ----------------------------------------------------

    /// Authenticates, connecting with default options first if needed.
    ///
    /// `credentials` overrides the configured ones.
    ///
    /// # Errors
    /// - [`SessionError::MissingCredentials`] if neither is available
    /// - [`SessionError::AuthFailed`] if the server rejects them
    pub async fn login(&self, credentials: Option<Credentials>) -> Result<UserId, SessionError> {
        let credentials = credentials
            .or_else(|| self.config.credentials.clone())
            .ok_or(SessionError::MissingCredentials)?;

        if !self.is_connected() {
            self.connect(ConnectOptions::default()).await?;
        }

        tracing::info!(
            username = credentials.username(),
            ldap = credentials.is_ldap(),
            "logging in"
        );

        let result = self
            .transport
            .login(&credentials)
            .await
            .map_err(|e| match e {
                TransportError::LoginRejected(reason) => SessionError::AuthFailed(reason),
                other => SessionError::Transport(other),
            })?;

        self.lock().user_id = Some(result.user_id.clone());
        tracing::info!(user_id = %result.user_id, "logged in");
        self.emit(ConnectionEvent::LoggedIn(result.user_id.clone()));
        Ok(result.user_id)
    }

    /// Drops every subscription (best effort), then logs out.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.unsubscribe_all().await;
        self.transport.logout().await?;

        self.lock().user_id = None;
        tracing::info!("logged out");
        self.emit(ConnectionEvent::LoggedOut);
        Ok(())
    }

    /// Tears the connection down: unsubscribes, logs out if logged in,
    /// then closes the transport. Failures before the close are logged
    /// and skipped.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        tracing::info!("disconnecting");
        self.unsubscribe_all().await;

        let logged_in = self.lock().is_logged_in();
        if logged_in && self.transport.is_connected() {
            match self.transport.logout().await {
                Ok(()) => self.emit(ConnectionEvent::LoggedOut),
                Err(e) => tracing::warn!(error = %e, "logout during disconnect failed"),
            }
        }

        let closed = self.transport.close().await;

        {
            let mut session = self.lock();
            session.state = SessionState::Disconnected;
            session.user_id = None;
        }
        self.emit(ConnectionEvent::Disconnected);

        closed.map_err(SessionError::from)
    }

    async fn unsubscribe_all(&self) {
        if let Err(e) = self.transport.unsubscribe_all().await {
            tracing::warn!(error = %e, "unsubscribe failed, continuing");
        }
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resets an abandoned attempt when the `connect` future is dropped
/// mid-race.
struct PendingConnect<'a> {
    session: &'a Mutex<Session>,
    settled: Arc<AtomicBool>,
    finished: bool,
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.settled.store(true, Ordering::SeqCst);
        let mut session = lock(self.session);
        if session.state == SessionState::Connecting {
            session.state = SessionState::Disconnected;
        }
        tracing::debug!("connect attempt abandoned");
    }
}
