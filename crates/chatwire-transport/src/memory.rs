//! An in-process transport with scripted behavior.
//!
//! `MemoryTransport` never touches the network. Tests (and offline demos)
//! script it up front (which users exist, what each method returns, how
//! long opening takes), then drive the code under test and inspect what
//! it did through the call log and counters.
//!
//! ```rust
//! use chatwire_transport::{MemoryTransport, Transport};
//! use serde_json::json;
//!
//! # tokio_test_block_on(async {
//! let transport = MemoryTransport::new()
//!     .with_method("getRoomIdByNameOrId", |_| Ok(json!("GENERAL")));
//! transport.open("localhost:3000", false).await.unwrap();
//!
//! let id = transport.call("getRoomIdByNameOrId", vec![json!("general")]).await.unwrap();
//! assert_eq!(id, json!("GENERAL"));
//! assert_eq!(transport.call_count("getRoomIdByNameOrId"), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chatwire_protocol::{Credentials, LoginResult, SubscriptionId, UserId};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{Subscription, Transport, TransportError};

/// A scripted method implementation.
type MethodHandler = Arc<dyn Fn(&[Value]) -> Result<Value, TransportError> + Send + Sync>;

/// How [`Transport::open`] behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenBehavior {
    /// Opens at once.
    Immediate,
    /// Opens after the given delay.
    Delay(Duration),
    /// Never finishes opening.
    Never,
    /// Fails with [`TransportError::ConnectFailed`].
    Fail(String),
}

/// One recorded method call.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub params: Vec<Value>,
}

struct MemorySubscription {
    name: String,
    events: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
struct Counters {
    opens: usize,
    closes: usize,
    logins: usize,
    logouts: usize,
    subscribes: usize,
    unsubscribes: usize,
}

struct MemoryState {
    open_behavior: OpenBehavior,
    call_delay: Option<Duration>,
    users: HashMap<String, (String, UserId)>,
    methods: HashMap<String, MethodHandler>,
    calls: Vec<MethodCall>,
    subscriptions: HashMap<SubscriptionId, MemorySubscription>,
    next_subscription: u64,
    fail_unsubscribe: bool,
    last_host: Option<String>,
    last_login: Option<Credentials>,
    counters: Counters,
}

/// A [`Transport`] that lives entirely in memory.
pub struct MemoryTransport {
    connected: AtomicBool,
    state: Mutex<MemoryState>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// A transport that opens immediately and knows no users or methods.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            state: Mutex::new(MemoryState {
                open_behavior: OpenBehavior::Immediate,
                call_delay: None,
                users: HashMap::new(),
                methods: HashMap::new(),
                calls: Vec::new(),
                subscriptions: HashMap::new(),
                next_subscription: 1,
                fail_unsubscribe: false,
                last_host: None,
                last_login: None,
                counters: Counters::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Scripting ---------------------------------------------------------

    pub fn with_open(self, behavior: OpenBehavior) -> Self {
        self.set_open(behavior);
        self
    }

    /// Changes how later opens behave. Opens already underway keep theirs.
    pub fn set_open(&self, behavior: OpenBehavior) {
        self.state().open_behavior = behavior;
    }

    /// Makes every method call take `delay` before answering.
    pub fn with_call_delay(self, delay: Duration) -> Self {
        self.state().call_delay = Some(delay);
        self
    }

    /// Registers an account that [`Transport::login`] accepts.
    pub fn with_user(self, username: &str, password: &str, user_id: &str) -> Self {
        self.state().users.insert(
            username.to_string(),
            (password.to_string(), UserId::from(user_id)),
        );
        self
    }

    /// Scripts the result of a remote method.
    pub fn with_method<F>(self, method: &str, handler: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        self.set_method(method, handler);
        self
    }

    /// Like [`with_method`](Self::with_method), for an already shared transport.
    pub fn set_method<F>(&self, method: &str, handler: F)
    where
        F: Fn(&[Value]) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        self.state()
            .methods
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Makes every unsubscribe fail.
    pub fn set_fail_unsubscribe(&self, fail: bool) {
        self.state().fail_unsubscribe = fail;
    }

    /// Pushes an event to every active subscription named `name`.
    ///
    /// Returns how many subscriptions received it.
    pub fn emit(&self, name: &str, fields: Value) -> usize {
        let state = self.state();
        state
            .subscriptions
            .values()
            .filter(|sub| sub.name == name)
            .filter(|sub| sub.events.send(fields.clone()).is_ok())
            .count()
    }

    // -- Inspection --------------------------------------------------------

    /// Every method call made so far, in order.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().calls.clone()
    }

    /// How many times `method` was called.
    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// The host passed to the most recent `open`.
    pub fn last_host(&self) -> Option<String> {
        self.state().last_host.clone()
    }

    /// The credentials of the most recent login attempt.
    pub fn last_login(&self) -> Option<Credentials> {
        self.state().last_login.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state().counters.opens
    }

    pub fn close_count(&self) -> usize {
        self.state().counters.closes
    }

    pub fn login_count(&self) -> usize {
        self.state().counters.logins
    }

    pub fn logout_count(&self) -> usize {
        self.state().counters.logouts
    }

    pub fn subscribe_count(&self) -> usize {
        self.state().counters.subscribes
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.state().counters.unsubscribes
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl Transport for MemoryTransport {
    async fn open(&self, host: &str, _use_ssl: bool) -> Result<(), TransportError> {
        let behavior = {
            let mut state = self.state();
            state.counters.opens += 1;
            state.last_host = Some(host.to_string());
            state.open_behavior.clone()
        };

        match behavior {
            OpenBehavior::Immediate => {}
            OpenBehavior::Delay(delay) => tokio::time::sleep(delay).await,
            OpenBehavior::Never => std::future::pending::<()>().await,
            OpenBehavior::Fail(reason) => return Err(TransportError::ConnectFailed(reason)),
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(host, "memory transport opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        let mut state = self.state();
        state.counters.closes += 1;
        state.subscriptions.clear();
        Ok(())
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResult, TransportError> {
        self.ensure_connected()?;
        let mut state = self.state();
        state.counters.logins += 1;
        state.last_login = Some(credentials.clone());

        let (expected, user_id) = state
            .users
            .get(credentials.username())
            .cloned()
            .ok_or_else(|| TransportError::LoginRejected("User not found".into()))?;

        let password = match credentials {
            Credentials::Password { password, .. } | Credentials::Ldap { password, .. } => password,
        };
        if *password != expected {
            return Err(TransportError::LoginRejected("Incorrect password".into()));
        }

        Ok(LoginResult {
            user_id,
            token: Some(format!("token-{}", state.counters.logins)),
        })
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.state().counters.logouts += 1;
        Ok(())
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        self.ensure_connected()?;
        let (handler, delay) = {
            let mut state = self.state();
            state.calls.push(MethodCall {
                method: method.to_string(),
                params: params.clone(),
            });
            (state.methods.get(method).cloned(), state.call_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match handler {
            Some(handler) => handler(&params),
            None => Err(TransportError::MethodFailed {
                method: method.to_string(),
                reason: "method not found".into(),
            }),
        }
    }

    async fn subscribe(&self, name: &str, _params: Vec<Value>) -> Result<Subscription, TransportError> {
        self.ensure_connected()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        let id = SubscriptionId::new(format!("sub-{}", state.next_subscription));
        state.next_subscription += 1;
        state.counters.subscribes += 1;
        state.subscriptions.insert(
            id.clone(),
            MemorySubscription {
                name: name.to_string(),
                events: events_tx,
            },
        );
        Ok(Subscription {
            id,
            name: name.to_string(),
            events: events_rx,
        })
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), TransportError> {
        let mut state = self.state();
        state.counters.unsubscribes += 1;
        if state.fail_unsubscribe {
            return Err(TransportError::UnsubscribeFailed {
                id: id.clone(),
                reason: "scripted failure".into(),
            });
        }
        state.subscriptions.remove(id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn active_subscriptions(&self) -> Vec<SubscriptionId> {
        self.state().subscriptions.keys().cloned().collect()
    }
}
