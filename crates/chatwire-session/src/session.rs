//! Session types: the driver's view of its connection to the server.
//!
//! A session tracks:
//! - WHERE we connect (`SessionConfig`, overridable per call with `ConnectOptions`)
//! - WHAT state the connection is in
//! - WHO we are logged in as, once authenticated

use std::fmt;
use std::time::Duration;

use chatwire_protocol::{Credentials, UserId};

/// Host used when nothing else is configured.
pub const DEFAULT_HOST: &str = "localhost:3000";

/// How long `connect` waits for the transport before giving up.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Defaults for connecting and logging in.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server host, with or without a scheme (`https://chat.example.com`).
    pub host: String,

    /// Use `wss://` rather than `ws://`. Also switched on by an
    /// `https`/`wss` scheme in `host`.
    pub use_ssl: bool,

    /// Upper bound on a single connection attempt.
    pub timeout: Duration,

    /// Used by `login(None)`.
    pub credentials: Option<Credentials>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            use_ssl: false,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            credentials: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectOptions
// ---------------------------------------------------------------------------

/// Per-call overrides for [`ConnectionManager::connect`](crate::ConnectionManager::connect).
/// Anything left as `None` falls back to the [`SessionConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: Option<String>,
    pub use_ssl: Option<bool>,
    pub timeout: Option<Duration>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = Some(use_ssl);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Where a connection attempt actually goes, after merging options
/// over the config and stripping any scheme from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub use_ssl: bool,
    pub timeout: Duration,
}

impl ConnectTarget {
    pub fn resolve(config: &SessionConfig, options: &ConnectOptions) -> Self {
        let raw = options.host.as_deref().unwrap_or(&config.host);
        let (host, scheme) = strip_protocol(raw);
        let secure_scheme = matches!(scheme, Some("https" | "wss"));

        Self {
            host: host.to_string(),
            use_ssl: options.use_ssl.unwrap_or(config.use_ssl || secure_scheme),
            timeout: options.timeout.unwrap_or(config.timeout),
        }
    }
}

/// Splits a leading `scheme://` off `host` and trims trailing slashes.
///
/// ```
/// use chatwire_session::strip_protocol;
///
/// assert_eq!(strip_protocol("https://chat.example.com/"), ("chat.example.com", Some("https")));
/// assert_eq!(strip_protocol("localhost:3000"), ("localhost:3000", None));
/// ```
pub fn strip_protocol(host: &str) -> (&str, Option<&str>) {
    let (rest, scheme) = match host.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            (rest, Some(scheme))
        }
        _ => (host.strip_prefix("//").unwrap_or(host), None),
    };
    (rest.trim_end_matches('/'), scheme)
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where the connection is in its lifecycle.
///
/// ```text
///   Disconnected ──(connect)──→ Connecting ──(open ok)──→ Connected
///        ↑                          │                        │
///        │                     (timer fires)            (disconnect)
///        │                          ▼                        │
///        │                       TimedOut ──(connect)──→ Connecting
///        └───────────────────────────────────────────────────┘
/// ```
///
/// A failed open goes back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    TimedOut,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A snapshot of the connection. Cloned out of the manager, so holding
/// one never blocks the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,

    /// Set by a successful login, cleared by logout and disconnect.
    pub user_id: Option<UserId>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            user_id: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Lifecycle notifications, broadcast to anyone who called
/// [`ConnectionManager::subscribe_events`](crate::ConnectionManager::subscribe_events).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    LoggedIn(UserId),
    LoggedOut,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_protocol_variants() {
        assert_eq!(strip_protocol("http://host:3000"), ("host:3000", Some("http")));
        assert_eq!(strip_protocol("wss://host/"), ("host", Some("wss")));
        assert_eq!(strip_protocol("//host"), ("host", None));
        assert_eq!(strip_protocol("host"), ("host", None));
    }

    #[test]
    fn test_resolve_uses_config_when_no_options() {
        let target = ConnectTarget::resolve(&SessionConfig::default(), &ConnectOptions::new());

        assert_eq!(target.host, "localhost:3000");
        assert!(!target.use_ssl);
        assert_eq!(target.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_resolve_https_scheme_enables_ssl() {
        let options = ConnectOptions::new().host("https://chat.example.com");
        let target = ConnectTarget::resolve(&SessionConfig::default(), &options);

        assert_eq!(target.host, "chat.example.com");
        assert!(target.use_ssl);
    }

    #[test]
    fn test_resolve_explicit_ssl_overrides_scheme() {
        let options = ConnectOptions::new()
            .host("https://chat.example.com")
            .use_ssl(false)
            .timeout(Duration::from_millis(50));
        let target = ConnectTarget::resolve(&SessionConfig::default(), &options);

        assert!(!target.use_ssl);
        assert_eq!(target.timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_new_session_is_disconnected_and_anonymous() {
        let session = Session::new();
        assert_eq!(session.state, SessionState::Disconnected);
        assert!(!session.is_connected());
        assert!(!session.is_logged_in());
    }
}
