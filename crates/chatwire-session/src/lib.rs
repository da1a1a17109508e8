//! Connection lifecycle for chatwire.
//!
//! This crate owns the driver's one [`Session`] with the chat server:
//!
//! 1. **Connecting**: opening the transport, racing a timeout
//!    ([`ConnectionManager::connect`])
//! 2. **Authentication**: password or LDAP login
//!    ([`ConnectionManager::login`])
//! 3. **Teardown**: logout and disconnect, after a best-effort
//!    unsubscribe of everything still active
//!
//! # How it fits in the stack
//!
//! ```text
//! Driver (above)  ← streams, filters, rooms; asks "who am I?" and "am I connected?"
//!     ↕
//! Session Layer (this crate)  ← connect/login/logout state machine
//!     ↕
//! Transport (below)  ← open, login, call, subscribe
//! ```

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::ConnectionManager;
pub use session::{
    ConnectOptions, ConnectTarget, ConnectionEvent, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, Session,
    SessionConfig, SessionState, strip_protocol,
};
