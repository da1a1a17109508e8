use chatwire_protocol::{ProtocolError, SubscriptionId};

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be opened, or the server refused the handshake.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The connection went away while an operation was in flight.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The operation needs an open connection and there is none.
    #[error("not connected")]
    NotConnected,

    /// The server rejected the credentials.
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// A remote method returned an error.
    #[error("method {method} failed: {reason}")]
    MethodFailed { method: String, reason: String },

    /// The server refused or ended a subscription.
    #[error("subscription {name} failed: {reason}")]
    SubscriptionFailed { name: String, reason: String },

    /// Tearing down a subscription failed.
    #[error("unsubscribe {id} failed: {reason}")]
    UnsubscribeFailed { id: SubscriptionId, reason: String },

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
