//! Error types for the session layer.

use std::time::Duration;

use chatwire_transport::TransportError;

/// Errors that can occur while connecting, logging in or out.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport didn't open within the connect timeout.
    /// Only the in-flight attempt fails; a new `connect` may be tried.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// The server rejected the credentials. The session stays logged out.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// `login` was called without credentials and none are configured.
    #[error("no credentials given or configured")]
    MissingCredentials,

    /// Another `connect` is already in flight.
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,

    /// Any other transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
