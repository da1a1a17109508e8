//! Unified error type for the chatwire driver.

use chatwire_protocol::{MalformedEvent, ProtocolError};
use chatwire_session::SessionError;
use chatwire_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A transport-level error (connection, method call, subscription).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (timeout, authentication).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A message-stream event that couldn't be decoded. Handed to message
    /// callbacks; the stream keeps running.
    #[error(transparent)]
    MalformedEvent(#[from] MalformedEvent),

    /// A method answered with something other than what the caller needs.
    #[error("unexpected result from {method}: {detail}")]
    UnexpectedResult { method: String, detail: String },
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let driver_err: DriverError = err.into();
        assert!(matches!(driver_err, DriverError::Transport(_)));
        assert!(driver_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let driver_err: DriverError = err.into();
        assert!(matches!(driver_err, DriverError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::Timeout(Duration::from_millis(50));
        let driver_err: DriverError = err.into();
        assert!(matches!(driver_err, DriverError::Session(_)));
    }

    #[test]
    fn test_from_malformed_event() {
        let driver_err: DriverError = MalformedEvent("no args".into()).into();
        assert!(matches!(driver_err, DriverError::MalformedEvent(_)));
        assert!(driver_err.to_string().contains("no args"));
    }
}
