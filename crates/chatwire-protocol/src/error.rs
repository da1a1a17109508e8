//! Error types for the protocol layer.
//!
//! Each crate in chatwire defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in serialization or in the
//! shape of a frame, not in networking or session state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// or a frame type this client doesn't know.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message passed deserialization but violates protocol rules:
    /// e.g., a method result of the wrong shape.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// A message-stream event that is missing the parts the driver needs.
///
/// Unlike [`ProtocolError`] this is `Clone`: the same decoded event is
/// fanned out to every reactor on the stream, errors included.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed stream event: {0}")]
pub struct MalformedEvent(pub String);
