//! Codec trait and implementations for serializing/deserializing frames.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The transport doesn't care HOW frames are serialized; it just needs
//! something that implements the [`Codec`] trait. DDP servers speak JSON,
//! so [`JsonCodec`] is the one the WebSocket transport uses.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → safe to share between the reader and writer tasks of
///   a connection, which Tokio may run on different worker threads.
/// - `'static` → the codec owns everything it needs, so it can live inside
///   long-lived async tasks.
///
/// ## Generic methods
///
/// `encode` and `decode` work with any `T` that has the matching serde
/// trait, so one codec handles every [`Frame`](crate::Frame) variant as
/// well as the loose `serde_json::Value` payloads carried inside them:
/// - `encode<T: Serialize>` → T can be turned into bytes
/// - `decode<T: DeserializeOwned>` → T can be built from bytes
///
/// `DeserializeOwned` (vs plain `Deserialize`) means the result owns all
/// its data and doesn't borrow from the input. The WebSocket reader drops
/// each text message as soon as it has been decoded.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// DDP is a JSON protocol: every frame is one JSON object sent as a
/// WebSocket text message, tagged by its `msg` field. Dates travel as
/// EJSON objects (`{"$date": millis}`), which are still plain JSON, so
/// no extension handling is needed at this layer.
///
/// ## Example
///
/// ```rust
/// use chatwire_protocol::{Codec, Frame, JsonCodec};
///
/// let codec = JsonCodec;
///
/// let frame = Frame::Ping { id: Some("p1".into()) };
/// let bytes = codec.encode(&frame).unwrap();
/// assert_eq!(bytes, br#"{"msg":"ping","id":"p1"}"#);
///
/// let decoded: Frame = codec.decode(&bytes).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
