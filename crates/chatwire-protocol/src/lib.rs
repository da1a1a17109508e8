//! Wire-level types for chatwire.
//!
//! This crate defines the "language" the driver and the chat server speak:
//!
//! - **Types** ([`Message`], [`MessageMeta`], [`RoomId`], [`Credentials`],
//!   etc.): the chat objects that arrive on the message stream or are sent
//!   through method calls.
//! - **Frames** ([`Frame`]): the DDP envelope every realtime message
//!   travels in.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are converted
//!   to/from bytes.
//! - **Errors** ([`ProtocolError`], [`MalformedEvent`]): what can go wrong
//!   during encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits below the transport (sockets) and the driver
//! (sessions, rooms, filters). It doesn't know about connections; it only
//! knows how to describe and (de)serialize what travels over them.
//!
//! ```text
//! Transport (frames) → Protocol (Message, MessageMeta) → Driver (filters, rooms)
//! ```

mod codec;
mod error;
mod frame;
mod stream;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::{MalformedEvent, ProtocolError};
pub use frame::{DDP_VERSION, DdpError, Frame};
pub use stream::{
    MESSAGE_STREAM, MY_MESSAGES_EVENT, decode_stream_event, message_stream_params,
};
pub use types::{
    Credentials, IncomingMessage, LoginResult, Message, MessageId,
    MessageMeta, OutgoingMessage, RoomId, RoomType, Sender, SubscriptionId,
    Timestamp, UserId,
};
