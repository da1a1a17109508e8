//! Decoding of message-stream events.
//!
//! The server pushes every message visible to the logged-in user on one
//! subscription. Each event's `fields` look like:
//!
//! ```text
//! { "eventName": "__my_messages__", "args": [ <message>, <meta> ] }
//! ```

use serde::Deserialize;
use serde_json::{Value, json};

use crate::{IncomingMessage, MalformedEvent, Message, MessageMeta};

/// Name of the subscription (and collection) that carries message events.
pub const MESSAGE_STREAM: &str = "stream-room-messages";

/// Stream event name that selects "all messages for me".
pub const MY_MESSAGES_EVENT: &str = "__my_messages__";

/// Subscription parameters for the user's private message stream.
pub fn message_stream_params() -> Vec<Value> {
    vec![json!(MY_MESSAGES_EVENT), json!(false)]
}

/// Extracts the message and its metadata from a stream event's `fields`.
///
/// # Errors
/// Returns [`MalformedEvent`] if the event carries no arguments, or if the
/// message lacks an id, room, sender or timestamp, or the metadata lacks a
/// room-type tag.
pub fn decode_stream_event(fields: &Value) -> Result<IncomingMessage, MalformedEvent> {
    let args = fields
        .get("args")
        .and_then(Value::as_array)
        .ok_or_else(|| MalformedEvent("event has no args".into()))?;

    let [raw_message, raw_meta, ..] = args.as_slice() else {
        return Err(MalformedEvent(
            "event fired without message or meta data".into(),
        ));
    };

    let message = Message::deserialize(raw_message)
        .map_err(|e| MalformedEvent(format!("bad message: {e}")))?;
    let meta = MessageMeta::deserialize(raw_meta)
        .map_err(|e| MalformedEvent(format!("bad meta: {e}")))?;

    Ok(IncomingMessage { message, meta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RoomType, Timestamp};

    fn event(args: Value) -> Value {
        json!({ "eventName": MY_MESSAGES_EVENT, "args": args })
    }

    fn message() -> Value {
        json!({
            "_id": "m1",
            "rid": "r1",
            "msg": "hi",
            "u": { "_id": "u1", "username": "alice" },
            "ts": { "$date": 1000 },
        })
    }

    #[test]
    fn test_decode_stream_event_valid_returns_message_and_meta() {
        let fields = event(json!([message(), { "roomType": "c", "roomParticipant": true }]));

        let incoming = decode_stream_event(&fields).expect("should decode");

        assert_eq!(incoming.message.ts, Timestamp::from_millis(1000));
        assert_eq!(incoming.meta.room_type, RoomType::Channel);
        assert!(incoming.meta.room_participant);
    }

    #[test]
    fn test_decode_stream_event_without_args_is_malformed() {
        let result = decode_stream_event(&json!({ "eventName": "x" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_stream_event_missing_meta_is_malformed() {
        let result = decode_stream_event(&event(json!([message()])));
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_stream_event_meta_without_room_type_is_malformed() {
        let result = decode_stream_event(&event(json!([message(), { "roomParticipant": true }])));
        assert!(matches!(result, Err(MalformedEvent(reason)) if reason.contains("meta")));
    }

    #[test]
    fn test_decode_stream_event_message_without_id_is_malformed() {
        let mut raw = message();
        raw.as_object_mut().unwrap().remove("_id");
        let result = decode_stream_event(&event(json!([raw, { "roomType": "c" }])));
        assert!(matches!(result, Err(MalformedEvent(reason)) if reason.contains("message")));
    }

    #[test]
    fn test_message_stream_params() {
        assert_eq!(message_stream_params(), vec![json!("__my_messages__"), json!(false)]);
    }
}
