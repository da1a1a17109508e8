//! DDP frames: the envelope every realtime message travels in.
//!
//! DDP is a small JSON protocol. Each frame is an object tagged by its
//! `msg` field, which maps directly onto serde's internally tagged enums:
//!
//! ```text
//! {"msg":"method","method":"joinRoom","params":["GENERAL"],"id":"4"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The DDP protocol version this client speaks.
pub const DDP_VERSION: &str = "1";

/// An error object attached to a `result` or `nosub` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdpError {
    /// Error code. Some servers use numbers (`403`), some use strings.
    pub error: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DdpError {
    /// Picks the most human-readable description available.
    pub fn describe(&self) -> String {
        self.reason
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| self.error.to_string())
    }
}

/// One DDP frame, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum Frame {
    // -- Connection lifecycle --
    /// Client → Server: open a DDP session.
    Connect { version: String, support: Vec<String> },

    /// Server → Client: the session is established.
    Connected { session: String },

    /// Server → Client: none of the offered versions is supported.
    Failed { version: String },

    // -- Heartbeat --
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    // -- Remote procedure calls --
    /// Client → Server: invoke a method.
    Method {
        method: String,
        params: Vec<Value>,
        id: String,
    },

    /// Server → Client: the outcome of a method call.
    Result {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<DdpError>,
    },

    /// Server → Client: writes from the listed methods are visible.
    Updated {
        #[serde(default)]
        methods: Vec<String>,
    },

    // -- Subscriptions --
    Sub {
        id: String,
        name: String,
        params: Vec<Value>,
    },

    Unsub { id: String },

    /// Server → Client: the subscription ended or was refused.
    Nosub {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<DdpError>,
    },

    /// Server → Client: the listed subscriptions are live.
    Ready { subs: Vec<String> },

    // -- Data --
    Added {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Value>,
    },

    Changed {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Value>,
    },

    Removed { collection: String, id: String },

    /// Server → Client: the server could not process a frame.
    Error {
        reason: String,
        #[serde(
            default,
            rename = "offendingMessage",
            skip_serializing_if = "Option::is_none"
        )]
        offending_message: Option<Value>,
    },
}

impl Frame {
    /// The handshake frame a client sends right after the socket opens.
    pub fn connect() -> Self {
        Self::Connect {
            version: DDP_VERSION.to_string(),
            support: vec![DDP_VERSION.to_string()],
        }
    }
}
