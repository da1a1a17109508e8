//! Chat objects as they travel on the wire.
//!
//! Field names follow the server's JSON (`_id`, `rid`, `u`, `ts`), mapped
//! onto Rust names with `#[serde(rename = ...)]` so the rest of the code
//! reads naturally (`message.room_id`, `message.sender`).

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Declares a string newtype identifier.
///
/// Every id on this server is an opaque string, but a `RoomId` and a
/// `UserId` must never be confused, so each gets its own type.
/// `#[serde(transparent)]` keeps the JSON form a bare string.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Creates an id from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a random 17-character alphanumeric id, the
            /// same shape the server uses for its own ids.
            pub fn random() -> Self {
                Self(random_id())
            }

            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id! {
    /// Identifier of a room (channel, private group, DM or live-chat room).
    RoomId
}

string_id! {
    /// Identifier of a user account.
    UserId
}

string_id! {
    /// Identifier of a single chat message.
    MessageId
}

string_id! {
    /// Identifier of a realtime subscription, chosen by the client.
    SubscriptionId
}

fn random_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(17)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Milliseconds since the Unix epoch.
///
/// The server sends dates in EJSON form, `{"$date": 1700000000000}`. We
/// accept that and plain integers, and always write the EJSON form back.
/// `Ord` is derived so the read cursor can compare timestamps directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from epoch milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns epoch milliseconds.
    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Returns this timestamp shifted by `delta` milliseconds (may be negative).
    pub fn offset_millis(self, delta: i64) -> Self {
        Self(self.0.saturating_add(delta))
    }

    /// Returns this timestamp shifted forward by `duration`.
    pub fn after(self, duration: Duration) -> Self {
        self.offset_millis(duration.as_millis() as i64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct EjsonDate {
            #[serde(rename = "$date")]
            date: i64,
        }
        EjsonDate { date: self.0 }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Ejson {
                #[serde(rename = "$date")]
                date: i64,
            },
            Millis(i64),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Ejson { date } => Self(date),
            Repr::Millis(millis) => Self(millis),
        })
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The author of a message, as embedded in it by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A chat message received on the message stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: MessageId,

    /// The room the message was posted in.
    #[serde(rename = "rid")]
    pub room_id: RoomId,

    /// Message text. System messages may have none.
    #[serde(rename = "msg", default)]
    pub text: String,

    #[serde(rename = "u")]
    pub sender: Sender,

    /// When the server accepted the message.
    pub ts: Timestamp,

    /// Set when the message has been edited since it was posted.
    #[serde(rename = "editedAt", default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
}

impl Message {
    /// Returns `true` if the message has been edited.
    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }
}

/// The kind of room a message was posted in.
///
/// The server tags rooms with a single letter. Unknown letters map to
/// [`RoomType::Other`] rather than failing the whole event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomType {
    #[serde(rename = "d")]
    Direct,
    #[serde(rename = "c")]
    Channel,
    #[serde(rename = "p")]
    PrivateGroup,
    #[serde(rename = "l")]
    LiveChat,
    #[serde(other)]
    Other,
}

/// Metadata the server sends alongside each streamed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMeta {
    pub room_type: RoomType,

    /// `true` if the logged-in user is a member of the room.
    #[serde(default)]
    pub room_participant: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
}

/// A decoded message-stream event: the message plus its room metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub message: Message,
    pub meta: MessageMeta,
}

/// A message about to be sent through the `sendMessage` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(rename = "_id")]
    pub id: MessageId,
    #[serde(rename = "rid")]
    pub room_id: RoomId,
    #[serde(rename = "msg")]
    pub text: String,
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// How to log in.
///
/// Directory-service (LDAP) accounts are authenticated by a different
/// login handler on the server, so they get their own variant.
#[derive(Clone, PartialEq)]
pub enum Credentials {
    /// A local username/password account.
    Password { username: String, password: String },

    /// An LDAP account. `options` is forwarded verbatim to the server's
    /// LDAP login handler.
    Ldap {
        username: String,
        password: String,
        options: Value,
    },
}

impl Credentials {
    /// Shorthand for [`Credentials::Password`].
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The account name, whichever login path is used.
    pub fn username(&self) -> &str {
        match self {
            Self::Password { username, .. } | Self::Ldap { username, .. } => username,
        }
    }

    /// Returns `true` for the LDAP login path.
    pub fn is_ldap(&self) -> bool {
        matches!(self, Self::Ldap { .. })
    }

    /// The single parameter of the server's `login` method.
    pub fn login_params(&self) -> Value {
        match self {
            Self::Password { username, password } => json!({
                "user": { "username": username },
                "password": password,
            }),
            Self::Ldap {
                username,
                password,
                options,
            } => json!({
                "ldap": true,
                "username": username,
                "ldapPass": password,
                "ldapOptions": options,
            }),
        }
    }
}

/// Manual `Debug` so passwords never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Ldap {
                username, options, ..
            } => f
                .debug_struct("Ldap")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("options", options)
                .finish(),
        }
    }
}

/// The server's answer to a successful `login` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    #[serde(rename = "id")]
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
