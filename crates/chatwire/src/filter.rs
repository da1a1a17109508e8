//! The message filter: decides which stream events reach the application.
//!
//! Checks run in a fixed order and the first one that fails drops the
//! message:
//!
//! ```text
//! own message? → direct? → live chat? → joined? → edited? → already read?
//!                                                               │
//!                                                  deliver, advance cursor
//! ```
//!
//! The read cursor is checked last, so a message dropped by policy never
//! moves it and can't hide a later, eligible message from another room.

use std::fmt;

use chatwire_protocol::{IncomingMessage, RoomType, Timestamp, UserId};

use crate::RoomMembership;

// ---------------------------------------------------------------------------
// FilterPolicy
// ---------------------------------------------------------------------------

/// Which optional message kinds are delivered. Everything defaults to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    pub dm: bool,
    pub livechat: bool,
    pub edited: bool,
    pub all_public: bool,
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    OwnMessage,
    DirectMessage,
    LiveChat,
    NotJoined,
    Edited,
    AlreadyRead,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::OwnMessage => "own message",
            Self::DirectMessage => "direct messages disabled",
            Self::LiveChat => "live chat disabled",
            Self::NotJoined => "room not joined",
            Self::Edited => "edited messages disabled",
            Self::AlreadyRead => "at or before read cursor",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deliver,
    Drop(DropReason),
}

// ---------------------------------------------------------------------------
// ReadCursor
// ---------------------------------------------------------------------------

/// Timestamp of the newest delivered message. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCursor {
    last_read: Timestamp,
}

impl ReadCursor {
    pub fn new(last_read: Timestamp) -> Self {
        Self { last_read }
    }

    pub fn last_read(&self) -> Timestamp {
        self.last_read
    }

    pub fn is_unread(&self, ts: Timestamp) -> bool {
        ts > self.last_read
    }

    pub fn advance(&mut self, ts: Timestamp) {
        self.last_read = self.last_read.max(ts);
    }
}

// ---------------------------------------------------------------------------
// MessageFilter
// ---------------------------------------------------------------------------

/// A policy plus the cursor it guards. One per responder.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    policy: FilterPolicy,
    cursor: ReadCursor,
}

impl MessageFilter {
    /// Messages at or before `start` are treated as already read.
    pub fn new(policy: FilterPolicy, start: Timestamp) -> Self {
        Self {
            policy,
            cursor: ReadCursor::new(start),
        }
    }

    pub fn policy(&self) -> FilterPolicy {
        self.policy
    }

    pub fn cursor(&self) -> ReadCursor {
        self.cursor
    }

    /// Runs the checks against one decoded message, advancing the cursor
    /// when it is delivered.
    pub fn evaluate(
        &mut self,
        incoming: &IncomingMessage,
        own_user: Option<&UserId>,
        membership: &RoomMembership,
    ) -> Verdict {
        let IncomingMessage { message, meta } = incoming;

        if own_user == Some(&message.sender.id) {
            return Verdict::Drop(DropReason::OwnMessage);
        }

        match meta.room_type {
            RoomType::Direct if !self.policy.dm => return Verdict::Drop(DropReason::DirectMessage),
            RoomType::LiveChat if !self.policy.livechat => {
                return Verdict::Drop(DropReason::LiveChat);
            }
            RoomType::Direct | RoomType::LiveChat => {}
            _ => {
                if !membership.contains(&message.room_id)
                    && !meta.room_participant
                    && !self.policy.all_public
                {
                    return Verdict::Drop(DropReason::NotJoined);
                }
            }
        }

        if message.is_edited() && !self.policy.edited {
            return Verdict::Drop(DropReason::Edited);
        }

        if !self.cursor.is_unread(message.ts) {
            return Verdict::Drop(DropReason::AlreadyRead);
        }

        self.cursor.advance(message.ts);
        Verdict::Deliver
    }
}
