//! Which rooms this driver has joined.
//!
//! Membership is a plain set, rebuilt from scratch every process lifetime.
//! Joins are two-phase: [`RoomMembership::begin_join`] marks the room as
//! in flight before the server call, so a second join of the same room
//! can be turned into a no-op instead of a duplicate call.

use std::collections::HashSet;

use chatwire_protocol::RoomId;

/// What [`RoomMembership::begin_join`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStart {
    /// The caller should issue the join and then complete or abort it.
    Started,
    AlreadyJoined,
    InFlight,
}

#[derive(Debug, Default)]
pub struct RoomMembership {
    joined: HashSet<RoomId>,
    joining: HashSet<RoomId>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_join(&mut self, room_id: &RoomId) -> JoinStart {
        if self.joined.contains(room_id) {
            JoinStart::AlreadyJoined
        } else if !self.joining.insert(room_id.clone()) {
            JoinStart::InFlight
        } else {
            JoinStart::Started
        }
    }

    pub fn complete_join(&mut self, room_id: &RoomId) {
        self.joining.remove(room_id);
        self.joined.insert(room_id.clone());
    }

    pub fn abort_join(&mut self, room_id: &RoomId) {
        self.joining.remove(room_id);
    }

    /// Forgets a joined room. Returns `false` if it wasn't joined.
    pub fn leave(&mut self, room_id: &RoomId) -> bool {
        self.joined.remove(room_id)
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.joined.contains(room_id)
    }

    /// Number of joined rooms. In-flight joins don't count.
    pub fn len(&self) -> usize {
        self.joined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.joined.iter()
    }
}
