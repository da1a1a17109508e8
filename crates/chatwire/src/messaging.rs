//! Room resolution, membership and sending.

use chatwire_protocol::{MessageId, OutgoingMessage, ProtocolError, RoomId};
use chatwire_transport::Transport;
use futures_util::future::try_join_all;
use serde_json::{Value, json};

use crate::membership::JoinStart;
use crate::{Driver, DriverError};

pub(crate) const GET_ROOM_ID: &str = "getRoomIdByNameOrId";
pub(crate) const GET_ROOM_NAME: &str = "getRoomNameById";
pub(crate) const CREATE_DIRECT_MESSAGE: &str = "createDirectMessage";
const JOIN_ROOM: &str = "joinRoom";
const LEAVE_ROOM: &str = "leaveRoom";
const SEND_MESSAGE: &str = "sendMessage";
const SET_REACTION: &str = "setReaction";

fn expect_str(method: &str, value: &Value) -> Result<String, DriverError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DriverError::UnexpectedResult {
            method: method.to_string(),
            detail: format!("expected a string, got {value}"),
        })
}

impl<T: Transport> Driver<T> {
    // -- Lookups -----------------------------------------------------------

    /// Resolves a room name (or id) to its id. Cached.
    pub async fn get_room_id(&self, name_or_id: &str) -> Result<RoomId, DriverError> {
        let result = self.call_method(GET_ROOM_ID, vec![json!(name_or_id)]).await?;
        expect_str(GET_ROOM_ID, &result).map(RoomId::from)
    }

    /// Looks up a room's display name. Cached.
    pub async fn get_room_name(&self, room_id: &RoomId) -> Result<String, DriverError> {
        let result = self.call_method(GET_ROOM_NAME, vec![json!(room_id)]).await?;
        expect_str(GET_ROOM_NAME, &result)
    }

    /// Returns the id of the direct-message room with `username`, creating
    /// it on the server if needed. Cached.
    pub async fn get_direct_message_room_id(&self, username: &str) -> Result<RoomId, DriverError> {
        let result = self
            .call_method(CREATE_DIRECT_MESSAGE, vec![json!(username)])
            .await?;
        expect_str(CREATE_DIRECT_MESSAGE, &result["rid"]).map(RoomId::from)
    }

    // -- Membership --------------------------------------------------------

    /// Joins a room by name or id.
    ///
    /// Joining a room that is already joined, or whose join is still in
    /// flight, logs and returns `Ok` without calling the server.
    pub async fn join_room(&self, name_or_id: &str) -> Result<(), DriverError> {
        let room_id = self.get_room_id(name_or_id).await?;

        let start = self.inner.membership.lock().await.begin_join(&room_id);
        match start {
            JoinStart::AlreadyJoined => {
                tracing::info!(%room_id, "already joined room");
                return Ok(());
            }
            JoinStart::InFlight => {
                tracing::info!(%room_id, "join already in progress");
                return Ok(());
            }
            JoinStart::Started => {}
        }

        match self.call_method(JOIN_ROOM, vec![json!(room_id)]).await {
            Ok(_) => {
                self.inner.membership.lock().await.complete_join(&room_id);
                tracing::info!(%room_id, "joined room");
                Ok(())
            }
            Err(e) => {
                self.inner.membership.lock().await.abort_join(&room_id);
                tracing::warn!(%room_id, error = %e, "join failed");
                Err(e)
            }
        }
    }

    /// Leaves a room by name or id. Leaving a room that isn't joined logs
    /// and returns `Ok`.
    pub async fn leave_room(&self, name_or_id: &str) -> Result<(), DriverError> {
        let room_id = self.get_room_id(name_or_id).await?;

        let joined = self.inner.membership.lock().await.contains(&room_id);
        if !joined {
            tracing::info!(%room_id, "not in room, nothing to leave");
            return Ok(());
        }

        self.call_method(LEAVE_ROOM, vec![json!(room_id)]).await?;
        self.inner.membership.lock().await.leave(&room_id);
        tracing::info!(%room_id, "left room");
        Ok(())
    }

    /// Joins every room concurrently. Fails with the first error.
    pub async fn join_rooms<S: AsRef<str>>(&self, rooms: &[S]) -> Result<(), DriverError> {
        try_join_all(rooms.iter().map(|room| self.join_room(room.as_ref()))).await?;
        Ok(())
    }

    pub async fn joined_rooms(&self) -> Vec<RoomId> {
        self.inner.membership.lock().await.rooms().cloned().collect()
    }

    // -- Sending -----------------------------------------------------------

    /// Builds a message with a fresh random id.
    pub fn prepare_message(&self, text: impl Into<String>, room_id: RoomId) -> OutgoingMessage {
        OutgoingMessage {
            id: MessageId::random(),
            room_id,
            text: text.into(),
        }
    }

    /// Sends a prepared message and returns the server's copy of it.
    pub async fn send_message(&self, message: OutgoingMessage) -> Result<Value, DriverError> {
        let param = serde_json::to_value(&message).map_err(ProtocolError::Encode)?;
        tracing::debug!(room_id = %message.room_id, id = %message.id, "sending message");
        self.call_method(SEND_MESSAGE, vec![param]).await
    }

    pub async fn send_to_room_id(&self, text: &str, room_id: &RoomId) -> Result<Value, DriverError> {
        let message = self.prepare_message(text, room_id.clone());
        self.send_message(message).await
    }

    /// Sends to a room given by name.
    pub async fn send_to_room(&self, text: &str, room_name: &str) -> Result<Value, DriverError> {
        let room_id = self.get_room_id(room_name).await?;
        self.send_to_room_id(text, &room_id).await
    }

    pub async fn send_direct_to_user(&self, text: &str, username: &str) -> Result<Value, DriverError> {
        let room_id = self.get_direct_message_room_id(username).await?;
        self.send_to_room_id(text, &room_id).await
    }

    /// Toggles `emoji` (e.g. `":thumbsup:"`) on a message.
    pub async fn set_reaction(&self, emoji: &str, message_id: &MessageId) -> Result<Value, DriverError> {
        self.call_method(SET_REACTION, vec![json!(emoji), json!(message_id)])
            .await
    }
}
