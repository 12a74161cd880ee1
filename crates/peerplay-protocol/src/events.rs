//! Event types for the PeerPlay wire protocol.
//!
//! Every message on the wire is a [`Packet`]: an event name plus a JSON
//! payload. Inbound packets are parsed into [`InboundEvent`]s; the relay
//! answers with [`OutboundEvent`]s, which render back into packets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::ProtocolError;

/// Event names used on the wire.
pub mod names {
    pub const JOIN_ROOM: &str = "join_room";
    pub const SEND_MSG: &str = "send_msg";
    pub const RECEIVE_MSG: &str = "receive_msg";
    pub const CHAT: &str = "chat";
    pub const SEEK: &str = "seek";
    pub const CREATE_PLAY: &str = "create_play";
    pub const USERS_UPDATE: &str = "users_update";
    pub const WELCOME: &str = "welcome";
}

/// A room identifier. Opaque and unvalidated.
pub type RoomId = String;

/// The envelope carried by every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl Packet {
    /// Create a new packet.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// One entry of a presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Connection ID of the member.
    pub id: String,
    /// Display name supplied at handshake.
    pub username: String,
}

impl Member {
    /// Create a new member entry.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// A payload addressed to a room, relayed verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomPayload {
    /// Room the payload targets, taken from its `roomId` field.
    pub room_id: RoomId,
    /// The full payload, `roomId` included.
    pub data: Value,
}

impl RoomPayload {
    fn parse(event: &str, data: Value) -> Result<Self, ProtocolError> {
        let room_id = data
            .get("roomId")
            .and_then(room_key)
            .ok_or_else(|| ProtocolError::MissingRoom(event.to_string()))?;
        Ok(Self { room_id, data })
    }
}

/// Room IDs arrive as strings, but numeric IDs are used as keys too.
fn room_key(value: &Value) -> Option<RoomId> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `join_room(roomId)`.
    JoinRoom {
        /// Room to join.
        room_id: RoomId,
    },
    /// `send_msg({roomId, ...})`, relayed as `receive_msg`.
    SendMsg(RoomPayload),
    /// `chat({roomId, ...})`, relayed as `chat`.
    Chat(RoomPayload),
    /// `seek({roomId, seekTime})`, relayed as `seek({seekTime})`.
    Seek {
        /// Room to seek in.
        room_id: RoomId,
        /// Target position. `None` only when the key is missing; an explicit
        /// `null` is relayed as `null`.
        seek_time: Option<Value>,
    },
    /// `create_play(data)`. Logged only.
    CreatePlay(Value),
}

impl InboundEvent {
    /// Parse an inbound packet.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown event names and for room-scoped events
    /// without a usable room ID.
    pub fn from_packet(packet: Packet) -> Result<Self, ProtocolError> {
        let Packet { event, data } = packet;
        match event.as_str() {
            names::JOIN_ROOM => {
                let room_id = room_key(&data)
                    .ok_or_else(|| ProtocolError::MissingRoom(names::JOIN_ROOM.to_string()))?;
                Ok(InboundEvent::JoinRoom { room_id })
            }
            names::SEND_MSG => Ok(InboundEvent::SendMsg(RoomPayload::parse(&event, data)?)),
            names::CHAT => Ok(InboundEvent::Chat(RoomPayload::parse(&event, data)?)),
            names::SEEK => {
                let RoomPayload { room_id, data } = RoomPayload::parse(&event, data)?;
                let seek_time = data.get("seekTime").cloned();
                Ok(InboundEvent::Seek { room_id, seek_time })
            }
            names::CREATE_PLAY => Ok(InboundEvent::CreatePlay(data)),
            _ => Err(ProtocolError::UnknownEvent(event)),
        }
    }

    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::JoinRoom { .. } => names::JOIN_ROOM,
            InboundEvent::SendMsg(_) => names::SEND_MSG,
            InboundEvent::Chat(_) => names::CHAT,
            InboundEvent::Seek { .. } => names::SEEK,
            InboundEvent::CreatePlay(_) => names::CREATE_PLAY,
        }
    }

    /// The room this event targets, if any.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        match self {
            InboundEvent::JoinRoom { room_id } | InboundEvent::Seek { room_id, .. } => {
                Some(room_id)
            }
            InboundEvent::SendMsg(p) | InboundEvent::Chat(p) => Some(&p.room_id),
            InboundEvent::CreatePlay(_) => None,
        }
    }
}

/// Normalized `seek` payload. Only the target position survives the relay.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekPayload {
    /// Target playback position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seek_time: Option<Value>,
}

/// `users_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsersUpdate {
    /// Room members in join order.
    pub users: Vec<Member>,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Relayed `send_msg` payload.
    ReceiveMsg(Value),
    /// Relayed `chat` payload.
    Chat(Value),
    /// Relayed seek.
    Seek(SeekPayload),
    /// Presence snapshot for a room.
    UsersUpdate(UsersUpdate),
    /// Connect greeting.
    Welcome(String),
}

impl OutboundEvent {
    /// Build a `seek` event.
    #[must_use]
    pub fn seek(seek_time: Option<Value>) -> Self {
        OutboundEvent::Seek(SeekPayload { seek_time })
    }

    /// Build a `users_update` event.
    #[must_use]
    pub fn users_update(users: Vec<Member>) -> Self {
        OutboundEvent::UsersUpdate(UsersUpdate { users })
    }

    /// Build the greeting sent when `connection_id` connects.
    #[must_use]
    pub fn welcome(connection_id: &str) -> Self {
        OutboundEvent::Welcome(format!("Welcome {connection_id}"))
    }

    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::ReceiveMsg(_) => names::RECEIVE_MSG,
            OutboundEvent::Chat(_) => names::CHAT,
            OutboundEvent::Seek(_) => names::SEEK,
            OutboundEvent::UsersUpdate(_) => names::USERS_UPDATE,
            OutboundEvent::Welcome(_) => names::WELCOME,
        }
    }

    /// Render this event as a packet.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn to_packet(&self) -> Result<Packet, ProtocolError> {
        let data = match self {
            OutboundEvent::ReceiveMsg(v) | OutboundEvent::Chat(v) => v.clone(),
            OutboundEvent::Seek(p) => serde_json::to_value(p)?,
            OutboundEvent::UsersUpdate(u) => serde_json::to_value(u)?,
            OutboundEvent::Welcome(m) => Value::String(m.clone()),
        };
        Ok(Packet::new(self.name(), data))
    }

    /// Parse a server packet. Used by clients and tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the event is unknown or its payload is malformed.
    pub fn from_packet(packet: Packet) -> Result<Self, ProtocolError> {
        let Packet { event, data } = packet;
        match event.as_str() {
            names::RECEIVE_MSG => Ok(OutboundEvent::ReceiveMsg(data)),
            names::CHAT => Ok(OutboundEvent::Chat(data)),
            names::SEEK => Ok(OutboundEvent::Seek(serde_json::from_value(data)?)),
            names::USERS_UPDATE => Ok(OutboundEvent::UsersUpdate(serde_json::from_value(data)?)),
            names::WELCOME => match data {
                Value::String(m) => Ok(OutboundEvent::Welcome(m)),
                other => Err(ProtocolError::Invalid(format!(
                    "welcome payload must be a string, got {other}"
                ))),
            },
            _ => Err(ProtocolError::UnknownEvent(event)),
        }
    }
}
