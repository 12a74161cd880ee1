//! # peerplay-protocol
//!
//! Wire protocol definitions for the PeerPlay watch-together relay.
//!
//! Every message is a [`Packet`]: an event name and a JSON payload.
//! Clients send [`InboundEvent`]s and receive [`OutboundEvent`]s.
//!
//! ## Events
//!
//! - `join_room` - Enter a room, answered with `users_update`
//! - `send_msg` / `receive_msg` - Room data relayed to the other members
//! - `chat` - Chat relayed to the other members
//! - `seek` - Playback position relayed to the other members
//! - `welcome` - Greeting sent when someone connects
//!
//! ## Example
//!
//! ```rust
//! use peerplay_protocol::{codec, InboundEvent, Packet};
//! use serde_json::json;
//!
//! let packet = Packet::new("seek", json!({"roomId": "movie-night", "seekTime": 42}));
//!
//! // Text frames carry JSON, binary frames carry MessagePack
//! let text = codec::encode_text(&packet).unwrap();
//! let decoded = codec::decode_text(&text).unwrap();
//!
//! let event = InboundEvent::from_packet(decoded).unwrap();
//! assert_eq!(event.room_id(), Some("movie-night"));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, decode_text, encode, encode_text, ProtocolError};
pub use events::{
    names, InboundEvent, Member, OutboundEvent, Packet, RoomId, RoomPayload, SeekPayload,
    UsersUpdate,
};
