//! Event relay for PeerPlay.
//!
//! The relay decides who hears each inbound event. It owns no state of its
//! own: membership lives in the [`PresenceRegistry`], subscriptions and
//! delivery live behind the [`Hub`].

use crate::presence::{PresenceRegistry, DEFAULT_USERNAME};
use peerplay_protocol::{InboundEvent, OutboundEvent, RoomId, RoomPayload};
use peerplay_transport::{ConnectionId, Hub, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The transport refused a channel join after all retries.
    #[error("Failed to join channel {room}: {source}")]
    ChannelJoin {
        /// Room being joined.
        room: RoomId,
        /// Last transport error.
        #[source]
        source: TransportError,
    },
}

/// How many rooms a connection may be in at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipPolicy {
    /// Joining another room keeps the earlier memberships.
    #[default]
    MultiRoom,
    /// Joining a room first leaves every other room.
    SingleRoom,
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Greet every other peer when someone connects.
    pub greet_on_connect: bool,
    /// Membership policy applied on `join_room`.
    pub membership: MembershipPolicy,
    /// Extra attempts for a failed channel join.
    pub transport_retries: u32,
    /// Display name for handshakes without one.
    pub default_username: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            greet_on_connect: true,
            membership: MembershipPolicy::MultiRoom,
            transport_retries: 1,
            default_username: DEFAULT_USERNAME.to_string(),
        }
    }
}

/// A connected peer as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Transport-assigned connection ID.
    pub id: ConnectionId,
    /// Display name from the handshake. Fixed for the connection's lifetime.
    pub username: String,
}

impl Session {
    /// Create a session with an explicit display name.
    #[must_use]
    pub fn new(id: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// What the relay did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Inbound event name.
    pub event: &'static str,
    /// Room the event was scoped to.
    pub room: Option<RoomId>,
    /// Number of peers the resulting event was queued for.
    pub recipients: usize,
}

impl Dispatch {
    fn new(event: &'static str, room: Option<RoomId>, recipients: usize) -> Self {
        Self {
            event,
            room,
            recipients,
        }
    }
}

/// Routes inbound events to their recipients.
pub struct Relay {
    registry: Arc<PresenceRegistry>,
    hub: Arc<dyn Hub>,
    config: RelayConfig,
}

impl Relay {
    /// Create a relay over a registry and a hub.
    #[must_use]
    pub fn new(registry: Arc<PresenceRegistry>, hub: Arc<dyn Hub>, config: RelayConfig) -> Self {
        Self {
            registry,
            hub,
            config,
        }
    }

    /// The presence registry.
    #[must_use]
    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// The relay configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Build a session, falling back to the default display name.
    #[must_use]
    pub fn session(&self, id: ConnectionId, username: Option<String>) -> Session {
        let username = username.unwrap_or_else(|| self.config.default_username.clone());
        Session::new(id, username)
    }

    /// Handle a new connection.
    ///
    /// Every other connected peer, in any room, receives `welcome`.
    pub fn on_connect(&self, session: &Session) -> Dispatch {
        info!(connection = %session.id, username = %session.username, "Peer connected");

        let recipients = if self.config.greet_on_connect {
            let greeting = Arc::new(OutboundEvent::welcome(session.id.as_str()));
            self.hub.broadcast_except(&session.id, greeting)
        } else {
            0
        };
        Dispatch::new("connect", None, recipients)
    }

    /// Handle an inbound event from `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if a `join_room` could not subscribe the connection
    /// at the transport. The registry is left untouched in that case.
    pub fn handle(&self, session: &Session, event: InboundEvent) -> Result<Dispatch, RelayError> {
        let name = event.name();
        match event {
            InboundEvent::JoinRoom { room_id } => self.join_room(session, room_id),
            InboundEvent::SendMsg(RoomPayload { room_id, data }) => {
                debug!(connection = %session.id, room = %room_id, data = %data, "send_msg");
                Ok(self.relay_to_others(session, name, room_id, OutboundEvent::ReceiveMsg(data)))
            }
            InboundEvent::Chat(RoomPayload { room_id, data }) => {
                debug!(connection = %session.id, room = %room_id, data = %data, "chat");
                Ok(self.relay_to_others(session, name, room_id, OutboundEvent::Chat(data)))
            }
            InboundEvent::Seek { room_id, seek_time } => {
                let position = seek_time.as_ref().unwrap_or(&Value::Null);
                debug!(connection = %session.id, room = %room_id, seek_time = %position, "seek");
                Ok(self.relay_to_others(session, name, room_id, OutboundEvent::seek(seek_time)))
            }
            InboundEvent::CreatePlay(data) => {
                debug!(connection = %session.id, data = %data, "create_play");
                Ok(Dispatch::new(name, None, 0))
            }
        }
    }

    /// Handle a closed connection.
    ///
    /// The connection leaves the first room it is registered in and the
    /// remaining members get the new snapshot. Returns `None` when the
    /// connection was not in any room.
    pub fn on_disconnect(&self, session: &Session) -> Option<Dispatch> {
        let dispatch = self.registry.leave_then(&session.id, |room_id, users| {
            self.leave_channel(&session.id, room_id);
            let update = Arc::new(OutboundEvent::users_update(users.to_vec()));
            let recipients = self.hub.emit_to_channel_except(room_id, &session.id, update);
            Dispatch::new("disconnect", Some(room_id.to_string()), recipients)
        });

        match &dispatch {
            Some(d) => info!(
                connection = %session.id,
                room = ?d.room,
                recipients = d.recipients,
                "Peer disconnected"
            ),
            None => debug!(connection = %session.id, "Peer disconnected outside any room"),
        }
        dispatch
    }

    fn join_room(&self, session: &Session, room_id: RoomId) -> Result<Dispatch, RelayError> {
        // Channel first: the joiner must be subscribed to hear its own users_update,
        // and a refused join must leave every existing membership intact.
        self.join_channel(&session.id, &room_id)?;

        if self.config.membership == MembershipPolicy::SingleRoom {
            self.leave_other_rooms(session, &room_id);
        }

        let recipients =
            self.registry
                .join_then(&room_id, &session.id, &session.username, |users| {
                    let update = Arc::new(OutboundEvent::users_update(users.to_vec()));
                    self.hub.emit_to_channel(&room_id, update)
                });

        info!(
            connection = %session.id,
            room = %room_id,
            username = %session.username,
            "Joined room"
        );
        Ok(Dispatch::new("join_room", Some(room_id), recipients))
    }

    fn leave_other_rooms(&self, session: &Session, keep: &str) {
        for room_id in self.registry.rooms_of(&session.id) {
            if room_id == keep {
                continue;
            }
            self.registry
                .leave_room_then(&session.id, &room_id, |users| {
                    self.leave_channel(&session.id, &room_id);
                    let update = Arc::new(OutboundEvent::users_update(users.to_vec()));
                    self.hub.emit_to_channel_except(&room_id, &session.id, update)
                });
            debug!(connection = %session.id, room = %room_id, "Left previous room");
        }
    }

    fn relay_to_others(
        &self,
        session: &Session,
        name: &'static str,
        room_id: RoomId,
        event: OutboundEvent,
    ) -> Dispatch {
        let recipients = self
            .hub
            .emit_to_channel_except(&room_id, &session.id, Arc::new(event));
        Dispatch::new(name, Some(room_id), recipients)
    }

    fn join_channel(&self, connection_id: &ConnectionId, room_id: &str) -> Result<(), RelayError> {
        let mut attempt = 0;
        loop {
            match self.hub.join_channel(connection_id, room_id) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.transport_retries => {
                    attempt += 1;
                    warn!(
                        connection = %connection_id,
                        room = %room_id,
                        attempt,
                        error = %e,
                        "Channel join failed, retrying"
                    );
                }
                Err(e) => {
                    warn!(
                        connection = %connection_id,
                        room = %room_id,
                        error = %e,
                        "Channel join failed, membership not recorded"
                    );
                    return Err(RelayError::ChannelJoin {
                        room: room_id.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    fn leave_channel(&self, connection_id: &ConnectionId, room_id: &str) {
        if let Err(e) = self.hub.leave_channel(connection_id, room_id) {
            warn!(
                connection = %connection_id,
                room = %room_id,
                error = %e,
                "Channel leave failed after presence removal"
            );
        }
    }
}
