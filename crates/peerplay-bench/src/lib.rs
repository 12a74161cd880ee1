//! Shared fixtures for PeerPlay benchmarks.

use peerplay_core::{PresenceRegistry, Relay, RelayConfig, Session};
use peerplay_transport::{ConnectionId, LocalHub, PeerReceiver};
use std::sync::Arc;

/// A relay with `members` peers already joined to `room`.
pub struct RoomFixture {
    /// The hub the relay emits through.
    pub hub: Arc<LocalHub>,
    /// The relay under test.
    pub relay: Relay,
    /// Joined sessions with their outbound queues.
    pub peers: Vec<(Session, PeerReceiver)>,
}

impl RoomFixture {
    /// Build a room of `members` peers.
    ///
    /// # Panics
    ///
    /// Panics if a peer cannot be registered or joined.
    #[must_use]
    pub fn new(room: &str, members: usize) -> Self {
        let hub = Arc::new(LocalHub::new());
        let relay = Relay::new(
            Arc::new(PresenceRegistry::new()),
            hub.clone(),
            RelayConfig {
                greet_on_connect: false,
                ..RelayConfig::default()
            },
        );

        let peers = (0..members)
            .map(|i| {
                let session = relay.session(
                    ConnectionId::new(format!("conn-{i}")),
                    Some(format!("user-{i}")),
                );
                let rx = hub.register(&session.id).expect("register peer");
                relay
                    .handle(
                        &session,
                        peerplay_protocol::InboundEvent::JoinRoom {
                            room_id: room.to_string(),
                        },
                    )
                    .expect("join room");
                (session, rx)
            })
            .collect();

        let mut fixture = Self { hub, relay, peers };
        fixture.drain();
        fixture
    }

    /// Empty every peer's queue.
    pub fn drain(&mut self) {
        for (_, rx) in &mut self.peers {
            while rx.try_recv().is_ok() {}
        }
    }
}
