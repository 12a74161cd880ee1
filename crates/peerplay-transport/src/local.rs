//! In-process channel hub.
//!
//! Every registered peer owns an unbounded outbound queue; the socket task
//! that registered it drains the queue onto the wire. Channels are plain
//! subscriber sets and disappear when their last subscriber leaves.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use peerplay_protocol::OutboundEvent;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::traits::{ConnectionId, Hub, TransportError};

/// Sending half of a peer's outbound queue.
pub type PeerSender = mpsc::UnboundedSender<Arc<OutboundEvent>>;

/// Receiving half of a peer's outbound queue.
pub type PeerReceiver = mpsc::UnboundedReceiver<Arc<OutboundEvent>>;

struct Peer {
    tx: PeerSender,
    channels: HashSet<String>,
}

/// A [`Hub`] backed by in-memory queues.
#[derive(Default)]
pub struct LocalHub {
    /// Registered peers.
    peers: DashMap<ConnectionId, Peer>,
    /// Channel name -> subscribed connections.
    channels: DashMap<String, HashSet<ConnectionId>>,
    /// Slots taken by registered peers, reserved before insertion.
    slots: AtomicUsize,
}

impl LocalHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer and hand back the receiving end of its queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is already registered.
    pub fn register(&self, connection_id: &ConnectionId) -> Result<PeerReceiver, TransportError> {
        self.register_bounded(connection_id, usize::MAX)
    }

    /// Register a peer unless `limit` peers are already registered.
    ///
    /// The slot is reserved atomically, so concurrent callers never push the
    /// peer count past `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub is full or the ID is already registered.
    pub fn register_bounded(
        &self,
        connection_id: &ConnectionId,
        limit: usize,
    ) -> Result<PeerReceiver, TransportError> {
        self.slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < limit).then_some(taken + 1)
            })
            .map_err(|_| TransportError::CapacityExceeded(limit))?;

        match self.peers.entry(connection_id.clone()) {
            Entry::Occupied(_) => {
                self.slots.fetch_sub(1, Ordering::AcqRel);
                Err(TransportError::AlreadyRegistered(connection_id.clone()))
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = mpsc::unbounded_channel();
                entry.insert(Peer {
                    tx,
                    channels: HashSet::new(),
                });
                debug!(connection = %connection_id, "Peer registered");
                Ok(rx)
            }
        }
    }

    /// Drop a peer and all of its channel subscriptions.
    ///
    /// Returns `true` if the peer was registered.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        let Some((_, peer)) = self.peers.remove(connection_id) else {
            return false;
        };
        self.slots.fetch_sub(1, Ordering::AcqRel);
        for channel in &peer.channels {
            self.remove_subscriber(channel, connection_id);
        }
        debug!(
            connection = %connection_id,
            channels = peer.channels.len(),
            "Peer unregistered"
        );
        true
    }

    /// Subscribers of a channel, in no particular order.
    #[must_use]
    pub fn channel_members(&self, channel: &str) -> Vec<ConnectionId> {
        self.channels
            .get(channel)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of channels with at least one subscriber.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn remove_subscriber(&self, channel: &str, connection_id: &ConnectionId) {
        if let Some(mut set) = self.channels.get_mut(channel) {
            set.remove(connection_id);
        }
        if self.channels.remove_if(channel, |_, set| set.is_empty()).is_some() {
            trace!(channel = %channel, "Dropped empty channel");
        }
    }

    /// Push an event onto each listed peer's queue.
    fn deliver(&self, recipients: &[ConnectionId], event: &Arc<OutboundEvent>) -> usize {
        recipients
            .iter()
            .filter(|id| match self.peers.get(*id) {
                Some(peer) => peer.tx.send(Arc::clone(event)).is_ok(),
                None => false,
            })
            .count()
    }

    fn recipients(&self, channel: &str, except: Option<&ConnectionId>) -> Vec<ConnectionId> {
        // Clone the set so no channel shard is held while peers are locked.
        self.channels
            .get(channel)
            .map(|set| {
                set.iter()
                    .filter(|id| Some(*id) != except)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Hub for LocalHub {
    fn join_channel(
        &self,
        connection_id: &ConnectionId,
        channel: &str,
    ) -> Result<(), TransportError> {
        {
            let mut peer = self
                .peers
                .get_mut(connection_id)
                .ok_or_else(|| TransportError::UnknownConnection(connection_id.clone()))?;
            peer.channels.insert(channel.to_string());
        }
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(connection_id.clone());
        trace!(connection = %connection_id, channel = %channel, "Joined channel");
        Ok(())
    }

    fn leave_channel(
        &self,
        connection_id: &ConnectionId,
        channel: &str,
    ) -> Result<(), TransportError> {
        {
            let mut peer = self
                .peers
                .get_mut(connection_id)
                .ok_or_else(|| TransportError::UnknownConnection(connection_id.clone()))?;
            peer.channels.remove(channel);
        }
        self.remove_subscriber(channel, connection_id);
        trace!(connection = %connection_id, channel = %channel, "Left channel");
        Ok(())
    }

    fn emit_to(
        &self,
        connection_id: &ConnectionId,
        event: Arc<OutboundEvent>,
    ) -> Result<(), TransportError> {
        let peer = self
            .peers
            .get(connection_id)
            .ok_or_else(|| TransportError::UnknownConnection(connection_id.clone()))?;
        peer.tx
            .send(event)
            .map_err(|_| TransportError::ConnectionClosed(connection_id.clone()))
    }

    fn emit_to_channel(&self, channel: &str, event: Arc<OutboundEvent>) -> usize {
        let recipients = self.recipients(channel, None);
        self.deliver(&recipients, &event)
    }

    fn emit_to_channel_except(
        &self,
        channel: &str,
        sender: &ConnectionId,
        event: Arc<OutboundEvent>,
    ) -> usize {
        let recipients = self.recipients(channel, Some(sender));
        self.deliver(&recipients, &event)
    }

    fn broadcast_except(&self, sender: &ConnectionId, event: Arc<OutboundEvent>) -> usize {
        self.peers
            .iter()
            .filter(|entry| entry.key() != sender)
            .filter(|entry| entry.value().tx.send(Arc::clone(&event)).is_ok())
            .count()
    }

    fn connection_count(&self) -> usize {
        self.peers.len()
    }
}
