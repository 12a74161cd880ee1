//! Transport abstraction traits for PeerPlay.
//!
//! The relay never talks to sockets directly. It only needs named channels
//! and three ways of emitting: to one peer, to a channel, and to a channel
//! minus the sender. [`Hub`] is that seam.

use peerplay_protocol::OutboundEvent;
use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Counter mixed into generated IDs so two connections accepted within the
/// same clock tick still differ.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}{:04x}", timestamp, counter & 0xffff))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No peer is registered under this ID.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The peer is registered but its outbound queue is gone.
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// A peer with this ID is already registered.
    #[error("Connection already registered: {0}")]
    AlreadyRegistered(ConnectionId),

    /// The hub already holds its maximum number of peers.
    #[error("Connection limit of {0} reached")]
    CapacityExceeded(usize),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// The transport primitives the relay is built on.
///
/// Emission is best-effort: every emit returns the number of peers whose
/// outbound queue accepted the event and never blocks.
pub trait Hub: Send + Sync {
    /// Subscribe a connection to a named channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not registered.
    fn join_channel(&self, connection_id: &ConnectionId, channel: &str)
        -> Result<(), TransportError>;

    /// Remove a connection from a named channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not registered.
    fn leave_channel(
        &self,
        connection_id: &ConnectionId,
        channel: &str,
    ) -> Result<(), TransportError>;

    /// Emit an event to a single peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer is unknown or its queue is closed.
    fn emit_to(
        &self,
        connection_id: &ConnectionId,
        event: Arc<OutboundEvent>,
    ) -> Result<(), TransportError>;

    /// Emit an event to every subscriber of a channel.
    fn emit_to_channel(&self, channel: &str, event: Arc<OutboundEvent>) -> usize;

    /// Emit an event to every subscriber of a channel except `sender`.
    fn emit_to_channel_except(
        &self,
        channel: &str,
        sender: &ConnectionId,
        event: Arc<OutboundEvent>,
    ) -> usize;

    /// Emit an event to every connected peer except `sender`, regardless of
    /// channel.
    fn broadcast_except(&self, sender: &ConnectionId, event: Arc<OutboundEvent>) -> usize;

    /// Number of registered peers.
    fn connection_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_connection_id_generation() {
        let ids: HashSet<ConnectionId> = (0..1000).map(|_| ConnectionId::generate()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.as_str().starts_with("conn_")));
    }

    #[test]
    fn test_connection_id_from_string() {
        let id: ConnectionId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }
}
