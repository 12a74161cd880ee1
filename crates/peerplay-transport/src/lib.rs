//! # peerplay-transport
//!
//! Transport primitives for the PeerPlay relay.
//!
//! The relay core is written against the [`Hub`] trait: named channels plus
//! emit-to-peer, emit-to-channel and emit-to-channel-except-sender. The
//! [`LocalHub`] implementation keeps everything in process; the server
//! registers each WebSocket with it and drains the peer queue onto the wire.
//!
//! ```rust
//! use peerplay_protocol::OutboundEvent;
//! use peerplay_transport::{ConnectionId, Hub, LocalHub};
//! use std::sync::Arc;
//!
//! let hub = LocalHub::new();
//! let alice = ConnectionId::new("alice");
//! let mut rx = hub.register(&alice).unwrap();
//! hub.join_channel(&alice, "movie-night").unwrap();
//!
//! let event = Arc::new(OutboundEvent::Welcome("hello".into()));
//! assert_eq!(hub.emit_to_channel("movie-night", event), 1);
//! assert!(rx.try_recv().is_ok());
//! ```

pub mod local;
pub mod traits;

pub use local::{LocalHub, PeerReceiver, PeerSender};
pub use traits::{ConnectionId, Hub, TransportError};
