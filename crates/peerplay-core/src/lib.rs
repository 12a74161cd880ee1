//! # peerplay-core
//!
//! Room membership and event relay for the PeerPlay watch-together server.
//!
//! - **PresenceRegistry** - Which connections are in which room, in join order
//! - **Relay** - Decides who hears each inbound event
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│    Relay    │────▶│     Hub     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌──────────────────┐
//!                     │ PresenceRegistry │
//!                     └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use peerplay_core::{PresenceRegistry, Relay, RelayConfig};
//! use peerplay_protocol::InboundEvent;
//! use peerplay_transport::{ConnectionId, LocalHub};
//! use std::sync::Arc;
//!
//! let hub = Arc::new(LocalHub::new());
//! let relay = Relay::new(Arc::new(PresenceRegistry::new()), hub.clone(), RelayConfig::default());
//!
//! let alice = relay.session(ConnectionId::new("A"), Some("alice".into()));
//! let mut rx = hub.register(&alice.id).unwrap();
//!
//! relay
//!     .handle(&alice, InboundEvent::JoinRoom { room_id: "r1".into() })
//!     .unwrap();
//! assert!(rx.try_recv().is_ok()); // users_update
//! ```

pub mod presence;
pub mod relay;

pub use presence::{PresenceRegistry, PresenceSnapshot, RegistryConfig, DEFAULT_USERNAME};
pub use relay::{Dispatch, MembershipPolicy, Relay, RelayConfig, RelayError, Session};
