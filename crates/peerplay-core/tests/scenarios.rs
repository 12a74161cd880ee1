//! End-to-end relay scenarios over the in-process hub.

use peerplay_core::{PresenceRegistry, Relay, RelayConfig, Session};
use peerplay_protocol::{codec, InboundEvent, Member, OutboundEvent, Packet};
use peerplay_transport::{ConnectionId, LocalHub, PeerReceiver};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<LocalHub>, Arc<Relay>) {
    let hub = Arc::new(LocalHub::new());
    let relay = Relay::new(
        Arc::new(PresenceRegistry::new()),
        hub.clone(),
        RelayConfig {
            greet_on_connect: false,
            ..RelayConfig::default()
        },
    );
    (hub, Arc::new(relay))
}

fn connect(hub: &LocalHub, relay: &Relay, id: &str, name: &str) -> (Session, PeerReceiver) {
    let session = relay.session(ConnectionId::new(id), Some(name.to_string()));
    let rx = hub.register(&session.id).unwrap();
    relay.on_connect(&session);
    (session, rx)
}

/// Feed a raw JSON text frame through the codec, as the server does.
fn send_text(relay: &Relay, session: &Session, text: &str) {
    let packet = codec::decode_text(text).unwrap();
    let event = InboundEvent::from_packet(packet).unwrap();
    relay.handle(session, event).unwrap();
}

fn drain_packets(rx: &mut PeerReceiver) -> Vec<Packet> {
    let mut packets = Vec::new();
    while let Ok(event) = rx.try_recv() {
        packets.push(event.to_packet().unwrap());
    }
    packets
}

#[test]
fn alice_and_bob_share_a_room() {
    let (hub, relay) = setup();
    let (alice, mut rx_a) = connect(&hub, &relay, "A", "alice");
    let (bob, mut rx_b) = connect(&hub, &relay, "B", "bob");

    send_text(&relay, &alice, r#"{"event":"join_room","data":"r1"}"#);
    send_text(&relay, &bob, r#"{"event":"join_room","data":"r1"}"#);

    assert_eq!(
        relay.registry().snapshot("r1"),
        vec![Member::new("A", "alice"), Member::new("B", "bob")]
    );
    drain_packets(&mut rx_a);
    drain_packets(&mut rx_b);

    relay.on_disconnect(&bob);
    hub.unregister(&bob.id);

    assert_eq!(
        drain_packets(&mut rx_a),
        vec![Packet::new(
            "users_update",
            json!({"users": [{"id": "A", "username": "alice"}]})
        )]
    );
}

#[test]
fn seek_reaches_only_the_other_member() {
    let (hub, relay) = setup();
    let (alice, mut rx_a) = connect(&hub, &relay, "A", "alice");
    let (bob, mut rx_b) = connect(&hub, &relay, "B", "bob");
    send_text(&relay, &alice, r#"{"event":"join_room","data":"r1"}"#);
    send_text(&relay, &bob, r#"{"event":"join_room","data":"r1"}"#);
    drain_packets(&mut rx_a);
    drain_packets(&mut rx_b);

    send_text(
        &relay,
        &alice,
        r#"{"event":"seek","data":{"roomId":"r1","seekTime":42}}"#,
    );

    assert!(drain_packets(&mut rx_a).is_empty());
    assert_eq!(
        drain_packets(&mut rx_b),
        vec![Packet::new("seek", json!({"seekTime": 42}))]
    );
}

#[test]
fn send_msg_is_relayed_verbatim_as_receive_msg() {
    let (hub, relay) = setup();
    let (alice, mut rx_a) = connect(&hub, &relay, "A", "alice");
    let (bob, mut rx_b) = connect(&hub, &relay, "B", "bob");
    send_text(&relay, &alice, r#"{"event":"join_room","data":"r1"}"#);
    send_text(&relay, &bob, r#"{"event":"join_room","data":"r1"}"#);
    drain_packets(&mut rx_a);
    drain_packets(&mut rx_b);

    send_text(
        &relay,
        &bob,
        r#"{"event":"send_msg","data":{"roomId":"r1","url":"https://v.example/1","playing":true}}"#,
    );

    assert!(drain_packets(&mut rx_b).is_empty());
    assert_eq!(
        drain_packets(&mut rx_a),
        vec![Packet::new(
            "receive_msg",
            json!({"roomId": "r1", "url": "https://v.example/1", "playing": true})
        )]
    );
}

#[test]
fn stranger_disconnect_emits_nothing() {
    let (hub, relay) = setup();
    let (alice, mut rx_a) = connect(&hub, &relay, "A", "alice");
    let (stranger, _rx_s) = connect(&hub, &relay, "S", "sam");
    send_text(&relay, &alice, r#"{"event":"join_room","data":"r1"}"#);
    drain_packets(&mut rx_a);

    assert!(relay.on_disconnect(&stranger).is_none());
    assert!(drain_packets(&mut rx_a).is_empty());
}

#[test]
fn welcome_goes_to_peers_in_every_room() {
    let hub = Arc::new(LocalHub::new());
    let relay = Relay::new(
        Arc::new(PresenceRegistry::new()),
        hub.clone(),
        RelayConfig::default(),
    );
    let (alice, mut rx_a) = connect(&hub, &relay, "A", "alice");
    let (carol, mut rx_c) = connect(&hub, &relay, "C", "carol");
    send_text(&relay, &alice, r#"{"event":"join_room","data":"r1"}"#);
    send_text(&relay, &carol, r#"{"event":"join_room","data":"r2"}"#);
    drain_packets(&mut rx_a);
    drain_packets(&mut rx_c);

    let (_dave, mut rx_d) = connect(&hub, &relay, "D", "dave");

    let welcome = Packet::new("welcome", json!("Welcome D"));
    assert_eq!(drain_packets(&mut rx_a), vec![welcome.clone()]);
    assert_eq!(drain_packets(&mut rx_c), vec![welcome]);
    assert!(drain_packets(&mut rx_d).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_converge_on_one_snapshot() {
    let (hub, relay) = setup();

    let mut sessions = Vec::new();
    for i in 0..32 {
        sessions.push(connect(&hub, &relay, &format!("c{i}"), &format!("user{i}")));
    }

    let handles: Vec<_> = sessions
        .iter()
        .map(|(session, _)| {
            let relay = Arc::clone(&relay);
            let session = session.clone();
            tokio::spawn(async move {
                let event = InboundEvent::JoinRoom {
                    room_id: "party".into(),
                };
                relay.handle(&session, event).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = relay.registry().snapshot("party");
    assert_eq!(snapshot.len(), 32);

    // The last users_update each peer sees is the full room.
    for (_, rx) in &mut sessions {
        let mut last = None;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await
        {
            last = Some(event);
        }
        match last.as_deref() {
            Some(OutboundEvent::UsersUpdate(update)) => assert_eq!(update.users, snapshot),
            other => panic!("Expected users_update, got {:?}", other),
        }
    }
}
