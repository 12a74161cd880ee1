//! End-to-end room benchmark for PeerPlay.
//!
//! Connects N clients to one room over real WebSockets, has each of them
//! chat as fast as it can, and counts relayed messages.

use futures_util::{SinkExt, StreamExt};
use peerplay_protocol::{codec, OutboundEvent, Packet};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SERVER_URL: &str = "ws://127.0.0.1:4000/ws";
const ROOM: &str = "bench-room";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("PeerPlay end-to-end room benchmark");
    println!("Make sure the server is running: cargo run --release --bin peerplay");
    println!();

    run_room_benchmark(num_clients).await;
}

async fn run_room_benchmark(num_clients: usize) {
    println!("Room benchmark: {} clients in {:?}", num_clients, ROOM);
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);

    let message_count = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let handles: Vec<_> = (0..num_clients)
        .map(|client_id| {
            let msg_count = Arc::clone(&message_count);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                if let Err(e) = run_client(client_id, num_clients, msg_count, barrier).await {
                    eprintln!("Client {} error: {}", client_id, e);
                }
            })
        })
        .collect();

    barrier.wait().await;
    println!("All {} clients joined", num_clients);

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    message_count.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_messages = message_count.load(Ordering::SeqCst);
    let msgs_per_sec = total_messages as f64 / elapsed.as_secs_f64();

    println!();
    println!("Results");
    println!("  Clients:          {:>10}", num_clients);
    println!("  Duration:         {:>10.2}s", elapsed.as_secs_f64());
    println!("  Relayed messages: {:>10}", total_messages);
    println!("  Throughput:       {:>10.0} msg/s", msgs_per_sec);
    println!(
        "  Per client:       {:>10.0} msg/s",
        msgs_per_sec / num_clients as f64
    );

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    client_id: usize,
    room_size: usize,
    message_count: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let url = format!("{}?username=bench-{}", SERVER_URL, client_id);
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut sender, mut receiver) = ws.split();

    let join = codec::encode_text(&Packet::new("join_room", json!(ROOM)))?;
    sender.send(Message::Text(join)).await?;

    // Wait until our own users_update lists the whole room
    while let Some(msg) = receiver.next().await {
        if let Message::Text(text) = msg? {
            let event = OutboundEvent::from_packet(codec::decode_text(&text)?)?;
            if let OutboundEvent::UsersUpdate(update) = event {
                if update.users.len() >= room_size {
                    break;
                }
            }
        }
    }

    barrier.wait().await;

    let chat = codec::encode_text(&Packet::new(
        "chat",
        json!({"roomId": ROOM, "from": client_id, "text": "x".repeat(64)}),
    ))?;
    let chat_msg = Message::Text(chat);

    let recv_count = Arc::clone(&message_count);
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Text(_)) {
                recv_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    loop {
        if sender.send(chat_msg.clone()).await.is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
