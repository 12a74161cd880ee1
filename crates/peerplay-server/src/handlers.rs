//! Connection handlers for the PeerPlay server.
//!
//! This module handles the connection lifecycle and feeds inbound packets
//! to the relay.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use peerplay_core::{PresenceRegistry, Relay, Session};
use peerplay_protocol::{codec, InboundEvent, OutboundEvent, Packet};
use peerplay_transport::{ConnectionId, Hub, LocalHub, TransportError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The event relay.
    pub relay: Relay,
    /// In-process channel hub shared with the relay.
    pub hub: Arc<LocalHub>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let hub = Arc::new(LocalHub::new());
        let registry = Arc::new(PresenceRegistry::with_config(config.relay.registry_config()));
        let relay = Relay::new(registry, hub.clone(), config.relay.relay_config());

        Self { relay, hub, config }
    }
}

/// Query parameters of the WebSocket handshake.
#[derive(Debug, Default, Deserialize)]
pub struct Handshake {
    /// Display name of the connecting participant.
    pub username: Option<String>,
}

/// The encoding a client last spoke; replies use the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireFormat {
    Text,
    Binary,
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let websocket_path = config.transport.websocket_path.clone();
    let state = Arc::new(AppState::new(config));
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;

    info!("PeerPlay relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, websocket_path);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.hub.connection_count(),
        "rooms": state.relay.registry().room_count(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(handshake): Query<Handshake>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !state.config.cors.allows(origin) {
        warn!(origin = ?origin, "Rejected WebSocket upgrade from disallowed origin");
        metrics::record_error("origin");
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    // Early refusal; the hard cap is enforced when the peer registers.
    if state.hub.connection_count() >= state.config.limits.max_connections {
        warn!("Connection limit reached");
        metrics::record_error("capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    }

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, handshake.username))
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    username: Option<String>,
) {
    let connection_id = ConnectionId::generate();
    let mut outbound = match state
        .hub
        .register_bounded(&connection_id, state.config.limits.max_connections)
    {
        Ok(rx) => rx,
        Err(TransportError::CapacityExceeded(limit)) => {
            warn!(connection = %connection_id, limit, "Connection limit reached after upgrade");
            metrics::record_error("capacity");
            let close = CloseFrame {
                code: close_code::AGAIN,
                reason: "Too many connections".into(),
            };
            let _ = socket.send(Message::Close(Some(close))).await;
            return;
        }
        Err(e) => {
            error!(connection = %connection_id, error = %e, "Failed to register connection");
            metrics::record_error("transport");
            return;
        }
    };
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();
    let session = state.relay.session(connection_id, username);

    debug!(connection = %session.id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    metrics::record_dispatch(&state.relay.on_connect(&session));

    let mut format = WireFormat::Text;
    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            // Events queued for this peer by the relay
            Some(event) = outbound.recv() => {
                if send_event(&mut sender, &event, format).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let start = Instant::now();
                        format = WireFormat::Text;
                        metrics::record_message(text.len(), "inbound");

                        match codec::decode_text(&text) {
                            Ok(packet) => dispatch_packet(&state, &session, packet),
                            Err(e) => {
                                warn!(connection = %session.id, error = %e, "Dropping undecodable text frame");
                                metrics::record_error("protocol");
                            }
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let start = Instant::now();
                        format = WireFormat::Binary;
                        metrics::record_message(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);

                        loop {
                            match codec::decode_from(&mut read_buffer) {
                                Ok(Some(packet)) => dispatch_packet(&state, &session, packet),
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(connection = %session.id, error = %e, "Dropping undecodable binary frame");
                                    metrics::record_error("protocol");
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %session.id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %session.id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %session.id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Leave presence while still subscribed, then drop the peer entirely.
    if let Some(dispatch) = state.relay.on_disconnect(&session) {
        metrics::record_dispatch(&dispatch);
    }
    state.hub.unregister(&session.id);
    metrics::set_active_rooms(state.relay.registry().room_count());

    debug!(connection = %session.id, "WebSocket disconnected");
}

/// Parse a packet and hand it to the relay.
fn dispatch_packet(state: &AppState, session: &Session, packet: Packet) {
    let event = match InboundEvent::from_packet(packet) {
        Ok(event) => event,
        Err(e) => {
            warn!(connection = %session.id, error = %e, "Dropping malformed event");
            metrics::record_error("protocol");
            return;
        }
    };

    match state.relay.handle(session, event) {
        Ok(dispatch) => {
            debug!(
                connection = %session.id,
                event = dispatch.event,
                room = ?dispatch.room,
                recipients = dispatch.recipients,
                "Dispatched"
            );
            metrics::record_dispatch(&dispatch);
        }
        Err(e) => {
            warn!(connection = %session.id, error = %e, "Relay error");
            metrics::record_error("transport");
        }
    }

    metrics::set_active_rooms(state.relay.registry().room_count());
}

/// Encode an outbound event in the peer's wire format.
fn encode_event(event: &OutboundEvent, format: WireFormat) -> Result<Message> {
    let packet = event.to_packet()?;
    let message = match format {
        WireFormat::Text => Message::Text(codec::encode_text(&packet)?),
        WireFormat::Binary => Message::Binary(codec::encode(&packet)?.to_vec()),
    };
    Ok(message)
}

/// Send an outbound event to the WebSocket.
///
/// Encoding failures are logged and skipped; only a dead socket is an error.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &OutboundEvent,
    format: WireFormat,
) -> Result<()> {
    let message = match encode_event(event, format) {
        Ok(message) => message,
        Err(e) => {
            warn!(event = event.name(), error = %e, "Failed to encode outbound event");
            metrics::record_error("encode");
            return Ok(());
        }
    };

    let len = match &message {
        Message::Text(text) => text.len(),
        Message::Binary(data) => data.len(),
        _ => 0,
    };
    metrics::record_message(len, "outbound");
    sender.send(message).await?;
    Ok(())
}
