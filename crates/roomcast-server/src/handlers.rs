//! Connection handlers for the Roomcast server.
//!
//! Each WebSocket gets a reader loop (this task) and a writer task draining
//! the connection's mailbox. Decoded events go to the broadcast router; the
//! router delivers back through the mailboxes.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use roomcast_core::BroadcastRouter;
use roomcast_protocol::{codec, Encoding, Event, EventKind, ProtocolError, WireFrame};
use roomcast_transport::{ConnectionId, Mailboxes, Outgoing};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The broadcast router.
    pub router: BroadcastRouter,
    /// Outbound queues, one per connection.
    pub mailboxes: Arc<Mailboxes>,
    /// Server configuration.
    pub config: Config,
    /// Connections admitted under the limit, upgraded or not.
    admitted: AtomicUsize,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let mailboxes = Arc::new(Mailboxes::new(config.mailbox_config()));
        let router = BroadcastRouter::with_config(config.router_config(), mailboxes.clone());

        Self {
            router,
            mailboxes,
            config,
            admitted: AtomicUsize::new(0),
        }
    }
}

/// A place under the connection limit, released on drop.
struct ConnectionSlot(Arc<AppState>);

impl ConnectionSlot {
    /// Reserve a slot, or `None` if the limit is reached.
    fn acquire(state: &Arc<AppState>) -> Option<Self> {
        let max = state.config.limits.max_connections;
        state
            .admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()?;
        Some(Self(Arc::clone(state)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.admitted.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
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
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Roomcast server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.router.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connection_count,
        "rooms": stats.rooms.room_count,
    }))
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
struct ConnectParams {
    /// Outbound encoding: `json` (default) or `msgpack`.
    format: Option<String>,
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let encoding = match params.format.as_deref().map(str::parse::<Encoding>) {
        None => Encoding::default(),
        Some(Ok(encoding)) => encoding,
        Some(Err(e)) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    // Dropped with the callback if the upgrade never completes
    let Some(slot) = ConnectionSlot::acquire(&state) else {
        warn!("Connection limit reached, rejecting upgrade");
        metrics::record_error("connection_limit");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    ws.on_upgrade(move |socket| handle_websocket(socket, state, encoding, slot))
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    encoding: Encoding,
    _slot: ConnectionSlot,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = ConnectionId::generate();

    debug!(connection = %connection_id, ?encoding, "WebSocket connected");

    let (sender, mut receiver) = socket.split();
    let outbox = state.mailboxes.open(connection_id.clone(), encoding);
    state.router.connect(connection_id.clone());

    let writer = tokio::spawn(write_loop(sender, outbox));

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);
    let limit = state.config.limits.max_message_size;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::record_message(text.len(), "inbound");
                match decode_text(&text, limit) {
                    Ok(event) => dispatch(&state, &connection_id, event).await,
                    Err(e) => reject(&connection_id, &e),
                }
            }
            Ok(Message::Binary(data)) => {
                metrics::record_message(data.len(), "inbound");
                if read_buffer.len() + data.len() > limit {
                    read_buffer.clear();
                    reject(&connection_id, &oversized(data.len(), limit));
                    continue;
                }
                read_buffer.extend_from_slice(&data);

                loop {
                    match codec::decode_from(&mut read_buffer) {
                        Ok(Some(event)) => dispatch(&state, &connection_id, event).await,
                        Ok(None) => break,
                        Err(e) => {
                            read_buffer.clear();
                            reject(&connection_id, &e);
                            break;
                        }
                    }
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Pings are answered by axum
            }
            Ok(Message::Close(_)) => {
                debug!(connection = %connection_id, "Received close frame");
                break;
            }
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        }
    }

    if let Some(age) = state.router.registry().age(&connection_id) {
        metrics::record_connection_duration(age.as_secs_f64());
    }

    // Leave rooms and unregister before the mailbox goes away
    state.router.disconnect(&connection_id).await;
    state.mailboxes.remove(&connection_id);
    metrics::set_active_rooms(state.router.stats().rooms.room_count);

    let drain = Duration::from_millis(state.config.transport.send_timeout_ms);
    if !drain_writer(writer, drain).await {
        debug!(connection = %connection_id, "Writer did not drain in time, aborted");
    }

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Wait for the writer to flush, aborting it after `drain`.
///
/// Returns `false` if it had to be aborted.
async fn drain_writer(mut writer: JoinHandle<()>, drain: Duration) -> bool {
    if tokio::time::timeout(drain, &mut writer).await.is_ok() {
        return true;
    }
    writer.abort();
    false
}

/// Forward queued frames to the socket until the mailbox closes.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<Outgoing>,
) {
    while let Some(outgoing) = outbox.recv().await {
        let closing = matches!(outgoing, Outgoing::Close(_));
        let message = to_ws_message(outgoing);

        if let Message::Text(text) = &message {
            metrics::record_message(text.len(), "outbound");
        } else if let Message::Binary(data) = &message {
            metrics::record_message(data.len(), "outbound");
        }

        if sender.send(message).await.is_err() || closing {
            break;
        }
    }
}

/// Convert a queued item into a WebSocket message.
fn to_ws_message(outgoing: Outgoing) -> Message {
    match outgoing {
        Outgoing::Frame(WireFrame::Text(text)) => Message::Text(text),
        Outgoing::Frame(WireFrame::Binary(data)) => Message::Binary(data.to_vec()),
        Outgoing::Close(reason) => Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: reason.into(),
        })),
    }
}

/// Decode a JSON text frame, enforcing the size limit.
fn decode_text(text: &str, limit: usize) -> Result<Event, ProtocolError> {
    if text.len() > limit {
        return Err(oversized(text.len(), limit));
    }
    codec::decode_json(text)
}

fn oversized(size: usize, limit: usize) -> ProtocolError {
    ProtocolError::Invalid(format!("message of {} bytes exceeds limit of {}", size, limit))
}

/// Route one event and record its outcome.
async fn dispatch(state: &AppState, connection_id: &ConnectionId, event: Event) {
    let start = Instant::now();
    let membership_change = matches!(event.kind, EventKind::Join | EventKind::Leave);

    let report = state.router.handle(connection_id, event).await;

    metrics::record_delivery(&report);
    metrics::record_latency(start.elapsed().as_secs_f64());
    if membership_change {
        metrics::set_active_rooms(state.router.stats().rooms.room_count);
    }

    debug!(
        connection = %connection_id,
        kind = %report.kind,
        room = report.room_id,
        recipients = report.recipients,
        failed = report.failed,
        "Dispatched"
    );
}

/// Log an undecodable frame. The connection stays open.
fn reject(connection_id: &ConnectionId, error: &ProtocolError) {
    warn!(connection = %connection_id, error = %error, "Malformed inbound frame");
    metrics::record_error("decode");
}
