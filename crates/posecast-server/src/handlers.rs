//! Connection handlers for the Posecast server.
//!
//! This module wires the HTTP/WebSocket surface to the core: sessions are
//! registered on upgrade and drained by a writer task, while the pose
//! stream (or the relay) pushes into their queues.

use crate::config::{Config, ConfigError, Mode, SourceKind};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use posecast_core::{
    Broadcaster, ChannelSink, ClientRegistry, ClientSession, Payload, PoseSource, PoseStreamer,
    Relay, SessionId, SimulatedPoseSource, StaticPoseSource, Ticker,
};
use posecast_protocol::PoseEncoder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Shared server state.
pub struct AppState {
    /// Connected sessions.
    pub registry: Arc<ClientRegistry>,
    /// Fan-out over the registry.
    pub broadcaster: Broadcaster,
    /// Client-to-client forwarding, used in relay mode.
    pub relay: Relay,
    /// Server configuration.
    pub config: Config,
    /// Cancelled on shutdown.
    pub cancel: CancellationToken,
    /// Connection slots in use, reserved before the upgrade.
    connections: AtomicUsize,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let relay = Relay::new(broadcaster.clone(), config.limits.max_message_size);

        Self {
            registry,
            broadcaster,
            relay,
            config,
            cancel,
            connections: AtomicUsize::new(0),
        }
    }

    /// Reserve a connection slot, or `None` at `limits.max_connections`.
    pub fn try_reserve(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let limit = self.config.limits.max_connections;
        self.connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()?;
        Some(ConnectionSlot {
            state: Arc::clone(self),
        })
    }

    /// Connection slots currently held.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }
}

/// A reserved connection slot, released on drop.
pub struct ConnectionSlot {
    state: Arc<AppState>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the pose source named by the configuration.
///
/// # Errors
///
/// Returns an error if the source settings are invalid.
pub fn build_source(config: &Config) -> Result<Arc<dyn PoseSource>, ConfigError> {
    let tracked_object_id = config.stream.tracked_object_id.clone();
    let source: Arc<dyn PoseSource> = match config.source.kind {
        SourceKind::Simulated => Arc::new(SimulatedPoseSource::new(
            tracked_object_id,
            config.source.radius_m,
            config.simulated_period()?,
        )),
        SourceKind::Static => Arc::new(StaticPoseSource::new(tracked_object_id, config.static_pose())),
    };
    Ok(source)
}

/// Run the HTTP/WebSocket server until `cancel` fires or the stream fails.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the pose stream
/// stops with an error.
pub async fn run_server(config: Config, cancel: CancellationToken) -> Result<()> {
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    // Relay mode never samples, so no source is opened for it.
    let source = match config.mode {
        Mode::Stream => Some(build_source(&config)?),
        Mode::Relay => None,
    };
    serve(listener, config, source, cancel).await
}

/// Serve on an already bound listener.
///
/// Stream mode requires `source`. In relay mode a given source is released
/// without being sampled.
///
/// # Errors
///
/// Returns an error if serving fails or the pose stream stops with an error.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    source: Option<Arc<dyn PoseSource>>,
    cancel: CancellationToken,
) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone(), cancel.clone()));

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::clone(&state));

    let addr = listener.local_addr()?;
    info!(mode = config.mode.as_str(), "Posecast server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let shutdown = cancel.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await });

    let source = match (config.mode, source) {
        (Mode::Relay, source) => {
            if let Some(source) = source {
                source.release();
            }
            server.await?;
            info!("Relay stopped");
            return Ok(());
        }
        (Mode::Stream, Some(source)) => source,
        (Mode::Stream, None) => anyhow::bail!("Stream mode requires a pose source"),
    };

    match source.play_area_extent() {
        Ok(area) => info!(width = area.width, height = area.height, "Play area"),
        Err(e) => debug!(error = %e, "Play area unavailable"),
    }

    let ticker = match Ticker::from_rate_hz(config.stream.update_rate_hz) {
        Ok(ticker) => ticker,
        Err(e) => {
            source.release();
            return Err(e.into());
        }
    };
    let streamer = PoseStreamer::new(
        source,
        PoseEncoder::new(config.stream.wire_format, config.channel_id()),
        config.stream.tracked_object_id.clone(),
        state.broadcaster.clone(),
    );

    let stream_cancel = cancel.clone();
    let stream = tokio::spawn(async move {
        let result = streamer
            .run(&ticker, &stream_cancel, metrics::record_tick)
            .await;
        if result.is_err() {
            metrics::record_error("stream");
            stream_cancel.cancel();
        }
        result
    });

    let served = server.await;
    cancel.cancel();

    let stats = stream
        .await
        .context("Pose stream task panicked")?
        .context("Pose stream failed")?;
    served?;

    info!(ticks = stats.ticks, overruns = stats.overruns, "Server stopped");
    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.config.mode.as_str(),
        "sessions": state.registry.len(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(slot) = state.try_reserve() else {
        warn!(%remote, limit = state.config.limits.max_connections, "Connection limit reached");
        metrics::record_rejected();
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    ws.on_upgrade(move |socket| handle_websocket(socket, remote, state, slot))
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    remote: SocketAddr,
    state: Arc<AppState>,
    _slot: ConnectionSlot,
) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (sink, mut outbound) =
        ChannelSink::new(state.config.limits.session_queue, state.config.send_timeout());
    let session = Arc::new(ClientSession::new(sink).with_remote_addr(remote.to_string()));
    let id = session.id();
    state.registry.register(Arc::clone(&session));

    debug!(session = %id, %remote, "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Writer: drain the session queue into the socket
    let writer_cancel = state.cancel.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                () = writer_cancel.cancelled() => {
                    let _ = sender.send(WsMessage::Close(None)).await;
                    break;
                }

                msg = outbound.recv() => {
                    let Some(msg) = msg else { break };
                    let bytes = msg.payload_size();
                    if sender.send(to_ws_message(msg.payload)).await.is_err() {
                        break;
                    }
                    metrics::record_message(bytes, "outbound");
                }
            }
        }
    });
    let mut writer_done = false;

    // Reader loop
    loop {
        tokio::select! {
            () = state.cancel.cancelled() => break,

            _ = &mut writer => {
                writer_done = true;
                break;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_client_message(&state, id, Payload::from(text)).await;
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        handle_client_message(&state, id, Payload::from(data)).await;
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!(session = %id, "Client closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session = %id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.registry.unregister(id);
    session.mark_dead();

    if !writer_done {
        if state.cancel.is_cancelled() {
            // Let the writer send its close frame.
            let _ = writer.await;
        } else {
            writer.abort();
        }
    }

    debug!(session = %id, age_ms = session.age().as_millis() as u64, "WebSocket disconnected");
}

/// Dispatch an inbound data frame.
async fn handle_client_message(state: &AppState, id: SessionId, payload: Payload) {
    metrics::record_message(payload.len(), "inbound");

    match state.config.mode {
        Mode::Relay => match state.relay.forward(id, payload).await {
            Ok(report) => metrics::record_relayed(report.delivered, report.dropped()),
            Err(_) => metrics::record_malformed(),
        },
        Mode::Stream => {
            trace!(session = %id, size = payload.len(), "Ignoring client message");
        }
    }
}

fn to_ws_message(payload: Payload) -> WsMessage {
    match payload {
        Payload::Text(text) => WsMessage::Text(text.to_string()),
        Payload::Binary(data) => WsMessage::Binary(data.to_vec()),
    }
}
