use crate::buffer::TelemetryBuffer;
use crate::connection::{Frame, IngestionConnection, TransportError};
use crate::event::{StoredEvent, TelemetryEvent};
use crate::store::{EventStore, EventStoreError};
use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt, future};
use serde::Serialize;
use shared::envelope::{ApiResponse, error_response};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Width of the `/recent` window, in milliseconds of client time.
const RECENT_WINDOW_MS: i64 = 60_000;

#[derive(Clone)]
pub struct TelemetryState {
    buffer: Arc<TelemetryBuffer>,
    store: Arc<dyn EventStore>,
    next_connection_id: Arc<AtomicU64>,
}

impl TelemetryState {
    pub fn new(buffer: Arc<TelemetryBuffer>, store: Arc<dyn EventStore>) -> Self {
        TelemetryState {
            buffer,
            store,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn router(state: TelemetryState) -> Router {
    Router::new()
        .route("/stream", get(stream))
        .route("/metrics", get(list_metrics))
        .route("/metrics/{project_id}", get(list_project_metrics))
        .route("/metrics/{project_id}/recent", get(list_recent_metrics))
        .route("/buffer", get(list_buffer))
        .route("/buffer/{project_id}", get(list_project_buffer))
        .with_state(state)
}

#[derive(thiserror::Error, Debug)]
pub enum TelemetryApiError {
    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl IntoResponse for TelemetryApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Telemetry read failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch metrics")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventListing<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    total: usize,
    metrics: Vec<T>,
}

impl<T> EventListing<T> {
    fn new(project_id: Option<String>, metrics: Vec<T>) -> Self {
        EventListing {
            project_id,
            total: metrics.len(),
            metrics,
        }
    }
}

type Listing<T> = Result<ApiResponse<EventListing<T>>, TelemetryApiError>;

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text.as_str().to_string()),
            Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            Message::Close(_) => Frame::Close,
            Message::Ping(_) | Message::Pong(_) => Frame::Control,
        }
    }
}

async fn stream(ws: WebSocketUpgrade, State(state): State<TelemetryState>) -> Response {
    let id = state.next_connection_id.fetch_add(1, Ordering::Relaxed);
    let peer = format!("conn-{id}");

    ws.on_failed_upgrade(move |e: axum::Error| {
        tracing::warn!(connection = id, error = %e, "Ingestion upgrade failed");
    })
    .on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(socket: WebSocket, peer: String, state: TelemetryState) {
    let (sender, receiver) = socket.split();

    let reader = receiver.map(|message| {
        message
            .map(Frame::from)
            .map_err(|e| TransportError::Read(e.to_string()))
    });
    let writer = sender.with(|text: String| {
        future::ready(Ok::<_, axum::Error>(Message::Text(text.into())))
    });

    IngestionConnection::new(peer, state.buffer, state.store)
        .run(reader, writer)
        .await;
}

async fn list_metrics(State(state): State<TelemetryState>) -> Listing<StoredEvent> {
    let events = state.store.list_all().await?;
    Ok(ApiResponse::ok(
        "metrics retrieved successfully",
        EventListing::new(None, events),
    ))
}

async fn list_project_metrics(
    State(state): State<TelemetryState>,
    Path(project_id): Path<String>,
) -> Listing<StoredEvent> {
    let events = state.store.list_by_project(&project_id).await?;
    Ok(ApiResponse::ok(
        "metrics retrieved successfully",
        EventListing::new(Some(project_id), events),
    ))
}

async fn list_recent_metrics(
    State(state): State<TelemetryState>,
    Path(project_id): Path<String>,
) -> Listing<StoredEvent> {
    let since_ms = Utc::now().timestamp_millis() - RECENT_WINDOW_MS;
    let events = state.store.list_recent(&project_id, since_ms).await?;
    Ok(ApiResponse::ok(
        "recent metrics retrieved successfully",
        EventListing::new(Some(project_id), events),
    ))
}

async fn list_buffer(State(state): State<TelemetryState>) -> Listing<TelemetryEvent> {
    Ok(ApiResponse::ok(
        "buffered metrics retrieved successfully",
        EventListing::new(None, state.buffer.all()),
    ))
}

async fn list_project_buffer(
    State(state): State<TelemetryState>,
    Path(project_id): Path<String>,
) -> Listing<TelemetryEvent> {
    let events = state.buffer.by_project(&project_id);
    Ok(ApiResponse::ok(
        "buffered metrics retrieved successfully",
        EventListing::new(Some(project_id), events),
    ))
}
