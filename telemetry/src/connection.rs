//! Lifecycle of one streaming ingestion connection.
//!
//! The connection is driven over an abstract duplex channel: a stream of
//! inbound [`Frame`]s and a sink of outbound acknowledgment texts. The
//! websocket adapter lives in [`crate::api`].
//!
//! Per frame the pipeline is strictly sequential: decode, append to the
//! buffer, persist, acknowledge, then read the next frame. Malformed frames
//! and failed writes to storage are logged and skipped. Only a transport
//! failure or the peer going away ends the loop.

use crate::buffer::TelemetryBuffer;
use crate::event::{Ack, TelemetryEvent};
use crate::metrics_defs::{
    CONNECTIONS_OPEN, EVENTS_RECEIVED, FRAMES_MALFORMED, PERSIST_DURATION, PERSIST_FAILED,
};
use crate::store::EventStore;
use futures::{Sink, SinkExt, Stream, StreamExt};
use shared::{counter, gauge, histogram};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Inbound unit read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
    /// Ping, pong and other frames with no payload for us.
    Control,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("read failed: {0}")]
    Read(String),
    #[error("write failed: {0}")]
    Write(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame.
    PeerClosed,
    /// The inbound stream ended without a close frame.
    EndOfStream,
    Transport(String),
}

impl CloseReason {
    fn is_error(&self) -> bool {
        matches!(self, CloseReason::Transport(_))
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::EndOfStream => write!(f, "end of stream"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// What happened over the life of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub received: u64,
    pub malformed: u64,
    pub persist_failed: u64,
    pub close: CloseReason,
}

enum Step {
    Continue,
    Close(CloseReason),
}

pub struct IngestionConnection {
    peer: String,
    buffer: Arc<TelemetryBuffer>,
    store: Arc<dyn EventStore>,
    received: u64,
    malformed: u64,
    persist_failed: u64,
}

impl IngestionConnection {
    pub fn new(
        peer: impl Into<String>,
        buffer: Arc<TelemetryBuffer>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        IngestionConnection {
            peer: peer.into(),
            buffer,
            store,
            received: 0,
            malformed: 0,
            persist_failed: 0,
        }
    }

    /// Runs the read loop until the peer leaves or the transport fails.
    pub async fn run<R, W>(mut self, reader: R, writer: W) -> ConnectionReport
    where
        R: Stream<Item = Result<Frame, TransportError>>,
        W: Sink<String>,
        W::Error: fmt::Display,
    {
        let mut reader = std::pin::pin!(reader);
        let mut writer = std::pin::pin!(writer);

        gauge!(CONNECTIONS_OPEN).increment(1.0);
        tracing::info!(peer = %self.peer, "Ingestion connection open");

        let close = loop {
            let frame = match reader.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => break CloseReason::Transport(e.to_string()),
                None => break CloseReason::EndOfStream,
            };

            let payload = match frame {
                Frame::Text(text) => text.into_bytes(),
                Frame::Binary(bytes) => bytes,
                Frame::Close => break CloseReason::PeerClosed,
                Frame::Control => continue,
            };

            match self.handle_payload(&payload, &mut writer).await {
                Step::Continue => {}
                Step::Close(reason) => break reason,
            }
        };

        if close.is_error() {
            tracing::warn!(peer = %self.peer, reason = %close, "Ingestion connection closing");
        } else {
            tracing::info!(peer = %self.peer, reason = %close, "Ingestion connection closing");
        }
        // Best effort; the peer may already be gone.
        let _ = writer.close().await;

        gauge!(CONNECTIONS_OPEN).decrement(1.0);
        tracing::info!(
            peer = %self.peer,
            received = self.received,
            malformed = self.malformed,
            persist_failed = self.persist_failed,
            "Ingestion connection closed"
        );

        ConnectionReport {
            received: self.received,
            malformed: self.malformed,
            persist_failed: self.persist_failed,
            close,
        }
    }

    async fn handle_payload<W>(&mut self, payload: &[u8], writer: &mut W) -> Step
    where
        W: Sink<String> + Unpin,
        W::Error: fmt::Display,
    {
        let event = match TelemetryEvent::decode(payload) {
            Ok(event) => event,
            Err(e) => {
                self.malformed += 1;
                counter!(FRAMES_MALFORMED).increment(1);
                tracing::warn!(peer = %self.peer, error = %e, "Dropping malformed frame");
                return Step::Continue;
            }
        };

        self.received += 1;
        counter!(EVENTS_RECEIVED).increment(1);
        tracing::debug!(
            project_id = %event.project_id,
            method = %event.method,
            route = %event.route,
            status_code = event.status_code,
            response_time_ms = event.response_time,
            "Received telemetry event"
        );

        // Memory first, then storage. A storage failure does not undo the
        // append.
        self.buffer.append(event.clone());
        let persisted = self.persist(&event).await;

        let ack = Ack::new(persisted);
        let text = match serde_json::to_string(&ack) {
            Ok(text) => text,
            Err(e) => return Step::Close(CloseReason::Transport(e.to_string())),
        };

        match writer.send(text).await {
            Ok(()) => Step::Continue,
            Err(e) => Step::Close(CloseReason::Transport(
                TransportError::Write(e.to_string()).to_string(),
            )),
        }
    }

    async fn persist(&mut self, event: &TelemetryEvent) -> bool {
        let start = Instant::now();
        let result = self.store.persist(event).await;
        histogram!(PERSIST_DURATION).record(start.elapsed().as_secs_f64());

        match result {
            Ok(stored) => {
                tracing::debug!(
                    peer = %self.peer,
                    event_id = stored.id,
                    "Persisted telemetry event"
                );
                true
            }
            Err(e) => {
                self.persist_failed += 1;
                counter!(PERSIST_FAILED).increment(1);
                tracing::error!(
                    peer = %self.peer,
                    project_id = %event.project_id,
                    error = %e,
                    "Failed to persist telemetry event; kept in buffer only"
                );
                false
            }
        }
    }
}
