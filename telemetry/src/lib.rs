//! Streaming ingestion of HTTP request telemetry.
//!
//! Every websocket connection on `/stream` runs its own
//! [`connection::IngestionConnection`]. Decoded events are appended to the
//! shared in-memory [`buffer::TelemetryBuffer`] and then written to the
//! durable [`store::EventStore`]. The buffer is a process-lifetime cache for
//! debugging; the store is the system of record.

pub mod api;
pub mod buffer;
pub mod connection;
pub mod event;
pub mod metrics_defs;
pub mod store;

#[cfg(test)]
mod testutils;
