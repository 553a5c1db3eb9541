//! Telemetry ingestion and account service.
//!
//! The public listener serves the `/auth` routes, the `/stream` ingestion
//! websocket and the metric read endpoints. A second listener serves the
//! admin probes.

pub mod config;
pub mod observability;
pub mod server;
