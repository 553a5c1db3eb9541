use shared::metrics_defs::{MetricDef, MetricType};

pub const CONNECTIONS_OPEN: MetricDef = MetricDef {
    name: "ingest.connections.open",
    metric_type: MetricType::Gauge,
    description: "Number of ingestion connections currently open",
};

pub const EVENTS_RECEIVED: MetricDef = MetricDef {
    name: "ingest.events.received",
    metric_type: MetricType::Counter,
    description: "Number of telemetry events decoded and buffered",
};

pub const FRAMES_MALFORMED: MetricDef = MetricDef {
    name: "ingest.frames.malformed",
    metric_type: MetricType::Counter,
    description: "Number of inbound frames dropped because they did not decode",
};

pub const PERSIST_FAILED: MetricDef = MetricDef {
    name: "ingest.events.persist_failed",
    metric_type: MetricType::Counter,
    description: "Number of buffered events that could not be written to storage",
};

pub const PERSIST_DURATION: MetricDef = MetricDef {
    name: "ingest.persist.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent writing one event to storage, in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CONNECTIONS_OPEN,
    EVENTS_RECEIVED,
    FRAMES_MALFORMED,
    PERSIST_FAILED,
    PERSIST_DURATION,
];
