pub mod admin_service;
pub mod envelope;
pub mod http;
pub mod metrics_defs;
pub mod storage;
