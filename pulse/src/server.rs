use crate::config::Config;
use accounts::credentials::{CredentialCodec, CredentialError};
use accounts::session::SessionCore;
use accounts::store::{SqliteAccountStore, StoreError};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use shared::admin_service::AdminService;
use shared::http::{bind, run_http_service};
use shared::storage::{StorageError, connect};
use sqlx::SqlitePool;
use std::io;
use std::sync::Arc;
use telemetry::api::TelemetryState;
use telemetry::buffer::TelemetryBuffer;
use telemetry::store::{EventStoreError, SqliteEventStore};
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("account schema migration failed: {0}")]
    AccountMigration(#[from] StoreError),
    #[error("event schema migration failed: {0}")]
    EventMigration(#[from] EventStoreError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Creates every table and index the service needs. Safe to run repeatedly.
pub async fn migrate(pool: &SqlitePool) -> Result<(), ServerError> {
    SqliteAccountStore::new(pool.clone()).migrate().await?;
    SqliteEventStore::new(pool.clone()).migrate().await?;
    tracing::info!("Storage schema is up to date");
    Ok(())
}

/// The public router: account routes, telemetry routes and `/health`.
pub fn app(pool: SqlitePool, token_secret: &str) -> Result<Router, ServerError> {
    let codec = Arc::new(CredentialCodec::new(token_secret)?);
    let account_store = Arc::new(SqliteAccountStore::new(pool.clone()));
    let session = Arc::new(SessionCore::new(account_store, codec));

    let telemetry_state = TelemetryState::new(
        Arc::new(TelemetryBuffer::new()),
        Arc::new(SqliteEventStore::new(pool)),
    );

    Ok(Router::new()
        .route("/health", get(health))
        .merge(accounts::api::router(session))
        .merge(telemetry::api::router(telemetry_state)))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "pulse"}))
}

/// Serves the public router and the admin probes until either listener fails.
pub async fn serve(
    listener: TcpListener,
    admin_listener: TcpListener,
    app: Router,
    pool: SqlitePool,
) -> Result<(), ServerError> {
    let public_task = async { axum::serve(listener, app).await };

    let admin = AdminService::new(move || !pool.is_closed());
    let admin_task = run_http_service::<_, io::Error>(admin_listener, admin);

    tokio::try_join!(public_task, admin_task)?;
    Ok(())
}

pub async fn run(config: Config) -> Result<(), ServerError> {
    let pool = connect(&config.storage).await?;
    migrate(&pool).await?;

    let app = app(pool.clone(), &config.auth.token_secret)?;

    let listener = bind(&config.listener.host, config.listener.port).await?;
    let admin_listener = bind(&config.admin_listener.host, config.admin_listener.port).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        admin_addr = %admin_listener.local_addr()?,
        "Pulse listening"
    );

    serve(listener, admin_listener, app, pool).await
}
