//! Durable storage for telemetry events.

use crate::event::{StoredEvent, TelemetryEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id TEXT NOT NULL,
        route TEXT NOT NULL,
        method TEXT NOT NULL,
        status_code INTEGER NOT NULL,
        response_time INTEGER NOT NULL,
        client_timestamp INTEGER NOT NULL,
        persisted_at TEXT NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_events_project_id ON events(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_client_timestamp ON events(client_timestamp)",
];

const EVENT_COLUMNS: &str =
    "id, project_id, route, method, status_code, response_time, client_timestamp, persisted_at";

#[derive(thiserror::Error, Debug)]
#[error("event storage failed: {0}")]
pub struct EventStoreError(#[from] sqlx::Error);

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Commits one event and returns it with its assigned id.
    async fn persist(&self, event: &TelemetryEvent) -> Result<StoredEvent, EventStoreError>;

    /// Every persisted event, newest first.
    async fn list_all(&self) -> Result<Vec<StoredEvent>, EventStoreError>;

    async fn list_by_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Events for a project whose client timestamp is at or after
    /// `since_ms`, newest first.
    async fn list_recent(
        &self,
        project_id: &str,
        since_ms: i64,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    project_id: String,
    route: String,
    method: String,
    status_code: u16,
    response_time: i64,
    client_timestamp: i64,
    persisted_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        StoredEvent {
            id: row.id,
            event: TelemetryEvent {
                project_id: row.project_id,
                route: row.route,
                method: row.method,
                status_code: row.status_code,
                response_time: row.response_time,
                timestamp: row.client_timestamp,
            },
            persisted_at: row.persisted_at,
        }
    }
}

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteEventStore { pool }
    }

    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn persist(&self, event: &TelemetryEvent) -> Result<StoredEvent, EventStoreError> {
        let query = format!(
            "INSERT INTO events (project_id, route, method, status_code, response_time, client_timestamp, persisted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {EVENT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, EventRow>(&query)
            .bind(&event.project_id)
            .bind(&event.route)
            .bind(&event.method)
            .bind(event.status_code)
            .bind(event.response_time)
            .bind(event.timestamp)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn list_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY id DESC");
        let rows = sqlx::query_as::<_, EventRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn list_by_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let query =
            format!("SELECT {EVENT_COLUMNS} FROM events WHERE project_id = ? ORDER BY id DESC");
        let rows = sqlx::query_as::<_, EventRow>(&query)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn list_recent(
        &self,
        project_id: &str,
        since_ms: i64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE project_id = ? AND client_timestamp >= ? \
             ORDER BY id DESC"
        );
        let rows = sqlx::query_as::<_, EventRow>(&query)
            .bind(project_id)
            .bind(since_ms)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }
}
