use crate::event::{StoredEvent, TelemetryEvent};
use crate::store::{EventStore, EventStoreError, SqliteEventStore};
use async_trait::async_trait;
use shared::storage::{StorageConfig, connect};
use tempfile::TempDir;

pub fn event(project_id: &str, route: &str) -> TelemetryEvent {
    event_at(project_id, route, 1_700_000_000_000)
}

pub fn event_at(project_id: &str, route: &str, timestamp: i64) -> TelemetryEvent {
    TelemetryEvent {
        project_id: project_id.to_string(),
        route: route.to_string(),
        method: "GET".to_string(),
        status_code: 200,
        response_time: 12,
        timestamp,
    }
}

pub async fn temp_event_store() -> (TempDir, SqliteEventStore) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("events.db").display());
    let pool = connect(&StorageConfig::new(url)).await.unwrap();

    let store = SqliteEventStore::new(pool);
    store.migrate().await.unwrap();
    (dir, store)
}

/// A store whose writes always fail.
pub struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn persist(&self, _event: &TelemetryEvent) -> Result<StoredEvent, EventStoreError> {
        Err(sqlx::Error::PoolClosed.into())
    }

    async fn list_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        Err(sqlx::Error::PoolClosed.into())
    }

    async fn list_by_project(
        &self,
        _project_id: &str,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        Err(sqlx::Error::PoolClosed.into())
    }

    async fn list_recent(
        &self,
        _project_id: &str,
        _since_ms: i64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        Err(sqlx::Error::PoolClosed.into())
    }
}
