use crate::credentials::CredentialCodec;
use crate::session::SessionCore;
use crate::store::{Account, AccountPatch, AccountStore, NewAccount, SqliteAccountStore, StoreError};
use async_trait::async_trait;
use shared::storage::{StorageConfig, connect};
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_TOKEN_SECRET: &str = "test-token-secret";

/// Opens a migrated account store backed by a database file in a fresh
/// temporary directory. Keep the directory alive for the lifetime of the store.
pub async fn temp_account_store() -> (TempDir, SqliteAccountStore) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("accounts.db").display());
    let pool = connect(&StorageConfig::new(url)).await.unwrap();

    let store = SqliteAccountStore::new(pool);
    store.migrate().await.unwrap();
    (dir, store)
}

pub async fn temp_session_core() -> (TempDir, Arc<SessionCore>) {
    let (dir, store) = temp_account_store().await;
    let codec = CredentialCodec::new(TEST_TOKEN_SECRET).unwrap();
    let core = SessionCore::new(Arc::new(store), Arc::new(codec));
    (dir, Arc::new(core))
}

/// Wraps a real store but never finds accounts by email, so every uniqueness
/// pre-check passes and the write itself hits the unique constraint. This is
/// what a request sees when a concurrent request wins between check and write.
pub struct StaleEmailLookupStore(pub SqliteAccountStore);

#[async_trait]
impl AccountStore for StaleEmailLookupStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError> {
        self.0.find_by_id(id).await
    }

    async fn find_by_email(&self, _email: &str) -> Result<Option<Account>, StoreError> {
        Ok(None)
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Account>, StoreError> {
        self.0.find_by_api_key(api_key).await
    }

    async fn insert(&self, account: NewAccount) -> Result<Account, StoreError> {
        self.0.insert(account).await
    }

    async fn update(&self, id: i64, patch: &AccountPatch) -> Result<Option<Account>, StoreError> {
        self.0.update(id, patch).await
    }
}

pub async fn temp_stale_lookup_session_core() -> (TempDir, Arc<SessionCore>) {
    let (dir, store) = temp_account_store().await;
    let codec = CredentialCodec::new(TEST_TOKEN_SECRET).unwrap();
    let core = SessionCore::new(Arc::new(StaleEmailLookupStore(store)), Arc::new(codec));
    (dir, Arc::new(core))
}
