//! Durable account records.
//!
//! Each call is one independent round trip. Uniqueness of email and API key is
//! enforced by the schema; a violation comes back as [`StoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        api_key TEXT NOT NULL UNIQUE,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_accounts_email ON accounts(email)",
    "CREATE INDEX IF NOT EXISTS idx_accounts_api_key ON accounts(api_key)",
];

const ACCOUNT_COLUMNS: &str =
    "id, username, email, password_hash, api_key, is_active, created_at, updated_at";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("uniqueness violation: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Column whose unique constraint rejected the write, when known. SQLite
    /// reports these as `UNIQUE constraint failed: accounts.<column>`.
    pub fn conflicting_column(&self) -> Option<&str> {
        match self {
            StoreError::Conflict(message) => {
                message.rsplit_once('.').map(|(_, column)| column.trim())
            }
            StoreError::Database(_) => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return StoreError::Conflict(db_err.message().to_string());
        }
        StoreError::Database(e)
    }
}

/// A stored account. The password hash is never serialized.
#[derive(Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub api_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("api_key", &self.api_key)
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Fields supplied when creating an account; the store assigns id and
/// timestamps.
#[derive(Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub api_key: String,
    pub is_active: bool,
}

/// Sparse set of column changes. `None` leaves the column untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccountPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub api_key: Option<String>,
    pub is_active: Option<bool>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.api_key.is_none()
            && self.is_active.is_none()
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Account>, StoreError>;

    async fn insert(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// Applies `patch` to the account and returns the updated row, or `None`
    /// when no account has that id.
    async fn update(&self, id: i64, patch: &AccountPatch) -> Result<Option<Account>, StoreError>;
}

pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteAccountStore { pool }
    }

    /// Creates the accounts table and its indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn find_one(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = ?");
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.find_one("email", email).await
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Account>, StoreError> {
        self.find_one("api_key", api_key).await
    }

    async fn insert(&self, account: NewAccount) -> Result<Account, StoreError> {
        let now = Utc::now();
        let query = format!(
            "INSERT INTO accounts (username, email, password_hash, api_key, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {ACCOUNT_COLUMNS}"
        );

        let created = sqlx::query_as::<_, Account>(&query)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&account.api_key)
            .bind(account.is_active)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(account_id = created.id, "Account created");
        Ok(created)
    }

    async fn update(&self, id: i64, patch: &AccountPatch) -> Result<Option<Account>, StoreError> {
        // One fixed statement; unset parameters bind NULL and keep the column.
        let query = format!(
            "UPDATE accounts SET \
                username = COALESCE(?, username), \
                email = COALESCE(?, email), \
                password_hash = COALESCE(?, password_hash), \
                api_key = COALESCE(?, api_key), \
                is_active = COALESCE(?, is_active), \
                updated_at = ? \
             WHERE id = ? \
             RETURNING {ACCOUNT_COLUMNS}"
        );

        let updated = sqlx::query_as::<_, Account>(&query)
            .bind(patch.username.as_deref())
            .bind(patch.email.as_deref())
            .bind(patch.password_hash.as_deref())
            .bind(patch.api_key.as_deref())
            .bind(patch.is_active)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        if updated.is_some() {
            tracing::info!(account_id = id, "Account updated");
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::temp_account_store;

    fn new_account(email: &str, api_key: &str) -> NewAccount {
        NewAccount {
            username: "ann".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$fake".to_string(),
            api_key: api_key.to_string(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let (_dir, store) = temp_account_store().await;

        let created = store.insert(new_account("a@x.com", "pk_1")).await.unwrap();
        assert!(created.id > 0);
        assert!(created.is_active);

        let by_email = store.find_by_email("a@x.com").await.unwrap().unwrap();
        let by_key = store.find_by_api_key("pk_1").await.unwrap().unwrap();
        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();

        assert_eq!(by_email.id, created.id);
        assert_eq!(by_key.id, created.id);
        assert_eq!(by_id.email, "a@x.com");

        assert!(store.find_by_email("b@x.com").await.unwrap().is_none());
        assert!(store.find_by_api_key("pk_2").await.unwrap().is_none());
        assert!(store.find_by_id(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_violations_are_conflicts() {
        let (_dir, store) = temp_account_store().await;
        store.insert(new_account("a@x.com", "pk_1")).await.unwrap();

        let email_taken = store.insert(new_account("a@x.com", "pk_2")).await.unwrap_err();
        assert!(matches!(email_taken, StoreError::Conflict(_)));
        assert_eq!(email_taken.conflicting_column(), Some("email"));

        let key_taken = store.insert(new_account("b@x.com", "pk_1")).await.unwrap_err();
        assert!(matches!(key_taken, StoreError::Conflict(_)));
        assert_eq!(key_taken.conflicting_column(), Some("api_key"));
    }

    #[tokio::test]
    async fn test_sparse_update() {
        let (_dir, store) = temp_account_store().await;
        let created = store.insert(new_account("a@x.com", "pk_1")).await.unwrap();

        let patch = AccountPatch {
            username: Some("x".to_string()),
            ..Default::default()
        };
        let updated = store.update(created.id, &patch).await.unwrap().unwrap();

        assert_eq!(updated.username, "x");
        assert_eq!(updated.email, created.email);
        assert_eq!(updated.password_hash, created.password_hash);
        assert_eq!(updated.api_key, created.api_key);
        assert_eq!(updated.is_active, created.is_active);

        let patch = AccountPatch {
            is_active: Some(false),
            ..Default::default()
        };
        let updated = store.update(created.id, &patch).await.unwrap().unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.username, "x");
    }

    #[tokio::test]
    async fn test_update_missing_account() {
        let (_dir, store) = temp_account_store().await;
        let patch = AccountPatch {
            username: Some("x".to_string()),
            ..Default::default()
        };
        assert!(store.update(99, &patch).await.unwrap().is_none());
    }

    #[test]
    fn test_password_hash_is_never_exposed() {
        let account = Account {
            id: 1,
            username: "ann".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            api_key: "pk_1".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["apiKey"], "pk_1");
        assert_eq!(json["isActive"], true);
        assert!(!format!("{account:?}").contains("$argon2id$secret"));
    }
}
