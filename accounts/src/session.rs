use crate::credentials::{Claims, CredentialCodec, CredentialError};
use crate::metrics_defs::{ACCOUNTS_REGISTERED, LOGIN_FAILURE, LOGIN_SUCCESS};
use crate::store::{Account, AccountPatch, AccountStore, NewAccount, StoreError};
use serde::{Deserialize, Serialize};
use shared::counter;
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedCause {
    MissingApiKey,
    UnknownApiKey,
    MissingToken,
    InvalidToken,
    ExpiredToken,
}

impl UnauthorizedCause {
    pub fn message(&self) -> &'static str {
        match self {
            UnauthorizedCause::MissingApiKey => "API key is required",
            UnauthorizedCause::UnknownApiKey => "invalid API key",
            UnauthorizedCause::MissingToken => "JWT token is required",
            UnauthorizedCause::InvalidToken => "invalid token",
            UnauthorizedCause::ExpiredToken => "token has expired",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("user not found")]
    NotFound,

    #[error("user is not active")]
    Inactive,

    #[error("invalid password")]
    InvalidCredential,

    #[error("{}", .0.message())]
    Unauthorized(UnauthorizedCause),

    #[error("storage failure: {0}")]
    Storage(StoreError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Storage(e)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub id: i64,
    pub token: String,
    pub api_key: String,
    pub username: String,
}

/// Sparse profile change. An absent or `null` field is left untouched; a
/// present field must hold a valid value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_email(email: &str) -> Result<(), SessionError> {
    if email.is_empty() || !email.contains('@') {
        return Err(SessionError::Validation("invalid email address".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), SessionError> {
    if password.is_empty() {
        return Err(SessionError::Validation("password is required".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(SessionError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), SessionError> {
    if username.is_empty() {
        return Err(SessionError::Validation("username is required".to_string()));
    }
    Ok(())
}

/// Maps a failed write, naming the field whose uniqueness was violated.
fn write_error(e: StoreError, email_taken: &str) -> SessionError {
    if !matches!(e, StoreError::Conflict(_)) {
        return SessionError::Storage(e);
    }
    let message = match e.conflicting_column() {
        Some("email") => email_taken,
        Some("api_key") => "API key is already in use",
        _ => "account conflicts with an existing user",
    };
    SessionError::Conflict(message.to_string())
}

/// Registration, login and profile workflows.
///
/// Holds no per-account state between calls; every read goes to the store.
/// Uniqueness checks and the following write are separate round trips, so two
/// racing requests can both pass the check. The loser is rejected by the
/// store's unique constraint and reported as [`SessionError::Conflict`].
pub struct SessionCore {
    store: Arc<dyn AccountStore>,
    codec: Arc<CredentialCodec>,
}

impl SessionCore {
    pub fn new(store: Arc<dyn AccountStore>, codec: Arc<CredentialCodec>) -> Self {
        SessionCore { store, codec }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Account, SessionError> {
        validate_email(&request.email)?;
        validate_password(&request.password)?;
        validate_username(&request.username)?;

        if self.store.find_by_email(&request.email).await?.is_some() {
            return Err(SessionError::Conflict(
                "user with this email already exists".to_string(),
            ));
        }

        let new_account = NewAccount {
            username: request.username,
            email: request.email,
            password_hash: self.codec.hash_password(&request.password)?,
            api_key: self.codec.generate_api_key()?,
            is_active: true,
        };

        let account = self
            .store
            .insert(new_account)
            .await
            .map_err(|e| write_error(e, "user with this email already exists"))?;

        counter!(ACCOUNTS_REGISTERED).increment(1);
        Ok(account)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, SessionError> {
        let result = self.try_login(request).await;
        match &result {
            Ok(response) => {
                counter!(LOGIN_SUCCESS).increment(1);
                tracing::info!(account_id = response.id, "Login succeeded");
            }
            Err(e) => {
                let reason = match e {
                    SessionError::NotFound => "not_found",
                    SessionError::Inactive => "inactive",
                    SessionError::InvalidCredential => "invalid_password",
                    _ => "error",
                };
                metrics::counter!(LOGIN_FAILURE.name, "reason" => reason).increment(1);
                tracing::debug!(reason, "Login rejected");
            }
        }
        result
    }

    async fn try_login(&self, request: LoginRequest) -> Result<LoginResponse, SessionError> {
        let account = self
            .store
            .find_by_email(&request.email)
            .await?
            .ok_or(SessionError::NotFound)?;

        if !account.is_active {
            return Err(SessionError::Inactive);
        }

        if !self
            .codec
            .verify_password(&request.password, &account.password_hash)?
        {
            return Err(SessionError::InvalidCredential);
        }

        let token = self.codec.issue_token(account.id, &account.email)?;

        Ok(LoginResponse {
            id: account.id,
            token,
            api_key: account.api_key,
            username: account.username,
        })
    }

    /// Applies `update` to the account identified by `account_id`, which the
    /// caller takes from verified token claims.
    pub async fn update_profile(
        &self,
        account_id: i64,
        update: ProfileUpdate,
    ) -> Result<Account, SessionError> {
        let current = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        if let Some(username) = &update.username {
            validate_username(username)?;
        }
        if let Some(email) = &update.email {
            validate_email(email)?;
        }
        if let Some(password) = &update.password {
            validate_password(password)?;
        }
        if let Some(api_key) = &update.api_key
            && api_key.is_empty()
        {
            return Err(SessionError::Validation("API key must not be empty".to_string()));
        }

        if let Some(email) = &update.email
            && *email != current.email
            && let Some(other) = self.store.find_by_email(email).await?
            && other.id != current.id
        {
            return Err(SessionError::Conflict(
                "another user with this email already exists".to_string(),
            ));
        }

        let patch = AccountPatch {
            username: update.username,
            email: update.email,
            password_hash: update
                .password
                .map(|password| self.codec.hash_password(&password))
                .transpose()?,
            api_key: update.api_key,
            is_active: update.is_active,
        };

        if patch.is_empty() {
            return Ok(current);
        }

        self.store
            .update(account_id, &patch)
            .await
            .map_err(|e| write_error(e, "another user with this email already exists"))?
            .ok_or(SessionError::NotFound)
    }

    pub async fn validate_api_key(&self, api_key: Option<&str>) -> Result<Account, SessionError> {
        let api_key = api_key
            .filter(|key| !key.is_empty())
            .ok_or(SessionError::Unauthorized(UnauthorizedCause::MissingApiKey))?;

        self.store
            .find_by_api_key(api_key)
            .await?
            .ok_or(SessionError::Unauthorized(UnauthorizedCause::UnknownApiKey))
    }

    pub fn validate_token(&self, token: Option<&str>) -> Result<Claims, SessionError> {
        let token = token
            .filter(|token| !token.is_empty())
            .ok_or(SessionError::Unauthorized(UnauthorizedCause::MissingToken))?;

        self.codec.verify_token(token).map_err(|e| match e {
            CredentialError::TokenExpired => {
                SessionError::Unauthorized(UnauthorizedCause::ExpiredToken)
            }
            _ => SessionError::Unauthorized(UnauthorizedCause::InvalidToken),
        })
    }
}
