use crate::credentials::Claims;
use crate::session::{
    LoginRequest, LoginResponse, ProfileUpdate, RegisterRequest, SessionCore, SessionError,
};
use crate::store::Account;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use shared::envelope::{ApiResponse, error_response};
use std::sync::Arc;

const BEARER_SCHEME: &str = "Bearer";
const API_KEY_SCHEME: &str = "ApiKey";

/// Routes for the account workflows, mounted at the root of the public
/// listener.
pub fn router(core: Arc<SessionCore>) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/update", put(update).patch(update))
        .route("/auth/validate-apikey", get(validate_api_key))
        .route("/auth/validate-jwt", get(validate_jwt))
        .with_state(core)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredAccount {
    id: i64,
    username: String,
    email: String,
    api_key: String,
    is_active: bool,
}

impl From<Account> for RegisteredAccount {
    fn from(account: Account) -> Self {
        RegisteredAccount {
            id: account.id,
            username: account.username,
            email: account.email,
            api_key: account.api_key,
            is_active: account.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountSummary {
    id: i64,
    username: String,
    email: String,
    is_active: bool,
}

impl From<Account> for AccountSummary {
    fn from(account: Account) -> Self {
        AccountSummary {
            id: account.id,
            username: account.username,
            email: account.email,
            is_active: account.is_active,
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SessionError::Validation(_) | SessionError::Conflict(_) => StatusCode::BAD_REQUEST,
            SessionError::NotFound
            | SessionError::Inactive
            | SessionError::InvalidCredential
            | SessionError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SessionError::Storage(_) | SessionError::Credential(_) => {
                tracing::error!(error = %self, "Account request failed");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
            }
        };

        error_response(status, self.to_string())
    }
}

/// Returns the credential of an `Authorization: <scheme> <credential>` header.
/// Anything other than exactly two space separated parts is treated as absent.
fn credential<'a>(headers: &'a HeaderMap, scheme: &str) -> Option<&'a str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(found), Some(credential), None) if found == scheme => Some(credential),
        _ => None,
    }
}

/// Decodes a JSON object body. Positional arrays are rejected even when their
/// values line up with the fields.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, SessionError> {
    let rejected = |e: serde_json::Error| {
        tracing::debug!(error = %e, "Rejected request body");
        SessionError::Validation("invalid request body".to_string())
    };

    let fields: Map<String, Value> = serde_json::from_slice(body).map_err(rejected)?;
    serde_json::from_value(Value::Object(fields)).map_err(rejected)
}

async fn register(
    State(core): State<Arc<SessionCore>>,
    body: Bytes,
) -> Result<ApiResponse<RegisteredAccount>, SessionError> {
    let request: RegisterRequest = parse_body(&body)?;
    let account = core.register(request).await?;
    Ok(ApiResponse::created("user registered successfully", account.into()))
}

async fn login(
    State(core): State<Arc<SessionCore>>,
    body: Bytes,
) -> Result<ApiResponse<LoginResponse>, SessionError> {
    let request: LoginRequest = parse_body(&body)?;
    let response = core.login(request).await?;
    Ok(ApiResponse::ok("user logged in successfully", response))
}

async fn update(
    State(core): State<Arc<SessionCore>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<Account>, SessionError> {
    // The token is checked before the body is even looked at.
    let claims = core.validate_token(credential(&headers, BEARER_SCHEME))?;
    let update: ProfileUpdate = parse_body(&body)?;
    let account = core.update_profile(claims.account_id, update).await?;
    Ok(ApiResponse::ok("user updated successfully", account))
}

async fn validate_api_key(
    State(core): State<Arc<SessionCore>>,
    headers: HeaderMap,
) -> Result<ApiResponse<AccountSummary>, SessionError> {
    let account = core
        .validate_api_key(credential(&headers, API_KEY_SCHEME))
        .await?;
    Ok(ApiResponse::ok("API key is valid", account.into()))
}

async fn validate_jwt(
    State(core): State<Arc<SessionCore>>,
    headers: HeaderMap,
) -> Result<ApiResponse<Claims>, SessionError> {
    let claims = core.validate_token(credential(&headers, BEARER_SCHEME))?;
    Ok(ApiResponse::ok("JWT token is valid", claims))
}
