//! Password hashing, API key generation and bearer token signing.

use argon2::{
    Argon2,
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Marker that makes API keys recognizable next to bearer tokens.
pub const API_KEY_PREFIX: &str = "pk_";

/// Characters of encoded entropy following the prefix.
const API_KEY_BODY_LEN: usize = 40;

const API_KEY_ENTROPY_BYTES: usize = 32;

/// Fixed lifetime of a bearer token.
pub const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("could not hash password: {0}")]
    Hashing(String),

    #[error("randomness source failed: {0}")]
    Entropy(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("token has expired")]
    TokenExpired,

    #[error("could not sign token: {0}")]
    Signing(String),
}

/// Claims carried by a bearer token. Nothing is stored server side; validity
/// is decided by the signature and `exp` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub account_id: i64,
    pub email: String,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expires at, seconds since the epoch
    pub exp: i64,
}

pub struct CredentialCodec {
    hasher: Argon2<'static>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl CredentialCodec {
    /// Builds a codec that signs tokens with `token_secret`. An empty secret
    /// is a misconfiguration and is rejected.
    pub fn new(token_secret: &str) -> Result<Self, CredentialError> {
        if token_secret.is_empty() {
            return Err(CredentialError::Signing(
                "token signing secret is empty".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        Ok(CredentialCodec {
            hasher: Argon2::default(),
            encoding_key: EncodingKey::from_secret(token_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(token_secret.as_bytes()),
            validation,
        })
    }

    /// Salted Argon2id hash in PHC string format.
    pub fn hash_password(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    /// Checks `password` against a stored hash. A mismatch is `Ok(false)`;
    /// only an unparseable hash is an error.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, CredentialError> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| CredentialError::MalformedHash(e.to_string()))?;

        match self.hasher.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CredentialError::MalformedHash(e.to_string())),
        }
    }

    /// Generates a fresh URL-safe API key, e.g. `pk_3q2-7w...`.
    pub fn generate_api_key(&self) -> Result<String, CredentialError> {
        let mut bytes = [0u8; API_KEY_ENTROPY_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CredentialError::Entropy(e.to_string()))?;

        let encoded = URL_SAFE.encode(bytes);
        Ok(format!("{API_KEY_PREFIX}{}", &encoded[..API_KEY_BODY_LEN]))
    }

    pub fn issue_token(&self, account_id: i64, email: &str) -> Result<String, CredentialError> {
        self.issue_token_at(account_id, email, Utc::now())
    }

    /// Signs a token as if it had been issued at `issued_at`.
    pub fn issue_token_at(
        &self,
        account_id: i64,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, CredentialError> {
        let expires_at = issued_at + Duration::hours(TOKEN_LIFETIME_HOURS);
        let claims = Claims {
            account_id,
            email: email.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| CredentialError::Signing(e.to_string()))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, CredentialError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CredentialError::TokenExpired,
                _ => CredentialError::TokenInvalid(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CredentialCodec {
        CredentialCodec::new("test-secret").unwrap()
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert!(matches!(
            CredentialCodec::new(""),
            Err(CredentialError::Signing(_))
        ));
    }

    #[test]
    fn test_hash_and_verify() {
        let codec = codec();
        let hash = codec.hash_password("secret1").unwrap();

        assert_ne!(hash, "secret1");
        assert!(codec.verify_password("secret1", &hash).unwrap());

        // Single character mutations never verify
        for wrong in ["secret2", "Secret1", "secret", "secret11"] {
            assert!(!codec.verify_password(wrong, &hash).unwrap(), "{wrong}");
        }
    }

    #[test]
    fn test_hashes_are_salted() {
        let codec = codec();
        let first = codec.hash_password("secret1").unwrap();
        let second = codec.hash_password("secret1").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_malformed_hash() {
        assert!(matches!(
            codec().verify_password("secret1", "not-a-phc-string"),
            Err(CredentialError::MalformedHash(_))
        ));
    }

    #[test]
    fn test_api_key_format() {
        let codec = codec();
        let key = codec.generate_api_key().unwrap();

        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + API_KEY_BODY_LEN);
        assert!(
            key[API_KEY_PREFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(key, codec.generate_api_key().unwrap());
    }

    #[test]
    fn test_token_round_trip() {
        let codec = codec();
        let token = codec.issue_token(42, "a@x.com").unwrap();
        let claims = codec.verify_token(&token).unwrap();

        assert_eq!(claims.account_id, 42);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp - claims.iat, TOKEN_LIFETIME_HOURS * 3600);
    }

    #[test]
    fn test_expired_token() {
        let codec = codec();
        let issued_at = Utc::now() - Duration::hours(TOKEN_LIFETIME_HOURS) - Duration::seconds(5);
        let token = codec.issue_token_at(1, "a@x.com", issued_at).unwrap();

        assert!(matches!(
            codec.verify_token(&token),
            Err(CredentialError::TokenExpired)
        ));
    }

    #[test]
    fn test_invalid_tokens() {
        let codec = codec();
        assert!(matches!(
            codec.verify_token("not.a.token"),
            Err(CredentialError::TokenInvalid(_))
        ));

        let other = CredentialCodec::new("another-secret").unwrap();
        let foreign = other.issue_token(1, "a@x.com").unwrap();
        assert!(matches!(
            codec.verify_token(&foreign),
            Err(CredentialError::TokenInvalid(_))
        ));
    }

    #[test]
    fn test_claims_wire_names() {
        let claims = Claims {
            account_id: 7,
            email: "a@x.com".to_string(),
            iat: 1,
            exp: 2,
        };
        assert_eq!(
            serde_json::to_value(&claims).unwrap(),
            serde_json::json!({"userId": 7, "email": "a@x.com", "iat": 1, "exp": 2})
        );
    }
}
