use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

/// Size of a one-time token before hex encoding.
const ONE_TIME_TOKEN_BYTES: usize = 32;

/// Represents the claims encoded within a session JWT.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject of the token: the user's id.
    pub sub: Uuid,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Issued at in microseconds. Compared against the user's password change stamp,
    /// which `iat` is too coarse for.
    #[serde(rename = "iatUs")]
    pub iat_micros: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
}

/// Signing material and lifetime for session tokens.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generates a session token for `user_id`, issued now.
    pub fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue_at(user_id, Utc::now())
    }

    /// Generates a session token as if it had been issued at `issued_at`.
    pub fn issue_at(&self, user_id: Uuid, issued_at: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims {
            sub: user_id,
            iat: issued_at.timestamp(),
            iat_micros: issued_at.timestamp_micros(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))
    }

    /// Verifies signature and expiry and decodes the claims.
    ///
    /// Returns `AppError::Unauthorized` if the token is malformed, its signature is invalid,
    /// or it has expired.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }
}

/// A freshly generated one-time token. `plain` goes into the emailed link,
/// only `digest` is persisted.
#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub plain: String,
    pub digest: String,
}

impl OneTimeToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; ONE_TIME_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let plain = hex::encode(bytes);
        let digest = digest(&plain);
        Self { plain, digest }
    }
}

/// Lowercase hex SHA-256 of a plaintext one-time token.
pub fn digest(plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plain.as_bytes());
    hex::encode(hasher.finalize())
}
