pub mod extractors;
pub mod middleware;
pub mod password;
pub mod service;
pub mod token;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::user::NAME_REGEX;
use crate::models::{Gender, Role};

// Re-export necessary items
pub use extractors::CurrentUser;
pub use middleware::{AuthMiddleware, RestrictTo};
pub use password::PasswordHasher;
pub use service::{AuthService, Session, TokenSettings};
pub use token::{Claims, JwtKeys, OneTimeToken};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "jwt";

/// Trims and lowercases an email address before any lookup or insert.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Represents the payload for a new account registration.
/// A `role` (or any other unknown field) is rejected.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignupRequest {
    #[serde(deserialize_with = "crate::models::trimmed::string")]
    #[validate(
        length(min = 1, max = 50),
        regex(
            path = "NAME_REGEX",
            message = "Name may only contain letters, spaces, dots, apostrophes or hyphens"
        )
    )]
    pub name: String,
    #[validate(email)]
    pub email: String,
    /// Must be at least 8 characters long.
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
    pub gender: Gender,
    #[serde(deserialize_with = "crate::models::trimmed::string")]
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    #[validate(length(max = 500))]
    pub image: Option<String>,
}

/// Login payload. Both fields are optional at the wire level so that a missing
/// field fails the same way as a wrong one.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Payload of the resend and forgot-password routes.
#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_new_password: String,
}

/// Account created by an admin: verified on creation, role chosen explicitly.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdminCreateUser {
    #[serde(deserialize_with = "crate::models::trimmed::string")]
    #[validate(
        length(min = 1, max = 50),
        regex(
            path = "NAME_REGEX",
            message = "Name may only contain letters, spaces, dots, apostrophes or hyphens"
        )
    )]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    pub gender: Gender,
    #[serde(deserialize_with = "crate::models::trimmed::string")]
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    #[validate(length(max = 500))]
    pub image: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// Returned when a verification or reset link was issued.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LinkSent {
    pub message: String,
    pub url: String,
}
