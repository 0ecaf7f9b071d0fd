//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the application.
//! Every handler, middleware and store operation returns it, and a single
//! `ResponseError` implementation turns it into the JSON envelope
//! `{ "status": "fail" | "error", "message": ... }` sent to clients.
//!
//! 4xx variants use the status `"fail"` and carry a human readable message.
//! 5xx variants use `"error"`; their detail is logged and replaced with a generic
//! message so store or transport internals never reach the client.
//!
//! `From` implementations exist for `sqlx::Error`, `validator::ValidationErrors`,
//! `jsonwebtoken::errors::Error`, `bcrypt::BcryptError` and `reqwest::Error`,
//! allowing for easy conversion using the `?` operator.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

const INTERNAL_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Represents all possible errors that can occur within the application.
#[derive(Debug)]
pub enum AppError {
    /// Malformed or missing input (HTTP 400).
    ValidationError(String),
    /// A one-time token that does not match any pending token or has expired (HTTP 400).
    InvalidToken(String),
    /// Duplicate unique value, e.g. an email that is already registered (HTTP 409).
    Conflict(String),
    /// Bad credentials, invalid or expired session token, stale session (HTTP 401).
    Unauthorized(String),
    /// The acting identity lacks the role required for the action (HTTP 403).
    Forbidden(String),
    /// Unknown resource or route (HTTP 404).
    NotFound(String),
    /// Resend cool-down not elapsed or request volume exceeded (HTTP 429).
    TooManyRequests(String),
    /// Represents an unexpected server-side error (HTTP 500).
    InternalServerError(String),
    /// Represents an error originating from database operations (HTTP 500).
    DatabaseError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidToken(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message shown to clients. Server-side failures are masked.
    pub fn public_message(&self) -> &str {
        match self {
            AppError::ValidationError(msg)
            | AppError::InvalidToken(msg)
            | AppError::Conflict(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::TooManyRequests(msg) => msg,
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => INTERNAL_MESSAGE,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            AppError::InvalidToken(msg) => write!(f, "Invalid Token: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::TooManyRequests(msg) => write!(f, "Too Many Requests: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
        }
    }
}

/// Converts `AppError` variants into the JSON error envelope.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = AppError::status_code(self);
        let label = if status.is_server_error() {
            log::error!("{}", self);
            "error"
        } else {
            "fail"
        };
        HttpResponse::build(status).json(json!({
            "status": label,
            "message": self.public_message(),
        }))
    }
}

/// Converts `sqlx::Error` into `AppError`.
///
/// Unique violations become `AppError::Conflict` with a message chosen by constraint,
/// `RowNotFound` becomes `AppError::NotFound`, everything else `AppError::DatabaseError`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                match db.constraint() {
                    Some("users_email_key") => {
                        AppError::Conflict("Email already registered".into())
                    }
                    Some("tasks_user_id_title_key") => {
                        AppError::Conflict("A task with this title already exists".into())
                    }
                    _ => AppError::Conflict("Duplicate value".into()),
                }
            }
            sqlx::Error::Database(ref db)
                if db.is_foreign_key_violation() && db.constraint() == Some("tasks_user_id_fkey") =>
            {
                AppError::NotFound("Task owner not found".into())
            }
            _ => AppError::DatabaseError(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> AppError {
        AppError::DatabaseError(error.to_string())
    }
}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`.
///
/// The detailed validation messages are preserved.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

/// Converts `jsonwebtoken::errors::Error` into `AppError::Unauthorized`.
///
/// Clients get one fixed message; the failure kind is only logged.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        log::debug!("Rejected session token: {}", error);
        AppError::Unauthorized("Invalid or expired token".into())
    }
}

/// Converts `bcrypt::BcryptError` into `AppError::InternalServerError`.
impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}

/// Outbound mail transport failures.
impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> AppError {
        AppError::InternalServerError(format!("Mail transport error: {}", error))
    }
}
