use std::env;
use std::str::FromStr;

use crate::error::AppError;

/// Which credential/task store backs the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// A request budget: at most `max` requests per `window_seconds` for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    pub max: u32,
    pub window_seconds: u64,
}

/// Process-wide configuration, read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub server_port: u16,
    pub server_host: String,
    pub jwt_secret: String,
    pub jwt_expires_in_days: i64,
    /// Base URL embedded in verification and reset links.
    pub app_url: String,
    pub one_time_token_minutes: i64,
    /// A pending one-time token may be replaced once it has at most this much life left.
    pub resend_window_seconds: i64,
    pub bcrypt_cost: u32,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_email: Option<String>,
    pub rate_limit: LimitConfig,
    pub login_rate_limit: LimitConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let store = match env::var("STORE").unwrap_or_else(|_| "postgres".to_string()).as_str() {
            "postgres" => StoreKind::Postgres,
            "memory" => StoreKind::Memory,
            other => {
                return Err(AppError::InternalServerError(format!(
                    "STORE must be 'postgres' or 'memory', got '{}'",
                    other
                )))
            }
        };
        let database_url = env::var("DATABASE_URL").ok();
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(AppError::InternalServerError(
                "DATABASE_URL must be set".into(),
            ));
        }

        let server_port = parse_var("SERVER_PORT", 8080)?;
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::InternalServerError("JWT_SECRET must be set".into()))?;
        let app_url = env::var("APP_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));

        Ok(Self {
            store,
            database_url,
            server_port,
            server_host,
            jwt_secret,
            jwt_expires_in_days: parse_var("JWT_EXPIRES_IN_DAYS", 30)?,
            app_url,
            one_time_token_minutes: parse_var("ONE_TIME_TOKEN_MINUTES", 10)?,
            resend_window_seconds: parse_var("RESEND_WINDOW_SECONDS", 210)?,
            bcrypt_cost: parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            sendgrid_api_key: env::var("SENDGRID_API_KEY").ok(),
            sendgrid_email: env::var("SENDGRID_EMAIL").ok(),
            rate_limit: LimitConfig {
                max: parse_var("RATE_LIMIT_MAX", 600)?,
                window_seconds: parse_var("RATE_LIMIT_WINDOW_SECONDS", 3600)?,
            },
            login_rate_limit: LimitConfig {
                max: parse_var("LOGIN_RATE_LIMIT_MAX", 3)?,
                window_seconds: parse_var("LOGIN_RATE_LIMIT_WINDOW_SECONDS", 1800)?,
            },
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| {
            AppError::InternalServerError(format!("{} has an invalid value: '{}'", key, raw))
        }),
        Err(_) => Ok(default),
    }
}
