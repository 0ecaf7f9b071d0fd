use std::sync::Arc;

use chrono::Duration;

use crate::auth::{AuthService, JwtKeys, PasswordHasher, TokenSettings};
use crate::config::{Config, StoreKind};
use crate::error::AppError;
use crate::mail::{LogMailer, Mailer, SendGridMailer};
use crate::models::{Task, User};
use crate::rate_limit::RequestLimits;
use crate::store::{MemoryStore, PgStore, Repository, UserStore};

/// Everything a request handler can reach, built once at start-up and shared
/// through `web::Data`.
pub struct AppState {
    pub auth: AuthService,
    pub limits: RequestLimits,
    pub users: Arc<dyn Repository<User>>,
    pub tasks: Arc<dyn Repository<Task>>,
}

impl AppState {
    pub fn new<S>(config: &Config, store: Arc<S>, mailer: Arc<dyn Mailer>) -> Self
    where
        S: UserStore + Repository<Task> + 'static,
    {
        let auth = AuthService::new(
            store.clone(),
            mailer,
            PasswordHasher::new(config.bcrypt_cost),
            JwtKeys::new(&config.jwt_secret, Duration::days(config.jwt_expires_in_days)),
            TokenSettings {
                one_time_ttl: Duration::minutes(config.one_time_token_minutes),
                resend_window: Duration::seconds(config.resend_window_seconds),
                app_url: config.app_url.clone(),
            },
        );

        Self {
            auth,
            limits: RequestLimits::new(config.rate_limit, config.login_rate_limit),
            users: store.clone(),
            tasks: store,
        }
    }

    /// Connects the configured store and mail transport.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        let mailer: Arc<dyn Mailer> = match (&config.sendgrid_api_key, &config.sendgrid_email) {
            (Some(key), Some(from)) => Arc::new(SendGridMailer::new(key, from)),
            _ => {
                log::warn!("SENDGRID_API_KEY or SENDGRID_EMAIL not set, emails will only be logged");
                Arc::new(LogMailer)
            }
        };

        match config.store {
            StoreKind::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    AppError::InternalServerError("DATABASE_URL must be set".into())
                })?;
                let store = PgStore::connect(url).await?;
                log::info!("Using Postgres store");
                Ok(Self::new(config, Arc::new(store), mailer))
            }
            StoreKind::Memory => {
                log::warn!("Using in-memory store, data is lost on restart");
                Ok(Self::new(config, Arc::new(MemoryStore::new()), mailer))
            }
        }
    }
}
