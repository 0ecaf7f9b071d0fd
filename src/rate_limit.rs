//! Per-client request caps.
//!
//! Each client (keyed by its peer IP address) gets a token bucket holding
//! `max` tokens that refills completely over `window_seconds`. The buckets live in
//! [`RequestLimits`] inside the application state; [`RateLimit`] is the middleware
//! that consults them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::config::LimitConfig;
use crate::error::AppError;
use crate::state::AppState;

/// Token bucket for a single client.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    /// Tokens per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_interval: Duration, now: Instant) -> Self {
        let interval = refill_interval.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_rate: capacity as f64 / interval,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes one token if available.
    pub fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_full(&self) -> bool {
        self.tokens >= self.capacity
    }
}

/// Buckets for one limit, one per client.
#[derive(Debug)]
pub struct Limiter {
    config: LimitConfig,
    message: &'static str,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl Limiter {
    pub fn new(config: LimitConfig, message: &'static str) -> Self {
        Self {
            config,
            message,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consumes one request from `client`'s budget.
    pub fn check(&self, client: &str) -> Result<(), AppError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| AppError::InternalServerError("rate limiter lock poisoned".into()))?;

        let now = Instant::now();
        // Full buckets carry no information; drop them so idle clients do not pile up
        if buckets.len() > 10_000 {
            buckets.retain(|_, bucket| {
                bucket.refill(now);
                !bucket.is_full()
            });
        }

        let config = self.config;
        let allowed = buckets
            .entry(client.to_string())
            .or_insert_with(|| {
                TokenBucket::new(config.max, Duration::from_secs(config.window_seconds), now)
            })
            .try_take(now);

        if allowed {
            Ok(())
        } else {
            log::warn!("Rate limit exceeded for client {}", client);
            Err(AppError::TooManyRequests(self.message.into()))
        }
    }
}

/// Every limiter the application applies.
#[derive(Debug)]
pub struct RequestLimits {
    pub global: Limiter,
    pub login: Limiter,
}

impl RequestLimits {
    pub fn new(global: LimitConfig, login: LimitConfig) -> Self {
        Self {
            global: Limiter::new(
                global,
                "Too many requests from this IP, please try again later.",
            ),
            login: Limiter::new(
                login,
                "Login error, you have reached the maximum number of retries. Please try again later.",
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Global,
    Login,
}

/// Buckets are keyed by the socket peer's IP. Forwarding headers are client
/// controlled and never consulted.
fn client_key(req: &ServiceRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware applying one of the [`RequestLimits`] limiters.
pub struct RateLimit {
    scope: Scope,
}

impl RateLimit {
    /// The overall request volume cap, wrapped around the whole app.
    pub fn global() -> Self {
        Self {
            scope: Scope::Global,
        }
    }

    /// The stricter cap on login attempts.
    pub fn login() -> Self {
        Self {
            scope: Scope::Login,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service,
            scope: self.scope,
        }))
    }
}

pub struct RateLimitService<S> {
    service: S,
    scope: Scope,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verdict = match req.app_data::<web::Data<AppState>>() {
            Some(state) => {
                let client = client_key(&req);
                match self.scope {
                    Scope::Global => state.limits.global.check(&client),
                    Scope::Login => state.limits.login.check(&client),
                }
            }
            None => Err(AppError::InternalServerError("AppState not registered".into())),
        };

        match verdict {
            Ok(()) => {
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(err) => Box::pin(ready(Ok(req.error_response(err).map_into_right_body()))),
        }
    }
}
