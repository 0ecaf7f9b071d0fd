#![allow(dead_code)]

use std::sync::Arc;

use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::middleware::Logger;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use uuid::Uuid;

use taskdeck::auth::AdminCreateUser;
use taskdeck::config::{Config, LimitConfig, StoreKind};
use taskdeck::mail::LogMailer;
use taskdeck::models::{Gender, Role};
use taskdeck::rate_limit::RateLimit;
use taskdeck::routes;
use taskdeck::store::MemoryStore;
use taskdeck::AppState;

pub const PASSWORD: &str = "password123";

pub fn config() -> Config {
    Config {
        store: StoreKind::Memory,
        database_url: None,
        server_port: 8080,
        server_host: "127.0.0.1".to_string(),
        jwt_secret: "integration-test-secret".to_string(),
        jwt_expires_in_days: 30,
        app_url: "http://localhost:8080".to_string(),
        one_time_token_minutes: 10,
        resend_window_seconds: 210,
        bcrypt_cost: 4,
        sendgrid_api_key: None,
        sendgrid_email: None,
        rate_limit: LimitConfig {
            max: 10_000,
            window_seconds: 3600,
        },
        login_rate_limit: LimitConfig {
            max: 1_000,
            window_seconds: 1800,
        },
    }
}

pub fn state(config: &Config) -> (web::Data<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(config, store.clone(), Arc::new(LogMailer));
    (web::Data::new(state), store)
}

/// The application as `main` assembles it, minus CORS and the bound socket.
pub async fn init(
    state: web::Data<AppState>,
) -> impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error> {
    test::init_service(
        App::new()
            .app_data(state)
            .wrap(RateLimit::global())
            .wrap(Logger::default())
            .configure(routes::config),
    )
    .await
}

/// Sends a request and returns the status with the JSON body (`Null` when empty).
pub async fn call<S, B>(app: &S, req: Request) -> (StatusCode, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| {
            panic!("non-JSON body: {}", String::from_utf8_lossy(&body))
        })
    };
    (status, json)
}

pub fn signup_body(name: &str, email: &str) -> Value {
    json!({
        "name": name,
        "email": email,
        "password": PASSWORD,
        "confirmPassword": PASSWORD,
        "gender": "female",
        "country": "Portugal",
    })
}

/// The plaintext token is the last path segment of an emailed link.
pub fn token_from_url(url: &Value) -> String {
    url.as_str()
        .and_then(|url| url.rsplit('/').next())
        .expect("link url")
        .to_string()
}

/// Signs up and returns the verification token.
pub async fn signup<S, B>(app: &S, name: &str, email: &str) -> String
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/users/signup")
        .set_json(signup_body(name, email))
        .to_request();
    let (status, body) = call(app, req).await;
    assert_eq!(status, StatusCode::OK, "signup failed: {}", body);
    token_from_url(&body["data"]["url"])
}

/// Verifies a token and returns the `(session token, user id)` pair.
pub async fn verify<S, B>(app: &S, token: &str) -> (String, Uuid)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri(&format!("/users/verify-user/{}", token))
        .to_request();
    let (status, body) = call(app, req).await;
    assert_eq!(status, StatusCode::OK, "verify failed: {}", body);
    session_of(&body)
}

/// A verified user, logged in.
pub async fn register<S, B>(app: &S, name: &str, email: &str) -> (String, Uuid)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let token = signup(app, name, email).await;
    verify(app, &token).await
}

pub fn session_of(body: &Value) -> (String, Uuid) {
    let token = body["token"].as_str().expect("session token").to_string();
    let id = body["data"]["id"]
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .expect("user id");
    (token, id)
}

/// Creates an admin directly through the service and issues a session for it.
pub async fn seed_admin(state: &web::Data<AppState>, email: &str) -> (String, Uuid) {
    let admin = state
        .auth
        .create_account(AdminCreateUser {
            name: "Root Admin".to_string(),
            email: email.to_string(),
            password: PASSWORD.to_string(),
            gender: Gender::Male,
            country: "Norway".to_string(),
            image: None,
            role: Role::Admin,
        })
        .await
        .expect("admin account");
    let token = state.auth.keys().issue(admin.id).expect("admin session");
    (token, admin.id)
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
