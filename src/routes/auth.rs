use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::{post, web, HttpResponse, Responder};
use serde_json::json;

use crate::{
    auth::{EmailRequest, LoginRequest, ResetPasswordRequest, Session, SignupRequest, SESSION_COOKIE},
    error::AppError,
    rate_limit::RateLimit,
    state::AppState,
};

/// Builds the response for every operation that logs the user in: the token in the
/// body and in an http-only `jwt` cookie with the same lifetime.
pub fn session_response(state: &AppState, session: Session) -> HttpResponse {
    let cookie = Cookie::build(SESSION_COOKIE, session.token.clone())
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::seconds(state.auth.session_ttl().num_seconds()))
        .finish();

    HttpResponse::Ok().cookie(cookie).json(json!({
        "status": "success",
        "token": session.token,
        "data": session.user,
    }))
}

/// Register a new account
///
/// Creates an unverified account and emails a verification link. Does not log in.
///
/// ## Responses:
/// - `200 OK`: `{status, data: {message, url}}`.
/// - `400 Bad Request`: validation failed, or a field such as `role` was sent.
/// - `409 Conflict`: the email is already registered.
#[post("/users/signup")]
pub async fn signup(
    state: web::Data<AppState>,
    body: web::Json<SignupRequest>,
) -> Result<impl Responder, AppError> {
    let link = state.auth.signup(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "data": link })))
}

/// Resend the verification link
///
/// ## Responses:
/// - `200 OK`: a new link was issued; the previous one no longer works.
/// - `404 Not Found`: no account with that email.
/// - `429 Too Many Requests`: the pending link is too fresh to replace.
#[post("/users/signup/resend")]
pub async fn resend_verification(
    state: web::Data<AppState>,
    body: web::Json<EmailRequest>,
) -> Result<impl Responder, AppError> {
    let link = state.auth.resend_verification(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "data": link })))
}

/// Verify an account with the emailed token and log in.
#[post("/users/verify-user/{token}")]
pub async fn verify_user(
    state: web::Data<AppState>,
    token: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let session = state.auth.verify_account(&token).await?;
    Ok(session_response(&state, session))
}

/// Login user
///
/// Authenticates a verified user and returns a session token.
/// Attempts are capped per client.
#[post("/users/login", wrap = "RateLimit::login()")]
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    let session = state.auth.login(body.into_inner()).await?;
    Ok(session_response(&state, session))
}

async fn send_reset_link(
    state: web::Data<AppState>,
    body: web::Json<EmailRequest>,
) -> Result<HttpResponse, AppError> {
    let link = state.auth.forgot_password(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": link.message,
        "url": link.url,
    })))
}

/// Email a password reset link.
///
/// ## Responses:
/// - `200 OK`: `{status, message, url}`.
/// - `404 Not Found`: no account with that email.
/// - `429 Too Many Requests`: a reset link was issued moments ago.
#[post("/users/forgot-password")]
pub async fn forgot_password(
    state: web::Data<AppState>,
    body: web::Json<EmailRequest>,
) -> Result<impl Responder, AppError> {
    send_reset_link(state, body).await
}

#[post("/users/forgot-password/resend")]
pub async fn resend_reset(
    state: web::Data<AppState>,
    body: web::Json<EmailRequest>,
) -> Result<impl Responder, AppError> {
    send_reset_link(state, body).await
}

/// Set a new password with the emailed token and log in.
#[post("/users/reset-password/{token}")]
pub async fn reset_password(
    state: web::Data<AppState>,
    token: web::Path<String>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<impl Responder, AppError> {
    let session = state
        .auth
        .reset_password(&token, body.into_inner())
        .await?;
    Ok(session_response(&state, session))
}
