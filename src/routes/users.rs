use actix_web::{get, patch, web, HttpResponse, Responder};
use serde_json::json;

use crate::{
    auth::{AdminCreateUser, ChangePasswordRequest, CurrentUser},
    error::AppError,
    routes::auth::session_response,
    state::AppState,
};

/// The acting user's own record.
#[get("/profile")]
pub async fn profile(actor: CurrentUser) -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "success", "data": actor.user }))
}

/// Change password
///
/// Requires the current password. Sessions issued before the change stop working;
/// the response carries a fresh one.
///
/// ## Responses:
/// - `200 OK`: `{status, token, data}` plus the session cookie.
/// - `400 Bad Request`: new password too short or confirmation mismatch.
/// - `401 Unauthorized`: wrong current password.
#[patch("/update-password")]
pub async fn update_password(
    state: web::Data<AppState>,
    actor: CurrentUser,
    body: web::Json<ChangePasswordRequest>,
) -> Result<impl Responder, AppError> {
    let session = state
        .auth
        .change_password(&actor, body.into_inner())
        .await?;
    Ok(session_response(&state, session))
}

/// Admin account creation. The account is verified and gets the requested role.
pub async fn create_user(
    state: web::Data<AppState>,
    actor: CurrentUser,
    body: web::Json<AdminCreateUser>,
) -> Result<HttpResponse, AppError> {
    let user = state.auth.create_account(body.into_inner()).await?;
    log::info!("User {} created by admin {}", user.id, actor.id);
    Ok(HttpResponse::Created().json(json!({ "status": "success", "data": user })))
}
