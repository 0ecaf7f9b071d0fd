//! Handlers shared by every [`Resource`]. Routes pick the entity with a turbofish,
//! e.g. `web::get().to(handlers::get_all::<Task>)`.

use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::resource::{Creatable, ListSpec, Resource};
use crate::state::AppState;

fn not_found<R: Resource>(id: Uuid) -> AppError {
    AppError::NotFound(format!("{} with id {} not found", R::NAME, id))
}

/// Lists the records the acting user may reach.
///
/// ## Query Parameters:
/// - `page`, `limit`: page window (`limit` at most 100).
/// - `sort`: comma separated sortable fields, `-` prefix for descending.
/// - any filterable field: equality filter.
pub async fn get_all<R: Resource>(
    state: web::Data<AppState>,
    actor: CurrentUser,
    params: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse, AppError> {
    let spec = ListSpec::parse::<R>(params.into_inner())?;
    let items = R::repository(&state)
        .query(R::scope_for(&actor), &spec)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "count": items.len(),
        "data": items,
    })))
}

pub async fn get_one<R: Resource>(
    state: web::Data<AppState>,
    actor: CurrentUser,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    let item = R::repository(&state)
        .find_by_id(id, R::scope_for(&actor))
        .await?
        .ok_or_else(|| not_found::<R>(id))?;

    Ok(HttpResponse::Ok().json(json!({ "status": "success", "data": item })))
}

/// Creates a record owned by the acting user.
///
/// ## Responses:
/// - `201 Created`: the new record.
/// - `400 Bad Request`: validation failed or unknown fields were sent.
/// - `409 Conflict`: a unique value is already taken.
pub async fn create_one<R: Creatable>(
    state: web::Data<AppState>,
    actor: CurrentUser,
    input: web::Json<R::Input>,
) -> Result<HttpResponse, AppError> {
    input.validate()?;
    let draft = R::draft(input.into_inner(), &actor);
    let item = R::repository(&state).create(draft).await?;
    log::info!("{} {} created by {}", R::NAME, item.id(), actor.id);

    Ok(HttpResponse::Created().json(json!({ "status": "success", "data": item })))
}

pub async fn update_one<R: Resource>(
    state: web::Data<AppState>,
    actor: CurrentUser,
    id: web::Path<Uuid>,
    patch: web::Json<R::Patch>,
) -> Result<HttpResponse, AppError> {
    patch.validate()?;
    let id = id.into_inner();
    let item = R::repository(&state)
        .find_and_update(id, R::scope_for(&actor), patch.into_inner())
        .await?
        .ok_or_else(|| not_found::<R>(id))?;

    Ok(HttpResponse::Ok().json(json!({ "status": "success", "data": item })))
}

pub async fn delete_one<R: Resource>(
    state: web::Data<AppState>,
    actor: CurrentUser,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    if !R::repository(&state)
        .find_and_delete(id, R::scope_for(&actor))
        .await?
    {
        return Err(not_found::<R>(id));
    }
    log::info!("{} {} deleted by {}", R::NAME, id, actor.id);

    Ok(HttpResponse::NoContent().finish())
}
