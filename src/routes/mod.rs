pub mod auth;
pub mod health;
pub mod users;

use actix_web::{guard, web, HttpRequest, HttpResponse};

use crate::auth::{AuthMiddleware, RestrictTo};
use crate::error::AppError;
use crate::models::{Task, User};
use crate::resource::handlers;

/// Request bodies above this size are rejected.
const JSON_LIMIT: usize = 10 * 1024;

/// Malformed bodies, query strings and path segments answer 400 through the usual envelope.
fn extractor_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(JSON_LIMIT)
            .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into()),
    );
}

pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound(format!(
        "Cannot find the {} route on the server!",
        req.path()
    )))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    extractor_configs(cfg);

    // Public account routes, registered ahead of the protected /users scope
    cfg.service(health::health)
        .service(auth::signup)
        .service(auth::resend_verification)
        .service(auth::verify_user)
        .service(auth::login)
        .service(auth::forgot_password)
        .service(auth::resend_reset)
        .service(auth::reset_password);

    cfg.service(
        web::scope("/users")
            .wrap(AuthMiddleware)
            .service(users::profile)
            .service(users::update_password)
            .service(
                web::resource("")
                    .wrap(RestrictTo::admin())
                    .route(web::get().to(handlers::get_all::<User>))
                    .route(web::post().to(users::create_user)),
            )
            // Anyone may patch, but only records in their scope
            .service(
                web::resource("/{id}")
                    .guard(guard::Patch())
                    .route(web::patch().to(handlers::update_one::<User>)),
            )
            .service(
                web::resource("/{id}")
                    .wrap(RestrictTo::admin())
                    .route(web::get().to(handlers::get_one::<User>))
                    .route(web::delete().to(handlers::delete_one::<User>)),
            ),
    )
    .service(
        web::scope("/tasks")
            .wrap(AuthMiddleware)
            .service(
                web::resource("")
                    .route(web::get().to(handlers::get_all::<Task>))
                    .route(web::post().to(handlers::create_one::<Task>)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(handlers::get_one::<Task>))
                    .route(web::patch().to(handlers::update_one::<Task>))
                    .route(web::delete().to(handlers::delete_one::<Task>)),
            ),
    )
    .default_service(web::route().to(not_found));
}
