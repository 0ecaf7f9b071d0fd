use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Role, User};

/// The identity resolved by [`AuthMiddleware`](crate::auth::AuthMiddleware).
///
/// The middleware stores it in the request extensions; handlers take it as an
/// argument. If it is missing (the route was not wrapped), extraction fails with
/// `AppError::Unauthorized`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
    pub user: User,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            user,
        }
    }
}

impl FromRequest for CurrentUser {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<CurrentUser>().cloned() {
            Some(user) => ready(Ok(user)),
            None => {
                let err = AppError::Unauthorized(
                    "You are not logged in! Please log in to get access.".to_string(),
                );
                ready(Err(err.into()))
            }
        }
    }
}
