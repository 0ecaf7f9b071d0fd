use std::rc::Rc;

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::auth::{CurrentUser, SESSION_COOKIE};
use crate::error::AppError;
use crate::models::Role;
use crate::state::AppState;

/// Route protection. Resolves the session token from the `Authorization: Bearer`
/// header, or failing that the `jwt` cookie, and attaches the [`CurrentUser`] to the
/// request. Any failure ends the request with a 401 response.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

fn session_token(req: &ServiceRequest) -> Option<String> {
    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    bearer.or_else(|| {
        req.cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    })
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let outcome = authenticate(&req).await;
            match outcome {
                Ok(user) => {
                    req.extensions_mut().insert(user);
                    service
                        .call(req)
                        .await
                        .map(ServiceResponse::map_into_left_body)
                }
                Err(err) => Ok(req.error_response(err).map_into_right_body()),
            }
        })
    }
}

async fn authenticate(req: &ServiceRequest) -> Result<CurrentUser, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| AppError::InternalServerError("AppState not registered".into()))?;

    let token = session_token(req).ok_or_else(|| {
        AppError::Unauthorized("You are not logged in! Please log in to get access.".into())
    })?;

    state.auth.authorize(&token).await
}

/// Role restriction for routes already behind [`AuthMiddleware`].
///
/// Responds 403 when the attached identity's role is not in the allow-list.
#[derive(Clone)]
pub struct RestrictTo {
    roles: Rc<[Role]>,
}

impl RestrictTo {
    pub fn new(roles: &[Role]) -> Self {
        Self {
            roles: Rc::from(roles),
        }
    }

    pub fn admin() -> Self {
        Self::new(&[Role::Admin])
    }
}

impl<S, B> Transform<S, ServiceRequest> for RestrictTo
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RestrictToService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RestrictToService {
            service,
            roles: Rc::clone(&self.roles),
        }))
    }
}

pub struct RestrictToService<S> {
    service: S,
    roles: Rc<[Role]>,
}

impl<S, B> Service<ServiceRequest> for RestrictToService<S>
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
        let role = req.extensions().get::<CurrentUser>().map(|user| user.role);

        let err = match role {
            Some(role) if self.roles.contains(&role) => {
                let fut = self.service.call(req);
                return Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) });
            }
            Some(_) => AppError::Forbidden("You do not have permission to perform this action".into()),
            None => {
                AppError::Unauthorized("You are not logged in! Please log in to get access.".into())
            }
        };
        Box::pin(ready(Ok(req.error_response(err).map_into_right_body())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, NewUser, User};
    use actix_web::{http::StatusCode, test, App, HttpResponse};

    fn identity(role: Role) -> CurrentUser {
        CurrentUser::from(User::from_new(NewUser {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            gender: Gender::Female,
            country: "UK".into(),
            image: None,
            role,
            verified: true,
            password_hash: "hash".into(),
            verification: None,
        }))
    }

    async fn status_for(identity: Option<CurrentUser>) -> StatusCode {
        let app = test::init_service(
            App::new().service(
                web::resource("/admin")
                    .wrap(RestrictTo::admin())
                    .wrap_fn(move |req, srv| {
                        if let Some(identity) = identity.clone() {
                            req.extensions_mut().insert(identity);
                        }
                        srv.call(req)
                    })
                    .to(|| async { HttpResponse::Ok().finish() }),
            ),
        )
        .await;

        let req = test::TestRequest::get().uri("/admin").to_request();
        test::call_service(&app, req).await.status()
    }

    #[actix_rt::test]
    async fn test_restrict_to_roles() {
        assert_eq!(status_for(Some(identity(Role::Admin))).await, StatusCode::OK);
        assert_eq!(
            status_for(Some(identity(Role::User))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_for(None).await, StatusCode::UNAUTHORIZED);
    }
}
