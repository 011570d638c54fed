use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::Header;
use actix_web::{web, Error, ResponseError};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use futures_util::future::{LocalBoxFuture, ready, Ready};
use std::rc::Rc;

use crate::auth::decode_jwt;
use crate::error::ApiError;
use crate::models::Id;
use crate::repo::RepoError;
use crate::routes::AppState;

/// Rejects every request made by a blocked user before it reaches a handler.
///
/// The principal comes from the bearer token. Requests without a valid token pass through
/// untouched; handlers that need a user reject them on their own.
#[derive(Clone, Copy, Default)]
pub struct UserBlock;

impl<S, B> Transform<S, ServiceRequest> for UserBlock
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = UserBlockMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(UserBlockMiddleware { service: Rc::new(service) }))
    }
}

pub struct UserBlockMiddleware<S> {
    service: Rc<S>,
}

fn principal(req: &ServiceRequest) -> Option<Id> {
    let bearer = Authorization::<Bearer>::parse(req).ok()?.into_scheme();
    let claims = decode_jwt(bearer.token()).ok()?;
    claims.user_id().ok()
}

impl<S, B> Service<ServiceRequest> for UserBlockMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        Box::pin(async move {
            let Some(user_id) = principal(&req) else {
                return svc.call(req).await.map(ServiceResponse::map_into_left_body);
            };
            let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
                tracing::error!("AppState missing; cannot evaluate user block");
                let res = ApiError::Internal.error_response();
                return Ok(req.into_response(res).map_into_right_body());
            };
            match state.repo.is_blocked(user_id).await {
                Ok(false) | Err(RepoError::NotFound) => {
                    svc.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Ok(true) => {
                    tracing::info!(user_id, method = %req.method(), path = %req.path(), "request from blocked user rejected");
                    let res = ApiError::Blocked.error_response();
                    Ok(req.into_response(res).map_into_right_body())
                }
                Err(e) => {
                    tracing::error!(user_id, error = %e, "block lookup failed");
                    let res = ApiError::Internal.error_response();
                    Ok(req.into_response(res).map_into_right_body())
                }
            }
        })
    }
}
