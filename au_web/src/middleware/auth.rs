//! ABOUTME: Authentication middleware for JWT bearer tokens
//! ABOUTME: Verifies the token and exposes the caller as an AuthUser extractor

use crate::{auth::JwtAuth, error::ApiError, AppState};
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use tracing::{debug, warn};

/// Rejects requests without a valid `Authorization: Bearer` token
pub struct RequireAuth;

impl RequireAuth {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RequireAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequireAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
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
            let token = req
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string);

            let Some(token) = token else {
                return Ok(reject(req, ApiError::unauthorized("Authentication required")));
            };

            let Some(state) = req.app_data::<web::Data<AppState>>() else {
                warn!("AppState missing from request; rejecting");
                return Ok(reject(req, ApiError::internal_server_error("Server misconfigured")));
            };

            match JwtAuth::verify_token(&token, &state.security.jwt_secret) {
                Ok(claims) => {
                    debug!("JWT authentication successful for user: {}", claims.sub);
                    req.extensions_mut().insert(AuthUser {
                        id: claims.sub,
                        phone_number: claims.phone,
                    });
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    warn!("JWT verification failed: {}", e);
                    Ok(reject(req, ApiError::unauthorized("Invalid or expired token")))
                }
            }
        })
    }
}

fn reject<B>(req: ServiceRequest, error: ApiError) -> ServiceResponse<EitherBody<B>> {
    let (req, _) = req.into_parts();
    ServiceResponse::new(req, error.error_response()).map_into_right_body()
}

/// Authenticated caller taken from the verified token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub phone_number: String,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ApiError::unauthorized("Authentication required")),
        )
    }
}
