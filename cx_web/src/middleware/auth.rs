//! ABOUTME: Authentication middleware for JWT verification
//! ABOUTME: Extracts Bearer tokens, enforces access-token type, injects AuthUser

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, ResponseError,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use tracing::{debug, warn};

use crate::auth::JwtAuth;
use crate::error::ApiError;
use crate::models::{Claims, TOKEN_TYPE_ACCESS};
use crate::AppState;

/// Authentication middleware requiring a valid access token
pub struct RequireAuth;

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
                .and_then(|header| header.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "));

            let Some(token) = token else {
                let err = ApiError::unauthorized("Authentication required");
                let response = err.error_response();
                return Ok(req.into_response(response).map_into_right_body());
            };

            let Some(state) = req.app_data::<actix_web::web::Data<AppState>>() else {
                let err = ApiError::internal("Application state missing");
                let response = err.error_response();
                return Ok(req.into_response(response).map_into_right_body());
            };

            match JwtAuth::verify_token(token, &state.config.security.jwt_secret) {
                Ok(claims) => {
                    if claims.token_type != TOKEN_TYPE_ACCESS {
                        warn!(
                            user = %claims.sub,
                            token_type = %claims.token_type,
                            "Refresh token presented where access token required"
                        );
                        let err = ApiError::unauthorized("Access token required");
                        let response = err.error_response();
                        return Ok(req.into_response(response).map_into_right_body());
                    }

                    // The subject must be a well-formed record id; a token
                    // with a mangled subject is treated as forged.
                    if claims.sub.parse::<cx_core::Id>().is_err() {
                        warn!(user = %claims.sub, "Token subject is not a valid id");
                        let err = ApiError::unauthorized("Invalid or expired token");
                        let response = err.error_response();
                        return Ok(req.into_response(response).map_into_right_body());
                    }

                    debug!(user = %claims.sub, "JWT authentication successful");
                    req.extensions_mut().insert(AuthUser::from_claims(claims));
                    service.call(req).await.map(|res| res.map_into_left_body())
                }
                Err(e) => {
                    warn!(error = %e, "JWT verification failed");
                    let err = ApiError::unauthorized("Invalid or expired token");
                    let response = err.error_response();
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}

/// Authenticated user information available to handlers
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    fn from_claims(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }

    pub fn is_mentor(&self) -> bool {
        self.role == "mentor"
    }

    pub fn is_student(&self) -> bool {
        self.role == "student"
    }
}

/// Extract the authenticated user from a request, erroring if auth
/// middleware did not run
pub fn auth_user(req: &actix_web::HttpRequest) -> Result<AuthUser, ApiError> {
    req.extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}
