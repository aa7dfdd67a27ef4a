//! ABOUTME: Authentication endpoints for registration, login, and token refresh
//! ABOUTME: Issues JWT access/refresh pairs and exposes the current profile

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use cx_db::{CreateUserRequest, UserRepository};
use serde_json::json;
use tracing::{debug, instrument, warn};
use validator::Validate;

use crate::auth::{JwtAuth, PasswordAuth};
use crate::error::ApiResult;
use crate::middleware::auth::auth_user;
use crate::models::{
    ApiResponse, LoginRequest, RefreshRequest, RegisterRequest, TokenPair, UserInfo,
};
use crate::routes::api_err;
use crate::AppState;

/// Register a new student or mentor account
#[post("/register")]
#[instrument(skip(state, payload, req), fields(email = %payload.email))]
pub async fn register(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate().map_err(|e| api_err(&req, e))?;

    let password_hash =
        PasswordAuth::hash_password(&payload.password).map_err(|e| api_err(&req, e))?;

    let repo = UserRepository::new(&state.db);
    let user = repo
        .create(CreateUserRequest {
            email: payload.email.clone(),
            password_hash,
            full_name: payload.full_name.clone(),
            role: payload.role.clone(),
        })
        .await
        .map_err(|e| api_err(&req, e))?;

    let (access_token, refresh_token) =
        JwtAuth::create_token_pair(&user.id, &user.email, &user.role, &state.config.security)
            .map_err(|e| api_err(&req, e))?;

    debug!(user = %user.id, "User registered");

    Ok(ApiResponse::created(json!({
        "user": UserInfo::from(user),
        "tokens": TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.security.access_token_ttl_secs,
        },
    })))
}

/// Log in with email and password
#[post("/login")]
#[instrument(skip(state, payload, req), fields(email = %payload.email))]
pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate().map_err(|e| api_err(&req, e))?;

    let repo = UserRepository::new(&state.db);
    let user = repo
        .find_by_email(&payload.email)
        .await
        .map_err(|e| api_err(&req, e))?;

    // Same response for unknown email and wrong password
    let invalid =
        || api_err(&req, cx_core::Error::Unauthorized("Invalid email or password".into()));

    let Some(user) = user else {
        warn!("Login attempt for unknown email");
        return Err(invalid());
    };

    let verified = PasswordAuth::verify_password(&payload.password, &user.password_hash)
        .map_err(|e| api_err(&req, e))?;
    if !verified {
        warn!(user = %user.id, "Invalid password");
        return Err(invalid());
    }

    let (access_token, refresh_token) =
        JwtAuth::create_token_pair(&user.id, &user.email, &user.role, &state.config.security)
            .map_err(|e| api_err(&req, e))?;

    debug!(user = %user.id, "Login successful");

    Ok(ApiResponse::ok(json!({
        "user": UserInfo::from(user),
        "tokens": TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.security.access_token_ttl_secs,
        },
    })))
}

/// Exchange a refresh token for a fresh token pair
#[post("/refresh")]
#[instrument(skip(state, payload, req))]
pub async fn refresh(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<RefreshRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate().map_err(|e| api_err(&req, e))?;

    let claims =
        JwtAuth::verify_refresh_token(&payload.refresh_token, &state.config.security.jwt_secret)
            .map_err(|e| api_err(&req, e))?;

    // Re-check the account still exists and is active before re-issuing
    let repo = UserRepository::new(&state.db);
    let user = repo
        .find_by_id(&claims.sub)
        .await
        .map_err(|e| api_err(&req, e))?
        .filter(|user| user.is_active)
        .ok_or_else(|| {
            api_err(
                &req,
                cx_core::Error::Unauthorized("Account no longer active".into()),
            )
        })?;

    let (access_token, refresh_token) =
        JwtAuth::create_token_pair(&user.id, &user.email, &user.role, &state.config.security)
            .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.security.access_token_ttl_secs,
    }))
}

/// Current authenticated user's profile
#[get("/me")]
#[instrument(skip(state, req))]
pub async fn me(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;

    let repo = UserRepository::new(&state.db);
    let user = repo
        .find_by_id(&auth.id)
        .await
        .map_err(|e| api_err(&req, e))?
        .ok_or_else(|| api_err(&req, cx_core::Error::NotFound("User not found".into())))?;

    Ok(ApiResponse::ok(UserInfo::from(user)))
}
