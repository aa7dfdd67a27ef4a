//! ABOUTME: User endpoints for profiles and account management
//! ABOUTME: Get, list, update own profile, soft delete own account

use actix_web::{delete, get, put, web, HttpRequest, HttpResponse};
use cx_db::{UpdateUserRequest, UserRepository};
use tracing::instrument;
use validator::Validate;

use crate::auth::PasswordAuth;
use crate::error::ApiResult;
use crate::middleware::auth::auth_user;
use crate::models::{ApiResponse, PageQuery, UpdateProfileRequest, UserInfo};
use crate::routes::api_err;
use crate::AppState;

/// List active users, paginated
#[get("")]
#[instrument(skip(state, req))]
pub async fn list(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let repo = UserRepository::new(&state.db);
    let page = repo
        .list(query.params())
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(page.map(UserInfo::from)))
}

/// Fetch a user by id
#[get("/{id}")]
#[instrument(skip(state, req))]
pub async fn get(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let repo = UserRepository::new(&state.db);
    let user = repo
        .find_by_id(&path)
        .await
        .map_err(|e| api_err(&req, e))?
        .ok_or_else(|| api_err(&req, cx_core::Error::NotFound("User not found".into())))?;

    Ok(ApiResponse::ok(UserInfo::from(user)))
}

/// Update the authenticated user's own profile
#[put("/me")]
#[instrument(skip(state, payload, req))]
pub async fn update_me(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<UpdateProfileRequest>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;
    payload.validate().map_err(|e| api_err(&req, e))?;

    let password_hash = match &payload.password {
        Some(password) => {
            Some(PasswordAuth::hash_password(password).map_err(|e| api_err(&req, e))?)
        }
        None => None,
    };

    let repo = UserRepository::new(&state.db);
    let user = repo
        .update(
            &auth.id,
            UpdateUserRequest {
                full_name: payload.full_name.clone(),
                bio: payload.bio.clone(),
                password_hash,
            },
        )
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(UserInfo::from(user)))
}

/// Soft delete the authenticated user's own account
#[delete("/me")]
#[instrument(skip(state, req))]
pub async fn delete_me(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;

    let repo = UserRepository::new(&state.db);
    repo.delete(&auth.id).await.map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(serde_json::json!({ "deleted": true })))
}
