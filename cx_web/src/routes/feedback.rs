//! ABOUTME: Feedback endpoints for post-application ratings
//! ABOUTME: Create feedback and list it per application or author

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use cx_db::{ApplicationRepository, CreateFeedbackRequest, FeedbackRepository};
use tracing::instrument;
use validator::Validate;

use crate::error::ApiResult;
use crate::middleware::auth::auth_user;
use crate::models::{ApiResponse, FeedbackBody, PageQuery};
use crate::routes::api_err;
use crate::AppState;

/// Leave feedback on an application
#[post("")]
#[instrument(skip(state, payload, req))]
pub async fn create(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<FeedbackBody>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;
    payload.validate().map_err(|e| api_err(&req, e))?;

    // The application must exist; anything else the repository enforces
    let applications = ApplicationRepository::new(&state.db);
    applications
        .find_by_id(&payload.application_id)
        .await
        .map_err(|e| api_err(&req, e))?
        .ok_or_else(|| {
            api_err(&req, cx_core::Error::NotFound("Application not found".into()))
        })?;

    let repo = FeedbackRepository::new(&state.db);
    let feedback = repo
        .create(CreateFeedbackRequest {
            application_id: payload.application_id.clone(),
            author_id: auth.id,
            rating: payload.rating,
            comment: payload.comment.clone(),
        })
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::created(feedback))
}

/// All feedback for an application
#[get("/application/{id}")]
#[instrument(skip(state, req))]
pub async fn list_for_application(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    auth_user(&req)?;

    let repo = FeedbackRepository::new(&state.db);
    let entries = repo
        .list_by_application(&path)
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(entries))
}

/// Feedback written by a user, paginated
#[get("/user/{id}")]
#[instrument(skip(state, req))]
pub async fn list_for_user(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    auth_user(&req)?;

    let repo = FeedbackRepository::new(&state.db);
    let page = repo
        .list_by_author(&path, query.params())
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(page))
}
