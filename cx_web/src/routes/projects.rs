//! ABOUTME: Project endpoints for mentor-owned listings
//! ABOUTME: CRUD, filtered listing, and status transitions with ownership checks

use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use cx_db::{
    CreateProjectRequest, Project, ProjectFilter, ProjectRepository, ProjectStatus,
    UpdateProjectRequest,
};
use tracing::instrument;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::{auth_user, AuthUser};
use crate::models::{ApiResponse, CreateProjectBody, ProjectListQuery, TransitionBody, UpdateProjectBody};
use crate::routes::api_err;
use crate::AppState;

/// Load a project and verify the caller owns it
async fn owned_project(
    req: &HttpRequest,
    state: &AppState,
    auth: &AuthUser,
    id: &str,
) -> Result<Project, ApiError> {
    let repo = ProjectRepository::new(&state.db);
    let project = repo
        .find_by_id(id)
        .await
        .map_err(|e| api_err(req, e))?
        .ok_or_else(|| api_err(req, cx_core::Error::NotFound("Project not found".into())))?;

    if project.mentor_id != auth.id {
        return Err(api_err(
            req,
            cx_core::Error::Forbidden("Only the project owner may do that".into()),
        ));
    }
    Ok(project)
}

/// Create a project (mentors only; starts in draft)
#[post("")]
#[instrument(skip(state, payload, req))]
pub async fn create(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<CreateProjectBody>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;
    if !auth.is_mentor() {
        return Err(api_err(
            &req,
            cx_core::Error::Forbidden("Only mentors can create projects".into()),
        ));
    }
    payload.validate().map_err(|e| api_err(&req, e))?;

    let repo = ProjectRepository::new(&state.db);
    let project = repo
        .create(CreateProjectRequest {
            mentor_id: auth.id,
            title: payload.title.clone(),
            description: payload.description.clone(),
        })
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::created(project))
}

/// List projects with optional status/mentor filters
#[get("")]
#[instrument(skip(state, req))]
pub async fn list(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ProjectListQuery>,
) -> ApiResult<HttpResponse> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            raw.parse::<ProjectStatus>()
                .map_err(|e| api_err(&req, e))?,
        ),
        None => None,
    };

    let defaults = cx_db::PageParams::default();
    let params = cx_db::PageParams {
        page: query.page.unwrap_or(defaults.page),
        limit: query.limit.unwrap_or(defaults.limit),
    };

    let repo = ProjectRepository::new(&state.db);
    let page = repo
        .list(
            ProjectFilter {
                status,
                mentor_id: query.mentor_id.clone(),
            },
            params,
        )
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(page))
}

/// Fetch a project by id
#[get("/{id}")]
#[instrument(skip(state, req))]
pub async fn get(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let repo = ProjectRepository::new(&state.db);
    let project = repo
        .find_by_id(&path)
        .await
        .map_err(|e| api_err(&req, e))?
        .ok_or_else(|| api_err(&req, cx_core::Error::NotFound("Project not found".into())))?;

    Ok(ApiResponse::ok(project))
}

/// Update project content (owner only)
#[put("/{id}")]
#[instrument(skip(state, payload, req))]
pub async fn update(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateProjectBody>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;
    payload.validate().map_err(|e| api_err(&req, e))?;
    owned_project(&req, &state, &auth, &path).await?;

    let repo = ProjectRepository::new(&state.db);
    let project = repo
        .update(
            &path,
            UpdateProjectRequest {
                title: payload.title.clone(),
                description: payload.description.clone(),
            },
        )
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(project))
}

/// Move a project along its lifecycle (owner only)
#[post("/{id}/status")]
#[instrument(skip(state, payload, req))]
pub async fn transition(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<TransitionBody>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;
    let next: ProjectStatus = payload.status.parse().map_err(|e| api_err(&req, e))?;
    owned_project(&req, &state, &auth, &path).await?;

    let repo = ProjectRepository::new(&state.db);
    let project = repo
        .transition_status(&path, next)
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(project))
}

/// Delete a project (owner only)
#[delete("/{id}")]
#[instrument(skip(state, req))]
pub async fn delete(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;
    owned_project(&req, &state, &auth, &path).await?;

    let repo = ProjectRepository::new(&state.db);
    repo.delete(&path).await.map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(serde_json::json!({ "deleted": true })))
}
