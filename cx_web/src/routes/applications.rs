//! ABOUTME: Application endpoints for students applying to projects
//! ABOUTME: Apply, list, and status transitions with notification emails

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use cx_db::{
    Application, ApplicationRepository, ApplicationStatus, CreateApplicationRequest,
    ProjectRepository, ProjectStatus, UserRepository,
};
use cx_mail::EmailMessage;
use tracing::{debug, instrument, warn};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::{auth_user, AuthUser};
use crate::models::{ApiResponse, ApplyBody, PageQuery, TransitionBody};
use crate::routes::api_err;
use crate::AppState;

/// Apply to an open project (students only)
#[post("")]
#[instrument(skip(state, payload, req))]
pub async fn apply(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<ApplyBody>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;
    if !auth.is_student() {
        return Err(api_err(
            &req,
            cx_core::Error::Forbidden("Only students can apply to projects".into()),
        ));
    }
    payload.validate().map_err(|e| api_err(&req, e))?;

    // Applications are only accepted against open projects
    let projects = ProjectRepository::new(&state.db);
    let project = projects
        .find_by_id(&payload.project_id)
        .await
        .map_err(|e| api_err(&req, e))?
        .ok_or_else(|| api_err(&req, cx_core::Error::NotFound("Project not found".into())))?;

    if project.status().map_err(|e| api_err(&req, e))? != ProjectStatus::Open {
        return Err(api_err(
            &req,
            cx_core::Error::Validation("Project is not open for applications".into()),
        ));
    }

    let repo = ApplicationRepository::new(&state.db);
    let application = repo
        .create(CreateApplicationRequest {
            project_id: payload.project_id.clone(),
            student_id: auth.id,
            cover_letter: payload.cover_letter.clone(),
        })
        .await
        .map_err(|e| api_err(&req, e))?;

    debug!(application = %application.id, "Application submitted");
    Ok(ApiResponse::created(application))
}

/// List the authenticated student's applications
#[get("/mine")]
#[instrument(skip(state, req))]
pub async fn list_mine(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;

    let repo = ApplicationRepository::new(&state.db);
    let page = repo
        .list_by_student(&auth.id, query.params())
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(page))
}

/// List applications for a project (project owner only)
#[get("/project/{id}")]
#[instrument(skip(state, req))]
pub async fn list_for_project(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;

    let projects = ProjectRepository::new(&state.db);
    let project = projects
        .find_by_id(&path)
        .await
        .map_err(|e| api_err(&req, e))?
        .ok_or_else(|| api_err(&req, cx_core::Error::NotFound("Project not found".into())))?;

    if project.mentor_id != auth.id {
        return Err(api_err(
            &req,
            cx_core::Error::Forbidden("Only the project owner may list applications".into()),
        ));
    }

    let repo = ApplicationRepository::new(&state.db);
    let page = repo
        .list_by_project(&path, query.params())
        .await
        .map_err(|e| api_err(&req, e))?;

    Ok(ApiResponse::ok(page))
}

/// Change an application's status.
///
/// Accept/reject is the project owner's call; withdraw is the applicant's.
#[post("/{id}/status")]
#[instrument(skip(state, payload, req))]
pub async fn transition(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<TransitionBody>,
) -> ApiResult<HttpResponse> {
    let auth = auth_user(&req)?;
    let next: ApplicationStatus = payload.status.parse().map_err(|e| api_err(&req, e))?;

    let repo = ApplicationRepository::new(&state.db);
    let application = repo
        .find_by_id(&path)
        .await
        .map_err(|e| api_err(&req, e))?
        .ok_or_else(|| api_err(&req, cx_core::Error::NotFound("Application not found".into())))?;

    authorize_transition(&req, &state, &auth, &application, next).await?;

    let application = repo
        .transition_status(&path, next)
        .await
        .map_err(|e| api_err(&req, e))?;

    notify_transition(&state, &application, next).await;

    Ok(ApiResponse::ok(application))
}

async fn authorize_transition(
    req: &HttpRequest,
    state: &AppState,
    auth: &AuthUser,
    application: &Application,
    next: ApplicationStatus,
) -> Result<(), ApiError> {
    match next {
        ApplicationStatus::Withdrawn => {
            if application.student_id != auth.id {
                return Err(api_err(
                    req,
                    cx_core::Error::Forbidden("Only the applicant may withdraw".into()),
                ));
            }
        }
        ApplicationStatus::Accepted | ApplicationStatus::Rejected => {
            let projects = ProjectRepository::new(&state.db);
            let project = projects
                .find_by_id(&application.project_id)
                .await
                .map_err(|e| api_err(req, e))?
                .ok_or_else(|| {
                    api_err(req, cx_core::Error::NotFound("Project not found".into()))
                })?;

            if project.mentor_id != auth.id {
                return Err(api_err(
                    req,
                    cx_core::Error::Forbidden(
                        "Only the project owner may accept or reject".into(),
                    ),
                ));
            }
        }
        ApplicationStatus::Pending => {
            return Err(api_err(
                req,
                cx_core::Error::Validation("Cannot transition back to pending".into()),
            ));
        }
    }
    Ok(())
}

/// Queue a status-change notification. Fire and forget: lookup failures are
/// logged, the request already succeeded.
async fn notify_transition(state: &AppState, application: &Application, next: ApplicationStatus) {
    let users = UserRepository::new(&state.db);

    let recipient_id = match next {
        // The applicant hears about decisions; the mentor hears about withdrawals
        ApplicationStatus::Accepted | ApplicationStatus::Rejected => {
            application.student_id.clone()
        }
        ApplicationStatus::Withdrawn => {
            let projects = ProjectRepository::new(&state.db);
            match projects.find_by_id(&application.project_id).await {
                Ok(Some(project)) => project.mentor_id,
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "Skipping notification, project lookup failed");
                    return;
                }
            }
        }
        ApplicationStatus::Pending => return,
    };

    match users.find_by_id(&recipient_id).await {
        Ok(Some(user)) => {
            state.mail.enqueue(EmailMessage {
                to: user.email,
                subject: format!("Application {}", next),
                body: format!(
                    "The application {} is now {}.",
                    application.id, application.status
                ),
            });
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "Skipping notification, recipient lookup failed");
        }
    }
}
