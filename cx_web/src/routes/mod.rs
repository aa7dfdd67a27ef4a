//! ABOUTME: REST route handlers grouped by resource
//! ABOUTME: Auth, users, projects, applications, feedback, and health

pub mod applications;
pub mod auth;
pub mod feedback;
pub mod health;
pub mod projects;
pub mod users;

use actix_web::HttpRequest;

use crate::error::ApiError;
use crate::middleware::correlation;

/// Convert any error into an ApiError carrying this request's correlation id
pub(crate) fn api_err(req: &HttpRequest, error: impl Into<ApiError>) -> ApiError {
    let error = error.into();
    match correlation::request_id(req) {
        Some(id) => error.with_request_id(id),
        None => error,
    }
}
