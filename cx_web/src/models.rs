//! ABOUTME: Data models for the web API with validation
//! ABOUTME: Envelope types, request/response structures, JWT claims

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Uniform success envelope: `{"success": true, "data": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> actix_web::HttpResponse {
        actix_web::HttpResponse::Ok().json(Self {
            success: true,
            data,
        })
    }

    pub fn created(data: T) -> actix_web::HttpResponse {
        actix_web::HttpResponse::Created().json(Self {
            success: true,
            data,
        })
    }
}

/// Error body inside the failure envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Correlates the response with server logs
    pub error_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Uniform failure envelope: `{"success": false, "error": {...}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

/// Request body for user registration
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    #[validate(length(min = 1, max = 200))]
    pub full_name: String,

    /// "student" or "mentor"
    #[validate(custom(function = "validate_role"))]
    pub role: String,
}

fn validate_role(role: &str) -> Result<(), validator::ValidationError> {
    match role {
        "student" | "mentor" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_role")),
    }
}

/// Request body for user login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// Request body for token refresh
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

/// Response for successful login/refresh
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Public user profile
#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub bio: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl From<cx_db::User> for UserInfo {
    fn from(user: cx_db::User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            bio: user.bio,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Request body for profile updates
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,

    #[validate(length(max = 2000))]
    pub bio: Option<String>,

    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
}

/// Request body for creating a project
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectBody {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(min = 1, max = 10000))]
    pub description: String,
}

/// Request body for updating a project
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectBody {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 10000))]
    pub description: Option<String>,
}

/// Request body for a project status change
#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub status: String,
}

/// Query parameters for project listing
#[derive(Debug, Deserialize, Default)]
pub struct ProjectListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub mentor_id: Option<String>,
}

/// Query parameters for plain paginated listings
#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn params(&self) -> cx_db::PageParams {
        let defaults = cx_db::PageParams::default();
        cx_db::PageParams {
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }
}

/// Request body for applying to a project
#[derive(Debug, Deserialize, Validate)]
pub struct ApplyBody {
    #[validate(length(min = 1, max = 200))]
    pub project_id: String,

    #[validate(length(min = 1, max = 10000))]
    pub cover_letter: String,
}

/// Request body for leaving feedback
#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackBody {
    #[validate(length(min = 1, max = 200))]
    pub application_id: String,

    #[validate(range(min = 1, max = 5))]
    pub rating: i64,

    #[validate(length(max = 5000))]
    pub comment: String,
}

/// Distinguishes access from refresh tokens inside claims
pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub email: String,
    pub role: String,
    /// "access" or "refresh"
    pub token_type: String,
    /// Expiration timestamp (seconds since epoch)
    pub exp: usize,
    /// Issued-at timestamp
    pub iat: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            email: "s@example.com".to_string(),
            password: "longenough".to_string(),
            full_name: "Student".to_string(),
            role: "student".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad_role = RegisterRequest {
            role: "admin".to_string(),
            ..valid
        };
        assert!(bad_role.validate().is_err());
    }

    #[test]
    fn test_feedback_rating_range() {
        let body = FeedbackBody {
            application_id: "app1".to_string(),
            rating: 6,
            comment: String::new(),
        };
        assert!(body.validate().is_err());
    }
}
