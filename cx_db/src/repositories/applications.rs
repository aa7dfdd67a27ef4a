//! ABOUTME: Application repository for students applying to projects
//! ABOUTME: Apply, list, and validated status transitions

use cx_core::{now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

use super::{PageParams, Paginated};
use crate::Database;

/// Application lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    /// Only pending applications may move; accepted/rejected/withdrawn are terminal
    pub fn can_transition(&self, next: ApplicationStatus) -> bool {
        matches!(
            (self, next),
            (ApplicationStatus::Pending, ApplicationStatus::Accepted)
                | (ApplicationStatus::Pending, ApplicationStatus::Rejected)
                | (ApplicationStatus::Pending, ApplicationStatus::Withdrawn)
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ApplicationStatus::Pending),
            "accepted" => Ok(ApplicationStatus::Accepted),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "withdrawn" => Ok(ApplicationStatus::Withdrawn),
            other => Err(Error::Validation(format!(
                "Unknown application status: {}",
                other
            ))),
        }
    }
}

/// Application entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub id: String,
    pub project_id: String,
    pub student_id: String,
    pub cover_letter: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Application {
    pub fn status(&self) -> Result<ApplicationStatus> {
        self.status.parse()
    }
}

/// Request to apply to a project
#[derive(Debug, Clone)]
pub struct CreateApplicationRequest {
    pub project_id: String,
    pub student_id: String,
    pub cover_letter: String,
}

/// Application repository
pub struct ApplicationRepository<'a> {
    db: &'a Database,
}

impl<'a> ApplicationRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Apply to a project; a second application to the same project by the
    /// same student surfaces as a conflict
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateApplicationRequest) -> Result<Application> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating application with id: {}", id);

        let pool = self.db.pool();
        self.db
            .timed(
                "applications.create",
                sqlx::query_as::<_, Application>(
                    r#"
                    INSERT INTO applications (id, project_id, student_id, cover_letter, status, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(request.project_id)
                .bind(request.student_id)
                .bind(request.cover_letter)
                .bind(&now)
                .bind(&now)
                .fetch_one(pool),
            )
            .await
    }

    /// Find an application by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Application>> {
        let pool = self.db.pool();
        self.db
            .timed(
                "applications.find_by_id",
                sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(pool),
            )
            .await
    }

    /// Move an application to a new status, validating the transition
    #[instrument(skip(self))]
    pub async fn transition_status(
        &self,
        id: &str,
        next: ApplicationStatus,
    ) -> Result<Application> {
        let current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Application not found".to_string()))?;
        let current_status = current.status()?;

        if !current_status.can_transition(next) {
            return Err(Error::Validation(format!(
                "Cannot transition application from {} to {}",
                current_status, next
            )));
        }

        let now = now_iso8601();
        let pool = self.db.pool();
        self.db
            .timed(
                "applications.transition_status",
                sqlx::query_as::<_, Application>(
                    r#"
                    UPDATE applications SET status = ?1, updated_at = ?2
                    WHERE id = ?3
                    RETURNING *
                    "#,
                )
                .bind(next.as_str())
                .bind(&now)
                .bind(id)
                .fetch_one(pool),
            )
            .await
    }

    /// List a student's applications, newest first
    #[instrument(skip(self))]
    pub async fn list_by_student(
        &self,
        student_id: &str,
        params: PageParams,
    ) -> Result<Paginated<Application>> {
        self.list_where("student_id", student_id, params).await
    }

    /// List applications for a project, newest first
    #[instrument(skip(self))]
    pub async fn list_by_project(
        &self,
        project_id: &str,
        params: PageParams,
    ) -> Result<Paginated<Application>> {
        self.list_where("project_id", project_id, params).await
    }

    async fn list_where(
        &self,
        column: &'static str,
        value: &str,
        params: PageParams,
    ) -> Result<Paginated<Application>> {
        let params = params.clamped();
        let pool = self.db.pool();
        let value = value.to_string();

        // `column` is one of two compile-time literals, never user input
        let count_sql = format!("SELECT COUNT(*) FROM applications WHERE {} = ?1", column);
        let page_sql = format!(
            "SELECT * FROM applications WHERE {} = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            column
        );

        let (applications, total) = self
            .db
            .timed("applications.list", async move {
                let total: i64 = sqlx::query_scalar(&count_sql)
                    .bind(&value)
                    .fetch_one(pool)
                    .await?;

                let applications = sqlx::query_as::<_, Application>(&page_sql)
                    .bind(&value)
                    .bind(i64::from(params.limit))
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await?;

                Ok((applications, total))
            })
            .await?;

        Ok(Paginated::new(applications, params, total))
    }
}
