//! ABOUTME: Feedback repository for post-application ratings and comments
//! ABOUTME: One feedback entry per (application, author) pair

use cx_core::{now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{debug, instrument};

use super::{PageParams, Paginated};
use crate::Database;

/// Feedback entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: String,
    pub application_id: String,
    pub author_id: String,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
}

/// Request to leave feedback on an application
#[derive(Debug, Clone)]
pub struct CreateFeedbackRequest {
    pub application_id: String,
    pub author_id: String,
    pub rating: i64,
    pub comment: String,
}

/// Feedback repository
pub struct FeedbackRepository<'a> {
    db: &'a Database,
}

impl<'a> FeedbackRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Leave feedback; rating must be 1-5 and each author may rate an
    /// application once
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateFeedbackRequest) -> Result<Feedback> {
        if !(1..=5).contains(&request.rating) {
            return Err(Error::Validation(format!(
                "Rating must be between 1 and 5, got {}",
                request.rating
            )));
        }

        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating feedback with id: {}", id);

        let pool = self.db.pool();
        self.db
            .timed(
                "feedback.create",
                sqlx::query_as::<_, Feedback>(
                    r#"
                    INSERT INTO feedback (id, application_id, author_id, rating, comment, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(request.application_id)
                .bind(request.author_id)
                .bind(request.rating)
                .bind(request.comment)
                .bind(&now)
                .fetch_one(pool),
            )
            .await
    }

    /// All feedback for an application
    #[instrument(skip(self))]
    pub async fn list_by_application(&self, application_id: &str) -> Result<Vec<Feedback>> {
        let pool = self.db.pool();
        self.db
            .timed(
                "feedback.list_by_application",
                sqlx::query_as::<_, Feedback>(
                    "SELECT * FROM feedback WHERE application_id = ?1 ORDER BY created_at DESC",
                )
                .bind(application_id)
                .fetch_all(pool),
            )
            .await
    }

    /// Feedback written by a user, newest first
    #[instrument(skip(self))]
    pub async fn list_by_author(
        &self,
        author_id: &str,
        params: PageParams,
    ) -> Result<Paginated<Feedback>> {
        let params = params.clamped();
        let pool = self.db.pool();
        let author_id = author_id.to_string();

        let (entries, total) = self
            .db
            .timed("feedback.list_by_author", async move {
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE author_id = ?1")
                        .bind(&author_id)
                        .fetch_one(pool)
                        .await?;

                let entries = sqlx::query_as::<_, Feedback>(
                    r#"
                    SELECT * FROM feedback WHERE author_id = ?1
                    ORDER BY created_at DESC
                    LIMIT ?2 OFFSET ?3
                    "#,
                )
                .bind(&author_id)
                .bind(i64::from(params.limit))
                .bind(params.offset())
                .fetch_all(pool)
                .await?;

                Ok((entries, total))
            })
            .await?;

        Ok(Paginated::new(entries, params, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::applications::{ApplicationRepository, CreateApplicationRequest};
    use crate::repositories::projects::{CreateProjectRequest, ProjectRepository};
    use crate::repositories::users::{CreateUserRequest, UserRepository};
    use crate::tests::create_test_db;

    async fn seed_application(db: &Database) -> (String, String) {
        let users = UserRepository::new(db);
        let mentor = users
            .create(CreateUserRequest {
                email: format!("mentor-{}@example.com", Id::new()),
                password_hash: "$argon2id$fake".to_string(),
                full_name: "Mentor".to_string(),
                role: "mentor".to_string(),
            })
            .await
            .unwrap();
        let student = users
            .create(CreateUserRequest {
                email: format!("student-{}@example.com", Id::new()),
                password_hash: "$argon2id$fake".to_string(),
                full_name: "Student".to_string(),
                role: "student".to_string(),
            })
            .await
            .unwrap();

        let project = ProjectRepository::new(db)
            .create(CreateProjectRequest {
                mentor_id: mentor.id.clone(),
                title: "Capstone".to_string(),
                description: "Final project".to_string(),
            })
            .await
            .unwrap();

        let application = ApplicationRepository::new(db)
            .create(CreateApplicationRequest {
                project_id: project.id,
                student_id: student.id,
                cover_letter: "Hello".to_string(),
            })
            .await
            .unwrap();

        (application.id, mentor.id)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let db = create_test_db().await;
        let (application_id, mentor_id) = seed_application(&db).await;
        let repo = FeedbackRepository::new(&db);

        let feedback = repo
            .create(CreateFeedbackRequest {
                application_id: application_id.clone(),
                author_id: mentor_id.clone(),
                rating: 5,
                comment: "Excellent work".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(feedback.rating, 5);

        let entries = repo.list_by_application(&application_id).await.unwrap();
        assert_eq!(entries.len(), 1);

        let by_author = repo
            .list_by_author(&mentor_id, PageParams::default())
            .await
            .unwrap();
        assert_eq!(by_author.pagination.total, 1);
    }

    #[tokio::test]
    async fn test_rating_out_of_range_is_validation_error() {
        let db = create_test_db().await;
        let (application_id, mentor_id) = seed_application(&db).await;
        let repo = FeedbackRepository::new(&db);

        let err = repo
            .create(CreateFeedbackRequest {
                application_id,
                author_id: mentor_id,
                rating: 6,
                comment: "Too good".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_second_feedback_from_same_author_is_conflict() {
        let db = create_test_db().await;
        let (application_id, mentor_id) = seed_application(&db).await;
        let repo = FeedbackRepository::new(&db);

        repo.create(CreateFeedbackRequest {
            application_id: application_id.clone(),
            author_id: mentor_id.clone(),
            rating: 4,
            comment: "Good".to_string(),
        })
        .await
        .unwrap();

        let err = repo
            .create(CreateFeedbackRequest {
                application_id,
                author_id: mentor_id,
                rating: 2,
                comment: "Changed my mind".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }
}
