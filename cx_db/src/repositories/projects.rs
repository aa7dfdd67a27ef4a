//! ABOUTME: Project repository for mentor-owned project and internship listings
//! ABOUTME: CRUD, filtered listing, and validated status transitions

use cx_core::{now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

use super::{PageParams, Paginated};
use crate::Database;

/// Project lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Draft,
    Open,
    Closed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Open => "open",
            ProjectStatus::Closed => "closed",
        }
    }

    /// Legal transitions: draft -> open -> closed
    pub fn can_transition(&self, next: ProjectStatus) -> bool {
        matches!(
            (self, next),
            (ProjectStatus::Draft, ProjectStatus::Open)
                | (ProjectStatus::Open, ProjectStatus::Closed)
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "open" => Ok(ProjectStatus::Open),
            "closed" => Ok(ProjectStatus::Closed),
            other => Err(Error::Validation(format!(
                "Unknown project status: {}",
                other
            ))),
        }
    }
}

/// Project entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: String,
    pub mentor_id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    pub fn status(&self) -> Result<ProjectStatus> {
        self.status.parse()
    }
}

/// Request to create a project (starts in draft)
#[derive(Debug, Clone)]
pub struct CreateProjectRequest {
    pub mentor_id: String,
    pub title: String,
    pub description: String,
}

/// Request to update a project's content
#[derive(Debug, Clone, Default)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Filters for project listing
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub mentor_id: Option<String>,
}

/// Project repository
pub struct ProjectRepository<'a> {
    db: &'a Database,
}

impl<'a> ProjectRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a new project in draft status
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateProjectRequest) -> Result<Project> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating project with id: {}", id);

        let pool = self.db.pool();
        self.db
            .timed(
                "projects.create",
                sqlx::query_as::<_, Project>(
                    r#"
                    INSERT INTO projects (id, mentor_id, title, description, status, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, 'draft', ?5, ?6)
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(request.mentor_id)
                .bind(request.title)
                .bind(request.description)
                .bind(&now)
                .bind(&now)
                .fetch_one(pool),
            )
            .await
    }

    /// Find a project by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Project>> {
        let pool = self.db.pool();
        self.db
            .timed(
                "projects.find_by_id",
                sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(pool),
            )
            .await
    }

    /// Update project content
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateProjectRequest) -> Result<Project> {
        if request.title.is_none() && request.description.is_none() {
            return Err(Error::Validation("No fields to update".to_string()));
        }

        let now = now_iso8601();
        let pool = self.db.pool();
        let id = id.to_string();

        let updated = self
            .db
            .timed("projects.update", async move {
                let mut tx = pool.begin().await?;

                let current =
                    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?1")
                        .bind(&id)
                        .fetch_optional(&mut *tx)
                        .await?;

                let Some(current) = current else {
                    return Ok(None);
                };

                let title = request.title.unwrap_or(current.title);
                let description = request.description.unwrap_or(current.description);

                let project = sqlx::query_as::<_, Project>(
                    r#"
                    UPDATE projects
                    SET title = ?1, description = ?2, updated_at = ?3
                    WHERE id = ?4
                    RETURNING *
                    "#,
                )
                .bind(title)
                .bind(description)
                .bind(&now)
                .bind(&id)
                .fetch_one(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(Some(project))
            })
            .await?;

        updated.ok_or_else(|| Error::NotFound("Project not found".to_string()))
    }

    /// Move a project to a new status, validating the transition
    #[instrument(skip(self))]
    pub async fn transition_status(&self, id: &str, next: ProjectStatus) -> Result<Project> {
        let current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Project not found".to_string()))?;
        let current_status = current.status()?;

        if !current_status.can_transition(next) {
            return Err(Error::Validation(format!(
                "Cannot transition project from {} to {}",
                current_status, next
            )));
        }

        let now = now_iso8601();
        let pool = self.db.pool();
        self.db
            .timed(
                "projects.transition_status",
                sqlx::query_as::<_, Project>(
                    r#"
                    UPDATE projects SET status = ?1, updated_at = ?2
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

    /// Delete a project
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let pool = self.db.pool();
        let result = self
            .db
            .timed(
                "projects.delete",
                sqlx::query("DELETE FROM projects WHERE id = ?1")
                    .bind(id)
                    .execute(pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Project not found".to_string()));
        }
        Ok(())
    }

    /// List projects matching the filter, newest first
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: ProjectFilter,
        params: PageParams,
    ) -> Result<Paginated<Project>> {
        let params = params.clamped();
        let pool = self.db.pool();
        let status = filter.status.map(|s| s.as_str().to_string());
        let mentor_id = filter.mentor_id;

        let (projects, total) = self
            .db
            .timed("projects.list", async move {
                let total: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM projects
                    WHERE (?1 IS NULL OR status = ?1)
                      AND (?2 IS NULL OR mentor_id = ?2)
                    "#,
                )
                .bind(&status)
                .bind(&mentor_id)
                .fetch_one(pool)
                .await?;

                let projects = sqlx::query_as::<_, Project>(
                    r#"
                    SELECT * FROM projects
                    WHERE (?1 IS NULL OR status = ?1)
                      AND (?2 IS NULL OR mentor_id = ?2)
                    ORDER BY created_at DESC
                    LIMIT ?3 OFFSET ?4
                    "#,
                )
                .bind(&status)
                .bind(&mentor_id)
                .bind(i64::from(params.limit))
                .bind(params.offset())
                .fetch_all(pool)
                .await?;

                Ok((projects, total))
            })
            .await?;

        Ok(Paginated::new(projects, params, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::users::{CreateUserRequest, UserRepository};
    use crate::tests::create_test_db;

    async fn create_mentor(db: &Database) -> String {
        UserRepository::new(db)
            .create(CreateUserRequest {
                email: format!("mentor-{}@example.com", Id::new()),
                password_hash: "$argon2id$fake".to_string(),
                full_name: "Mentor".to_string(),
                role: "mentor".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    fn listing(mentor_id: &str, title: &str) -> CreateProjectRequest {
        CreateProjectRequest {
            mentor_id: mentor_id.to_string(),
            title: title.to_string(),
            description: "Build something real".to_string(),
        }
    }

    #[test]
    fn test_status_transitions() {
        assert!(ProjectStatus::Draft.can_transition(ProjectStatus::Open));
        assert!(ProjectStatus::Open.can_transition(ProjectStatus::Closed));
        assert!(!ProjectStatus::Draft.can_transition(ProjectStatus::Closed));
        assert!(!ProjectStatus::Closed.can_transition(ProjectStatus::Open));
        assert!(!ProjectStatus::Open.can_transition(ProjectStatus::Draft));
    }

    #[tokio::test]
    async fn test_create_starts_draft() {
        let db = create_test_db().await;
        let mentor = create_mentor(&db).await;
        let repo = ProjectRepository::new(&db);

        let project = repo.create(listing(&mentor, "Intro to Rust")).await.unwrap();
        assert_eq!(project.status, "draft");
        assert_eq!(project.mentor_id, mentor);
    }

    #[tokio::test]
    async fn test_transition_enforced() {
        let db = create_test_db().await;
        let mentor = create_mentor(&db).await;
        let repo = ProjectRepository::new(&db);
        let project = repo.create(listing(&mentor, "CRDT lab")).await.unwrap();

        // draft -> closed is illegal
        let err = repo
            .transition_status(&project.id, ProjectStatus::Closed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // draft -> open -> closed is the legal path
        let opened = repo
            .transition_status(&project.id, ProjectStatus::Open)
            .await
            .unwrap();
        assert_eq!(opened.status, "open");

        let closed = repo
            .transition_status(&project.id, ProjectStatus::Closed)
            .await
            .unwrap();
        assert_eq!(closed.status, "closed");
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let db = create_test_db().await;
        let mentor = create_mentor(&db).await;
        let repo = ProjectRepository::new(&db);

        let p1 = repo.create(listing(&mentor, "One")).await.unwrap();
        let _p2 = repo.create(listing(&mentor, "Two")).await.unwrap();
        repo.transition_status(&p1.id, ProjectStatus::Open)
            .await
            .unwrap();

        let open = repo
            .list(
                ProjectFilter {
                    status: Some(ProjectStatus::Open),
                    mentor_id: None,
                },
                PageParams::default(),
            )
            .await
            .unwrap();
        assert_eq!(open.data.len(), 1);
        assert_eq!(open.data[0].title, "One");

        let all = repo
            .list(ProjectFilter::default(), PageParams::default())
            .await
            .unwrap();
        assert_eq!(all.pagination.total, 2);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let db = create_test_db().await;
        let repo = ProjectRepository::new(&db);
        assert!(matches!(
            repo.delete("nope").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
