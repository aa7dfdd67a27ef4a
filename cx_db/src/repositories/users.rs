//! ABOUTME: User repository for students and mentors
//! ABOUTME: CRUD with soft delete and paginated listing

use cx_core::{now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{debug, instrument};

use super::{PageParams, Paginated};
use crate::Database;

/// User entity (student or mentor)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub bio: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Request to create a new user
#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
}

/// Request to update a user profile
#[derive(Debug, Clone, Default)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub password_hash: Option<String>,
}

/// User repository
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a new user; a duplicate email surfaces as a conflict
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateUserRequest) -> Result<User> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating user with id: {}", id);

        let pool = self.db.pool();
        self.db
            .timed(
                "users.create",
                sqlx::query_as::<_, User>(
                    r#"
                    INSERT INTO users (id, email, password_hash, full_name, role, is_active, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, TRUE, ?6, ?7)
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(request.email)
                .bind(request.password_hash)
                .bind(request.full_name)
                .bind(request.role)
                .bind(&now)
                .bind(&now)
                .fetch_one(pool),
            )
            .await
    }

    /// Find a user by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let pool = self.db.pool();
        self.db
            .timed(
                "users.find_by_id",
                sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(pool),
            )
            .await
    }

    /// Find an active user by email
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let pool = self.db.pool();
        self.db
            .timed(
                "users.find_by_email",
                sqlx::query_as::<_, User>(
                    "SELECT * FROM users WHERE email = ?1 AND is_active = TRUE",
                )
                .bind(email)
                .fetch_optional(pool),
            )
            .await
    }

    /// Update a user profile
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateUserRequest) -> Result<User> {
        if request.full_name.is_none() && request.bio.is_none() && request.password_hash.is_none()
        {
            return Err(Error::Validation("No fields to update".to_string()));
        }

        let now = now_iso8601();
        let pool = self.db.pool();
        let id = id.to_string();

        let updated = self
            .db
            .timed("users.update", async move {
                let mut tx = pool.begin().await?;

                let current = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
                    .bind(&id)
                    .fetch_optional(&mut *tx)
                    .await?;

                let Some(current) = current else {
                    return Ok(None);
                };

                let full_name = request.full_name.unwrap_or(current.full_name);
                let bio = request.bio.or(current.bio);
                let password_hash = request.password_hash.unwrap_or(current.password_hash);

                let user = sqlx::query_as::<_, User>(
                    r#"
                    UPDATE users
                    SET full_name = ?1, bio = ?2, password_hash = ?3, updated_at = ?4
                    WHERE id = ?5
                    RETURNING *
                    "#,
                )
                .bind(full_name)
                .bind(bio)
                .bind(password_hash)
                .bind(&now)
                .bind(&id)
                .fetch_one(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(Some(user))
            })
            .await?;

        updated.ok_or_else(|| Error::NotFound("User not found".to_string()))
    }

    /// Soft delete a user (mark inactive)
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let now = now_iso8601();
        let pool = self.db.pool();

        let result = self
            .db
            .timed(
                "users.delete",
                sqlx::query("UPDATE users SET is_active = FALSE, updated_at = ?1 WHERE id = ?2")
                    .bind(now)
                    .bind(id)
                    .execute(pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("User not found".to_string()));
        }

        debug!("Soft deleted user: {}", id);
        Ok(())
    }

    /// List active users, newest first
    #[instrument(skip(self))]
    pub async fn list(&self, params: PageParams) -> Result<Paginated<User>> {
        let params = params.clamped();
        let pool = self.db.pool();

        let (users, total) = self
            .db
            .timed("users.list", async move {
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
                        .fetch_one(pool)
                        .await?;

                let users = sqlx::query_as::<_, User>(
                    r#"
                    SELECT * FROM users WHERE is_active = TRUE
                    ORDER BY created_at DESC
                    LIMIT ?1 OFFSET ?2
                    "#,
                )
                .bind(i64::from(params.limit))
                .bind(params.offset())
                .fetch_all(pool)
                .await?;

                Ok((users, total))
            })
            .await?;

        Ok(Paginated::new(users, params, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::create_test_db;

    fn student(email: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: email.to_string(),
            password_hash: "$argon2id$fake".to_string(),
            full_name: "Test Student".to_string(),
            role: "student".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = create_test_db().await;
        let repo = UserRepository::new(&db);

        let user = repo.create(student("a@example.com")).await.unwrap();
        assert!(!user.id.is_empty());
        assert_eq!(user.role, "student");
        assert!(user.is_active);

        let found = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(found.email, "a@example.com");

        let by_email = repo.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let db = create_test_db().await;
        let repo = UserRepository::new(&db);

        repo.create(student("dup@example.com")).await.unwrap();
        let err = repo.create(student("dup@example.com")).await.unwrap_err();

        match err {
            Error::Conflict { fields } => assert_eq!(fields, vec!["email"]),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_preserves_unset_fields() {
        let db = create_test_db().await;
        let repo = UserRepository::new(&db);

        let user = repo.create(student("u@example.com")).await.unwrap();
        let updated = repo
            .update(
                &user.id,
                UpdateUserRequest {
                    bio: Some("Learning Rust".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.full_name, "Test Student");
        assert_eq!(updated.bio.as_deref(), Some("Learning Rust"));
    }

    #[tokio::test]
    async fn test_update_requires_fields() {
        let db = create_test_db().await;
        let repo = UserRepository::new(&db);
        let user = repo.create(student("v@example.com")).await.unwrap();

        let err = repo
            .update(&user.id, UpdateUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_email_lookup() {
        let db = create_test_db().await;
        let repo = UserRepository::new(&db);

        let user = repo.create(student("gone@example.com")).await.unwrap();
        repo.delete(&user.id).await.unwrap();

        assert!(repo
            .find_by_email("gone@example.com")
            .await
            .unwrap()
            .is_none());

        // Deleting an unknown id is a not-found
        assert!(matches!(
            repo.delete("missing").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let db = create_test_db().await;
        let repo = UserRepository::new(&db);

        for i in 0..15 {
            repo.create(student(&format!("user{}@example.com", i)))
                .await
                .unwrap();
        }

        let page = repo
            .list(PageParams { page: 1, limit: 10 })
            .await
            .unwrap();
        assert_eq!(page.data.len(), 10);
        assert_eq!(page.pagination.total, 15);
        assert_eq!(page.pagination.total_pages, 2);
        assert!(page.pagination.has_next_page);

        let page2 = repo
            .list(PageParams { page: 2, limit: 10 })
            .await
            .unwrap();
        assert_eq!(page2.data.len(), 5);
        assert!(!page2.pagination.has_next_page);
        assert!(page2.pagination.has_prev_page);
    }
}
