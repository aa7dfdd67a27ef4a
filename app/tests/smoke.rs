//! ABOUTME: End-to-end smoke test for the codionix marketplace backend
//! ABOUTME: Walks the full lifecycle from registration to feedback to drain

use std::sync::Arc;
use std::time::Duration;

use cx_config::Config;
use cx_db::{
    ApplicationRepository, ApplicationStatus, CreateApplicationRequest, CreateFeedbackRequest,
    CreateProjectRequest, CreateUserRequest, Database, FeedbackRepository, PageParams,
    ProjectRepository, ProjectStatus, UserRepository,
};
use cx_mail::{test_retry_config, MailQueue, RecordingMailer};
use cx_web::auth::PasswordAuth;
use cx_web::lifecycle::{DrainOutcome, RequestTracker};
use cx_web::AppState;

async fn create_user(db: &Database, email: &str, role: &str) -> cx_db::User {
    let repo = UserRepository::new(db);
    let password_hash = PasswordAuth::hash_password("password123").expect("hash");
    repo.create(CreateUserRequest {
        email: email.to_string(),
        password_hash,
        full_name: "Smoke Tester".to_string(),
        role: role.to_string(),
    })
    .await
    .expect("create user")
}

#[tokio::test]
async fn test_marketplace_workflow_end_to_end() {
    let db_config = test_support::temp_db_config();
    let db = Database::connect(&db_config).await.expect("connect");

    // A fresh database answers health checks
    let report = db.health_check().await;
    assert!(report.healthy);

    let mentor = create_user(&db, "mentor@example.com", "mentor").await;
    let student = create_user(&db, "student@example.com", "student").await;
    assert!(PasswordAuth::verify_password("password123", &mentor.password_hash).expect("verify"));

    // Mentor publishes a project
    let projects = ProjectRepository::new(&db);
    let project = projects
        .create(CreateProjectRequest {
            mentor_id: mentor.id.clone(),
            title: "Build a data pipeline".to_string(),
            description: "Batch ingestion with checkpointing".to_string(),
        })
        .await
        .expect("create project");
    assert_eq!(project.status().expect("status"), ProjectStatus::Draft);

    let project = projects
        .transition_status(&project.id, ProjectStatus::Open)
        .await
        .expect("open project");
    assert_eq!(project.status().expect("status"), ProjectStatus::Open);

    // Student applies and the mentor accepts
    let applications = ApplicationRepository::new(&db);
    let application = applications
        .create(CreateApplicationRequest {
            project_id: project.id.clone(),
            student_id: student.id.clone(),
            cover_letter: "I have shipped two similar pipelines.".to_string(),
        })
        .await
        .expect("apply");
    assert_eq!(
        application.status().expect("status"),
        ApplicationStatus::Pending
    );

    let application = applications
        .transition_status(&application.id, ApplicationStatus::Accepted)
        .await
        .expect("accept");
    assert_eq!(
        application.status().expect("status"),
        ApplicationStatus::Accepted
    );

    // Student leaves feedback after the engagement
    let feedback = FeedbackRepository::new(&db);
    let entry = feedback
        .create(CreateFeedbackRequest {
            application_id: application.id.clone(),
            author_id: student.id.clone(),
            rating: 5,
            comment: "Clear scoping and fast reviews.".to_string(),
        })
        .await
        .expect("feedback");
    assert_eq!(entry.rating, 5);

    let page = feedback
        .list_by_author(&student.id, PageParams::default())
        .await
        .expect("list feedback");
    assert_eq!(page.data.len(), 1);

    db.disconnect().await;
}

#[tokio::test]
async fn test_app_state_wires_metrics_and_tracker() {
    let db_config = test_support::temp_db_config();
    let db = Database::connect(&db_config).await.expect("connect");

    let mut config = Config::default();
    config.security.jwt_secret = "smoke_test_secret_32_characters!".to_string();
    config.database = db_config;

    let (mail, _worker) = MailQueue::start(Arc::new(RecordingMailer::new()), test_retry_config());
    let state = AppState::new(db, config, mail);

    assert_eq!(state.tracker.active_count(), 0);
    assert!(!state.tracker.is_shutting_down());

    // The registry carries the pool metrics so /metrics has content
    let mut body = String::new();
    prometheus_client::encoding::text::encode(&mut body, &state.registry).expect("encode");
    assert!(body.contains("db_queries_executed"));
}

#[tokio::test]
async fn test_shutdown_drains_before_stopping() {
    let tracker = RequestTracker::new();

    let guard = tracker.track();
    assert!(tracker.begin_shutdown());
    // A second signal is a no-op
    assert!(!tracker.begin_shutdown());

    let waiter = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.wait_for_drain(Duration::from_secs(5)).await })
    };

    // The in-flight request finishes and the drain resolves
    drop(guard);
    let outcome = waiter.await.expect("join");
    assert_eq!(outcome, DrainOutcome::Drained);
}
