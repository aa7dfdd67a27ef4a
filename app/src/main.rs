//! ABOUTME: Main binary for the codionix marketplace backend
//! ABOUTME: Startup wiring and the graceful shutdown sequence

use std::process;
use std::sync::Arc;
use std::time::Duration;

use cx_config::Config;
use cx_core::telemetry;
use cx_db::Database;
use cx_mail::{MailQueue, Mailer, NullMailer, RetryConfig, SmtpMailer};
use cx_web::lifecycle::DrainOutcome;
use cx_web::AppState;

/// Slack on top of the drain budget before the backstop kills the process
const SHUTDOWN_BACKSTOP_SLACK: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    // Tracing comes up before config so config errors are visible. The
    // deployment env is peeked from the environment since config isn't
    // loaded yet.
    let env = std::env::var("CODIONIX_SERVER_ENV").unwrap_or_else(|_| "development".to_string());
    let log_level = std::env::var("CODIONIX_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    telemetry::init_tracing(&env, "codionix", &log_level);
    tracing::info!("codionix starting");

    // Load configuration - exit with non-zero if invalid
    let config = match Config::load() {
        Ok(config) => {
            tracing::debug!(?config, "Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        env = %config.server.env,
        db_url = %config.database.url,
        "Application configured and ready"
    );

    // Connect the database pool and run migrations
    let db = match Database::connect(&config.database).await {
        Ok(db) => {
            tracing::info!("Database initialized successfully");
            db
        }
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            process::exit(1);
        }
    };

    let report = db.health_check().await;
    if !report.healthy {
        tracing::error!("Database health check failed after connect");
        process::exit(1);
    }

    // Mail transport: real SMTP when configured, a dropping stand-in otherwise
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => match SmtpMailer::new(smtp) {
            Ok(mailer) => Arc::new(mailer),
            Err(e) => {
                tracing::error!("Failed to build SMTP transport: {}", e);
                process::exit(1);
            }
        },
        None => {
            tracing::warn!("SMTP not configured, outbound emails will be dropped");
            Arc::new(NullMailer)
        }
    };
    let (mail, mail_worker) = MailQueue::start(mailer, RetryConfig::default());

    let state = AppState::new(db.clone(), config.clone(), mail);
    let tracker = Arc::clone(&state.tracker);

    // Background observers: pool utilization sampling and query leak scans
    let pool_monitor = cx_db::spawn_pool_monitor(
        db.clone(),
        cx_db::monitor_interval(config.server.is_production()),
    );
    let leak_detector =
        cx_db::spawn_leak_detector(Arc::clone(db.query_tracker()), db.query_timeout());

    let server = match cx_web::build_server(state) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start web server: {}", e);
            process::exit(1);
        }
    };
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    wait_for_shutdown_signal().await;

    // If anything below stalls, the backstop takes the process down hard
    let drain_budget = Duration::from_secs(config.server.shutdown_drain_secs);
    let backstop = tokio::spawn(async move {
        tokio::time::sleep(drain_budget + SHUTDOWN_BACKSTOP_SLACK).await;
        tracing::error!("Shutdown sequence stalled, forcing exit");
        process::exit(1);
    });

    // New requests get 503 from here on; in-flight ones get the drain budget
    if tracker.begin_shutdown() {
        match tracker.wait_for_drain(drain_budget).await {
            DrainOutcome::Drained => tracing::info!("All in-flight requests drained"),
            DrainOutcome::TimedOut => tracing::warn!(
                remaining = tracker.active_count(),
                "Drain budget exhausted with requests still in flight"
            ),
        }
    }

    server_handle.stop(true).await;
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Web server exited with error: {}", e),
        Err(e) => tracing::warn!("Web server task ended abnormally: {}", e),
    }

    pool_monitor.abort();
    leak_detector.abort();
    mail_worker.abort();

    // Best effort: the pool may already be idle
    db.disconnect().await;

    backstop.abort();
    tracing::info!("Shutdown complete");
}

/// Resolve on the first SIGTERM or SIGINT
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                process::exit(1);
            }
        };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for SIGINT: {}", e);
                    process::exit(1);
                }
                tracing::info!("SIGINT received, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {}", e);
            process::exit(1);
        }
        tracing::info!("SIGINT received, shutting down");
    }
}
