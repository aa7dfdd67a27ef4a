//! ABOUTME: Web API layer with authentication, routing, and graceful drain
//! ABOUTME: Builds the actix-web application and the bound server

use std::sync::Arc;
use std::time::Instant;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use cx_config::Config;
use cx_core::Result;
use cx_db::Database;
use cx_mail::MailQueue;
use prometheus_client::registry::Registry;

pub mod auth;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod sanitize;

use lifecycle::RequestTracker;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub tracker: Arc<RequestTracker>,
    pub mail: MailQueue,
    pub registry: Arc<Registry>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Database, config: Config, mail: MailQueue) -> Self {
        let mut registry = Registry::default();
        db.metrics().register(&mut registry);

        Self {
            db,
            config,
            tracker: RequestTracker::new(),
            mail,
            registry: Arc::new(registry),
            started_at: Instant::now(),
        }
    }
}

/// Create the main web application service factory
pub fn create_app(
    state: AppState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let tracker = Arc::clone(&state.tracker);
    let rate_limit = state.config.server.rate_limit.clone();
    let cors_origin = state.config.server.cors_origin.clone();

    let cors = Cors::default()
        .allowed_origin(&cors_origin)
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allow_any_header()
        .max_age(3600);

    App::new()
        .app_data(web::Data::new(state))
        .wrap(cors)
        // Correlation registered last so it runs outermost: every request,
        // including drain rejections, gets an id and a duration log
        .wrap(middleware::correlation::Correlation)
        // Probes and scrapes stay outside the drain gate and rate limiter
        .service(routes::health::liveness)
        .service(routes::health::readiness)
        .service(routes::health::full)
        .service(routes::health::metrics)
        .service(
            web::scope("/api")
                .wrap(middleware::drain::DrainGate::new(tracker))
                .service(
                    web::scope("/auth")
                        .wrap(middleware::ratelimit::RateLimit::new(&rate_limit))
                        .service(routes::auth::register)
                        .service(routes::auth::login)
                        .service(routes::auth::refresh)
                        .service(
                            web::scope("")
                                .wrap(middleware::auth::RequireAuth)
                                .service(routes::auth::me),
                        ),
                )
                .service(
                    web::scope("/users")
                        .wrap(middleware::auth::RequireAuth)
                        .service(routes::users::update_me)
                        .service(routes::users::delete_me)
                        .service(routes::users::list)
                        .service(routes::users::get),
                )
                .service(
                    web::scope("/projects")
                        .wrap(middleware::auth::RequireAuth)
                        .service(routes::projects::create)
                        .service(routes::projects::list)
                        .service(routes::projects::transition)
                        .service(routes::projects::update)
                        .service(routes::projects::delete)
                        .service(routes::projects::get),
                )
                .service(
                    web::scope("/applications")
                        .wrap(middleware::auth::RequireAuth)
                        .service(routes::applications::apply)
                        .service(routes::applications::list_mine)
                        .service(routes::applications::list_for_project)
                        .service(routes::applications::transition),
                )
                .service(
                    web::scope("/feedback")
                        .wrap(middleware::auth::RequireAuth)
                        .service(routes::feedback::create)
                        .service(routes::feedback::list_for_application)
                        .service(routes::feedback::list_for_user),
                ),
        )
}

/// Bind the HTTP server without awaiting it, so the caller owns its handle
/// for graceful stop
pub fn build_server(state: AppState) -> Result<actix_web::dev::Server> {
    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    tracing::info!("Starting web server on {}", bind_addr);

    let server = HttpServer::new(move || create_app(state.clone()))
        .disable_signals()
        .bind(&bind_addr)
        .map_err(|e| cx_core::Error::Config(format!("Failed to bind web server: {}", e)))?
        .run();

    Ok(server)
}
