//! ABOUTME: Drain gateway middleware rejecting new work during shutdown
//! ABOUTME: Installs the in-flight guard before handlers; 503 after begin_shutdown

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpResponse,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::lifecycle::RequestTracker;
use crate::models::{ErrorBody, ErrorEnvelope};

/// Seconds suggested to clients retrying a drained instance
const RETRY_AFTER_SECS: u64 = 10;

/// Gateway middleware tracking in-flight requests and gating shutdown
pub struct DrainGate {
    tracker: Arc<RequestTracker>,
}

impl DrainGate {
    pub fn new(tracker: Arc<RequestTracker>) -> Self {
        Self { tracker }
    }
}

impl<S, B> Transform<S, ServiceRequest> for DrainGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = DrainGateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(DrainGateMiddleware {
            service: Rc::new(service),
            tracker: Arc::clone(&self.tracker),
        }))
    }
}

pub struct DrainGateMiddleware<S> {
    service: Rc<S>,
    tracker: Arc<RequestTracker>,
}

impl<S, B> Service<ServiceRequest> for DrainGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let tracker = Arc::clone(&self.tracker);

        Box::pin(async move {
            if tracker.is_shutting_down() {
                // Rejected before tracking: the counter only ever counts
                // requests that reached a handler.
                debug!(path = %req.path(), "Rejecting request during shutdown");

                let mut response = HttpResponse::ServiceUnavailable().json(ErrorEnvelope {
                    success: false,
                    error: ErrorBody {
                        code: "SERVICE_UNAVAILABLE".to_string(),
                        message: "Server is shutting down, please retry".to_string(),
                        details: None,
                        error_id: Uuid::new_v4().to_string(),
                        request_id: None,
                    },
                });

                if let Ok(header_value) = HeaderValue::from_str(&RETRY_AFTER_SECS.to_string()) {
                    response
                        .headers_mut()
                        .insert(HeaderName::from_static("retry-after"), header_value);
                }

                let (req, _) = req.into_parts();
                return Ok(ServiceResponse::new(req, response).map_into_right_body());
            }

            // Guard lives for the whole downstream call; dropping with the
            // future covers success, error, and client disconnect.
            let _guard = tracker.track();
            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App};
    use std::time::Duration;

    fn tracked_app(
        tracker: Arc<RequestTracker>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl actix_web::body::MessageBody>,
            Error = Error,
            InitError = (),
        >,
    > {
        App::new().wrap(DrainGate::new(tracker)).route(
            "/slow",
            web::get().to(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                HttpResponse::Ok().finish()
            }),
        )
    }

    #[actix_web::test]
    async fn test_requests_pass_before_shutdown() {
        let tracker = RequestTracker::new();
        let app = test::init_service(tracked_app(Arc::clone(&tracker))).await;

        let res =
            test::call_service(&app, test::TestRequest::get().uri("/slow").to_request()).await;
        assert!(res.status().is_success());

        // Guard released once the handler finished
        assert_eq!(tracker.active_count(), 0);
    }

    #[actix_web::test]
    async fn test_rejects_with_503_after_shutdown() {
        let tracker = RequestTracker::new();
        let app = test::init_service(tracked_app(Arc::clone(&tracker))).await;

        tracker.begin_shutdown();

        let res =
            test::call_service(&app, test::TestRequest::get().uri("/slow").to_request()).await;
        assert_eq!(res.status(), 503);
        assert!(res.headers().get("retry-after").is_some());

        // Rejected request never touched the counter
        assert_eq!(tracker.active_count(), 0);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    }
}
