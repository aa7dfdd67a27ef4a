//! ABOUTME: Request correlation middleware assigning per-request ids
//! ABOUTME: Honors inbound x-request-id, echoes it back, logs method/path/status/duration

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Instant;
use tracing::{error, info, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id stored in request extensions for handlers and the error
/// path to pick up
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Extract the correlation id from a request, if the middleware ran
pub fn request_id(req: &actix_web::HttpRequest) -> Option<String> {
    req.extensions().get::<RequestId>().map(|id| id.0.clone())
}

/// Correlation middleware transform
pub struct Correlation;

impl<S, B> Transform<S, ServiceRequest> for Correlation
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = CorrelationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CorrelationMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct CorrelationMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for CorrelationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        // Honor an inbound id from a proxy or client retry, otherwise mint one
        let id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty() && value.len() <= 128)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        req.extensions_mut().insert(RequestId(id.clone()));

        let method = req.method().to_string();
        let path = req.path().to_string();
        let request_headers = req.headers().clone();
        let started = Instant::now();

        let span = tracing::info_span!("request", request_id = %id, %method, %path);

        Box::pin(
            async move {
                let mut res = service.call(req).await?;

                if let Ok(header_value) = HeaderValue::from_str(&id) {
                    res.headers_mut()
                        .insert(HeaderName::from_static(REQUEST_ID_HEADER), header_value);
                }

                if res.status().is_server_error() {
                    // Headers go through redaction before they reach the logs
                    error!(
                        status = res.status().as_u16(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        headers = ?crate::sanitize::sanitize_headers(&request_headers),
                        "Request failed server-side"
                    );
                } else {
                    info!(
                        status = res.status().as_u16(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Request completed"
                    );
                }

                Ok(res)
            }
            .instrument(span),
        )
    }
}
