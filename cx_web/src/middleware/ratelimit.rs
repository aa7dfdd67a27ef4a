//! ABOUTME: Rate limiting middleware with per-IP sliding windows
//! ABOUTME: In-memory DashMap buckets; rejections use the JSON failure envelope

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpResponse,
};
use dashmap::DashMap;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ErrorBody, ErrorEnvelope};

/// Sliding-window counter per client key
#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Debug, Clone)]
struct SlidingWindowLimiter {
    entries: Arc<DashMap<String, WindowEntry>>,
    max_requests: u32,
    window: Duration,
}

impl SlidingWindowLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_requests,
            window,
        }
    }

    /// Returns (allowed, remaining, reset_in)
    fn check(&self, key: &str) -> (bool, u32, Duration) {
        let now = Instant::now();

        let mut entry = self.entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            (true, self.max_requests - entry.count, Duration::ZERO)
        } else {
            let reset_in = self.window - now.duration_since(entry.window_start);
            (false, 0, reset_in)
        }
    }
}

/// Rate limiting middleware transform
pub struct RateLimit {
    limiter: SlidingWindowLimiter,
}

impl RateLimit {
    pub fn new(config: &cx_config::RateLimitConfig) -> Self {
        Self {
            limiter: SlidingWindowLimiter::new(
                config.max_requests,
                Duration::from_secs(config.window_seconds),
            ),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: SlidingWindowLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
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
        let limiter = self.limiter.clone();

        Box::pin(async move {
            let client_ip = req
                .peer_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());

            let (allowed, remaining, reset_in) = limiter.check(&client_ip);

            if allowed {
                debug!(ip = %client_ip, remaining = remaining, "Rate limit check passed");
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            warn!(
                ip = %client_ip,
                reset_in_secs = reset_in.as_secs(),
                "Rate limit exceeded"
            );

            let retry_after = reset_in.as_secs().max(1);
            let mut response = HttpResponse::TooManyRequests().json(ErrorEnvelope {
                success: false,
                error: ErrorBody {
                    code: "RATE_LIMITED".to_string(),
                    message: "Too many requests, slow down".to_string(),
                    details: None,
                    error_id: Uuid::new_v4().to_string(),
                    request_id: None,
                },
            });

            if let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("retry-after"), header_value);
            }

            let (req, _) = req.into_parts();
            Ok(ServiceResponse::new(req, response).map_into_right_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_allows_up_to_max() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));

        let (allowed, remaining, _) = limiter.check("1.2.3.4");
        assert!(allowed);
        assert_eq!(remaining, 1);

        let (allowed, remaining, _) = limiter.check("1.2.3.4");
        assert!(allowed);
        assert_eq!(remaining, 0);

        let (allowed, _, reset_in) = limiter.check("1.2.3.4");
        assert!(!allowed);
        assert!(reset_in <= Duration::from_secs(60));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check("1.1.1.1").0);
        assert!(!limiter.check("1.1.1.1").0);
        assert!(limiter.check("2.2.2.2").0);
    }

    #[test]
    fn test_window_resets() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(10));

        assert!(limiter.check("1.2.3.4").0);
        assert!(!limiter.check("1.2.3.4").0);

        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("1.2.3.4").0);
    }
}
