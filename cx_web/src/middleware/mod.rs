//! ABOUTME: Middleware chain for the web layer
//! ABOUTME: Request correlation, drain gateway, auth, and rate limiting

pub mod auth;
pub mod correlation;
pub mod drain;
pub mod ratelimit;
