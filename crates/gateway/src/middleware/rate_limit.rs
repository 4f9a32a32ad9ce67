//! Rate limiting middleware using token bucket algorithm

use audience_common::config::RateLimitConfig;
use audience_common::errors::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Limiter plus the configured rate, for error reporting
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<GlobalRateLimiter>,
    per_second: u32,
}

impl RateLimit {
    /// Create a new rate limiter; zero values are raised to one
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            per_second: per_second.get(),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limit): State<RateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match limit.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited {
                limit: limit.per_second,
            })
        }
    }
}
