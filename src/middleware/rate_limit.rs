use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::{config::Config, result::ApiResult};

const LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again in an hour!";

/// Fixed-window request counter per client IP, kept in Redis.
#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    window_secs: u64,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(redis: redis::Client, config: &Config) -> Self {
        Self {
            redis: Arc::new(redis),
            window_secs: config.rate_limit_window().as_secs(),
            max_requests: config.rate_limit_requests,
        }
    }

    /// Counts one request for `client` and reports whether it is still
    /// within budget.
    pub async fn admit(&self, client: &str) -> redis::RedisResult<bool> {
        let key = format!("rate_limit:{client}");
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let window = i64::try_from(self.window_secs).unwrap_or(i64::MAX);
            let _: () = conn.expire(&key, window).await?;
        }
        Ok(count <= u64::from(self.max_requests))
    }
}

fn client_ip(req: &Request<Body>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());
    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    match limiter.admit(&ip).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            debug!(%ip, "rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ApiResult::<()>::fail(LIMIT_MESSAGE)),
            )
                .into_response()
        }
        Err(e) => {
            // Fail open while Redis is unreachable.
            warn!("rate limiter unavailable: {}", e);
            next.run(req).await
        }
    }
}
