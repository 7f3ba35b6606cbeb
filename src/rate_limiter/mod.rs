/*!
 * # Rate Limiting
 *
 * Fixed-window request counters keyed by client IP. Counters live in a
 * `DashMap`, or in Redis (`INCR` + `EXPIRE`) so several API instances share
 * one budget. When Redis is unreachable the in-process counters take over.
 *
 * The cart routes use this as their security guard:
 *
 * ```ignore
 * let limiter = RateLimiter::in_memory(RateLimitConfig {
 *     requests_per_window: 5,
 *     window_duration: Duration::from_secs(60),
 * });
 * let cart = cart_routes().layer(from_fn_with_state(limiter, rate_limit_middleware));
 * ```
 */
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::AppConfig;
use crate::errors::ServiceError;

fn num_to_header_value<T: ToString>(n: T) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn time_until_reset(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.duration_since(self.window_start))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 5,
            window_duration: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Default)]
pub enum RateLimitBackend {
    #[default]
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, RateLimitEntry>>,
    backend: RateLimitBackend,
    config: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            backend,
            config,
        }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, RateLimitBackend::InMemory)
    }

    /// Cart security limiter as configured in `AppConfig`.
    pub fn for_carts(cfg: &AppConfig) -> Self {
        let config = RateLimitConfig {
            requests_per_window: cfg.cart_rate_limit_requests,
            window_duration: cfg.cart_rate_limit_window(),
        };
        let backend = if cfg.rate_limit_use_redis {
            match redis::Client::open(cfg.redis_url.as_str()) {
                Ok(client) => RateLimitBackend::Redis {
                    client: Arc::new(client),
                    namespace: format!("{}:cart", cfg.rate_limit_namespace),
                },
                Err(err) => {
                    warn!("Invalid Redis URL for rate limiting, using memory: {}", err);
                    RateLimitBackend::InMemory
                }
            }
        } else {
            RateLimitBackend::InMemory
        };
        Self::new(config, backend)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counts one request against `key` and reports whether it is allowed.
    pub async fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        match &self.backend {
            RateLimitBackend::InMemory => self.check_in_memory(key, Instant::now()),
            RateLimitBackend::Redis { client, namespace } => {
                match client.get_async_connection().await {
                    Ok(mut conn) => {
                        match Self::check_with_redis(&mut conn, namespace, key, &self.config).await
                        {
                            Ok(result) => result,
                            Err(err) => {
                                warn!("Redis rate limit error: {}", err);
                                self.check_in_memory(key, Instant::now())
                            }
                        }
                    }
                    Err(err) => {
                        warn!("Failed to connect to Redis for rate limiting: {}", err);
                        self.check_in_memory(key, Instant::now())
                    }
                }
            }
        }
    }

    fn check_in_memory(&self, key: &str, now: Instant) -> RateLimitResult {
        let limit = self.config.requests_per_window;
        let window = self.config.window_duration;

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));

        if now.duration_since(entry.window_start) >= window {
            *entry = RateLimitEntry::new(now);
        }

        if entry.count >= limit {
            return RateLimitResult {
                allowed: false,
                limit,
                remaining: 0,
                reset_time: entry.time_until_reset(now, window),
            };
        }

        entry.count += 1;
        RateLimitResult {
            allowed: true,
            limit,
            remaining: limit - entry.count,
            reset_time: entry.time_until_reset(now, window),
        }
    }

    async fn check_with_redis<C>(
        conn: &mut C,
        namespace: &str,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, redis::RedisError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let redis_key = format!("{}:{}", namespace, key);
        let window_secs = config.window_duration.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
        }

        let ttl_secs = match conn.ttl::<_, i64>(&redis_key).await {
            Ok(ttl) if ttl > 0 => ttl as u64,
            _ => {
                let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
                window_secs
            }
        };

        let limit = config.requests_per_window;
        let allowed = count <= limit as i64;
        Ok(RateLimitResult {
            allowed,
            limit,
            remaining: if allowed {
                limit.saturating_sub(count.max(0) as u32)
            } else {
                0
            },
            reset_time: Duration::from_secs(ttl_secs),
        })
    }

    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops in-memory windows that have fully elapsed.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let window = self.config.window_duration;
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < window);
    }
}

/// Client key from `X-Forwarded-For` (first hop) or `X-Real-IP`.
pub fn extract_ip_key(request: &Request) -> String {
    if let Some(ip) = client_ip(request.headers()) {
        return format!("ip:{}", ip);
    }
    "ip:unknown".to_string()
}

pub fn client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().map(str::trim) {
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Rejects with 429 once the caller's window is used up.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let key = extract_ip_key(&request);
    let result = limiter.check_rate_limit(&key).await;

    let mut response = if result.allowed {
        next.run(request).await
    } else {
        warn!(key = %key, "Rate limit exceeded");
        ServiceError::RateLimitExceeded.into_response()
    };

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", num_to_header_value(result.limit));
    headers.insert("X-RateLimit-Remaining", num_to_header_value(result.remaining));
    headers.insert(
        "X-RateLimit-Reset",
        num_to_header_value(result.reset_time.as_secs()),
    );
    if !result.allowed {
        headers.insert(
            "Retry-After",
            num_to_header_value(result.reset_time.as_secs().max(1)),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    fn limiter(limit: u32, window: Duration) -> RateLimiter {
        RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: limit,
            window_duration: window,
        })
    }

    #[test]
    fn allows_exactly_the_limit() {
        let limiter = limiter(5, Duration::from_secs(60));
        let now = Instant::now();
        for expected_remaining in (0..5).rev() {
            let result = limiter.check_in_memory("ip:1", now);
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
        }
        assert!(!limiter.check_in_memory("ip:1", now).allowed);
        assert!(limiter.check_in_memory("ip:2", now).allowed);
    }

    #[test]
    fn window_resets() {
        let limiter = limiter(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_in_memory("k", start).allowed);
        assert!(!limiter.check_in_memory("k", start + Duration::from_secs(5)).allowed);
        assert!(limiter.check_in_memory("k", start + Duration::from_secs(10)).allowed);
    }

    #[tokio::test]
    async fn middleware_returns_429_with_headers() {
        let limiter = limiter(2, Duration::from_secs(60));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ));

        let call = || {
            app.clone().oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .header("x-forwarded-for", "10.0.0.1, 172.16.0.1")
                    .body(Body::empty())
                    .unwrap(),
            )
        };

        assert_eq!(call().await.unwrap().status(), StatusCode::OK);
        assert_eq!(call().await.unwrap().status(), StatusCode::OK);
        let limited = call().await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()["X-RateLimit-Remaining"], "0");
        assert!(limited.headers().contains_key("Retry-After"));
    }

    #[test]
    fn ip_key_prefers_forwarded_for() {
        let request = axum::http::Request::builder()
            .header("x-real-ip", "192.168.1.5")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_ip_key(&request), "ip:192.168.1.5");

        let request = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.9")
            .header("x-real-ip", "192.168.1.5")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_ip_key(&request), "ip:203.0.113.9");
    }
}
