//! Per-client rate limiting.
//!
//! Token-bucket limiter keyed by the caller's discord id when the request
//! carries one (query string or `x-discord-id` header), falling back to the
//! client IP.  Realtime event posts share one client's budget with the rest
//! of the API but draw from a tighter bucket, since cursor and typing
//! traffic is the first thing to spiral when a client misbehaves.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::ConnectInfo,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, rate: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;

        self.tokens = (self.tokens + elapsed * rate).min(capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Who a bucket belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    User(String),
    Ip(IpAddr),
}

/// Which budget a route draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Standard,
    Realtime,
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<(ClientKey, RouteClass), TokenBucket>>>,
    standard: (f64, f64),
    realtime: (f64, f64),
}

impl RateLimiter {
    pub fn new(standard: (f64, f64), realtime: (f64, f64)) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            standard,
            realtime,
        }
    }

    pub async fn check(&self, key: ClientKey, class: RouteClass) -> bool {
        let (rate, capacity) = match class {
            RouteClass::Standard => self.standard,
            RouteClass::Realtime => self.realtime,
        };
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry((key, class))
            .or_insert_with(|| TokenBucket::new(capacity));
        bucket.try_consume(rate, capacity)
    }

    pub async fn purge_stale(&self, max_idle_secs: f64) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| {
            now.duration_since(bucket.last_refill).as_secs_f64() < max_idle_secs
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        // Standard API: 10 req/s sustained, burst of 30.
        // Realtime posts: 5 req/s sustained, burst of 15 — clients throttle
        // typing and heartbeats well below this.
        Self::new((10.0, 30.0), (5.0, 15.0))
    }
}

pub async fn rate_limit_middleware(
    axum::extract::State(limiter): axum::extract::State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let class = classify(&req);

    if let Some(key) = client_key(&req) {
        if !limiter.check(key.clone(), class).await {
            warn!(?key, ?class, "rate limit exceeded");
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    Ok(next.run(req).await)
}

fn classify<B>(req: &Request<B>) -> RouteClass {
    if req.method() == Method::POST && req.uri().path() == "/api/realtime-event" {
        RouteClass::Realtime
    } else {
        RouteClass::Standard
    }
}

/// Discord id from the query string or `x-discord-id` header, else IP from
/// ConnectInfo, X-Forwarded-For, or X-Real-IP.
fn client_key<B>(req: &Request<B>) -> Option<ClientKey> {
    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some(id) = pair
                .strip_prefix("discordId=")
                .or_else(|| pair.strip_prefix("userId="))
            {
                if !id.is_empty() {
                    return Some(ClientKey::User(id.to_string()));
                }
            }
        }
    }

    if let Some(id) = req
        .headers()
        .get("x-discord-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(ClientKey::User(id.to_string()));
    }

    if let Some(connect_info) = req.extensions().get::<ConnectInfo<std::net::SocketAddr>>() {
        return Some(ClientKey::Ip(connect_info.0.ip()));
    }

    for header in ["x-forwarded-for", "x-real-ip"] {
        if let Some(value) = req.headers().get(header).and_then(|v| v.to_str().ok()) {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return Some(ClientKey::Ip(ip));
                }
            }
        }
    }

    None
}
