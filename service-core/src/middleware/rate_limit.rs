//! Fixed-window admission control keyed by client.
//!
//! Each `(client, window)` pair owns one counter in a sharded map. Counters
//! for closed windows are evicted by [`WindowRateLimiter::sweep`], which the
//! owning service schedules alongside its other housekeeping.

use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{net::SocketAddr, sync::Arc};

/// Shared handle passed to the middleware and the sweeper.
pub type SharedRateLimiter = Arc<WindowRateLimiter>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    client: String,
    window: i64,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Rejected { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[derive(Debug)]
pub struct WindowRateLimiter {
    limit: u32,
    window_secs: i64,
    buckets: DashMap<BucketKey, u32>,
}

impl WindowRateLimiter {
    /// Limiter admitting `limit` requests per client per `window_secs`.
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit: limit.max(1),
            window_secs: window_secs.max(1) as i64,
            buckets: DashMap::new(),
        }
    }

    /// Limiter with one-minute windows.
    pub fn per_minute(limit: u32) -> SharedRateLimiter {
        Arc::new(Self::new(limit, 60))
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn window_of(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.window_secs)
    }

    /// Admit or reject one request from `client` at the current time.
    pub fn allow(&self, client: &str) -> bool {
        self.check_at(client, Utc::now()).is_allowed()
    }

    /// Admission check against an explicit instant.
    ///
    /// The counter is read and bumped under the shard lock, so concurrent
    /// callers for the same client never lose an increment.
    pub fn check_at(&self, client: &str, now: DateTime<Utc>) -> Admission {
        let window = self.window_of(now);
        let key = BucketKey {
            client: client.to_string(),
            window,
        };

        let mut count = self.buckets.entry(key).or_insert(0);
        if *count >= self.limit {
            let window_end = (window + 1) * self.window_secs;
            let retry_after_secs = (window_end - now.timestamp()).max(1) as u64;
            return Admission::Rejected { retry_after_secs };
        }

        *count += 1;
        Admission::Allowed {
            remaining: self.limit - *count,
        }
    }

    /// Evict counters whose window closed before `now`. Returns the number
    /// of evicted buckets.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let current = self.window_of(now);
        let before = self.buckets.len();
        self.buckets.retain(|key, _| key.window >= current);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of live buckets.
    pub fn tracked_buckets(&self) -> usize {
        self.buckets.len()
    }
}

/// Resolve the rate limit key: first `X-Forwarded-For` hop, then peer address.
pub fn client_key(request: &Request) -> Option<String> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

/// Middleware admitting requests through a [`WindowRateLimiter`].
pub async fn window_rate_limit_middleware(
    State(limiter): State<SharedRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(key) = client_key(&request) else {
        tracing::warn!("Could not determine client address for rate limiting");
        return Ok(next.run(request).await);
    };

    match limiter.check_at(&key, Utc::now()) {
        Admission::Allowed { .. } => Ok(next.run(request).await),
        Admission::Rejected { retry_after_secs } => {
            metrics::counter!("rate_limit_rejections_total").increment(1);
            tracing::warn!(client = %key, "Rate limit exceeded");
            Err(AppError::TooManyRequests(
                "Too many requests. Please try again in a minute.".to_string(),
                Some(retry_after_secs),
            ))
        }
    }
}
