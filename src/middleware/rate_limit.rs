//! Fixed-window request limiter keyed by client IP and request path.
//!
//! Counters live in process memory only: they reset on restart and are not
//! shared between instances.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

pub struct RateLimiter {
    windows: DashMap<String, Window>,
    max: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });

        if entry.count == 0 || now > entry.reset_at {
            *entry = Window {
                count: 1,
                reset_at: now + self.window,
            };
            return Decision::Allowed;
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count > self.max {
            return Decision::Limited {
                retry_after: entry.reset_at.saturating_duration_since(now),
            };
        }
        Decision::Allowed
    }

    /// Drop windows that have already expired.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| w.reset_at >= now);
        before - self.windows.len()
    }
}

fn client_ip(req: &Request) -> String {
    if let Some(fwd) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return fwd.to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = format!("{}:{}", client_ip(&req), req.uri().path());
    match state.rate_limiter.check(&key) {
        Decision::Allowed => Ok(next.run(req).await),
        Decision::Limited { retry_after } => {
            warn!(%key, "rate limit exceeded");
            Err(AppError::TooManyRequests {
                message: "Too many requests, please try again later.".into(),
                retry_after_secs: retry_after.as_secs().max(1),
            })
        }
    }
}
