//! In-memory fixed-window rate limiting
//!
//! Each caller (keyed by peer IP address) may make at most `max_requests`
//! requests per window. Counter state is shared by every in-flight request
//! and guarded by a mutex; rejected requests never reach the inner handler.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::{config::RateLimitConfig, error::Error};

/// Key used when the peer address is not available
pub const UNKNOWN_CALLER: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Shared rate limiter state
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window` per caller
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a limiter from `[rate_limit]` settings
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        // Counters stay usable even if a holder panicked
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a request from `key` now
    pub fn check(&self, key: &str) -> Result<(), Error> {
        self.check_at(key, Instant::now())
    }

    /// Count a request from `key` at `now`
    ///
    /// # Errors
    ///
    /// Returns `Error::RateLimitExceeded` once the caller has used up the
    /// current window, with the seconds left until it resets.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), Error> {
        let mut windows = self.lock();
        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.saturating_duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let elapsed = now.saturating_duration_since(window.started);
            let remaining = self.window.saturating_sub(elapsed);
            let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);

            tracing::warn!(
                caller = %key,
                limit = self.max_requests,
                "Rate limit exceeded"
            );
            return Err(Error::RateLimitExceeded {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Drop windows that have fully elapsed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Drop windows that have fully elapsed as of `now`, returning how many
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - windows.len()
    }

    /// Number of callers currently tracked
    pub fn tracked_callers(&self) -> usize {
        self.lock().len()
    }
}

/// Caller key for a request: the peer IP, or [`UNKNOWN_CALLER`]
pub fn caller_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string())
}

/// Middleware function enforcing the limit
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    limiter.check(&caller_key(&request))?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[test]
    fn test_admits_n_then_rejects_then_resets() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..3 {
            limiter
                .check_at("10.0.0.1", start + Duration::from_secs(i))
                .unwrap();
        }

        let err = limiter
            .check_at("10.0.0.1", start + Duration::from_secs(10))
            .unwrap_err();
        match err {
            Error::RateLimitExceeded { retry_after_secs } => assert_eq!(retry_after_secs, 50),
            other => panic!("unexpected error: {:?}", other),
        }

        limiter
            .check_at("10.0.0.1", start + Duration::from_secs(60))
            .unwrap();
    }

    #[test]
    fn test_callers_counted_separately() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        limiter.check_at("10.0.0.1", now).unwrap();
        limiter.check_at("10.0.0.2", now).unwrap();
        assert!(limiter.check_at("10.0.0.1", now).is_err());
    }

    #[test]
    fn test_purge_expired() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();
        limiter.check_at("a", start).unwrap();
        limiter.check_at("b", start + Duration::from_secs(8)).unwrap();

        assert_eq!(limiter.purge_expired_at(start + Duration::from_secs(12)), 1);
        assert_eq!(limiter.tracked_callers(), 1);
    }

    #[test]
    fn test_concurrent_checks_do_not_lose_counts() {
        let limiter = RateLimiter::new(50, Duration::from_secs(60));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        if limiter.check("shared").is_ok() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_rejected_request_never_reaches_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new()
            .route(
                "/",
                get(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "ok"
                    }
                }),
            )
            .layer(from_fn_with_state(
                RateLimiter::new(2, Duration::from_secs(60)),
                rate_limit,
            ));

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            statuses.push(response.status());
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                assert!(response.headers().contains_key("retry-after"));
            }
        }

        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_caller_key_from_connect_info() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(caller_key(&request), UNKNOWN_CALLER);

        let addr: SocketAddr = "192.168.1.20:41000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(caller_key(&request), "192.168.1.20");
    }
}
