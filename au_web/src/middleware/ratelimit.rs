//! ABOUTME: Rate limiting middleware keyed by client IP
//! ABOUTME: Sliding-window request log per IP kept in a DashMap

use crate::models::ProblemDetails;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpResponse,
};
use dashmap::DashMap;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per IP inside one window
    pub max_requests: u32,
    pub window: Duration,
    /// Peers whose X-Forwarded-For header is honoured
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
            trusted_proxies: vec!["127.0.0.1".to_string(), "::1".to_string()],
        }
    }
}

impl From<&au_config::RateLimitConfig> for RateLimitConfig {
    fn from(config: &au_config::RateLimitConfig) -> Self {
        Self {
            max_requests: config.requests_per_minute,
            window: Duration::from_secs(config.window_seconds),
            ..Self::default()
        }
    }
}

/// Checks between sweeps of idle keys
const SWEEP_INTERVAL: u64 = 256;

/// Timestamps of recent requests per key
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    entries: Arc<DashMap<String, VecDeque<Instant>>>,
    checks: Arc<AtomicU64>,
    max_requests: u32,
    window: Duration,
}

pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            checks: Arc::new(AtomicU64::new(0)),
            max_requests,
            window,
        }
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Drop keys whose newest request has left the window
    fn prune_at(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, log| {
            log.back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });
        debug!(
            removed = before.saturating_sub(self.entries.len()),
            "Pruned idle rate limit keys"
        );
    }

    fn check_at(&self, key: &str, now: Instant) -> Decision {
        // Must run before taking an entry guard on the map
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.prune_at(now);
        }

        let mut log = self.entries.entry(key.to_string()).or_default();

        while log
            .front()
            .is_some_and(|seen| now.duration_since(*seen) >= self.window)
        {
            log.pop_front();
        }

        if (log.len() as u32) < self.max_requests {
            log.push_back(now);
            Decision::Allowed {
                remaining: self.max_requests - log.len() as u32,
            }
        } else {
            let oldest = log.front().copied().unwrap_or(now);
            Decision::Limited {
                retry_after: self.window.saturating_sub(now.duration_since(oldest)),
            }
        }
    }
}

/// Rate limiting middleware transform
pub struct RateLimit {
    config: RateLimitConfig,
    limiter: SlidingWindowLimiter,
}

impl RateLimit {
    pub fn new(config: RateLimitConfig) -> Self {
        let limiter = SlidingWindowLimiter::new(config.max_requests, config.window);
        Self { config, limiter }
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
            trusted_proxies: Rc::new(self.config.trusted_proxies.clone()),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    trusted_proxies: Rc<Vec<String>>,
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
        let client_ip = client_ip(&req, &self.trusted_proxies);
        let decision = self.limiter.check(&client_ip);

        Box::pin(async move {
            match decision {
                Decision::Allowed { remaining } => {
                    debug!("Rate limit passed: ip={}, remaining={}", client_ip, remaining);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Decision::Limited { retry_after } => {
                    // round up so clients never retry early
                    let retry_after = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                    warn!("Rate limit exceeded: ip={}, retry_after={}s", client_ip, retry_after);

                    let mut response = HttpResponse::TooManyRequests()
                        .content_type("application/problem+json")
                        .json(ProblemDetails::rate_limit_error(Some(retry_after)));

                    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static("retry-after"), value);
                    }
                    response.headers_mut().insert(
                        HeaderName::from_static("x-ratelimit-remaining"),
                        HeaderValue::from_static("0"),
                    );

                    let (req, _) = req.into_parts();
                    Ok(ServiceResponse::new(req, response).map_into_right_body())
                }
            }
        })
    }
}

/// Peer address, or the first X-Forwarded-For hop when the peer is a trusted proxy
fn client_ip(req: &ServiceRequest, trusted_proxies: &[String]) -> String {
    let peer_ip = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if trusted_proxies.iter().any(|trusted| trusted == &peer_ip) {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer_ip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sliding_window_allows_then_limits() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(matches!(
            limiter.check_at("1.2.3.4", start),
            Decision::Allowed { remaining: 1 }
        ));
        assert!(matches!(
            limiter.check_at("1.2.3.4", start + Duration::from_secs(10)),
            Decision::Allowed { remaining: 0 }
        ));
        match limiter.check_at("1.2.3.4", start + Duration::from_secs(20)) {
            Decision::Limited { retry_after } => assert_eq!(retry_after, Duration::from_secs(40)),
            Decision::Allowed { .. } => panic!("third request should be limited"),
        }

        // other clients are unaffected
        assert!(matches!(
            limiter.check_at("5.6.7.8", start),
            Decision::Allowed { .. }
        ));
    }

    #[test]
    fn test_idle_keys_are_pruned() {
        let limiter = SlidingWindowLimiter::new(1000, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..SWEEP_INTERVAL {
            limiter.check_at(&format!("10.0.{}.{}", i / 256, i % 256), start);
        }
        assert_eq!(limiter.tracked_keys(), SWEEP_INTERVAL as usize);

        // the next sweep happens once another interval of checks has passed
        let later = start + Duration::from_secs(61);
        for _ in 0..SWEEP_INTERVAL {
            limiter.check_at("10.9.9.9", later);
        }
        assert_eq!(limiter.tracked_keys(), 1);

        limiter.prune_at(later + Duration::from_secs(61));
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.check_at("ip", start);
        limiter.check_at("ip", start + Duration::from_secs(30));

        // first request has aged out, second still counts
        assert!(matches!(
            limiter.check_at("ip", start + Duration::from_secs(61)),
            Decision::Allowed { remaining: 0 }
        ));
        assert!(matches!(
            limiter.check_at("ip", start + Duration::from_secs(62)),
            Decision::Limited { .. }
        ));
    }
}
