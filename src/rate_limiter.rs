use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use comms_core::Headers;

/// Sliding-window rate limiter keyed by client.
///
/// Each key keeps the instants of its admitted requests within the current
/// window; a request is admitted while fewer than `max_requests` remain.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

/// Result of rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_seconds)
    }

    /// Check if a request should be rate limited, recording it if not
    pub async fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed {
                remaining: self.config.max_requests,
            };
        }

        let now = Instant::now();
        let window = self.window();
        let mut windows = self.windows.lock().await;
        let hits = windows.entry(key.to_string()).or_default();

        while let Some(&oldest) = hits.front() {
            if now.duration_since(oldest) >= window {
                hits.pop_front();
            } else {
                break;
            }
        }

        let used = hits.len() as u32;
        if used >= self.config.max_requests {
            let retry_after = hits
                .front()
                .map(|oldest| window - now.duration_since(*oldest))
                .unwrap_or(window);
            warn!("Rate limit exceeded for key: {}", key);
            return RateLimitResult::Limited { retry_after };
        }

        hits.push_back(now);
        debug!("Rate limit check passed for key: {}", key);
        RateLimitResult::Allowed {
            remaining: self.config.max_requests - used - 1,
        }
    }

    /// Drop keys with no requests inside the current window. Returns the
    /// number of keys removed.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let window = self.window();
        let mut windows = self.windows.lock().await;
        let before = windows.len();

        windows.retain(|key, hits| {
            let keep = hits
                .back()
                .is_some_and(|newest| now.duration_since(*newest) < window);
            if !keep {
                debug!("Cleaning up rate limit window for key: {}", key);
            }
            keep
        });
        before - windows.len()
    }

    /// Periodically prune idle keys to bound memory use.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.prune().await;
            }
        })
    }
}

/// Generic rate limit key generator
pub trait KeyGenerator {
    fn generate_key(&self, scope: &str, identifier: &str) -> String {
        format!("{}:{}", scope, identifier)
    }

    fn extract_client_ip(&self, headers: &Headers) -> Option<String> {
        // Look for common IP headers
        for (name, value) in headers {
            match name.to_lowercase().as_str() {
                "x-forwarded-for" => return Some(value.split(',').next()?.trim().to_string()),
                "x-real-ip" => return Some(value.trim().to_string()),
                "cf-connecting-ip" => return Some(value.trim().to_string()),
                _ => continue,
            }
        }
        None
    }
}

/// Default key generator implementation
pub struct DefaultKeyGenerator;

impl KeyGenerator for DefaultKeyGenerator {}
