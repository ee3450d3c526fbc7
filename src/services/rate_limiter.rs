//! Login rate limiting
//!
//! Two sliding windows guard the login endpoint:
//! - failed attempts per email: 5 per 15 minutes
//! - requests per IP address: 10 per minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps of recent events per key, pruned to a fixed window
struct SlidingWindow<K> {
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
    window: Duration,
    limit: usize,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            window,
            limit,
        }
    }

    async fn is_limited(&self, key: &K) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        match events.get_mut(key) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= self.limit
            }
            None => false,
        }
    }

    async fn record(&self, key: K) {
        self.events
            .write()
            .await
            .entry(key)
            .or_default()
            .push(Utc::now());
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn prune(&self) {
        let cutoff = Utc::now() - self.window;
        self.events.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }

    async fn tracked_keys(&self) -> usize {
        self.events.read().await.len()
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    failures_by_email: SlidingWindow<String>,
    requests_by_ip: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::with_limits(5, Duration::minutes(15), 10, Duration::minutes(1))
    }

    pub fn with_limits(
        max_failures: usize,
        failure_window: Duration,
        max_ip_requests: usize,
        ip_window: Duration,
    ) -> Self {
        Self {
            failures_by_email: SlidingWindow::new(max_failures, failure_window),
            requests_by_ip: SlidingWindow::new(max_ip_requests, ip_window),
        }
    }

    /// Too many recent failures for this email (case-insensitive)
    pub async fn is_email_limited(&self, email: &str) -> bool {
        self.failures_by_email.is_limited(&normalize(email)).await
    }

    pub async fn record_failed_attempt(&self, email: &str) {
        self.failures_by_email.record(normalize(email)).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_email_attempts(&self, email: &str) {
        self.failures_by_email.clear(&normalize(email)).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.requests_by_ip.is_limited(&ip).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.requests_by_ip.record(ip).await;
    }

    /// Drop expired entries; run periodically
    pub async fn cleanup(&self) {
        self.failures_by_email.prune().await;
        self.requests_by_ip.prune().await;
    }

    /// Number of emails and IPs currently tracked
    pub async fn tracked(&self) -> (usize, usize) {
        (
            self.failures_by_email.tracked_keys().await,
            self.requests_by_ip.tracked_keys().await,
        )
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}
