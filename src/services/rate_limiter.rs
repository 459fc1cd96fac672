//! Login throttling
//!
//! Failed logins are counted per account, login attempts per client IP.
//! Each key holds a sliding window of timestamps; entries older than the
//! window no longer count and are swept by [`LoginRateLimiter::cleanup`].

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Failed logins allowed per account inside [`ACCOUNT_WINDOW_MINUTES`]
pub const ACCOUNT_MAX_FAILURES: usize = 5;
pub const ACCOUNT_WINDOW_MINUTES: i64 = 15;
/// Login attempts allowed per IP inside [`IP_WINDOW_MINUTES`]
pub const IP_MAX_ATTEMPTS: usize = 10;
pub const IP_WINDOW_MINUTES: i64 = 1;

/// Timestamps per key within a fixed window
#[derive(Debug)]
struct Window<K> {
    hits: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
    limit: usize,
    span: Duration,
}

impl<K: Eq + Hash> Window<K> {
    fn new(limit: usize, span: Duration) -> Self {
        Self {
            hits: RwLock::new(HashMap::new()),
            limit,
            span,
        }
    }

    async fn is_limited(&self, key: &K, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.span;
        let hits = self.hits.read().await;
        hits.get(key)
            .map(|times| times.iter().filter(|t| **t > cutoff).count() >= self.limit)
            .unwrap_or(false)
    }

    async fn record(&self, key: K, now: DateTime<Utc>) {
        let cutoff = now - self.span;
        let mut hits = self.hits.write().await;
        let times = hits.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.push(now);
    }

    async fn clear(&self, key: &K) {
        self.hits.write().await.remove(key);
    }

    async fn sweep(&self, now: DateTime<Utc>) {
        let cutoff = now - self.span;
        self.hits.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }
}

/// What failed logins are counted against
///
/// A login naming an existing account, by username or by email, counts
/// against that account. Anything else counts against the name as typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoginKey {
    Account(i64),
    Unknown(String),
}

impl LoginKey {
    pub fn unknown(login: &str) -> Self {
        LoginKey::Unknown(login.trim().to_string())
    }
}

/// Shared login throttle
#[derive(Debug)]
pub struct LoginRateLimiter {
    accounts: Window<LoginKey>,
    ips: Window<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            accounts: Window::new(
                ACCOUNT_MAX_FAILURES,
                Duration::minutes(ACCOUNT_WINDOW_MINUTES),
            ),
            ips: Window::new(IP_MAX_ATTEMPTS, Duration::minutes(IP_WINDOW_MINUTES)),
        }
    }

    pub async fn is_login_limited(&self, key: &LoginKey) -> bool {
        self.accounts.is_limited(key, Utc::now()).await
    }

    pub async fn record_failed_attempt(&self, key: LoginKey) {
        self.accounts.record(key, Utc::now()).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_failed_attempts(&self, key: &LoginKey) {
        self.accounts.clear(key).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ips.is_limited(&ip, Utc::now()).await
    }

    /// Count a login attempt from `ip`, successful or not
    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip, Utc::now()).await;
    }

    /// Drop keys whose whole window has expired
    pub async fn cleanup(&self) {
        let now = Utc::now();
        self.accounts.sweep(now).await;
        self.ips.sweep(now).await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_account_limited_after_five_failures() {
        let limiter = LoginRateLimiter::new();
        let alice = LoginKey::Account(1);

        for _ in 0..ACCOUNT_MAX_FAILURES - 1 {
            limiter.record_failed_attempt(alice.clone()).await;
        }
        assert!(!limiter.is_login_limited(&alice).await);

        limiter.record_failed_attempt(alice.clone()).await;
        assert!(limiter.is_login_limited(&alice).await);
        assert!(!limiter.is_login_limited(&LoginKey::Account(2)).await);

        limiter.clear_failed_attempts(&alice).await;
        assert!(!limiter.is_login_limited(&alice).await);
    }

    #[tokio::test]
    async fn test_unknown_names_keep_their_case() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..ACCOUNT_MAX_FAILURES {
            limiter.record_failed_attempt(LoginKey::unknown(" Ghost ")).await;
        }
        assert!(limiter.is_login_limited(&LoginKey::unknown("Ghost")).await);
        assert!(!limiter.is_login_limited(&LoginKey::unknown("ghost")).await);
    }

    #[tokio::test]
    async fn test_ip_limited_after_ten_attempts() {
        let limiter = LoginRateLimiter::new();
        let ip = IpAddr::from_str("192.0.2.1").unwrap();
        let other = IpAddr::from_str("192.0.2.2").unwrap();

        for _ in 0..IP_MAX_ATTEMPTS {
            assert!(!limiter.is_ip_limited(ip).await);
            limiter.record_ip_request(ip).await;
        }
        assert!(limiter.is_ip_limited(ip).await);
        assert!(!limiter.is_ip_limited(other).await);
    }

    #[tokio::test]
    async fn test_old_hits_fall_out_of_the_window() {
        let window: Window<&str> = Window::new(2, Duration::minutes(1));
        let past = Utc::now() - Duration::minutes(5);
        window.record("k", past).await;
        window.record("k", past).await;

        assert!(window.is_limited(&"k", past).await);
        assert!(!window.is_limited(&"k", Utc::now()).await);

        window.sweep(Utc::now()).await;
        assert!(window.hits.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let limiter = LoginRateLimiter::new();
        let key = LoginKey::Account(7);
        for _ in 0..ACCOUNT_MAX_FAILURES {
            limiter.record_failed_attempt(key.clone()).await;
        }
        let ip = IpAddr::from_str("::1").unwrap();
        for _ in 0..IP_MAX_ATTEMPTS {
            limiter.record_ip_request(ip).await;
        }

        limiter.cleanup().await;
        assert!(limiter.is_login_limited(&key).await);
        assert!(limiter.is_ip_limited(ip).await);
    }
}
