//! Sliding-window rate limiter keyed by user and action.
//!
//! Epistemic foundation:
//! - K_i: Each `user:action` key keeps the instants of its accepted actions
//! - K_i: A rejected check records nothing, so rejections never extend the wait
//! - K_i: Keys whose window has fully expired are swept, so client-chosen ids stay bounded
//! - I^R: Limits and windows come from config per action

use crate::models::{CodegenieError, RateLimitRule, Result};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Checks between sweeps of expired keys.
const SWEEP_EVERY: u64 = 1024;

#[derive(Debug, Default)]
struct Window {
    length: Duration,
    /// Accepted action instants, oldest first
    accepted: VecDeque<Instant>,
}

impl Window {
    fn expire(&mut self, now: Instant) {
        while self
            .accepted
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= self.length)
        {
            self.accepted.pop_front();
        }
    }
}

/// Sliding-window rate limiter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    total_checks: AtomicU64,
    total_rejections: AtomicU64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(user_id: &str, action: &str) -> String {
        format!("{user_id}:{action}")
    }

    /// Check and record an action. Returns false when the limit is reached.
    pub fn check(&self, user_id: &str, action: &str, rule: RateLimitRule) -> bool {
        self.check_at(user_id, action, rule, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock.
    pub fn check_at(&self, user_id: &str, action: &str, rule: RateLimitRule, now: Instant) -> bool {
        let checks = self.total_checks.fetch_add(1, Ordering::Relaxed) + 1;
        let allowed = self.record(user_id, action, rule, now);
        // the entry guard is released by now; sweeping takes shard locks
        if checks % SWEEP_EVERY == 0 {
            let swept = self.sweep_at(now);
            if swept > 0 {
                debug!(swept, "Swept expired rate-limit keys");
            }
        }
        allowed
    }

    fn record(&self, user_id: &str, action: &str, rule: RateLimitRule, now: Instant) -> bool {
        let mut entry = self.windows.entry(Self::key(user_id, action)).or_default();
        entry.length = rule.window();
        entry.expire(now);

        if entry.accepted.len() >= rule.limit {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            debug!(user_id, action, limit = rule.limit, "Rate limit reached");
            return false;
        }

        entry.accepted.push_back(now);
        true
    }

    /// Drop keys with no action left inside their window. Returns how many went.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut swept = 0;
        self.windows.retain(|_, window| {
            window.expire(now);
            let keep = !window.accepted.is_empty();
            if !keep {
                swept += 1;
            }
            keep
        });
        swept
    }

    /// Check and record, mapping a rejection to `CodegenieError::RateLimited`.
    pub fn enforce(&self, user_id: &str, action: &str, rule: RateLimitRule) -> Result<()> {
        let now = Instant::now();
        if self.check_at(user_id, action, rule, now) {
            return Ok(());
        }
        Err(CodegenieError::RateLimited {
            action: action.to_string(),
            retry_after_secs: self.retry_after_at(user_id, action, rule, now).as_secs_f64(),
        })
    }

    /// Time until the oldest recorded action leaves the window.
    pub fn retry_after_at(
        &self,
        user_id: &str,
        action: &str,
        rule: RateLimitRule,
        now: Instant,
    ) -> Duration {
        self.windows
            .get(&Self::key(user_id, action))
            .and_then(|w| w.accepted.front().copied())
            .map(|oldest| rule.window().saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(Duration::ZERO)
    }

    /// Get statistics.
    pub fn stats(&self) -> RateLimiterStats {
        let total_checks = self.total_checks.load(Ordering::Relaxed);
        let total_rejections = self.total_rejections.load(Ordering::Relaxed);

        RateLimiterStats {
            total_checks,
            total_rejections,
            rejection_ratio: if total_checks > 0 {
                total_rejections as f64 / total_checks as f64
            } else {
                0.0
            },
            keys_tracked: self.windows.len(),
        }
    }
}

/// Rate limiter statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RateLimiterStats {
    pub total_checks: u64,
    pub total_rejections: u64,
    pub rejection_ratio: f64,
    pub keys_tracked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: RateLimitRule = RateLimitRule::new(3, 60);

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        assert!(limiter.check_at("u", "goal", RULE, now));
        assert!(limiter.check_at("u", "goal", RULE, now));
        assert!(limiter.check_at("u", "goal", RULE, now));
        assert!(!limiter.check_at("u", "goal", RULE, now));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        let one = RateLimitRule::new(1, 60);
        assert!(limiter.check_at("u1", "goal", one, now));
        assert!(limiter.check_at("u2", "goal", one, now));
        assert!(limiter.check_at("u1", "code", one, now));
        assert!(!limiter.check_at("u1", "goal", one, now));
        assert_eq!(limiter.stats().keys_tracked, 3);
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        let rule = RateLimitRule::new(2, 10);
        assert!(limiter.check_at("u", "a", rule, start));
        assert!(limiter.check_at("u", "a", rule, start + Duration::from_secs(5)));
        assert!(!limiter.check_at("u", "a", rule, start + Duration::from_secs(9)));
        // the first action is exactly one window old and no longer counts
        assert!(limiter.check_at("u", "a", rule, start + Duration::from_secs(10)));
        assert!(!limiter.check_at("u", "a", rule, start + Duration::from_secs(11)));
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        let rule = RateLimitRule::new(1, 10);
        assert!(limiter.check_at("u", "a", rule, start));
        for s in 1..10 {
            assert!(!limiter.check_at("u", "a", rule, start + Duration::from_secs(s)));
        }
        assert!(limiter.check_at("u", "a", rule, start + Duration::from_secs(10)));

        let stats = limiter.stats();
        assert_eq!(stats.total_checks, 11);
        assert_eq!(stats.total_rejections, 9);
    }

    #[test]
    fn test_sweep_drops_expired_keys() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        let short = RateLimitRule::new(5, 10);
        let long = RateLimitRule::new(5, 100);
        for i in 0..50 {
            assert!(limiter.check_at(&format!("user-{i}"), "code", short, start));
        }
        assert!(limiter.check_at("keeper", "code", long, start));
        assert_eq!(limiter.stats().keys_tracked, 51);

        assert_eq!(limiter.sweep_at(start + Duration::from_secs(9)), 0);
        assert_eq!(limiter.sweep_at(start + Duration::from_secs(10)), 50);
        assert_eq!(limiter.stats().keys_tracked, 1);
        // a swept key starts over with a full budget
        assert!(limiter.check_at("user-0", "code", short, start + Duration::from_secs(10)));
    }

    #[test]
    fn test_distinct_users_stay_bounded() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        let rule = RateLimitRule::new(1, 1);
        for i in 0..(SWEEP_EVERY - 1) {
            limiter.check_at(&format!("user-{i}"), "code", rule, start);
        }
        assert_eq!(limiter.stats().keys_tracked, (SWEEP_EVERY - 1) as usize);

        // this check is the sweep trigger; every earlier window has expired
        assert!(limiter.check_at("late", "code", rule, start + Duration::from_secs(2)));
        assert_eq!(limiter.stats().keys_tracked, 1);
    }

    #[test]
    fn test_enforce_reports_retry_after() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule::new(1, 300);
        limiter.enforce("u", "code_execution", rule).unwrap();
        let err = limiter.enforce("u", "code_execution", rule).unwrap_err();
        match err {
            CodegenieError::RateLimited {
                action,
                retry_after_secs,
            } => {
                assert_eq!(action, "code_execution");
                assert!(retry_after_secs > 299.0 && retry_after_secs <= 300.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
