use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::Id;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Sliding-window in-memory counter (pod local).
#[derive(Clone)]
pub struct SlidingWindow {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl SlidingWindow {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Daily post quota per owner, gated by privilege tier:
/// 1 listing/day standard, 3/day premium.
#[derive(Clone)]
pub struct PostQuota {
    window: SlidingWindow,
    standard_daily: usize,
    premium_daily: usize,
}

impl PostQuota {
    pub fn new(standard_daily: usize, premium_daily: usize) -> Self {
        Self {
            window: SlidingWindow::new(true),
            standard_daily,
            premium_daily,
        }
    }

    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        let enabled = std::env::var("POST_QUOTA_DISABLED").is_err();
        Self {
            window: SlidingWindow::new(enabled),
            standard_daily: usize_env("POST_QUOTA_STANDARD_DAILY", 1),
            premium_daily: usize_env("POST_QUOTA_PREMIUM_DAILY", 3),
        }
    }

    pub fn allow_post(&self, owner: Id, premium: bool) -> bool {
        let limit = if premium { self.premium_daily } else { self.standard_daily };
        self.window.check(&format!("post:{owner}"), limit, DAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_basic() {
        let w = SlidingWindow::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 {
            assert!(w.check("k", 3, window));
        }
        assert!(!w.check("k", 3, window));
    }

    #[test]
    fn premium_tier_gets_larger_quota() {
        let quota = PostQuota {
            window: SlidingWindow::new(true),
            standard_daily: 1,
            premium_daily: 3,
        };
        let standard = Id::new_v4();
        let premium = Id::new_v4();
        assert!(quota.allow_post(standard, false));
        assert!(!quota.allow_post(standard, false));
        for _ in 0..3 {
            assert!(quota.allow_post(premium, true));
        }
        assert!(!quota.allow_post(premium, true));
    }
}
