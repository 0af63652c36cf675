//! Per-level, per-minute log rate limiting.

use crate::types::LogLevel;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Window {
    minute: i64,
    count: u32,
}

/// Counts entries per level within the current calendar minute.
///
/// Holds at most one window per level; a window is replaced when the
/// minute rolls over, so memory stays bounded.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<LogLevel, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry at `level` and report whether it may proceed.
    pub fn allow(&self, level: LogLevel, max_per_minute: u32) -> bool {
        self.allow_at(level, max_per_minute, chrono::Utc::now().timestamp() / 60)
    }

    /// Same as [`allow`](Self::allow) with an explicit minute bucket.
    pub fn allow_at(&self, level: LogLevel, max_per_minute: u32, minute: i64) -> bool {
        if level.is_failure() {
            return true;
        }

        let mut windows = self.windows.lock();
        let window = windows.entry(level).or_insert(Window { minute, count: 0 });
        if window.minute != minute {
            *window = Window { minute, count: 0 };
        }

        if window.count >= max_per_minute {
            return false;
        }
        window.count += 1;
        true
    }

    /// Entries counted for `level` in the current window.
    pub fn count(&self, level: LogLevel) -> u32 {
        self.windows.lock().get(&level).map(|w| w.count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_within_minute() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.allow_at(LogLevel::Info, 3, 100));
        }
        assert!(!limiter.allow_at(LogLevel::Info, 3, 100));
        // Other levels have their own window
        assert!(limiter.allow_at(LogLevel::Warn, 3, 100));
    }

    #[test]
    fn test_window_resets_next_minute() {
        let limiter = RateLimiter::new();
        assert!(limiter.allow_at(LogLevel::Debug, 1, 7));
        assert!(!limiter.allow_at(LogLevel::Debug, 1, 7));
        assert!(limiter.allow_at(LogLevel::Debug, 1, 8));
        assert_eq!(limiter.count(LogLevel::Debug), 1);
    }

    #[test]
    fn test_failures_never_limited() {
        let limiter = RateLimiter::new();
        for _ in 0..50 {
            assert!(limiter.allow_at(LogLevel::Error, 1, 1));
            assert!(limiter.allow_at(LogLevel::Critical, 0, 1));
        }
    }
}
