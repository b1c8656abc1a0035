//! Per-email attempt counter with a fixed window anchored at the first attempt.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
struct AttemptWindow {
    count: u32,
    first_attempt: DateTime<Utc>,
}

/// Verdict for a single attempt, computed under the tracker lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptDecision {
    pub allowed: bool,
    pub attempts: u32,
    pub remaining: u32,
    /// Time until the window closes. Only set when the attempt was refused.
    pub reset_in: Option<Duration>,
}

#[derive(Debug)]
pub struct LoginAttemptTracker {
    max_attempts: u32,
    window: Duration,
    windows: Mutex<HashMap<String, AttemptWindow>>,
}

impl LoginAttemptTracker {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Count an attempt and decide in one step. Closed windows for every key are
    /// dropped first, so an expired key restarts at 1.
    pub fn record(&self, key: &str, now: DateTime<Utc>) -> AttemptDecision {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, window| elapsed(window.first_attempt, now) <= self.window);
        let window = windows
            .entry(key.to_string())
            .and_modify(|window| window.count = window.count.saturating_add(1))
            .or_insert(AttemptWindow {
                count: 1,
                first_attempt: now,
            });

        let allowed = window.count <= self.max_attempts;
        AttemptDecision {
            allowed,
            attempts: window.count,
            remaining: self.max_attempts.saturating_sub(window.count),
            reset_in: (!allowed)
                .then(|| self.window.saturating_sub(elapsed(window.first_attempt, now))),
        }
    }

    pub fn reset(&self, key: &str) {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |window| window.count)
    }

    /// Number of keys with an open window.
    pub fn tracked(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(since).to_std().unwrap_or_default()
}
