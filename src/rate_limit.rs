//! Per-user sliding-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Allows at most `limit` requests per user in any trailing window.
///
/// A limit of `0` disables limiting.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn per_minute(limit: usize) -> Self {
        Self::with_window(limit, WINDOW)
    }

    pub fn with_window(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Record a request from `user_id` and report whether it is allowed.
    /// Rejected requests are not recorded.
    pub fn check(&self, user_id: &str) -> bool {
        self.check_at(user_id, Instant::now())
    }

    pub fn check_at(&self, user_id: &str, now: Instant) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let times = requests.entry(user_id.to_string()).or_default();
        prune(times, now, self.window);

        if times.len() >= self.limit {
            tracing::warn!(user = %user_id, limit = self.limit, "rate limit exceeded");
            return false;
        }
        times.push_back(now);
        true
    }

    /// Requests `user_id` may still make in the current window.
    pub fn remaining(&self, user_id: &str) -> usize {
        self.remaining_at(user_id, Instant::now())
    }

    pub fn remaining_at(&self, user_id: &str, now: Instant) -> usize {
        if !self.is_enabled() {
            return usize::MAX;
        }
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        match requests.get_mut(user_id) {
            Some(times) => {
                prune(times, now, self.window);
                self.limit.saturating_sub(times.len())
            }
            None => self.limit,
        }
    }

    /// Drop users with no requests in the current window.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        requests.retain(|_, times| {
            prune(times, now, self.window);
            !times.is_empty()
        });
    }
}

fn prune(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = times.front() {
        if now.saturating_duration_since(oldest) < window {
            break;
        }
        times.pop_front();
    }
}
