//! Per-record exponential backoff for failed passes

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// `min * 2^attempt`, capped at `max`
pub fn calculate_backoff(attempt: u32, min: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    min.checked_mul(factor).unwrap_or(max).min(max)
}

/// Tracks consecutive failures per object key
#[derive(Debug)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    attempts: Mutex<HashMap<String, u32>>,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before the next attempt for `key`; each call counts as one failure
    pub fn next_delay(&self, key: &str) -> Duration {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let attempt = attempts.entry(key.to_string()).or_insert(0);
        let delay = calculate_backoff(*attempt, self.min, self.max);
        *attempt = attempt.saturating_add(1);
        delay
    }

    /// Forget failures for `key` after a successful pass
    pub fn reset(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}
