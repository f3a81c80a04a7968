//! Sliding window request limiter
//!
//! Process-local burst protection on top of the persisted daily quota. Owned
//! by the application state, created at startup and never persisted, so it
//! starts empty after every restart. Running several instances behind a load
//! balancer multiplies the effective limit; that would need a shared counter
//! store.

use dashmap::DashMap;
use rand::Rng;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of one limiter check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the oldest hit leaves the window (set when denied)
    pub retry_after: Option<Duration>,
}

impl RateDecision {
    /// Whole seconds for a `Retry-After` header, never below one
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after.map(|d| d.as_secs().max(1)).unwrap_or(1)
    }
}

struct Window {
    hits: VecDeque<Instant>,
    span: Duration,
}

pub struct SlidingWindowLimiter {
    windows: DashMap<String, Window>,
    gc_probability: f64,
}

impl SlidingWindowLimiter {
    pub fn new(gc_probability: f64) -> Self {
        Self {
            windows: DashMap::new(),
            gc_probability: gc_probability.clamp(0.0, 1.0),
        }
    }

    /// Admit iff fewer than `limit` hits fall within `[now - window, now]`.
    pub fn allow(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.check(key, limit, window).allowed
    }

    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        self.check_at(key, limit, window, Instant::now())
    }

    pub fn check_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> RateDecision {
        let decision = {
            let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
                hits: VecDeque::new(),
                span: window,
            });
            entry.span = window;
            if let Some(cutoff) = now.checked_sub(window) {
                while entry.hits.front().is_some_and(|t| *t < cutoff) {
                    entry.hits.pop_front();
                }
            }

            let in_window = entry.hits.len() as u32;
            if in_window < limit {
                entry.hits.push_back(now);
                RateDecision {
                    allowed: true,
                    limit,
                    remaining: limit - in_window - 1,
                    retry_after: None,
                }
            } else {
                let retry_after = entry
                    .hits
                    .front()
                    .map(|oldest| (*oldest + window).saturating_duration_since(now));
                RateDecision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    retry_after,
                }
            }
        };
        // The entry guard is released above; sweeping takes every shard lock.

        if self.gc_probability > 0.0 && rand::thread_rng().gen_bool(self.gc_probability) {
            self.sweep(now);
        }

        decision
    }

    /// Drop every key whose newest hit is older than its window.
    pub fn sweep(&self, now: Instant) {
        let before = self.windows.len();
        self.windows.retain(|_, w| {
            w.hits
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) <= w.span)
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Swept idle rate limit windows");
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
