//! Sliding-window rate limiter for invite forwarding.
//!
//! Each identity keeps two timestamp queues, one per window. A check prunes
//! both queues, rejects when either is at its limit, and otherwise records the
//! request in both. The whole check for one identity runs under the map
//! shard's write lock, so two concurrent requests from the same identity can
//! never both observe "under limit" for the last free slot.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub hourly_limit: usize,
    pub daily_limit: usize,
    pub hourly_window: Duration,
    pub daily_window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            hourly_limit: 10,
            daily_limit: 50,
            hourly_window: Duration::from_secs(60 * 60),
            daily_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitWindow {
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub hourly: usize,
    pub daily: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        remaining: Remaining,
    },
    Limited {
        window: LimitWindow,
        limit: usize,
        retry_after_secs: u64,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

impl fmt::Display for RateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateDecision::Allowed { remaining } => write!(
                f,
                "allowed ({} hourly, {} daily remaining)",
                remaining.hourly, remaining.daily
            ),
            RateDecision::Limited {
                window: LimitWindow::Hourly,
                limit,
                ..
            } => write!(f, "Hourly limit exceeded ({limit} invites per hour)"),
            RateDecision::Limited {
                window: LimitWindow::Daily,
                limit,
                ..
            } => write!(f, "Daily limit exceeded ({limit} invites per day)"),
        }
    }
}

#[derive(Debug, Default)]
struct RateWindow {
    hourly: VecDeque<Instant>,
    daily: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, policy: &RateLimitPolicy) {
        prune_older_than(&mut self.hourly, now, policy.hourly_window);
        prune_older_than(&mut self.daily, now, policy.daily_window);
    }

    fn is_empty(&self) -> bool {
        self.hourly.is_empty() && self.daily.is_empty()
    }
}

fn prune_older_than(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = queue.front() {
        if now.saturating_duration_since(*oldest) < window {
            break;
        }
        queue.pop_front();
    }
}

/// Whole seconds until `oldest` leaves the window, rounded up and never zero.
fn retry_after(oldest: Instant, window: Duration, now: Instant) -> u64 {
    let wait = (oldest + window).saturating_duration_since(now);
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

pub struct RateLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            windows: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn check(&self, identity: &str) -> RateDecision {
        let now = self.clock.now();
        let mut entry = self.windows.entry(identity.to_string()).or_default();
        let window = entry.value_mut();
        window.prune(now, &self.policy);

        if window.hourly.len() >= self.policy.hourly_limit {
            let retry_after_secs = window
                .hourly
                .front()
                .map(|oldest| retry_after(*oldest, self.policy.hourly_window, now))
                .unwrap_or(1);
            debug!(%identity, retry_after_secs, "hourly invite limit reached");
            return RateDecision::Limited {
                window: LimitWindow::Hourly,
                limit: self.policy.hourly_limit,
                retry_after_secs,
            };
        }

        if window.daily.len() >= self.policy.daily_limit {
            let retry_after_secs = window
                .daily
                .front()
                .map(|oldest| retry_after(*oldest, self.policy.daily_window, now))
                .unwrap_or(1);
            debug!(%identity, retry_after_secs, "daily invite limit reached");
            return RateDecision::Limited {
                window: LimitWindow::Daily,
                limit: self.policy.daily_limit,
                retry_after_secs,
            };
        }

        window.hourly.push_back(now);
        window.daily.push_back(now);

        RateDecision::Allowed {
            remaining: Remaining {
                hourly: self.policy.hourly_limit - window.hourly.len(),
                daily: self.policy.daily_limit - window.daily.len(),
            },
        }
    }

    /// Drops identities whose windows have fully aged out. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            window.prune(now, &self.policy);
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    info!(
                        removed,
                        tracked = self.tracked_identities(),
                        "evicted idle rate limit entries"
                    );
                }
            }
        })
    }
}
