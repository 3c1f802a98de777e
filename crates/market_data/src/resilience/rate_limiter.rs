use std::collections::VecDeque;

use common::config::RateLimit;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Sliding-window limiter: at most `max_requests` starts within any
/// `window`. Callers wait for a free slot instead of failing.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    limit: RateLimit,
    starts: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, limit: RateLimit) -> Self {
        Self {
            name: name.into(),
            limit: RateLimit {
                max_requests: limit.max_requests.max(1),
                window: limit.window,
            },
            starts: VecDeque::new(),
        }
    }

    pub async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            self.evict(now);
            if self.starts.len() < self.limit.max_requests {
                self.starts.push_back(now);
                return;
            }

            let Some(&oldest) = self.starts.front() else {
                continue;
            };
            let wait = (oldest + self.limit.window).saturating_duration_since(now);
            debug!("{} rate limit reached, waiting {:?}", self.name, wait);
            sleep(wait).await;
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&front) = self.starts.front() {
            if now.saturating_duration_since(front) >= self.limit.window {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }
}
