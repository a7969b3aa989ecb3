//! Shared rate-limiting state for the WebDAV transport: at most 3
//! concurrent requests, a minimum spacing between request starts, a
//! cooldown every 50 requests, and a hard ceiling per rolling 30-minute
//! window. This is process-scoped state, not per-call state, so every
//! clone of the transport shares one limiter.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

const COOLDOWN_EVERY: u64 = 50;
const COOLDOWN_DURATION: Duration = Duration::from_secs(2);
const WINDOW: Duration = Duration::from_secs(30 * 60);
const WINDOW_CAP: usize = 600;

struct LimiterState {
    last_request_completed_at: Option<Instant>,
    requests_since_cooldown: u64,
    window: VecDeque<Instant>,
}

/// Enforces the transport's concurrency and request-rate budget. Held as
/// a single shared instance by the WebDAV client.
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    state: Mutex<LimiterState>,
    spacing: Duration,
}

/// RAII guard held for the lifetime of one in-flight request; dropping it
/// releases the concurrency slot.
pub struct RequestSlot<'a> {
    _permit: tokio::sync::SemaphorePermit<'a>,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrency: usize, spacing: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            state: Mutex::new(LimiterState {
                last_request_completed_at: None,
                requests_since_cooldown: 0,
                window: VecDeque::new(),
            }),
            spacing,
        }
    }

    /// Blocks until a concurrency slot and rate budget are available,
    /// then records the request start. The returned slot must be held
    /// for the duration of the HTTP call.
    pub async fn acquire(&self) -> RequestSlot<'_> {
        let permit = self.semaphore.acquire().await.expect("limiter semaphore never closes");

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.prune_window(&mut state);

                if state.window.len() >= WINDOW_CAP {
                    let oldest = *state.window.front().expect("window at cap is non-empty");
                    Some(oldest + WINDOW - Instant::now())
                } else if let Some(last) = state.last_request_completed_at {
                    let elapsed = Instant::now().saturating_duration_since(last);
                    if elapsed < self.spacing {
                        Some(self.spacing - elapsed)
                    } else {
                        None
                    }
                } else {
                    None
                }
            };

            match wait {
                Some(d) if !d.is_zero() => tokio::time::sleep(d).await,
                _ => break,
            }
        }

        {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            state.window.push_back(now);
            state.requests_since_cooldown += 1;
            if state.requests_since_cooldown >= COOLDOWN_EVERY {
                state.requests_since_cooldown = 0;
                drop(state);
                tokio::time::sleep(COOLDOWN_DURATION).await;
            }
        }

        RequestSlot { _permit: permit }
    }

    /// Call once the HTTP response has been received, so the next
    /// request's spacing is measured from completion, not from start.
    pub async fn record_completed(&self) {
        let mut state = self.state.lock().await;
        state.last_request_completed_at = Some(Instant::now());
    }

    fn prune_window(&self, state: &mut LimiterState) {
        let cutoff = Instant::now() - WINDOW;
        while let Some(front) = state.window.front() {
            if *front < cutoff {
                state.window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enforces_minimum_spacing() {
        let limiter = ConcurrencyLimiter::new(3, Duration::from_millis(50));
        let start = Instant::now();

        {
            let _slot = limiter.acquire().await;
            limiter.record_completed().await;
        }
        {
            let _slot = limiter.acquire().await;
        }

        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn allows_up_to_max_concurrency_without_blocking_on_spacing_alone() {
        let limiter = ConcurrencyLimiter::new(3, Duration::from_millis(0));
        let _a = limiter.acquire().await;
        let _b = limiter.acquire().await;
        let _c = limiter.acquire().await;
    }
}
