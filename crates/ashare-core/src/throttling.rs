use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::provider_policy::ProviderPolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-provider request pacing: a governor GCRA limiter for the request
/// rate and a semaphore for the number of calls in flight.
///
/// Cloning shares both budgets, so every clone paces against the same
/// quota.
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DirectRateLimiter>,
    slots: Arc<Semaphore>,
}

/// Held for the duration of one upstream call; dropping it frees the
/// concurrency slot.
#[must_use = "the concurrency slot is released as soon as the permit is dropped"]
pub struct ThrottlePermit {
    _slot: Option<OwnedSemaphorePermit>,
}

impl Throttle {
    pub fn new(quota_window: Duration, quota_limit: u32, max_concurrency: usize) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
            slots: Arc::new(Semaphore::new(
                max_concurrency.clamp(1, Semaphore::MAX_PERMITS),
            )),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(policy.quota_window, policy.quota_limit, policy.max_concurrency)
    }

    /// Waits for a free concurrency slot, then for one cell of rate budget.
    pub async fn acquire(&self) -> ThrottlePermit {
        // The semaphore is never closed, so the error arm is unreachable.
        let slot = Arc::clone(&self.slots).acquire_owned().await.ok();
        self.limiter.until_ready().await;
        ThrottlePermit { _slot: slot }
    }

    /// Concurrency slots not currently held.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
