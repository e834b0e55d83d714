//! Per-provider minimum spacing between entity fetches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

use super::traits::ProviderKey;

/// Enforces a minimum interval between successive grants for the same provider.
///
/// Each provider owns a slot holding the instant of its last grant. A caller locks the
/// slot, sleeps until `last + interval`, records the new grant and only then releases
/// the slot, so concurrent callers targeting the same provider proceed strictly one
/// per interval, in lock order. Providers never wait on each other.
///
/// Providers without a configured interval are not throttled.
#[derive(Debug, Default)]
pub struct RateLimiter {
    slots: HashMap<ProviderKey, Slot>,
}

#[derive(Debug)]
struct Slot {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(intervals: &HashMap<ProviderKey, Duration>) -> Self {
        let slots = intervals
            .iter()
            .map(|(key, interval)| {
                (
                    *key,
                    Slot {
                        interval: *interval,
                        last: Mutex::new(None),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn interval(&self, provider: ProviderKey) -> Option<Duration> {
        self.slots.get(&provider).map(|slot| slot.interval)
    }

    /// Waits for this provider's turn and returns the instant the turn was granted.
    ///
    /// Grants for the same provider are always at least the configured interval apart.
    pub async fn wait_for(&self, provider: ProviderKey) -> Instant {
        let Some(slot) = self.slots.get(&provider) else {
            return Instant::now();
        };

        let mut last = slot.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + slot.interval;
            if ready_at > Instant::now() {
                tracing::trace!("{provider} throttled until {:?}", ready_at - Instant::now());
                sleep_until(ready_at).await;
            }
        }

        let granted = Instant::now();
        *last = Some(granted);
        granted
    }
}
