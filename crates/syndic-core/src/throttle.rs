//! Per-provider dispatch gate.
//!
//! Enforces a minimum spacing between consecutive fetch dispatches to the
//! same ATS provider. It is a scheduling gate only; failed fetches are
//! retried by [`RetryingFetcher`](crate::retry::RetryingFetcher), not here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::models::Provider;

#[derive(Debug, Clone)]
pub struct ProviderGate {
    default_delay: Duration,
    overrides: HashMap<Provider, Duration>,
    /// Earliest instant the next dispatch to each provider may start.
    next_slot: Arc<Mutex<HashMap<Provider, Instant>>>,
}

impl ProviderGate {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            overrides: HashMap::new(),
            next_slot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_overrides(mut self, overrides: HashMap<Provider, Duration>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn delay_for(&self, provider: Provider) -> Duration {
        self.overrides
            .get(&provider)
            .copied()
            .unwrap_or(self.default_delay)
    }

    /// Wait for this provider's next dispatch slot. Returns how long the
    /// caller was held back.
    ///
    /// Slots are reserved under the lock and slept on outside it, so waiters
    /// for other providers are never blocked.
    pub async fn wait(&self, provider: Provider) -> Duration {
        let now = Instant::now();
        let slot = {
            let mut slots = self.next_slot.lock().await;
            let slot = slots.get(&provider).copied().map_or(now, |s| s.max(now));
            slots.insert(provider, slot + self.delay_for(provider));
            slot
        };

        let held = slot.saturating_duration_since(now);
        if !held.is_zero() {
            tracing::debug!(
                provider = %provider,
                sleep_ms = %held.as_millis(),
                "Throttling dispatch"
            );
            tokio::time::sleep_until(slot).await;
        }
        held
    }
}
