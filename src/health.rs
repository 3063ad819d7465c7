//! Backend health: consecutive-failure tracking and local availability.
//!
//! The failure tracker is a soft heuristic — a process-wide counter of
//! consecutive cloud failures that biases routing toward the local backend
//! once a threshold is crossed. It is deliberately not persisted; a restart
//! resets it.
//!
//! The availability probe caches its verdict for a configurable window
//! (default 5 minutes) so routing never pays a network round-trip per
//! request. Stale reads are acceptable.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::clock::{Clock, SystemClock};
use crate::error::ProbeError;

/// Counts consecutive cloud-backend failures.
#[derive(Debug, Default)]
pub struct FailureTracker {
    count: AtomicU32,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self) {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(consecutive_failures = count, "Cloud backend failure recorded");
    }

    pub fn record_success(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Transport used by the availability probe. The local backend implements
/// this; tests substitute a fake.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn ping(&self) -> Result<(), ProbeError>;
}

#[derive(Debug, Clone, Copy)]
struct ProbeVerdict {
    available: bool,
    at: Instant,
}

/// Cached reachability of the local inference endpoint.
pub struct AvailabilityProbe {
    transport: Arc<dyn ProbeTransport>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<ProbeVerdict>>,
}

impl AvailabilityProbe {
    pub fn new(transport: Arc<dyn ProbeTransport>, ttl: Duration) -> Self {
        Self::with_clock(transport, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        transport: Arc<dyn ProbeTransport>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            ttl,
            clock,
            cached: Mutex::new(None),
        }
    }

    /// Whether the local backend is reachable, probing at most once per TTL
    /// window. A probe error means "unavailable".
    pub async fn is_available(&self) -> bool {
        let now = self.clock.now();

        {
            let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(verdict) = *cached {
                if now.duration_since(verdict.at) < self.ttl {
                    return verdict.available;
                }
            }
        }

        self.refresh().await
    }

    /// Probe now, bypassing the cache, and record the fresh verdict.
    pub async fn refresh(&self) -> bool {
        let available = match self.transport.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Local backend probe failed");
                false
            }
        };

        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(ProbeVerdict {
            available,
            at: self.clock.now(),
        });
        available
    }
}
