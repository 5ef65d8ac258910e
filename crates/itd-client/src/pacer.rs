//! Minimum-interval request pacing
//!
//! A [`RequestPacer`] hands out dispatch slots at least `min_interval` apart.
//! Wrap it in an `Arc` and pass it to several sessions to keep a fleet of
//! clients under one rate ceiling.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Default spacing between requests; the API starts answering 429 below this
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(105);

/// Serialises dispatch slots for any number of concurrent callers
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Creates a pacer; a zero interval disables throttling
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Creates a pacer ready to be shared between sessions
    pub fn shared(min_interval: Duration) -> Arc<Self> {
        Arc::new(Self::new(min_interval))
    }

    /// Minimum spacing between two dispatches
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits for the next free dispatch slot
    ///
    /// The slot is claimed before sleeping, so concurrent callers queue up
    /// behind each other instead of landing on the same instant.
    pub async fn interval(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        if let Some(slot) = self.claim_slot(Instant::now()) {
            tokio::time::sleep_until(slot).await;
        }
    }

    /// Claims the next slot; returns it if the caller must wait for it
    fn claim_slot(&self, now: Instant) -> Option<Instant> {
        let mut last = self
            .last_dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.min_interval => {
                let slot = prev + self.min_interval;
                *last = Some(slot);
                Some(slot)
            }
            _ => {
                *last = Some(now);
                None
            }
        }
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

/// How a session paces its requests
#[derive(Debug, Clone)]
pub enum Pacing {
    /// No throttling at all
    Disabled,
    /// A private pacer with this interval
    Interval(Duration),
    /// A pacer shared with other sessions
    Shared(Arc<RequestPacer>),
}

impl Pacing {
    pub(crate) fn into_pacer(self) -> Option<Arc<RequestPacer>> {
        match self {
            Self::Disabled => None,
            Self::Interval(interval) if interval.is_zero() => None,
            Self::Interval(interval) => Some(RequestPacer::shared(interval)),
            Self::Shared(pacer) => Some(pacer),
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::Interval(DEFAULT_INTERVAL)
    }
}
