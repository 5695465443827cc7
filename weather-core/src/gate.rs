//! One-shot, one-directional reachability cache for the document store.
//!
//! The first `is_available` call probes the store once. After that the
//! answer is cached for the life of the process; a failed write or read can
//! only downgrade it. Nothing flips it back: re-checking needs a restart.

use async_trait::async_trait;
use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};
use tokio::sync::OnceCell;

use crate::store::WeatherStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unknown,
    Available,
    Unavailable,
}

impl Availability {
    fn from_u8(raw: u8) -> Self {
        match raw {
            AVAILABLE => Availability::Available,
            UNAVAILABLE => Availability::Unavailable,
            _ => Availability::Unknown,
        }
    }
}

const UNKNOWN: u8 = 0;
const AVAILABLE: u8 = 1;
const UNAVAILABLE: u8 = 2;

/// Gate in front of every persistence attempt.
#[async_trait]
pub trait AvailabilityGate: Send + Sync + Debug {
    /// Probes on first use, then answers from the cached state.
    async fn is_available(&self) -> bool;

    /// Idempotent downgrade; any number of concurrent calls settle on
    /// `Unavailable`.
    fn mark_unavailable(&self);

    fn state(&self) -> Availability;
}

/// [`AvailabilityGate`] that probes a [`WeatherStore`] with `ping`.
#[derive(Debug)]
pub struct StoreGate {
    store: Arc<dyn WeatherStore>,
    state: AtomicU8,
    probe: OnceCell<()>,
}

impl StoreGate {
    pub fn new(store: Arc<dyn WeatherStore>) -> Self {
        Self {
            store,
            state: AtomicU8::new(UNKNOWN),
            probe: OnceCell::new(),
        }
    }
}

#[async_trait]
impl AvailabilityGate for StoreGate {
    async fn is_available(&self) -> bool {
        match self.state() {
            Availability::Available => return true,
            Availability::Unavailable => return false,
            Availability::Unknown => {}
        }

        self.probe
            .get_or_init(|| async {
                let next = match self.store.ping().await {
                    Ok(()) => {
                        tracing::info!("document store is reachable");
                        AVAILABLE
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "document store not available, records will not be saved");
                        UNAVAILABLE
                    }
                };
                // A downgrade that landed while the probe was in flight wins.
                let _ = self
                    .state
                    .compare_exchange(UNKNOWN, next, Ordering::AcqRel, Ordering::Acquire);
            })
            .await;

        self.state() == Availability::Available
    }

    fn mark_unavailable(&self) {
        let previous = self.state.swap(UNAVAILABLE, Ordering::AcqRel);
        if previous != UNAVAILABLE {
            tracing::warn!("document store marked unavailable until restart");
        }
    }

    fn state(&self) -> Availability {
        Availability::from_u8(self.state.load(Ordering::Acquire))
    }
}
