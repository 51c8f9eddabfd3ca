//! Tick sources driving every time-based decision of the engine.
//!
//! All algorithm timing lives in one monotonically increasing tick domain.
//! Durations from the configuration are converted into ticks once, when the
//! instance is built.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::time::Instant;

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

pub trait Clock: Send {
    /// Current time in ticks. Must never go backwards.
    fn now(&self) -> u64;

    /// Ticks per second.
    fn hz(&self) -> u64;

    fn duration_to_ticks(&self, duration: Duration) -> u64 {
        duration_to_ticks(duration, self.hz())
    }

    fn ticks_to_duration(&self, ticks: u64) -> Duration {
        ticks_to_duration(ticks, self.hz())
    }
}

pub fn duration_to_ticks(duration: Duration, hz: u64) -> u64 {
    let ticks = duration.as_nanos() * hz as u128 / NANOS_PER_SEC as u128;
    ticks.min(u64::MAX as u128) as u64
}

pub fn ticks_to_duration(ticks: u64, hz: u64) -> Duration {
    if hz == 0 {
        return Duration::ZERO;
    }
    let nanos = ticks as u128 * NANOS_PER_SEC as u128 / hz as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Nanosecond ticks measured from the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct InstantClock {
    origin: Instant,
}

impl InstantClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for InstantClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for InstantClock {
    fn now(&self) -> u64 {
        // Tick 0 is reserved as "unset" by the controllers.
        self.origin.elapsed().as_nanos() as u64 + 1
    }

    fn hz(&self) -> u64 {
        NANOS_PER_SEC
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
    hz: u64,
}

impl ManualClock {
    pub fn new(hz: u64) -> Self {
        Self::starting_at(hz, 0)
    }

    pub fn starting_at(hz: u64, ticks: u64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(ticks)),
            hz,
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.advance_ticks(duration_to_ticks(duration, self.hz));
    }

    pub fn advance_ticks(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }

    pub fn set(&self, ticks: u64) {
        self.ticks.fetch_max(ticks, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn hz(&self) -> u64 {
        self.hz
    }
}
