//! Random Early Detection.
//!
//! The average queue length is an EWMA of the occupancy seen by arrivals,
//! kept in fixed point scaled by `2^RED_SCALING`. Arrivals to an idle queue
//! first age the average by `(1 - w)^m`, `m` being the number of typical
//! packet transmission times (`idle_slot`) the queue sat empty.

use std::time::Duration;

use rand::{rngs::StdRng, RngCore, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{AlgorithmStats, AqmAlgorithm, DropTally, Verdict};
use crate::clock::duration_to_ticks;
use crate::error::{ConfigError, Result};
use crate::packet::Packet;
use crate::ring::RingBuffer;

pub const RED_SCALING: u32 = 10;
pub const WQ_LOG2_MIN: u8 = 1;
pub const WQ_LOG2_MAX: u8 = 12;
pub(crate) const DEFAULT_SEED: u64 = 42;

const Q32: u128 = 1 << 32;

#[cfg_attr(
    feature = "serde",
    serde_with::skip_serializing_none,
    derive(Deserialize, Serialize),
    serde(default)
)]
#[derive(Debug, Clone, PartialEq)]
pub struct RedConfig {
    pub min_th: u32,  // in packets
    pub max_th: u32,  // in packets
    pub maxp_inv: u8, // max drop probability is 1 / maxp_inv
    pub wq_log2: u8,  // averaging weight is 2^-wq_log2
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub idle_slot: Duration, // transmission time of a typical packet
    pub seed: Option<u64>,
}

impl Default for RedConfig {
    fn default() -> Self {
        Self {
            min_th: 32,
            max_th: 128,
            maxp_inv: 10,
            wq_log2: 9,
            idle_slot: Duration::from_micros(10),
            seed: None,
        }
    }
}

impl RedConfig {
    pub fn new(min_th: u32, max_th: u32, maxp_inv: u8, wq_log2: u8) -> Self {
        Self {
            min_th,
            max_th,
            maxp_inv,
            wq_log2,
            ..Default::default()
        }
    }
}

pub(crate) fn validate_weight(wq_log2: u8) -> Result<()> {
    if !(WQ_LOG2_MIN..=WQ_LOG2_MAX).contains(&wq_log2) {
        warn!(wq_log2, "RED averaging weight out of range");
        return Err(ConfigError::InvalidWeight(wq_log2).into());
    }
    Ok(())
}

/// Occupancy average shared by every drop profile of a queue.
#[derive(Debug, Clone)]
pub(crate) struct RedAverage {
    avg: u64,
    wq_log2: u8,
    idle_slot: u64,
    idle_since: Option<u64>,
}

impl RedAverage {
    pub(crate) fn new(wq_log2: u8, idle_slot: u64) -> Self {
        Self {
            avg: 0,
            wq_log2,
            idle_slot: idle_slot.max(1),
            idle_since: None,
        }
    }

    /// Fold the occupancy seen by an arrival into the average.
    pub(crate) fn update(&mut self, qlen: usize, now: u64) {
        if qlen == 0 {
            if let Some(since) = self.idle_since {
                let slots = now.saturating_sub(since) / self.idle_slot;
                self.avg = Self::decay(self.avg, self.wq_log2, slots);
            }
            self.idle_since = Some(now);
        } else {
            self.idle_since = None;
            let sample = (qlen as u64) << RED_SCALING;
            self.avg = self.avg - (self.avg >> self.wq_log2) + (sample >> self.wq_log2);
        }
    }

    pub(crate) fn mark_empty(&mut self, now: u64) {
        self.idle_since = Some(now);
    }

    pub(crate) fn scaled(&self) -> u64 {
        self.avg
    }

    pub(crate) fn packets(&self) -> f64 {
        self.avg as f64 / (1u64 << RED_SCALING) as f64
    }

    // avg * (1 - 2^-wq_log2)^slots, by squaring in Q0.32
    fn decay(avg: u64, wq_log2: u8, mut slots: u64) -> u64 {
        let mut factor = Q32;
        let mut base = Q32 - (Q32 >> wq_log2);
        while slots > 0 && factor > 0 {
            if slots & 1 == 1 {
                factor = (factor * base) >> 32;
            }
            base = (base * base) >> 32;
            slots >>= 1;
        }
        ((avg as u128 * factor) >> 32) as u64
    }
}

/// Thresholds and drop spreading of one RED profile.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct RedProfile {
    min_th: u64, // scaled like the average
    max_th: u64,
    maxp_inv: u8,
    count: u32, // packets admitted since the last drop
    early_drops: u64,
    forced_drops: u64,
}

impl RedProfile {
    pub(crate) fn new(min_th: u32, max_th: u32, maxp_inv: u8, capacity: usize) -> Result<Self> {
        if min_th >= max_th || max_th as usize > capacity {
            warn!(min_th, max_th, capacity, "Invalid RED thresholds");
            return Err(ConfigError::InvalidThreshold { min_th, max_th }.into());
        }
        if maxp_inv == 0 {
            warn!(maxp_inv, "Invalid RED max probability");
            return Err(ConfigError::InvalidMaxProbInverse(maxp_inv).into());
        }
        Ok(Self {
            min_th: (min_th as u64) << RED_SCALING,
            max_th: (max_th as u64) << RED_SCALING,
            maxp_inv,
            count: 0,
            early_drops: 0,
            forced_drops: 0,
        })
    }

    /// Whether an arrival seeing average `avg` must be dropped.
    pub(crate) fn should_drop<R: RngCore>(&mut self, avg: u64, rng: &mut R) -> bool {
        if avg < self.min_th {
            self.count = 0;
            return false;
        }
        if avg >= self.max_th {
            self.count = 0;
            self.forced_drops += 1;
            return true;
        }

        // pb = (avg - min_th) / ((max_th - min_th) * maxp_inv), in Q0.32
        let pb = (((avg - self.min_th) as u128) << 32)
            / ((self.max_th - self.min_th) as u128 * self.maxp_inv as u128);
        // pa = pb / (1 - count * pb) spreads drops evenly between thresholds
        let spread = self.count as u128 * pb;
        let drop = if spread >= Q32 {
            true
        } else {
            let pa = (pb << 32) / (Q32 - spread);
            (rng.next_u32() as u128) < pa
        };

        if drop {
            self.count = 0;
            self.early_drops += 1;
        } else {
            self.count = self.count.saturating_add(1);
        }
        drop
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    pub(crate) fn early_drops(&self) -> u64 {
        self.early_drops
    }

    pub(crate) fn forced_drops(&self) -> u64 {
        self.forced_drops
    }
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RedStats {
    pub average_queue: f64, // in packets
    pub count: u32,
    pub early_drops: u64,
    pub forced_drops: u64,
}

#[derive(Debug)]
pub struct Red {
    average: RedAverage,
    profile: RedProfile,
    rng: StdRng,
}

impl AqmAlgorithm for Red {
    type Config = RedConfig;

    fn new(config: Self::Config, capacity: usize, hz: u64) -> Result<Self> {
        debug!(?config, capacity, "New Red");
        validate_weight(config.wq_log2)?;
        let profile = RedProfile::new(config.min_th, config.max_th, config.maxp_inv, capacity)?;
        Ok(Self {
            average: RedAverage::new(config.wq_log2, duration_to_ticks(config.idle_slot, hz)),
            profile,
            rng: StdRng::seed_from_u64(config.seed.unwrap_or(DEFAULT_SEED)),
        })
    }

    fn guards_capacity(&self) -> bool {
        true
    }

    fn admit<P: Packet>(&mut self, ring: &RingBuffer<P>, packet: &P, now: u64) -> Verdict {
        self.average.update(ring.length_pkts(), now);
        if ring.is_full() {
            trace!(
                queue_len = ring.length_pkts(),
                "Drop packet(len: {}) when enqueue to a full queue",
                packet.length()
            );
            return Verdict::Overflow;
        }
        if self.profile.should_drop(self.average.scaled(), &mut self.rng) {
            trace!(
                queue_len = ring.length_pkts(),
                avg = self.average.packets(),
                "Drop packet(len: {}) when enqueue",
                packet.length()
            );
            return Verdict::Dropped;
        }
        Verdict::Admitted
    }

    fn dequeue<P: Packet>(
        &mut self,
        ring: &mut RingBuffer<P>,
        now: u64,
        _drops: &mut DropTally,
    ) -> Result<Option<P>> {
        let packet = ring.dequeue(now)?;
        if ring.is_empty() {
            self.average.mark_empty(now);
        }
        Ok(packet)
    }

    fn stats(&self) -> AlgorithmStats {
        AlgorithmStats::Red(RedStats {
            average_queue: self.average.packets(),
            count: self.profile.count(),
            early_drops: self.profile.early_drops(),
            forced_drops: self.profile.forced_drops(),
        })
    }
}
