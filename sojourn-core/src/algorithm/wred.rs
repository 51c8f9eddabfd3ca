//! Weighted RED: one drop profile per traffic class over a single ring.
//!
//! All classes share the occupancy average; each class has its own
//! thresholds, max probability and drop spreading count. Packets whose class
//! has no profile use the last configured one.

use std::time::Duration;

use rand::{rngs::StdRng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::red::{validate_weight, RedAverage, RedProfile, DEFAULT_SEED};
use super::{AlgorithmStats, AqmAlgorithm, DropTally, Verdict};
use crate::clock::duration_to_ticks;
use crate::error::{ConfigError, Result};
use crate::packet::Packet;
use crate::ring::RingBuffer;

pub const MAX_TRAFFIC_CLASSES: usize = 8;

#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WredClassConfig {
    pub min_th: u32,
    pub max_th: u32,
    pub maxp_inv: u8,
}

impl WredClassConfig {
    pub fn new(min_th: u32, max_th: u32, maxp_inv: u8) -> Self {
        Self {
            min_th,
            max_th,
            maxp_inv,
        }
    }
}

#[cfg_attr(
    feature = "serde",
    serde_with::skip_serializing_none,
    derive(Deserialize, Serialize),
    serde(default)
)]
#[derive(Debug, Clone, PartialEq)]
pub struct WredConfig {
    pub wq_log2: u8,
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub idle_slot: Duration,
    pub classes: Vec<WredClassConfig>, // indexed by traffic class
    pub seed: Option<u64>,
}

impl Default for WredConfig {
    fn default() -> Self {
        Self {
            wq_log2: 9,
            idle_slot: Duration::from_micros(10),
            classes: vec![
                WredClassConfig::new(64, 128, 10),
                WredClassConfig::new(48, 128, 10),
                WredClassConfig::new(32, 128, 10),
            ],
            seed: None,
        }
    }
}

impl WredConfig {
    pub fn new(wq_log2: u8, classes: Vec<WredClassConfig>) -> Self {
        Self {
            wq_log2,
            classes,
            ..Default::default()
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WredStats {
    pub average_queue: f64,
    pub classes: usize,
    pub counts: [u32; MAX_TRAFFIC_CLASSES],
    pub early_drops: [u64; MAX_TRAFFIC_CLASSES],
    pub forced_drops: [u64; MAX_TRAFFIC_CLASSES],
}

#[derive(Debug)]
pub struct Wred {
    average: RedAverage,
    profiles: [RedProfile; MAX_TRAFFIC_CLASSES],
    classes: usize,
    rng: StdRng,
}

impl Wred {
    fn profile_index(&self, traffic_class: u8) -> usize {
        (traffic_class as usize).min(self.classes - 1)
    }
}

impl AqmAlgorithm for Wred {
    type Config = WredConfig;

    fn new(config: Self::Config, capacity: usize, hz: u64) -> Result<Self> {
        debug!(?config, capacity, "New Wred");
        validate_weight(config.wq_log2)?;
        if config.classes.is_empty() {
            warn!("WRED configured without traffic classes");
            return Err(ConfigError::NoTrafficClass.into());
        }
        if config.classes.len() > MAX_TRAFFIC_CLASSES {
            warn!(classes = config.classes.len(), "Too many WRED traffic classes");
            return Err(ConfigError::TooManyTrafficClasses(config.classes.len()).into());
        }
        let mut profiles = [RedProfile::default(); MAX_TRAFFIC_CLASSES];
        for (profile, class) in profiles.iter_mut().zip(config.classes.iter()) {
            *profile = RedProfile::new(class.min_th, class.max_th, class.maxp_inv, capacity)?;
        }
        Ok(Self {
            average: RedAverage::new(config.wq_log2, duration_to_ticks(config.idle_slot, hz)),
            profiles,
            classes: config.classes.len(),
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
        let index = self.profile_index(packet.traffic_class());
        if self.profiles[index].should_drop(self.average.scaled(), &mut self.rng) {
            trace!(
                queue_len = ring.length_pkts(),
                avg = self.average.packets(),
                traffic_class = packet.traffic_class(),
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
        let mut stats = WredStats {
            average_queue: self.average.packets(),
            classes: self.classes,
            counts: [0; MAX_TRAFFIC_CLASSES],
            early_drops: [0; MAX_TRAFFIC_CLASSES],
            forced_drops: [0; MAX_TRAFFIC_CLASSES],
        };
        for (i, profile) in self.profiles[..self.classes].iter().enumerate() {
            stats.counts[i] = profile.count();
            stats.early_drops[i] = profile.early_drops();
            stats.forced_drops[i] = profile.forced_drops();
        }
        AlgorithmStats::Wred(stats)
    }
}
