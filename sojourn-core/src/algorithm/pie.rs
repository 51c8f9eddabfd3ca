//! Proportional Integral controller Enhanced. Ref: RFC 8033 and the linux
//! kernel implementation.
//!
//! The drop probability is recomputed once per `t_update` from the current
//! and previous queueing delay. The update is driven by [`AqmAlgorithm::poll`],
//! which the dispatcher runs before every operation and from its explicit
//! tick, catching up on every period that fell due in between.

use std::time::Duration;

use rand::{rngs::StdRng, RngCore, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::red::DEFAULT_SEED;
use super::{AlgorithmStats, AqmAlgorithm, DropTally, Verdict};
use crate::clock::{duration_to_ticks, ticks_to_duration};
use crate::error::{ConfigError, Result};
use crate::packet::Packet;
use crate::ring::RingBuffer;

pub const MAX_PROB: u64 = u64::MAX >> 8;
// Periods run by a single poll before the schedule is realigned to now
const MAX_CATCH_UP: u32 = 64;
const NANOS_PER_MILLI: i128 = 1_000_000;

#[cfg_attr(
    feature = "serde",
    serde_with::skip_serializing_none,
    derive(Deserialize, Serialize),
    serde(default)
)]
#[derive(Debug, Clone, PartialEq)]
pub struct PieConfig {
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub target_delay: Duration, // AQM latency target (default: 15 milliseconds)
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub t_update: Duration, // period of the drop probability update (default: 15 milliseconds)
    pub mean_pkt_size: u32, // in bytes
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub max_burst: Duration, // burst allowance (default: 150 milliseconds)
    pub alpha: u8, // in units of 1/16, 0-32 (default: 2, i.e. 0.125)
    pub beta: u8,  // in units of 1/16, 0-32 (default: 20, i.e. 1.25)
    pub seed: Option<u64>,
}

impl Default for PieConfig {
    fn default() -> Self {
        Self {
            target_delay: Duration::from_millis(15),
            t_update: Duration::from_millis(15),
            mean_pkt_size: 1514,
            max_burst: Duration::from_millis(150),
            alpha: 2,
            beta: 20,
            seed: None,
        }
    }
}

impl PieConfig {
    pub fn new(
        target_delay: Duration,
        t_update: Duration,
        mean_pkt_size: u32,
        max_burst: Duration,
    ) -> Self {
        Self {
            target_delay,
            t_update,
            mean_pkt_size,
            max_burst,
            ..Default::default()
        }
    }

    // alpha and beta have unit of 1/s and apply to delays in 64ns units
    fn scale_alpha_beta(coeff: u8) -> u64 {
        (coeff as u64 * (MAX_PROB / (1_000_000_000 >> 6))) >> 4
    }
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PieStats {
    pub drop_prob: u64,
    pub probability: f64,
    pub burst_allowance: u64, // in ticks
    pub cur_qdelay: u64,      // in ticks
    pub old_qdelay: u64,      // in ticks
    pub accu_prob: u64,
    pub updates: u64,
}

#[derive(Debug)]
pub struct Pie {
    hz: u64,
    target_delay: u64, // in ticks
    t_update: u64,     // in ticks
    max_burst: u64,    // in ticks
    mean_pkt_size: usize,
    alpha: u64,
    beta: u64,

    prob: u64,
    accu_prob: u64,
    burst_allowance: u64,
    cur_qdelay: u64,
    old_qdelay: u64,
    next_update: u64, // 0 until the first poll arms the schedule
    armed: bool,
    updates: u64,

    rng: StdRng,
}

impl Pie {
    fn nanos(&self, ticks: u64) -> i128 {
        ticks_to_duration(ticks, self.hz).as_nanos() as i128
    }

    fn drop_early(&mut self, backlog: usize) -> bool {
        /* If current delay is less than half of target and the drop probability
         * is low already, or there are fewer than 2 mean-sized packets queued,
         * skip random early drop
         */
        if (self.cur_qdelay < self.target_delay / 2 && self.prob < MAX_PROB / 5)
            || backlog <= 2 * self.mean_pkt_size
        {
            return false;
        }

        if self.prob == 0 {
            self.accu_prob = 0;
        }
        self.accu_prob = self.accu_prob.saturating_add(self.prob);

        if self.accu_prob < (MAX_PROB / 100) * 85 {
            return false;
        }
        if self.accu_prob >= MAX_PROB {
            self.accu_prob = 0;
            return true;
        }
        if (self.rng.next_u64() >> 8) < self.prob {
            self.accu_prob = 0;
            return true;
        }
        false
    }

    /// One controller step, run every `t_update`.
    fn calculate_drop_prob(&mut self) {
        let qdelay = self.nanos(self.cur_qdelay);
        let qdelay_old = self.nanos(self.old_qdelay);
        let target = self.nanos(self.target_delay);

        let mut alpha = self.alpha;
        let mut beta = self.beta;
        // Smaller steps while the probability is low, see RFC 8033
        if self.prob < MAX_PROB / 10 {
            alpha >>= 1;
            beta >>= 1;
            let mut power = 100;
            while self.prob < MAX_PROB / power && power <= 1_000_000 {
                alpha >>= 2;
                beta >>= 2;
                power *= 10;
            }
        }

        let mut delta = alpha as i128 * ((qdelay - target) >> 6);
        delta += beta as i128 * ((qdelay - qdelay_old) >> 6);

        // Increase in steps of no more than 2% once above 10%
        if delta > (MAX_PROB / 50) as i128 && self.prob >= MAX_PROB / 10 {
            delta = (MAX_PROB / 50) as i128;
        }

        let mut prob = (self.prob as i128 + delta).clamp(0, MAX_PROB as i128) as u64;

        // Decay quickly while the queue stays (almost) empty
        if qdelay < NANOS_PER_MILLI && qdelay_old < NANOS_PER_MILLI {
            prob -= prob / 64;
        }

        trace!(
            prob,
            delta = %delta,
            cur_qdelay = self.cur_qdelay,
            old_qdelay = self.old_qdelay,
            burst_allowance = self.burst_allowance,
            "PIE drop probability update"
        );
        self.prob = prob;
        self.old_qdelay = self.cur_qdelay;
        self.burst_allowance = self.burst_allowance.saturating_sub(self.t_update);
        self.updates += 1;
    }
}

impl AqmAlgorithm for Pie {
    type Config = PieConfig;

    fn new(config: Self::Config, capacity: usize, hz: u64) -> Result<Self> {
        debug!(?config, capacity, "New Pie");
        let target_delay = duration_to_ticks(config.target_delay, hz);
        let t_update = duration_to_ticks(config.t_update, hz);
        let max_burst = duration_to_ticks(config.max_burst, hz);
        if target_delay == 0 {
            warn!(target_delay = ?config.target_delay, hz, "PIE target rounds to zero ticks");
            return Err(ConfigError::ZeroTarget.into());
        }
        if t_update == 0 {
            warn!(t_update = ?config.t_update, hz, "PIE update period rounds to zero ticks");
            return Err(ConfigError::ZeroUpdatePeriod.into());
        }
        if max_burst == 0 {
            warn!(max_burst = ?config.max_burst, hz, "PIE burst allowance rounds to zero ticks");
            return Err(ConfigError::ZeroMaxBurst.into());
        }
        let mean_pkt_size = match config.mean_pkt_size {
            0 => 2,
            size => size as usize,
        };
        Ok(Self {
            hz,
            target_delay,
            t_update,
            max_burst,
            mean_pkt_size,
            alpha: PieConfig::scale_alpha_beta(config.alpha),
            beta: PieConfig::scale_alpha_beta(config.beta),
            prob: 0,
            accu_prob: 0,
            burst_allowance: max_burst,
            cur_qdelay: 0,
            old_qdelay: 0,
            next_update: 0,
            armed: true,
            updates: 0,
            rng: StdRng::seed_from_u64(config.seed.unwrap_or(DEFAULT_SEED)),
        })
    }

    fn poll(&mut self, now: u64) {
        if !self.armed {
            return;
        }
        if self.next_update == 0 {
            self.next_update = now.saturating_add(self.t_update);
            return;
        }
        let mut steps = 0;
        while now >= self.next_update {
            if steps == MAX_CATCH_UP {
                // Too far behind, resume the schedule from now
                self.next_update = now.saturating_add(self.t_update);
                break;
            }
            self.calculate_drop_prob();
            self.next_update = self.next_update.saturating_add(self.t_update);
            steps += 1;
        }
    }

    fn on_overflow(&mut self) {
        self.accu_prob = 0;
    }

    fn admit<P: Packet>(&mut self, ring: &RingBuffer<P>, packet: &P, _now: u64) -> Verdict {
        if self.burst_allowance == 0 && self.drop_early(ring.length_bytes()) {
            trace!(
                queue_len = ring.length_pkts(),
                queue_bytes = ring.length_bytes(),
                prob = self.prob,
                cur_qdelay = self.cur_qdelay,
                "Drop packet(len: {}) when enqueue",
                packet.length()
            );
            return Verdict::Dropped;
        }
        if self.prob == 0
            && self.cur_qdelay < self.target_delay / 2
            && self.old_qdelay < self.target_delay / 2
        {
            self.burst_allowance = self.max_burst;
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
        if packet.is_some() {
            self.cur_qdelay = ring.queue_delay();
        }
        Ok(packet)
    }

    fn stats(&self) -> AlgorithmStats {
        AlgorithmStats::Pie(PieStats {
            drop_prob: self.prob,
            probability: self.prob as f64 / MAX_PROB as f64,
            burst_allowance: self.burst_allowance,
            cur_qdelay: self.cur_qdelay,
            old_qdelay: self.old_qdelay,
            accu_prob: self.accu_prob,
            updates: self.updates,
        })
    }

    fn destroy(&mut self) {
        debug!(updates = self.updates, "Disarm PIE update timer");
        self.armed = false;
    }
}
