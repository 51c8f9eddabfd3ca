// CoDel Implementation Reference:
// https://github.com/torvalds/linux/blob/v6.6/include/net/codel.h
// https://github.com/torvalds/linux/blob/v6.6/include/net/codel_impl.h

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{AlgorithmStats, AqmAlgorithm, DropTally, Verdict};
use crate::clock::duration_to_ticks;
use crate::error::{ConfigError, Result};
use crate::packet::Packet;
use crate::ring::RingBuffer;

const REC_INV_SQRT_BITS: u32 = u16::BITS;
// Shift turning rec_inv_sqrt into a Q0.32 number
const REC_INV_SQRT_SHIFT: u32 = 32 - REC_INV_SQRT_BITS;
const REC_INV_SQRT_MAX: u16 = u16::MAX;

#[cfg_attr(feature = "serde", derive(Deserialize, Serialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct CoDelConfig {
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub target: Duration, // target queue delay
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub interval: Duration, // width of moving time window
    pub mtu: u32, // minimal queue backlog in bytes before dropping
}

impl Default for CoDelConfig {
    fn default() -> Self {
        Self {
            target: Duration::from_millis(5),
            interval: Duration::from_millis(100),
            mtu: 1514,
        }
    }
}

impl CoDelConfig {
    pub fn new(target: Duration, interval: Duration) -> Self {
        Self {
            target,
            interval,
            ..Default::default()
        }
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoDelStats {
    pub count: u32,
    pub lastcount: u32,
    pub dropping: bool,
    pub rec_inv_sqrt: u16,
    pub first_above_time: u64, // in ticks, 0 if unset
    pub drop_next: u64,        // in ticks
    pub sojourn: u64,          // in ticks
    pub drops: u64,
}

#[derive(Debug)]
pub struct CoDel {
    target: u64,   // in ticks
    interval: u64, // in ticks
    mtu: usize,

    count: u32,     // how many drops we've done since the last time we entered dropping state
    lastcount: u32, // count at entry to dropping state
    dropping: bool,
    rec_inv_sqrt: u16,     // 1 / sqrt(count), in the top bits of a Q0.32
    first_above_time: u64, // when we went (or will go) continuously above target for interval, 0 if unset
    drop_next: u64,        // time to drop next packet, or when we dropped last
    sojourn: u64,          // sojourn time of last dequeued packet
    drops: u64,
}

impl CoDel {
    /// One Newton iteration of `invsqrt = invsqrt * (3 - count * invsqrt^2) / 2`.
    fn newton_step(&mut self) {
        let invsqrt = (self.rec_inv_sqrt as u64) << REC_INV_SQRT_SHIFT;
        let invsqrt2 = (invsqrt * invsqrt) >> 32;
        let val = (3u64 << 32).saturating_sub(self.count as u64 * invsqrt2);
        // Pre-shift by 2 keeps the product below 2^64
        let val = ((val >> 2) * invsqrt) >> (32 - 2 + 1);
        self.rec_inv_sqrt = (val >> REC_INV_SQRT_SHIFT) as u16;
    }

    /// `t + interval / sqrt(count)`
    fn control_law(&self, t: u64) -> u64 {
        let inv_sqrt = (self.rec_inv_sqrt as u128) << REC_INV_SQRT_SHIFT;
        let scaled = (self.interval as u128 * inv_sqrt) >> 32;
        t.saturating_add(scaled as u64)
    }

    fn should_drop<P: Packet>(&mut self, packet: &P, backlog: usize, now: u64) -> bool {
        self.sojourn = now.saturating_sub(packet.get_timestamp());
        if self.sojourn < self.target || backlog <= self.mtu {
            self.first_above_time = 0;
            return false;
        }
        if self.first_above_time == 0 {
            self.first_above_time = now.saturating_add(self.interval);
            false
        } else {
            now >= self.first_above_time
        }
    }

    fn drop_head<P: Packet>(&mut self, packet: P, drops: &mut DropTally) {
        trace!(
            sojourn = self.sojourn,
            count = self.count,
            "Drop packet(len: {}) when dequeue",
            packet.length()
        );
        self.drops += 1;
        drops.release(packet);
    }
}

impl AqmAlgorithm for CoDel {
    type Config = CoDelConfig;

    fn new(config: Self::Config, capacity: usize, hz: u64) -> Result<Self> {
        debug!(?config, capacity, "New CoDel");
        let target = duration_to_ticks(config.target, hz);
        let interval = duration_to_ticks(config.interval, hz);
        if target == 0 {
            warn!(target = ?config.target, hz, "CoDel target rounds to zero ticks");
            return Err(ConfigError::ZeroTarget.into());
        }
        if interval == 0 {
            warn!(interval = ?config.interval, hz, "CoDel interval rounds to zero ticks");
            return Err(ConfigError::ZeroInterval.into());
        }
        Ok(Self {
            target,
            interval,
            mtu: config.mtu as usize,
            count: 0,
            lastcount: 0,
            dropping: false,
            rec_inv_sqrt: REC_INV_SQRT_MAX,
            first_above_time: 0,
            drop_next: 0,
            sojourn: 0,
            drops: 0,
        })
    }

    fn admit<P: Packet>(&mut self, _ring: &RingBuffer<P>, _packet: &P, _now: u64) -> Verdict {
        Verdict::Admitted
    }

    fn dequeue<P: Packet>(
        &mut self,
        ring: &mut RingBuffer<P>,
        now: u64,
        drops: &mut DropTally,
    ) -> Result<Option<P>> {
        let Some(mut packet) = ring.dequeue(now)? else {
            self.first_above_time = 0;
            self.dropping = false;
            return Ok(None);
        };
        let ok_to_drop = self.should_drop(&packet, ring.length_bytes(), now);
        trace!(
            ok_to_drop,
            sojourn = self.sojourn,
            count = self.count,
            lastcount = self.lastcount,
            dropping = self.dropping,
            first_above_time = self.first_above_time,
            drop_next = self.drop_next,
            after_queue_len = ring.length_pkts(),
            "Dequeueing a new packet"
        );

        if self.dropping {
            if !ok_to_drop {
                self.dropping = false;
                trace!("Exit dropping state since packet should not drop");
            }
            while self.dropping && now >= self.drop_next {
                self.count = self.count.wrapping_add(1);
                self.newton_step();
                self.drop_head(packet, drops);
                packet = match ring.dequeue(now)? {
                    Some(packet) => packet,
                    None => {
                        self.dropping = false;
                        trace!("Exit dropping state since queue is empty");
                        return Ok(None);
                    }
                };
                if self.should_drop(&packet, ring.length_bytes(), now) {
                    self.drop_next = self.control_law(self.drop_next);
                } else {
                    self.dropping = false;
                    trace!("Exit dropping state since packet should not drop");
                }
            }
        } else if ok_to_drop {
            self.drop_head(packet, drops);
            self.dropping = true;
            let delta = self.count.wrapping_sub(self.lastcount);
            if delta > 1 && now.saturating_sub(self.drop_next) < self.interval.saturating_mul(16) {
                self.count = delta;
                self.newton_step();
            } else {
                self.count = 1;
                self.rec_inv_sqrt = REC_INV_SQRT_MAX;
            }
            self.lastcount = self.count;
            self.drop_next = self.control_law(now);
            trace!(
                count = self.count,
                delta,
                drop_next = self.drop_next,
                "Enter dropping state"
            );
            packet = match ring.dequeue(now)? {
                Some(packet) => packet,
                None => {
                    self.dropping = false;
                    trace!("Exit dropping state since queue is empty");
                    return Ok(None);
                }
            };
            // Refresh first_above_time against the new head
            self.should_drop(&packet, ring.length_bytes(), now);
        }
        Ok(Some(packet))
    }

    fn stats(&self) -> AlgorithmStats {
        AlgorithmStats::CoDel(CoDelStats {
            count: self.count,
            lastcount: self.lastcount,
            dropping: self.dropping,
            rec_inv_sqrt: self.rec_inv_sqrt,
            first_above_time: self.first_above_time,
            drop_next: self.drop_next,
            sojourn: self.sojourn,
            drops: self.drops,
        })
    }
}
