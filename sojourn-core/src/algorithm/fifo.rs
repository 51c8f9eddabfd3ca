#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AlgorithmStats, AqmAlgorithm, Verdict};
use crate::error::Result;
use crate::packet::Packet;
use crate::ring::RingBuffer;

#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FifoConfig {}

impl FifoConfig {
    pub fn new() -> Self {
        Self {}
    }
}

/// Tail drop. Admits whatever fits; the dispatcher rejects on a full ring.
#[derive(Debug, Default)]
pub struct Fifo;

impl AqmAlgorithm for Fifo {
    type Config = FifoConfig;

    fn new(config: Self::Config, capacity: usize, _hz: u64) -> Result<Self> {
        debug!(?config, capacity, "New Fifo");
        Ok(Fifo)
    }

    fn admit<P: Packet>(&mut self, _ring: &RingBuffer<P>, _packet: &P, _now: u64) -> Verdict {
        Verdict::Admitted
    }

    fn stats(&self) -> AlgorithmStats {
        AlgorithmStats::Fifo
    }
}
