//! Queue management policies.
//!
//! Every policy is a hook set over one shared [`RingBuffer`]: an admission
//! check run before the ring append, a dequeue hook wrapping the ring removal
//! and a stats snapshot. [`Engine`] is the closed set of policies an instance
//! can be built with, stored inline so that the instance never allocates past
//! its ring storage.

use std::fmt::{self, Debug, Display};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::AlgorithmConfig;
use crate::error::{ConfigError, Result};
use crate::packet::Packet;
use crate::ring::RingBuffer;

pub mod codel;
pub mod fifo;
pub mod pie;
pub mod red;
pub mod wred;

pub use codel::{CoDel, CoDelConfig, CoDelStats};
pub use fifo::{Fifo, FifoConfig};
pub use pie::{Pie, PieConfig, PieStats};
pub use red::{Red, RedConfig, RedStats};
pub use wred::{Wred, WredClassConfig, WredConfig, WredStats};

#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(rename_all = "lowercase")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    Fifo,
    Red,
    Wred,
    CoDel,
    Pie,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 5] = [
        AlgorithmKind::Fifo,
        AlgorithmKind::Red,
        AlgorithmKind::Wred,
        AlgorithmKind::CoDel,
        AlgorithmKind::Pie,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmKind::Fifo => "fifo",
            AlgorithmKind::Red => "red",
            AlgorithmKind::Wred => "wred",
            AlgorithmKind::CoDel => "codel",
            AlgorithmKind::Pie => "pie",
        }
    }

    /// Bytes of runtime state the policy keeps inline in the instance.
    pub fn state_size(&self) -> usize {
        match self {
            AlgorithmKind::Fifo => Fifo::memory_size(),
            AlgorithmKind::Red => Red::memory_size(),
            AlgorithmKind::Wred => Wred::memory_size(),
            AlgorithmKind::CoDel => CoDel::memory_size(),
            AlgorithmKind::Pie => Pie::memory_size(),
        }
    }
}

impl Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AlgorithmKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownAlgorithm(s.to_string()))
    }
}

impl TryFrom<u8> for AlgorithmKind {
    type Error = ConfigError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        AlgorithmKind::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| ConfigError::UnknownAlgorithm(value.to_string()))
    }
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admitted,
    // The ring had no free slot
    Overflow,
    // The policy rejected the packet
    Dropped,
}

/// Packets released by the engine during one dequeue call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DropTally {
    pub packets: u32,
    pub bytes: u64,
}

impl DropTally {
    /// Account for `packet` and release it.
    pub fn release<P: Packet>(&mut self, packet: P) {
        self.packets += 1;
        self.bytes += packet.length() as u64;
    }
}

pub trait AqmAlgorithm: Debug + Send {
    #[cfg(feature = "serde")]
    type Config: for<'a> Deserialize<'a> + Serialize + Send + Debug;
    #[cfg(not(feature = "serde"))]
    type Config: Send + Debug;

    /// Validate `config` and build the runtime state. `capacity` is the ring
    /// size and `hz` the clock rate used to convert durations into ticks.
    fn new(config: Self::Config, capacity: usize, hz: u64) -> Result<Self>
    where
        Self: Sized;

    fn memory_size() -> usize
    where
        Self: Sized,
    {
        std::mem::size_of::<Self>()
    }

    /// Whether `admit` performs the ring-full test itself.
    fn guards_capacity(&self) -> bool {
        false
    }

    /// Run any periodic work that fell due before `now`.
    fn poll(&mut self, _now: u64) {}

    /// Called when the dispatcher rejected a packet because the ring was full.
    fn on_overflow(&mut self) {}

    fn admit<P: Packet>(&mut self, ring: &RingBuffer<P>, packet: &P, now: u64) -> Verdict;

    /// Remove the next packet to deliver, releasing any packet dropped on the
    /// way into `drops`.
    fn dequeue<P: Packet>(
        &mut self,
        ring: &mut RingBuffer<P>,
        now: u64,
        _drops: &mut DropTally,
    ) -> Result<Option<P>> {
        ring.dequeue(now)
    }

    fn stats(&self) -> AlgorithmStats;

    /// Release policy resources such as a periodic trigger.
    fn destroy(&mut self) {}
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmStats {
    Fifo,
    Red(RedStats),
    Wred(WredStats),
    CoDel(CoDelStats),
    Pie(PieStats),
}

#[derive(Debug)]
pub enum Engine {
    Fifo(Fifo),
    Red(Red),
    Wred(Wred),
    CoDel(CoDel),
    Pie(Pie),
}

macro_rules! dispatch {
    ($engine:expr, $algorithm:ident => $body:expr) => {
        match $engine {
            Engine::Fifo($algorithm) => $body,
            Engine::Red($algorithm) => $body,
            Engine::Wred($algorithm) => $body,
            Engine::CoDel($algorithm) => $body,
            Engine::Pie($algorithm) => $body,
        }
    };
}

impl Engine {
    pub fn new(config: AlgorithmConfig, capacity: usize, hz: u64) -> Result<Self> {
        if hz == 0 {
            return Err(ConfigError::ZeroClockRate.into());
        }
        Ok(match config {
            AlgorithmConfig::Fifo(config) => Engine::Fifo(Fifo::new(config, capacity, hz)?),
            AlgorithmConfig::Red(config) => Engine::Red(Red::new(config, capacity, hz)?),
            AlgorithmConfig::Wred(config) => Engine::Wred(Wred::new(config, capacity, hz)?),
            AlgorithmConfig::CoDel(config) => Engine::CoDel(CoDel::new(config, capacity, hz)?),
            AlgorithmConfig::Pie(config) => Engine::Pie(Pie::new(config, capacity, hz)?),
        })
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Engine::Fifo(_) => AlgorithmKind::Fifo,
            Engine::Red(_) => AlgorithmKind::Red,
            Engine::Wred(_) => AlgorithmKind::Wred,
            Engine::CoDel(_) => AlgorithmKind::CoDel,
            Engine::Pie(_) => AlgorithmKind::Pie,
        }
    }

    pub fn guards_capacity(&self) -> bool {
        dispatch!(self, algorithm => algorithm.guards_capacity())
    }

    pub fn poll(&mut self, now: u64) {
        dispatch!(self, algorithm => algorithm.poll(now))
    }

    pub fn on_overflow(&mut self) {
        dispatch!(self, algorithm => algorithm.on_overflow())
    }

    pub fn admit<P: Packet>(&mut self, ring: &RingBuffer<P>, packet: &P, now: u64) -> Verdict {
        dispatch!(self, algorithm => algorithm.admit(ring, packet, now))
    }

    pub fn dequeue<P: Packet>(
        &mut self,
        ring: &mut RingBuffer<P>,
        now: u64,
        drops: &mut DropTally,
    ) -> Result<Option<P>> {
        dispatch!(self, algorithm => algorithm.dequeue(ring, now, drops))
    }

    pub fn stats(&self) -> AlgorithmStats {
        dispatch!(self, algorithm => algorithm.stats())
    }

    pub fn destroy(&mut self) {
        dispatch!(self, algorithm => algorithm.destroy())
    }
}
