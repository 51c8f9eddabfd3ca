//! The AQM instance: lifetime counters, one ring and one policy.
//!
//! # Concurrency
//!
//! An [`Aqm`] is not internally synchronized and every operation takes
//! `&mut self`. Callers sharing one instance between execution contexts must
//! serialize all access behind a single lock, PIE's periodic update through
//! [`Aqm::tick`] included. No operation blocks: a full ring or an empty ring
//! is an ordinary result.
//!
//! # Packet ownership
//!
//! The instance owns a packet from a successful enqueue until it is handed
//! back by dequeue. Packets rejected on enqueue, dropped during dequeue or
//! still resident at destroy are released by the instance, exactly once.

use std::mem::size_of;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::{debug, error, trace};

use crate::algorithm::{AlgorithmKind, AlgorithmStats, DropTally, Engine, Verdict};
use crate::clock::Clock;
use crate::config::AqmConfig;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::ring::RingBuffer;

/// Packets and bytes seen by one lifetime counter.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub packets: u64,
    pub bytes: u64,
}

impl Tally {
    fn add(&mut self, packets: u64, bytes: u64) {
        self.packets += packets;
        self.bytes += bytes;
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    enqueued: Tally,
    dequeued: Tally,
    overflow: Tally,
    enqueue_drops: Tally,
    dequeue_drops: Tally,
}

/// Bytes an instance of `kind` keeps inline: counters, ring metadata and the
/// policy state. The ring slots come on top, see [`ring_storage_size`].
pub fn memory_size<P: Packet>(kind: AlgorithmKind) -> usize {
    size_of::<Counters>() + size_of::<RingBuffer<P>>() + kind.state_size()
}

pub fn ring_storage_size<P: Packet>(capacity: usize) -> usize {
    capacity * size_of::<Option<P>>()
}

/// Outcome of one dequeue call.
#[derive(Debug)]
pub struct Dequeued<P> {
    /// The delivered packet, `None` when the queue is (or was drained) empty.
    pub packet: Option<P>,
    pub dropped_packets: u32,
    pub dropped_bytes: u64,
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AqmStats {
    pub enqueued: Tally,
    pub dequeued: Tally,
    pub overflow: Tally,
    pub enqueue_drops: Tally,
    pub dequeue_drops: Tally,
    pub length_pkts: usize,
    pub length_bytes: usize,
    // Sojourn time of the last delivered packet
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub queue_delay: Duration,
    pub algorithm: AlgorithmStats,
}

#[derive(Debug)]
pub struct Aqm<P, C>
where
    P: Packet,
    C: Clock,
{
    counters: Counters,
    ring: RingBuffer<P>,
    engine: Engine,
    clock: C,
    destroyed: bool,
}

impl<P, C> Aqm<P, C>
where
    P: Packet,
    C: Clock,
{
    pub fn new(config: AqmConfig, clock: C) -> Result<Self> {
        let ring = RingBuffer::new(config.capacity)?;
        Self::build(config, ring, clock)
    }

    /// Build the instance on caller-provided ring slots, which must be empty
    /// and exactly `config.capacity` long.
    pub fn with_storage(config: AqmConfig, storage: Box<[Option<P>]>, clock: C) -> Result<Self> {
        if storage.len() != config.capacity {
            return Err(Error::RingError(format!(
                "ring storage holds {} slots, capacity is {}",
                storage.len(),
                config.capacity
            )));
        }
        let ring = RingBuffer::with_storage(storage)?;
        Self::build(config, ring, clock)
    }

    fn build(config: AqmConfig, ring: RingBuffer<P>, clock: C) -> Result<Self> {
        debug!(?config, hz = clock.hz(), "New Aqm");
        let engine = Engine::new(config.algorithm, config.capacity, clock.hz())?;
        Ok(Self {
            counters: Counters::default(),
            ring,
            engine,
            clock,
            destroyed: false,
        })
    }

    fn ensure_live(&self) -> Result<()> {
        if self.destroyed {
            return Err(Error::Destroyed);
        }
        Ok(())
    }

    /// Offer `packet` to the queue. A rejected packet is released here.
    pub fn enqueue(&mut self, packet: P) -> Result<Verdict> {
        self.ensure_live()?;
        let now = self.clock.now();
        self.engine.poll(now);
        let length = packet.length() as u64;

        let verdict = if !self.engine.guards_capacity() && self.ring.is_full() {
            Verdict::Overflow
        } else {
            self.engine.admit(&self.ring, &packet, now)
        };

        match verdict {
            Verdict::Admitted => {
                if let Some(packet) = self.ring.enqueue(packet, now) {
                    error!(
                        queue_len = self.ring.length_pkts(),
                        algorithm = %self.engine.kind(),
                        "Admitted packet(len: {}) found the ring full",
                        packet.length()
                    );
                    return Err(Error::RingError(format!(
                        "ring full after admission with {} packets resident",
                        self.ring.length_pkts()
                    )));
                }
                self.counters.enqueued.add(1, length);
            }
            Verdict::Overflow => {
                self.engine.on_overflow();
                self.counters.overflow.add(1, length);
                trace!(
                    queue_len = self.ring.length_pkts(),
                    queue_bytes = self.ring.length_bytes(),
                    "Drop packet(len: {}) on overflow",
                    length
                );
            }
            Verdict::Dropped => {
                self.counters.enqueue_drops.add(1, length);
            }
        }
        Ok(verdict)
    }

    /// Deliver the next packet, after any drops the policy decides on.
    pub fn dequeue(&mut self) -> Result<Dequeued<P>> {
        self.ensure_live()?;
        let now = self.clock.now();
        self.engine.poll(now);

        let mut drops = DropTally::default();
        let packet = self.engine.dequeue(&mut self.ring, now, &mut drops)?;
        self.counters
            .dequeue_drops
            .add(drops.packets as u64, drops.bytes);
        if let Some(packet) = &packet {
            self.counters.dequeued.add(1, packet.length() as u64);
        }
        Ok(Dequeued {
            packet,
            dropped_packets: drops.packets,
            dropped_bytes: drops.bytes,
        })
    }

    /// Run periodic policy work that fell due, without moving packets.
    pub fn tick(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.engine.poll(self.clock.now());
        Ok(())
    }

    pub fn get_stats(&self) -> AqmStats {
        AqmStats {
            enqueued: self.counters.enqueued,
            dequeued: self.counters.dequeued,
            overflow: self.counters.overflow,
            enqueue_drops: self.counters.enqueue_drops,
            dequeue_drops: self.counters.dequeue_drops,
            length_pkts: self.ring.length_pkts(),
            length_bytes: self.ring.length_bytes(),
            queue_delay: self.clock.ticks_to_duration(self.ring.queue_delay()),
            algorithm: self.engine.stats(),
        }
    }

    /// Release every resident packet and the policy resources. Returns the
    /// number of packets released; destroying twice releases nothing.
    pub fn destroy(&mut self) -> Result<usize> {
        if self.destroyed {
            return Ok(0);
        }
        let now = self.clock.now();
        let mut released = 0;
        while self.ring.dequeue(now)?.is_some() {
            released += 1;
        }
        self.engine.destroy();
        self.destroyed = true;
        debug!(released, algorithm = %self.engine.kind(), "Destroy Aqm");
        Ok(released)
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    pub fn len(&self) -> usize {
        self.ring.length_pkts()
    }

    pub fn len_bytes(&self) -> usize {
        self.ring.length_bytes()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn algorithm(&self) -> AlgorithmKind {
        self.engine.kind()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
