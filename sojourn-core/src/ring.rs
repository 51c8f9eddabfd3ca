//! Fixed-capacity circular packet store with byte, packet and delay accounting.
//!
//! The ring holds no policy: admission is decided by the caller, which tests
//! [`RingBuffer::is_full`] first. A packet offered to a full ring is handed
//! back untouched. Slots are allocated once when the ring is built and never
//! again.

use tracing::{error, trace};

use crate::error::{ConfigError, Error, Result};
use crate::packet::Packet;

/// Largest ring the engine accepts.
pub const MAX_CAPACITY: usize = u16::MAX as usize;

#[derive(Debug)]
pub struct RingBuffer<P> {
    slots: Box<[Option<P>]>,
    head: usize,
    tail: usize,
    length_pkts: usize,
    length_bytes: usize,
    queue_delay: u64, // sojourn time of the last dequeued packet, in ticks
}

impl<P> RingBuffer<P>
where
    P: Packet,
{
    pub fn new(capacity: usize) -> Result<Self> {
        Self::validate_capacity(capacity)?;
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self::from_slots(slots.into_boxed_slice()))
    }

    /// Build the ring on caller-provided slot storage. Every slot must be empty.
    pub fn with_storage(storage: Box<[Option<P>]>) -> Result<Self> {
        Self::validate_capacity(storage.len())?;
        if storage.iter().any(Option::is_some) {
            return Err(Error::RingError(
                "ring storage must be handed over empty".to_string(),
            ));
        }
        Ok(Self::from_slots(storage))
    }

    fn validate_capacity(capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity.into());
        }
        if capacity > MAX_CAPACITY {
            return Err(ConfigError::CapacityTooLarge(capacity).into());
        }
        Ok(())
    }

    fn from_slots(slots: Box<[Option<P>]>) -> Self {
        Self {
            slots,
            head: 0,
            tail: 0,
            length_pkts: 0,
            length_bytes: 0,
            queue_delay: 0,
        }
    }

    /// Stamp `now` on the packet and append it at the tail.
    ///
    /// Returns the packet back, unstamped, if the ring is full. Resident
    /// packets and the occupancy counters are left as they were.
    pub fn enqueue(&mut self, mut packet: P, now: u64) -> Option<P> {
        if self.is_full() {
            return Some(packet);
        }
        packet.set_timestamp(now);
        self.length_bytes += packet.length();
        self.length_pkts += 1;
        self.slots[self.tail] = Some(packet);
        self.tail += 1;
        if self.tail == self.slots.len() {
            self.tail = 0;
        }
        None
    }

    /// Remove the oldest packet and record its sojourn time.
    ///
    /// Returns `Ok(None)` on an empty ring. An empty slot under a non-zero
    /// occupancy is an internal invariant failure.
    pub fn dequeue(&mut self, now: u64) -> Result<Option<P>> {
        if self.is_empty() {
            return Ok(None);
        }
        let packet = match self.slots[self.head].take() {
            Some(packet) => packet,
            None => {
                error!(
                    head = self.head,
                    length_pkts = self.length_pkts,
                    "Ring slot at head is empty while the ring is not"
                );
                return Err(Error::RingError(format!(
                    "empty slot at head {} with {} packets resident",
                    self.head, self.length_pkts
                )));
            }
        };
        self.head += 1;
        if self.head == self.slots.len() {
            self.head = 0;
        }
        self.length_pkts -= 1;
        self.length_bytes -= packet.length();
        self.queue_delay = now.saturating_sub(packet.get_timestamp());
        trace!(
            sojourn = self.queue_delay,
            after_queue_len = self.length_pkts,
            after_queue_bytes = self.length_bytes,
            "Ring dequeue"
        );
        Ok(Some(packet))
    }

    pub fn front(&self) -> Option<&P> {
        if self.is_empty() {
            None
        } else {
            self.slots[self.head].as_ref()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.length_pkts == 0
    }

    pub fn is_full(&self) -> bool {
        self.length_pkts == self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn length_pkts(&self) -> usize {
        self.length_pkts
    }

    pub fn length_bytes(&self) -> usize {
        self.length_bytes
    }

    /// Sojourn time of the most recently dequeued packet, in ticks.
    pub fn queue_delay(&self) -> u64 {
        self.queue_delay
    }
}
