use std::fmt::Debug;

/// A packet handle owned by the queue while it is resident.
///
/// The engine stamps the arrival time on enqueue and reads it back on dequeue
/// to derive the sojourn time. Dropping a handle releases it, so a packet the
/// engine decides to drop is released exactly once, by the engine.
pub trait Packet: Debug + Send + 'static {
    // Length in bytes as accounted by the queue
    fn length(&self) -> usize;

    // Arrival timestamp, in ticks of the instance clock
    fn get_timestamp(&self) -> u64;
    fn set_timestamp(&mut self, timestamp: u64);

    /// Traffic class used by WRED to pick a drop profile.
    fn traffic_class(&self) -> u8 {
        0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StdPacket {
    buf: Vec<u8>,
    timestamp: u64,
    traffic_class: u8,
}

impl StdPacket {
    pub fn from_raw_buffer(buf: &[u8]) -> Self {
        Self {
            buf: buf.to_vec(),
            timestamp: 0,
            traffic_class: 0,
        }
    }

    pub fn with_class(buf: &[u8], traffic_class: u8) -> Self {
        Self {
            buf: buf.to_vec(),
            timestamp: 0,
            traffic_class,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }
}

impl Packet for StdPacket {
    fn length(&self) -> usize {
        self.buf.len()
    }

    fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    fn traffic_class(&self) -> u8 {
        self.traffic_class
    }
}
