use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use sojourn_core::{
    algorithm::{CoDelConfig, RedConfig},
    AlgorithmConfig, Aqm, AqmConfig, Error, ManualClock, Packet, StdPacket, Verdict,
};

/// A packet that counts how many times it was released.
#[derive(Debug)]
struct TrackedPacket {
    len: usize,
    timestamp: u64,
    released: Arc<AtomicUsize>,
}

impl TrackedPacket {
    fn new(len: usize, released: &Arc<AtomicUsize>) -> Self {
        Self {
            len,
            timestamp: 0,
            released: released.clone(),
        }
    }
}

impl Drop for TrackedPacket {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl Packet for TrackedPacket {
    fn length(&self) -> usize {
        self.len
    }

    fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }
}

#[test_log::test]
fn test_destroy_releases_every_resident_packet() -> Result<(), Error> {
    let configs: [AlgorithmConfig; 3] = [
        AlgorithmConfig::default(),
        CoDelConfig::default().into(),
        RedConfig::new(8, 16, 10, 9).into(),
    ];
    for config in configs {
        let released = Arc::new(AtomicUsize::new(0));
        let mut aqm = Aqm::new(AqmConfig::new(16, config), ManualClock::new(1_000_000))?;
        for _ in 0..5 {
            assert_eq!(
                aqm.enqueue(TrackedPacket::new(100, &released))?,
                Verdict::Admitted
            );
        }
        assert_eq!(released.load(Ordering::SeqCst), 0);

        assert_eq!(aqm.destroy()?, 5);
        assert_eq!(released.load(Ordering::SeqCst), 5);
        let stats = aqm.get_stats();
        assert_eq!(stats.length_pkts, 0);
        assert_eq!(stats.length_bytes, 0);

        drop(aqm);
        assert_eq!(released.load(Ordering::SeqCst), 5);
    }
    Ok(())
}

#[test_log::test]
fn test_rejected_packets_are_released_once() -> Result<(), Error> {
    let released = Arc::new(AtomicUsize::new(0));
    let mut aqm = Aqm::new(AqmConfig::new(2, AlgorithmConfig::default()), ManualClock::new(1_000))?;
    aqm.enqueue(TrackedPacket::new(10, &released))?;
    aqm.enqueue(TrackedPacket::new(10, &released))?;
    assert_eq!(
        aqm.enqueue(TrackedPacket::new(10, &released))?,
        Verdict::Overflow
    );
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let delivered = aqm.dequeue()?.packet;
    assert!(delivered.is_some());
    assert_eq!(released.load(Ordering::SeqCst), 1);
    drop(delivered);
    assert_eq!(released.load(Ordering::SeqCst), 2);

    // Dropping the instance releases what is still queued
    drop(aqm);
    assert_eq!(released.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test_log::test]
fn test_caller_storage() -> Result<(), Error> {
    let storage: Box<[Option<StdPacket>]> = (0..8).map(|_| None).collect();
    let mut aqm = Aqm::with_storage(
        AqmConfig::new(8, AlgorithmConfig::default()),
        storage,
        ManualClock::new(1_000_000),
    )?;
    assert_eq!(aqm.capacity(), 8);
    aqm.enqueue(StdPacket::from_raw_buffer(&[7; 40]))?;
    assert_eq!(aqm.len_bytes(), 40);
    assert_eq!(aqm.dequeue()?.packet.map(|p| p.length()), Some(40));
    Ok(())
}
