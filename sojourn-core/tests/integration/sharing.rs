use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use sojourn_core::{
    algorithm::FifoConfig, Aqm, AqmConfig, Error, InstantClock, StdPacket, Verdict,
};
use tracing::info;

const PACKETS: u32 = 5_000;

#[test_log::test]
fn test_shared_instance_behind_one_lock() -> Result<(), Error> {
    let aqm = Arc::new(Mutex::new(Aqm::new(
        AqmConfig::new(64, FifoConfig::new()),
        InstantClock::new(),
    )?));

    let producer = {
        let aqm = aqm.clone();
        thread::spawn(move || -> Result<Vec<u32>, Error> {
            let mut admitted = Vec::new();
            for seq in 0..PACKETS {
                let packet = StdPacket::from_raw_buffer(&seq.to_be_bytes());
                if aqm.lock().enqueue(packet)? == Verdict::Admitted {
                    admitted.push(seq);
                }
                if seq % 16 == 0 {
                    thread::yield_now();
                }
            }
            Ok(admitted)
        })
    };

    let mut delivered = Vec::new();
    loop {
        // Sampled before the dequeue so that an empty result after it is final
        let finished = producer.is_finished();
        let out = aqm.lock().dequeue()?;
        match out.packet {
            Some(packet) => {
                let mut seq = [0u8; 4];
                seq.copy_from_slice(packet.as_slice());
                delivered.push(u32::from_be_bytes(seq));
            }
            None if finished => break,
            None => thread::yield_now(),
        }
    }

    let admitted = match producer.join() {
        Ok(result) => result?,
        Err(_) => panic!("producer panicked"),
    };
    let stats = aqm.lock().get_stats();
    info!(admitted = admitted.len(), ?stats, "Producer and consumer done");
    assert_eq!(delivered, admitted);
    assert_eq!(
        stats.enqueued.packets + stats.overflow.packets,
        PACKETS as u64
    );
    assert!(aqm.lock().is_empty());
    Ok(())
}
