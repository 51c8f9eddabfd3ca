use std::collections::VecDeque;

use rand::{rngs::StdRng, Rng, SeedableRng};
use sojourn_core::{
    algorithm::FifoConfig, Aqm, AqmConfig, Error, ManualClock, Packet, StdPacket, Verdict,
};
use tracing::{info, span, Level};

fn labelled(label: u8) -> StdPacket {
    StdPacket::from_raw_buffer(&[label; 64])
}

fn label(packet: &StdPacket) -> u8 {
    packet.as_slice()[0]
}

#[test_log::test]
fn test_fifo_overflow_scenario() -> Result<(), Error> {
    let _span = span!(Level::INFO, "test_fifo_overflow_scenario").entered();
    let mut aqm = Aqm::new(
        AqmConfig::new(4, FifoConfig::new()),
        ManualClock::new(1_000_000),
    )?;
    for name in b"ABCD" {
        assert_eq!(aqm.enqueue(labelled(*name))?, Verdict::Admitted);
    }
    assert!(aqm.is_full());
    assert_eq!(aqm.enqueue(labelled(b'E'))?, Verdict::Overflow);
    assert_eq!(aqm.get_stats().overflow.packets, 1);

    let first = aqm.dequeue()?.packet.map(|p| label(&p));
    assert_eq!(first, Some(b'A'));
    assert_eq!(aqm.enqueue(labelled(b'E'))?, Verdict::Admitted);

    let mut rest = Vec::new();
    while let Some(packet) = aqm.dequeue()?.packet {
        rest.push(label(&packet));
    }
    info!(?rest, "Drained");
    assert_eq!(rest, b"BCDE".to_vec());
    Ok(())
}

#[test_log::test]
fn test_fifo_matches_model_queue() -> Result<(), Error> {
    let mut rng = StdRng::seed_from_u64(42);
    let clock = ManualClock::new(1_000_000);
    let mut aqm = Aqm::new(AqmConfig::new(8, FifoConfig::new()), clock.clone())?;
    let mut model = VecDeque::new();
    let (mut admitted, mut overflow, mut delivered) = (0u64, 0u64, 0u64);

    for step in 0..2_000u32 {
        clock.advance_ticks(rng.gen_range(0..100));
        if rng.gen_bool(0.55) {
            let len = rng.gen_range(1..1500);
            let packet = StdPacket::from_raw_buffer(&vec![(step % 251) as u8; len]);
            match aqm.enqueue(packet.clone())? {
                Verdict::Admitted => {
                    admitted += 1;
                    model.push_back(packet);
                }
                Verdict::Overflow => {
                    assert_eq!(model.len(), 8);
                    overflow += 1;
                }
                Verdict::Dropped => panic!("fifo never drops on admission"),
            }
        } else {
            let out = aqm.dequeue()?;
            assert_eq!(out.dropped_packets, 0);
            let expected = model.pop_front();
            assert_eq!(
                out.packet.as_ref().map(|p| p.as_slice()),
                expected.as_ref().map(|p| p.as_slice())
            );
            if out.packet.is_some() {
                delivered += 1;
            }
        }
        assert_eq!(aqm.len(), model.len());
        assert_eq!(
            aqm.len_bytes(),
            model.iter().map(|p| p.length()).sum::<usize>()
        );
    }

    let stats = aqm.get_stats();
    assert_eq!(stats.enqueued.packets, admitted);
    assert_eq!(stats.overflow.packets, overflow);
    assert_eq!(stats.dequeued.packets, delivered);
    assert_eq!(admitted - delivered, aqm.len() as u64);
    Ok(())
}
