use sojourn_core::{
    algorithm::{RedConfig, WredClassConfig, WredConfig},
    AlgorithmConfig, AlgorithmKind, Aqm, AqmConfig, Error, ManualClock, StdPacket, Verdict,
};
use tracing::info;

const CAPACITY: usize = 16;

fn config_for(kind: AlgorithmKind) -> AlgorithmConfig {
    match kind {
        // Default thresholds exceed a 16 slot ring
        AlgorithmKind::Red => RedConfig::new(4, CAPACITY as u32, 10, 2).into(),
        AlgorithmKind::Wred => WredConfig::new(
            2,
            vec![
                WredClassConfig::new(8, CAPACITY as u32, 10),
                WredClassConfig::new(4, 12, 10),
            ],
        )
        .into(),
        kind => AlgorithmConfig::default_for(kind),
    }
}

#[test_log::test]
fn test_ring_never_exceeds_capacity() -> Result<(), Error> {
    for kind in AlgorithmKind::ALL {
        let clock = ManualClock::new(1_000_000);
        let mut aqm = Aqm::new(AqmConfig::new(CAPACITY, config_for(kind)), clock.clone())?;
        assert_eq!(aqm.algorithm(), kind);

        let mut overflow = 0;
        for i in 0..200u32 {
            let packet = StdPacket::with_class(&[0; 512], (i % 3) as u8);
            let before = aqm.len();
            let verdict = aqm.enqueue(packet)?;
            if before == CAPACITY {
                assert_eq!(verdict, Verdict::Overflow, "{kind}: full ring must overflow");
            }
            if verdict == Verdict::Overflow {
                overflow += 1;
            }
            assert!(aqm.len() <= CAPACITY);
            clock.advance_ticks(10);
            if i % 4 == 0 {
                aqm.dequeue()?;
            }
        }

        let stats = aqm.get_stats();
        info!(%kind, ?stats, "Burst done");
        assert_eq!(stats.overflow.packets, overflow);
        assert_eq!(
            stats.enqueued.packets + stats.overflow.packets + stats.enqueue_drops.packets,
            200
        );
        assert_eq!(
            stats.enqueued.packets,
            stats.dequeued.packets + stats.dequeue_drops.packets + stats.length_pkts as u64
        );
    }
    Ok(())
}
