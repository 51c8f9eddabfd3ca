use std::time::Duration;

use sojourn_core::{
    algorithm::PieConfig, AlgorithmStats, Aqm, AqmConfig, Clock, Error, ManualClock, StdPacket,
};
use tracing::{info, span, Level};

const HZ: u64 = 1_000_000;
const MS: u64 = HZ / 1_000;

fn pie_stats(aqm: &Aqm<StdPacket, ManualClock>) -> sojourn_core::algorithm::PieStats {
    match aqm.get_stats().algorithm {
        AlgorithmStats::Pie(stats) => stats,
        other => panic!("unexpected stats {other:?}"),
    }
}

#[test_log::test]
fn test_pie_burst_allowance() -> Result<(), Error> {
    let _span = span!(Level::INFO, "test_pie_burst_allowance").entered();
    let clock = ManualClock::new(HZ);
    let mut aqm = Aqm::new(AqmConfig::new(4096, PieConfig::default()), clock.clone())?;

    // Ten arrivals and one departure per millisecond
    let step = |aqm: &mut Aqm<StdPacket, ManualClock>| -> Result<(), Error> {
        for _ in 0..10 {
            aqm.enqueue(StdPacket::from_raw_buffer(&[0; 1500]))?;
        }
        aqm.dequeue()?;
        clock.advance(Duration::from_millis(1));
        Ok(())
    };

    while clock.now() < 150 * MS {
        step(&mut aqm)?;
    }
    let stats = aqm.get_stats();
    info!(?stats, "Burst allowance spent");
    // Admission is unconditional while allowance is left
    assert_eq!(stats.enqueue_drops.packets, 0);
    assert_eq!(stats.overflow.packets, 0);

    step(&mut aqm)?;
    let pie = pie_stats(&aqm);
    assert_eq!(pie.burst_allowance, 0);
    assert!(pie.drop_prob > 0);
    assert!(pie.cur_qdelay > 15 * MS);

    while clock.now() < 300 * MS {
        step(&mut aqm)?;
    }
    let stats = aqm.get_stats();
    info!(?stats, "Early drops kicked in");
    assert!(stats.enqueue_drops.packets > 0);
    // Still no replenish under a standing queue
    assert_eq!(pie_stats(&aqm).burst_allowance, 0);
    Ok(())
}

#[test_log::test]
fn test_pie_tick_runs_missed_periods() -> Result<(), Error> {
    let clock = ManualClock::new(HZ);
    let mut aqm = Aqm::new(AqmConfig::new(64, PieConfig::default()), clock.clone())?;
    // The first call arms the update schedule
    aqm.tick()?;
    assert_eq!(pie_stats(&aqm).updates, 0);

    clock.advance(Duration::from_millis(45));
    aqm.tick()?;
    assert_eq!(pie_stats(&aqm).updates, 3);

    clock.advance(Duration::from_millis(14));
    aqm.tick()?;
    assert_eq!(pie_stats(&aqm).updates, 3);

    aqm.destroy()?;
    clock.advance(Duration::from_secs(1));
    assert_eq!(pie_stats(&aqm).updates, 3);
    Ok(())
}
