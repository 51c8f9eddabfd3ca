use std::time::Duration;

use sojourn_core::{
    algorithm::CoDelConfig, AlgorithmStats, Aqm, AqmConfig, Clock, Error, ManualClock,
    StdPacket,
};
use tracing::{info, span, Level};

const HZ: u64 = 1_000_000;
const MS: u64 = HZ / 1_000;

fn codel_aqm(clock: &ManualClock) -> Result<Aqm<StdPacket, ManualClock>, Error> {
    let config = CoDelConfig::new(Duration::from_millis(5), Duration::from_millis(100));
    Aqm::new(AqmConfig::new(1024, config), clock.clone())
}

/// Run `per_ms` arrivals and `per_ms` departures every millisecond after a
/// 10ms head start, so that the head sojourn sits at 10ms. Returns the tick
/// of every dequeue that dropped.
fn run_standing_queue(
    aqm: &mut Aqm<StdPacket, ManualClock>,
    clock: &ManualClock,
    per_ms: usize,
    until_ms: u64,
) -> Result<Vec<u64>, Error> {
    for _ in 0..10 {
        for _ in 0..per_ms {
            aqm.enqueue(StdPacket::from_raw_buffer(&[0; 1500]))?;
        }
        clock.advance(Duration::from_millis(1));
    }
    let mut drop_times = Vec::new();
    while clock.now() <= until_ms * MS {
        for _ in 0..per_ms {
            aqm.enqueue(StdPacket::from_raw_buffer(&[0; 1500]))?;
        }
        for _ in 0..per_ms {
            let out = aqm.dequeue()?;
            for _ in 0..out.dropped_packets {
                drop_times.push(clock.now());
            }
        }
        clock.advance(Duration::from_millis(1));
    }
    Ok(drop_times)
}

#[test_log::test]
fn test_codel_drops_after_interval() -> Result<(), Error> {
    let _span = span!(Level::INFO, "test_codel_drops_after_interval").entered();
    let clock = ManualClock::new(HZ);
    let mut aqm = codel_aqm(&clock)?;
    let drop_times = run_standing_queue(&mut aqm, &clock, 1, 160)?;
    info!(?drop_times);

    assert!(!drop_times.is_empty(), "10ms sojourn for 150ms must drop");
    // Nothing can drop while the first interval is still open
    assert!(drop_times.iter().all(|t| *t >= 110 * MS));
    assert_eq!(drop_times[0], 110 * MS);
    let stats = aqm.get_stats();
    assert_eq!(stats.dequeue_drops.packets, drop_times.len() as u64);
    assert_eq!(stats.dequeue_drops.bytes, 1500 * drop_times.len() as u64);
    Ok(())
}

#[test_log::test]
fn test_codel_drop_spacing_shrinks() -> Result<(), Error> {
    let clock = ManualClock::new(HZ);
    let mut aqm = codel_aqm(&clock)?;
    let drop_times = run_standing_queue(&mut aqm, &clock, 10, 1_000)?;
    let gaps: Vec<u64> = drop_times.windows(2).map(|w| w[1] - w[0]).collect();
    info!(drops = drop_times.len(), ?gaps);

    assert!(drop_times.len() >= 20, "{drop_times:?}");
    // The first drop after entering waits a whole interval
    assert_eq!(gaps[0], 100 * MS);
    // interval / sqrt(count) is below 25ms once count passes 16
    let last = gaps[gaps.len() - 1];
    assert!(last < 25 * MS, "{gaps:?}");
    match aqm.get_stats().algorithm {
        AlgorithmStats::CoDel(stats) => {
            assert!(stats.dropping);
            assert_eq!(stats.count as usize, drop_times.len());
        }
        other => panic!("unexpected stats {other:?}"),
    }
    Ok(())
}

#[test_log::test]
fn test_codel_below_target_never_drops() -> Result<(), Error> {
    let clock = ManualClock::new(HZ);
    let mut aqm = codel_aqm(&clock)?;
    for _ in 0..2_000 {
        for _ in 0..4 {
            aqm.enqueue(StdPacket::from_raw_buffer(&[0; 1500]))?;
        }
        clock.advance(Duration::from_millis(4));
        for _ in 0..4 {
            assert_eq!(aqm.dequeue()?.dropped_packets, 0);
        }
    }
    match aqm.get_stats().algorithm {
        AlgorithmStats::CoDel(stats) => {
            assert!(!stats.dropping);
            assert_eq!(stats.first_above_time, 0);
            assert_eq!(stats.drops, 0);
        }
        other => panic!("unexpected stats {other:?}"),
    }
    Ok(())
}
