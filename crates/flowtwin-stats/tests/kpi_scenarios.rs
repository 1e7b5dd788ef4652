//! KPI aggregation over timelines that are rewound and mutated.

use flowtwin_core::test_utils::*;
use flowtwin_core::{Timeline, TimelineConfig};
use flowtwin_stats::{KpiAggregator, SimulationReport, StatsConfig};

#[test]
fn reaggregating_after_toggle_matches_fresh_run() {
    let (state, ids) = single_step_line();
    let mut tl = Timeline::new(state.clone(), TimelineConfig::default());
    tl.run(8).unwrap();
    tl.jump_to_tick(2).unwrap();
    tl.toggle_transport_system(ids.inbound).unwrap();
    tl.jump_to_tick(7).unwrap();
    let rewound = KpiAggregator::aggregate(StatsConfig::default(), tl.frames()).unwrap();

    // No inflow after tick 2: the queue drains one A per tick.
    let depth: Vec<_> = rewound.kpis()[2..].iter().map(|k| k.queue_depth).collect();
    assert_eq!(depth, vec![6; 6]);
    let units: Vec<_> = rewound.kpis()[3..].iter().map(|k| k.units_produced).collect();
    assert_eq!(units, vec![1, 1, 1, 1, 0]);
    assert_eq!(rewound.latest().unwrap().units_produced_total, 6);
}

#[test]
fn blocked_steps_are_counted() {
    let mut builder = SnapshotBuilder::new();
    let a = builder.material("A");
    let b = builder.material("B");
    let step = builder.step(1, StepSpec::new(5).recipe(vec![(a, 1)], vec![(b, 1)], 1));
    builder.stock(step, a, 3);
    let state = builder.build();

    let mut tl = Timeline::new(state, TimelineConfig::default());
    tl.run(3).unwrap();
    let agg = KpiAggregator::aggregate(StatsConfig::default(), tl.frames()).unwrap();
    assert!(agg.kpis().iter().all(|k| k.blocked_steps == 1));
    assert_eq!(agg.latest().unwrap().units_produced_total, 0);
}

#[test]
fn report_lists_bottlenecks_in_tick_order() {
    let (state, _) = single_step_line();
    let mut tl = Timeline::new(state, TimelineConfig::default());
    tl.run(10).unwrap();
    let config = StatsConfig {
        bottleneck_threshold: fixed(0.5),
        bottleneck_min_ticks: 2,
        throughput_window: 5,
    };
    let agg = KpiAggregator::aggregate(config, tl.frames()).unwrap();
    let report = SimulationReport::from_aggregator("line", &agg);

    assert!(!report.bottlenecks.is_empty());
    assert_eq!(report.bottlenecks[0].tick, 4);
    assert_eq!(report.bottlenecks[0].name, "Step 1");
    assert!(report.bottlenecks.windows(2).all(|w| w[0].tick <= w[1].tick));
}
