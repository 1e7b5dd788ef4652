//! Criterion benchmarks for the tick engine.
//!
//! Two benchmark groups:
//! - `advance`: a single tick over plants of increasing size
//! - `timeline`: a full `run` and a seek-extension over a mid-sized plant

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use flowtwin_core::engine::advance;
use flowtwin_core::graph::SimulationState;
use flowtwin_core::test_utils::*;
use flowtwin_core::{Timeline, TimelineConfig};

// ===========================================================================
// Plant builders
// ===========================================================================

/// `lines` parallel lines of `length` stages each, every line fed by its own
/// external link and passing material `i` to `i + 1` stage by stage.
fn build_plant(lines: u64, length: u64) -> SimulationState {
    let mut builder = SnapshotBuilder::new();
    let materials: Vec<_> = (0..=length)
        .map(|i| builder.material(&format!("M{i}")))
        .collect();

    for line in 0..lines {
        let base = line * 1_000;
        let mut previous = None;
        for stage in 0..length {
            let i = stage as usize;
            let step = builder.step(
                base + stage + 1,
                StepSpec::new(50)
                    .speeds(4, 4)
                    .machines(2)
                    .recipe(vec![(materials[i], 1)], vec![(materials[i + 1], 1)], 2),
            );
            builder.step_sensor(step, base + stage + 1, 0.01);
            let spec = LinkSpec::new(2)
                .delay(1)
                .limit(20)
                .filter(vec![materials[i]]);
            match previous {
                None => builder.inbound(base + 500, step, spec),
                Some(prev) => builder.link(base + 500 + stage, prev, step, spec),
            };
            previous = Some(step);
        }
    }
    builder.build()
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("advance");
    for &(lines, length) in &[(10, 5), (50, 10), (200, 10)] {
        // Warm the plant up so inventories and cycles are populated.
        let mut state = build_plant(lines, length);
        for _ in 0..50 {
            state = advance(&state).state;
        }
        group.bench_with_input(
            BenchmarkId::from_parameter(lines * length),
            &state,
            |b, state| b.iter(|| advance(state)),
        );
    }
    group.finish();
}

fn bench_timeline(c: &mut Criterion) {
    let state = build_plant(50, 10);
    let mut group = c.benchmark_group("timeline");
    group.sample_size(20);

    group.bench_function("run_200", |b| {
        b.iter(|| {
            let mut tl = Timeline::new(state.clone(), TimelineConfig::default());
            tl.run(200).map(|frames| frames.len())
        })
    });

    group.bench_function("toggle_and_recompute_100", |b| {
        let mut tl = Timeline::new(state.clone(), TimelineConfig::default());
        let _ = tl.run(200);
        b.iter(|| {
            let _ = tl.jump_to_tick(100);
            let _ = tl.toggle_transport_system(flowtwin_core::id::TransportId(500));
            tl.jump_to_tick(199).map(|f| f.hash)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_advance, bench_timeline);
criterion_main!(benches);
