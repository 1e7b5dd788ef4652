//! End-to-end scenarios over the timeline API.

use flowtwin_core::event::{TickEvent, TickEventKind, count_kind};
use flowtwin_core::graph::SimulationState;
use flowtwin_core::id::*;
use flowtwin_core::loader::{LoadOptions, load_snapshot_json};
use flowtwin_core::model::{OrderStatus, StepStatus};
use flowtwin_core::test_utils::*;
use flowtwin_core::{SimError, Timeline, TimelineConfig};

fn timeline(max_ticks: u64) -> (Timeline, LineIds) {
    let (state, ids) = single_step_line();
    (Timeline::new(state, TimelineConfig { max_ticks }), ids)
}

// ---------------------------------------------------------------------------
// Inbound A -> B line
// ---------------------------------------------------------------------------

#[test]
fn inbound_line_arithmetic() {
    let (mut tl, ids) = timeline(10);
    let frames = tl.run(3).unwrap();
    assert_eq!(frames.len(), 3);

    // Two units of A arrive; nothing is consumed on arrival.
    assert_eq!(material_count(&frames[0].state, ids.step, ids.a), 2);
    assert_eq!(material_count(&frames[0].state, ids.step, ids.b), 0);

    // One A consumed, one B produced, one A left plus two new arrivals.
    assert_eq!(material_count(&frames[1].state, ids.step, ids.a), 3);
    assert_eq!(material_count(&frames[1].state, ids.step, ids.b), 1);

    assert_eq!(material_count(&frames[2].state, ids.step, ids.a), 4);
    assert_eq!(material_count(&frames[2].state, ids.step, ids.b), 2);
    assert_eq!(
        frames[2].state.graph.step(ids.step).unwrap().status,
        StepStatus::Proceeding
    );
}

#[test]
fn disabling_inbound_link_stops_inflow() {
    let (mut tl, ids) = timeline(10);
    tl.run(5).unwrap();
    tl.jump_to_tick(2).unwrap();
    let outcome = tl.toggle_transport_system(ids.inbound).unwrap();
    assert_eq!(outcome.discarded, 2);
    assert_eq!(tl.len(), 3);

    tl.jump_to_tick(5).unwrap();
    assert_eq!(tl.len(), 6);
    assert_eq!(tl.current_tick(), Some(5));

    let frames = tl.frames();
    for frame in &frames[3..] {
        assert_eq!(count_kind(&frame.events, TickEventKind::ItemsLoaded), 0);
        assert_eq!(count_kind(&frame.events, TickEventKind::ItemsDelivered), 0);
    }
    // Queued A keeps draining at one unit per tick.
    let a: Vec<_> = frames[2..]
        .iter()
        .map(|f| material_count(&f.state, ids.step, ids.a))
        .collect();
    let b: Vec<_> = frames[2..]
        .iter()
        .map(|f| material_count(&f.state, ids.step, ids.b))
        .collect();
    assert_eq!(a, vec![4, 3, 2, 1]);
    assert_eq!(b, vec![2, 3, 4, 5]);
}

#[test]
fn re_enabling_resumes_inflow() {
    let (mut tl, ids) = timeline(10);
    tl.run(2).unwrap();
    tl.toggle_transport_system(ids.inbound).unwrap();
    tl.jump_to_tick(3).unwrap();
    tl.toggle_transport_system(ids.inbound).unwrap();
    let frame = tl.tick_forward().unwrap();
    assert_eq!(count_kind(&frame.events, TickEventKind::ItemsDelivered), 1);
    assert_eq!(tl.mutations().len(), 2);
}

#[test]
fn errors_leave_timeline_consistent() {
    let (mut tl, _) = timeline(4);
    assert!(tl.tick_forward().is_err());
    tl.run(4).unwrap();
    assert!(matches!(
        tl.jump_to_tick(4),
        Err(SimError::OutOfRange { requested: 4, len: 4 })
    ));
    assert!(tl.toggle_transport_system(TransportId(1)).is_err());
    for (i, frame) in tl.frames().iter().enumerate() {
        assert_eq!(frame.tick, i as u64);
    }
    assert_eq!(tl.current_tick(), Some(3));
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[test]
fn order_flows_to_completion() {
    let (state, ids) = order_line(3);
    let mut tl = Timeline::new(state, TimelineConfig { max_ticks: 20 });
    let frames = tl.run(6).unwrap();

    let order = |tick: usize| frames[tick].state.order(ids.order).unwrap().clone();
    assert_eq!(order(0).status, OrderStatus::InProgress);
    assert_eq!(order(0).started_at, Some(0));
    assert!(frames[0]
        .events
        .contains(&TickEvent::OrderStarted { order: ids.order, tick: 0 }));
    assert!(order(2).materials_reserved);
    assert_eq!(order(3).status, OrderStatus::InProgress);
    assert_eq!(material_count(&frames[3].state, ids.dock, ids.b), 2);

    assert_eq!(order(4).status, OrderStatus::Completed);
    assert_eq!(order(4).completed_at, Some(4));
    assert!(frames[4].events.contains(&TickEvent::OrderCompleted {
        order: ids.order,
        removed: 3,
        tick: 4
    }));
    assert_eq!(material_count(&frames[4].state, ids.dock, ids.b), 0);
    assert_eq!(
        frames[4].state.graph.step(ids.press).unwrap().status,
        StepStatus::Complete
    );

    // Once satisfied the inbound link releases nothing more.
    assert_eq!(frames[5].state.graph.total_entries(), 0);
}

#[test]
fn order_is_in_progress_for_at_least_one_frame() {
    let (state, ids) = order_line(1);
    let mut tl = Timeline::new(state, TimelineConfig::default());
    tl.run(10).unwrap();
    let statuses: Vec<_> = tl
        .frames()
        .iter()
        .map(|f| f.state.order(ids.order).unwrap().status)
        .collect();
    let first_done = statuses
        .iter()
        .position(|s| *s == OrderStatus::Completed)
        .unwrap();
    assert!(first_done > 0);
    assert_eq!(statuses[first_done - 1], OrderStatus::InProgress);
    assert!(statuses[first_done..].iter().all(|s| *s == OrderStatus::Completed));
}

#[test]
fn untagged_units_are_reserved_by_downstream_link_orders() {
    let mut builder = SnapshotBuilder::new();
    let a = builder.material("A");
    let store = builder.step(1, StepSpec::new(10));
    let dock = builder.step(2, StepSpec::new(10));
    builder.stock(store, a, 2);
    let link = builder.link(10, store, dock, LinkSpec::new(2));
    let order = builder.order(5, link, 2, None);
    let state = builder.build();

    let frames = run_ticks(&state, 3);
    let o = frames[1].state.order(order).unwrap();
    assert_eq!(o.status, OrderStatus::InProgress);
    assert_eq!(o.started_at, Some(1));
    assert!(o.materials_reserved);
    assert_eq!(
        frames[2].state.order(order).unwrap().status,
        OrderStatus::Completed
    );
}

/// Inbound A feeds a press turning `inputs` A into `outputs` B, conveyed to
/// a terminal dock. One order per entry of `quantities`, all on the inbound
/// link.
fn press_line(
    inputs: u32,
    outputs: u32,
    quantities: &[u32],
) -> (SimulationState, StepId, MaterialId, Vec<OrderId>) {
    let mut builder = SnapshotBuilder::new();
    let a = builder.material("A");
    let b = builder.material("B");
    let press = builder.step(
        1,
        StepSpec::new(10)
            .machines(1)
            .recipe(vec![(a, inputs)], vec![(b, outputs)], 1),
    );
    let dock = builder.step(2, StepSpec::new(20));
    let inbound = builder.inbound(100, press, LinkSpec::new(1).filter(vec![a]));
    builder.link(101, press, dock, LinkSpec::new(4).filter(vec![b]));
    let orders = quantities
        .iter()
        .enumerate()
        .map(|(i, &qty)| builder.order(i as u64 + 1, inbound, qty, Some(a)))
        .collect();
    (builder.build(), dock, b, orders)
}

#[test]
fn order_completes_when_inputs_are_combined() {
    let (state, dock, b, orders) = press_line(2, 1, &[2]);
    let frames = run_ticks(&state, 8);
    let order = |tick: usize| frames[tick].state.order(orders[0]).unwrap().clone();

    // Both A arrive by tick 1, are pressed into one B at tick 2 and reach
    // the dock at tick 3.
    assert_eq!(order(2).status, OrderStatus::InProgress);
    assert_eq!(order(3).status, OrderStatus::Completed);
    assert_eq!(order(3).completed_at, Some(3));
    assert!(frames[3].events.contains(&TickEvent::OrderCompleted {
        order: orders[0],
        removed: 1,
        tick: 3
    }));
    assert_eq!(material_count(&frames[3].state, dock, b), 0);
    assert_eq!(frames[7].state.graph.total_entries(), 0);
}

#[test]
fn order_takes_every_unit_of_a_split() {
    let (state, dock, b, orders) = press_line(1, 2, &[1]);
    let frames = run_ticks(&state, 6);

    assert_eq!(
        frames[1].state.order(orders[0]).unwrap().status,
        OrderStatus::InProgress
    );
    assert!(frames[2].events.contains(&TickEvent::OrderCompleted {
        order: orders[0],
        removed: 2,
        tick: 2
    }));
    assert_eq!(material_count(&frames[2].state, dock, b), 0);
    assert_eq!(frames[5].state.graph.total_entries(), 0);
}

#[test]
fn merged_order_waits_for_the_shared_output() {
    let (state, dock, b, orders) = press_line(2, 1, &[1, 1]);
    let frames = run_ticks(&state, 5);
    let status = |tick: usize, i: usize| frames[tick].state.order(orders[i]).unwrap().status;

    // The press combines one unit of each order at tick 2; the output keeps
    // the first order's tag.
    assert!(frames[2].state.order(orders[1]).unwrap().merged_into.contains(&orders[0]));
    assert_eq!(status(2, 0), OrderStatus::InProgress);
    assert_eq!(status(2, 1), OrderStatus::InProgress);

    assert_eq!(status(3, 0), OrderStatus::Completed);
    assert_eq!(status(3, 1), OrderStatus::Completed);
    assert!(frames[3].events.contains(&TickEvent::OrderCompleted {
        order: orders[1],
        removed: 0,
        tick: 3
    }));
    assert_eq!(material_count(&frames[3].state, dock, b), 0);
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

#[test]
fn certain_faults_log_every_tick() {
    let mut builder = SnapshotBuilder::new();
    let a = builder.material("A");
    let step = builder.step(1, StepSpec::new(5));
    let link = builder.inbound(9, step, LinkSpec::new(1).filter(vec![a]));
    builder.step_sensor(step, 1, 1.0);
    builder.link_sensor(link, 2, 0.0);
    let state = builder.build();

    let frames = run_ticks(&state, 4);
    let last = &frames[3].state;
    let log = &last.graph.step(step).unwrap().sensors[0].log;
    assert_eq!(log.len(), 4);
    let ticks: Vec<_> = log.iter().map(|l| l.tick).collect();
    assert_eq!(ticks, vec![0, 1, 2, 3]);
    assert!(log.windows(2).all(|w| w[0].id < w[1].id));
    assert!(last.graph.transport(link).unwrap().sensors[0].log.is_empty());
    for frame in &frames {
        assert_eq!(count_kind(&frame.events, TickEventKind::SensorFault), 1);
    }
}

#[test]
fn sensor_faults_depend_only_on_seed() {
    let build = |seed| {
        let mut builder = SnapshotBuilder::new();
        builder.seed(seed);
        let step = builder.step(1, StepSpec::new(5));
        builder.step_sensor(step, 1, 0.5);
        builder.step_sensor(step, 2, 0.25);
        builder.build()
    };
    let faults = |seed| -> Vec<u64> {
        run_ticks(&build(seed), 50).iter().map(|f| f.hash).collect()
    };
    assert_eq!(faults(11), faults(11));
    assert_ne!(faults(11), faults(12));
}

// ---------------------------------------------------------------------------
// Loader to timeline
// ---------------------------------------------------------------------------

#[test]
fn json_snapshot_runs_like_builder_snapshot() {
    let json = r#"{ "locations": [{ "id": 1, "name": "Plant", "processSteps": [{
        "id": 1, "name": "Press", "inputSpeed": 2, "outputSpeed": 2, "recipeRate": 1,
        "inventory": { "limit": 10 },
        "resources": [{ "id": 1, "name": "Press", "type": "machine" }],
        "recipe": {
            "inputs": [{ "material": "A", "quantity": 1 }],
            "outputs": [{ "material": "B", "quantity": 1 }]
        },
        "inputs": [{
            "id": 100, "name": "Inbound", "startStepId": null,
            "inputSpeed": 2, "outputSpeed": 2,
            "inventory": { "limit": 10 }, "filter": { "materials": ["A"] }
        }]
    }] }] }"#;
    let loaded = load_snapshot_json(json, LoadOptions { seed: 7 }).unwrap();
    let a = loaded.materials.id("A").unwrap();
    let b = loaded.materials.id("B").unwrap();
    let mut tl = Timeline::new(loaded.state, TimelineConfig::default());
    let frames = tl.run(3).unwrap();

    let (reference, ids) = single_step_line();
    let expected = run_ticks(&reference, 3);
    for (got, want) in frames.iter().zip(&expected) {
        assert_eq!(
            material_count(&got.state, StepId(1), a),
            material_count(&want.state, ids.step, ids.a)
        );
        assert_eq!(
            material_count(&got.state, StepId(1), b),
            material_count(&want.state, ids.step, ids.b)
        );
    }
}
