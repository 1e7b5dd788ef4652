//! Runs the bundled press line scenario through the runtime layer.

use std::path::PathBuf;

use flowtwin_core::id::{OrderId, TransportId};
use flowtwin_core::model::OrderStatus;
use flowtwin_core::replay::ReplayCommand;
use flowtwin_runtime::{MockDriver, Simulation, SimulationConfig, SimulationHandle, logging};
use flowtwin_stats::SimulationReport;

fn scenario(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(file)
}

fn press_line() -> (Simulation, SimulationConfig) {
    logging::init_test();
    let config = SimulationConfig::load(&scenario("press_line.ron")).unwrap();
    let sim = Simulation::load(&scenario("press_line.json"), &config).unwrap();
    (sim, config)
}

#[test]
fn bundled_config_loads() {
    let (sim, config) = press_line();
    assert_eq!(config.name, "press line");
    assert_eq!(config.seed, 42);
    assert_eq!(config.ticks, 40);
    assert_eq!(sim.name(), "press line");
    assert!(sim.materials().id("Panel").is_some());
}

#[test]
fn order_is_delivered_to_the_dock() {
    let (mut sim, config) = press_line();
    sim.run(config.ticks).unwrap();

    let last = sim.timeline().last_frame().unwrap();
    let order = last.state.order(OrderId(1)).unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert!(order.completed_at.unwrap() > order.started_at.unwrap());

    let kpis = sim.aggregator().latest().unwrap();
    assert_eq!(kpis.completed_orders, 1);
    // Six panels pressed and six boxes packed.
    assert_eq!(kpis.units_produced_total, 12);
}

#[test]
fn report_is_written_as_json() {
    let (mut sim, config) = press_line();
    sim.run(config.ticks).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    std::fs::write(&path, sim.report().to_json_pretty().unwrap()).unwrap();

    let read = SimulationReport::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(read.simulation_name, "press line");
    assert_eq!(read.kpi("completedOrders"), Some(1.0));
    assert_eq!(read.kpi("ticks"), Some(40.0));
}

#[test]
fn stopping_the_press_conveyor_starves_packing() {
    let (sim, _) = press_line();
    let handle = SimulationHandle::new(sim);
    handle.run(1).unwrap();
    handle.toggle_transport_system(TransportId(101)).unwrap();
    handle.jump_to_tick(30).unwrap();

    let run = handle.simulation_run().unwrap();
    assert!(run.kpis.iter().all(|k| k.completed_orders == 0));
    let view = handle.current_view().unwrap().unwrap();
    let conveyor = view
        .transports
        .iter()
        .find(|t| t.id == TransportId(101))
        .unwrap();
    assert!(!conveyor.active);
}

#[test]
fn mock_session_is_replayable() {
    let (sim, _) = press_line();
    let mut driver = MockDriver::new(sim).unwrap();
    driver
        .apply_all([
            ReplayCommand::Run { ticks: 10 },
            ReplayCommand::JumpToTick { tick: 4 },
            ReplayCommand::ToggleTransport {
                transport: TransportId(102),
            },
            ReplayCommand::JumpToTick { tick: 12 },
        ])
        .unwrap();
    let (_, log) = driver.into_parts();
    let bytes = log.serialize().unwrap();
    let restored = flowtwin_core::replay::ReplayLog::deserialize(&bytes).unwrap();
    let result = flowtwin_core::replay::replay_and_verify(&restored).unwrap();
    assert!(result.is_verified);
    assert_eq!(result.commands_executed, 4);
}
