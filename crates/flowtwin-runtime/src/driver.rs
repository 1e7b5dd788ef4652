//! Drivers decide when ticks happen.
//!
//! [`LiveDriver`] advances a shared simulation on a wall-clock interval from
//! a background thread. [`MockDriver`] applies commands one at a time under
//! caller control and records them into a replay log.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flowtwin_core::replay::{ReplayCommand, ReplayLog, cursor_hash};

use crate::error::RuntimeError;
use crate::handle::SimulationHandle;
use crate::simulation::Simulation;

// ---------------------------------------------------------------------------
// LiveDriver
// ---------------------------------------------------------------------------

/// Why a live driver stopped.
#[derive(Debug)]
pub enum LiveStop {
    /// [`LiveDriver::stop`] was called.
    Cancelled { ticks: u64 },
    /// The timeline reached its tick limit.
    Exhausted { ticks: u64 },
    Failed(RuntimeError),
}

/// Calls `tick_forward` every `interval` until stopped.
///
/// Stopping only takes effect between ticks, so a frame is never half
/// computed.
pub struct LiveDriver {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<LiveStop>>,
}

impl LiveDriver {
    /// Start ticking `handle`. An empty timeline is seeded with its first
    /// frame.
    pub fn spawn(handle: SimulationHandle, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = thread::spawn(move || live_loop(&handle, interval, &flag));
        Self {
            stop,
            worker: Some(worker),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Ask the worker to stop and wait for it.
    pub fn stop(mut self) -> LiveStop {
        self.stop.store(true, Ordering::Relaxed);
        self.join_worker()
    }

    /// Wait for the worker to stop on its own.
    pub fn join(mut self) -> LiveStop {
        self.join_worker()
    }

    fn join_worker(&mut self) -> LiveStop {
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(stop)) => stop,
            Some(Err(_)) => LiveStop::Failed(RuntimeError::Poisoned),
            None => LiveStop::Cancelled { ticks: 0 },
        }
    }
}

impl Drop for LiveDriver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn live_loop(handle: &SimulationHandle, interval: Duration, stop: &AtomicBool) -> LiveStop {
    let mut ticks = 0;
    tracing::info!(interval_ms = interval.as_millis() as u64, "live driver started");
    loop {
        if stop.load(Ordering::Relaxed) {
            tracing::info!(ticks, "live driver cancelled");
            return LiveStop::Cancelled { ticks };
        }
        let step = handle.with(|sim| {
            if sim.timeline().is_empty() {
                sim.run(1).map(|_| ())
            } else {
                sim.tick_forward().map(|_| ())
            }
        });
        match step {
            Ok(Ok(())) => ticks += 1,
            Ok(Err(RuntimeError::Sim(flowtwin_core::SimError::OutOfRange { .. }))) => {
                tracing::info!(ticks, "live driver reached tick limit");
                return LiveStop::Exhausted { ticks };
            }
            Ok(Err(err)) | Err(err) => {
                tracing::error!(%err, "live driver failed");
                return LiveStop::Failed(err);
            }
        }
        thread::sleep(interval);
    }
}

// ---------------------------------------------------------------------------
// MockDriver
// ---------------------------------------------------------------------------

/// Manual driver for tests and tooling. Every successful command is recorded
/// with the resulting cursor hash, so the session can be replayed and
/// verified later.
#[derive(Debug)]
pub struct MockDriver {
    simulation: Simulation,
    log: ReplayLog,
}

impl MockDriver {
    pub fn new(simulation: Simulation) -> Result<Self, RuntimeError> {
        let log = simulation.replay_log()?;
        Ok(Self { simulation, log })
    }

    /// Apply `cmd`. Failed commands are not recorded.
    pub fn apply(&mut self, cmd: ReplayCommand) -> Result<(), RuntimeError> {
        match cmd {
            ReplayCommand::Run { ticks } => {
                self.simulation.run(ticks)?;
            }
            ReplayCommand::TickForward => {
                self.simulation.tick_forward()?;
            }
            ReplayCommand::JumpToTick { tick } => {
                self.simulation.jump_to_tick(tick)?;
            }
            ReplayCommand::ToggleTransport { transport } => {
                self.simulation.toggle_transport_system(transport)?;
            }
        }
        let hash = cursor_hash(self.simulation.timeline());
        self.log.record_with_hash(cmd, hash);
        Ok(())
    }

    pub fn apply_all(
        &mut self,
        cmds: impl IntoIterator<Item = ReplayCommand>,
    ) -> Result<(), RuntimeError> {
        for cmd in cmds {
            self.apply(cmd)?;
        }
        Ok(())
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn log(&self) -> &ReplayLog {
        &self.log
    }

    pub fn into_parts(self) -> (Simulation, ReplayLog) {
        (self.simulation, self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use flowtwin_core::loader::LoadedSnapshot;
    use flowtwin_core::registry::MaterialRegistry;
    use flowtwin_core::replay::replay_and_verify;
    use flowtwin_core::test_utils::*;

    fn simulation(max_ticks: u64) -> (Simulation, LineIds) {
        let (state, ids) = single_step_line();
        let loaded = LoadedSnapshot {
            state,
            materials: MaterialRegistry::default(),
        };
        let config = SimulationConfig {
            max_ticks,
            ticks: 0,
            ..SimulationConfig::default()
        };
        (Simulation::new("line", loaded, &config), ids)
    }

    #[test]
    fn mock_session_replays_verified() {
        let (sim, ids) = simulation(50);
        let mut driver = MockDriver::new(sim).unwrap();
        driver
            .apply_all([
                ReplayCommand::Run { ticks: 5 },
                ReplayCommand::JumpToTick { tick: 2 },
                ReplayCommand::ToggleTransport {
                    transport: ids.inbound,
                },
                ReplayCommand::JumpToTick { tick: 6 },
                ReplayCommand::TickForward,
            ])
            .unwrap();
        assert_eq!(driver.simulation().current_tick(), Some(7));

        let (sim, log) = driver.into_parts();
        assert_eq!(log.command_count(), 5);
        let result = replay_and_verify(&log).unwrap();
        assert!(result.is_verified);
        assert_eq!(
            result.timeline.current_frame().map(|f| f.hash),
            sim.timeline().current_frame().map(|f| f.hash)
        );
    }

    #[test]
    fn failed_command_is_not_recorded() {
        let (sim, _) = simulation(3);
        let mut driver = MockDriver::new(sim).unwrap();
        assert!(driver.apply(ReplayCommand::TickForward).is_err());
        assert!(driver.apply(ReplayCommand::Run { ticks: 4 }).is_err());
        assert_eq!(driver.log().command_count(), 0);
    }

    #[test]
    fn live_driver_runs_until_exhausted() {
        let (sim, _) = simulation(4);
        let handle = SimulationHandle::new(sim);
        let driver = LiveDriver::spawn(handle.clone(), Duration::from_millis(1));
        match driver.join() {
            LiveStop::Exhausted { ticks } => assert_eq!(ticks, 4),
            other => panic!("unexpected stop: {other:?}"),
        }
        assert_eq!(handle.current_tick().unwrap(), Some(3));
    }

    #[test]
    fn live_driver_stops_between_ticks() {
        let (sim, _) = simulation(100_000);
        let handle = SimulationHandle::new(sim);
        let driver = LiveDriver::spawn(handle.clone(), Duration::from_millis(1));
        thread::sleep(Duration::from_millis(20));
        assert!(driver.is_running());
        let ticks = match driver.stop() {
            LiveStop::Cancelled { ticks } => ticks,
            other => panic!("unexpected stop: {other:?}"),
        };
        let run = handle.simulation_run().unwrap();
        assert_eq!(run.frames.len() as u64, ticks);
        assert_eq!(run.kpis.len() as u64, ticks);
    }
}
