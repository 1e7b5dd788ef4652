//! Shared access to one simulation from several threads.
//!
//! Ticks and seeks wait for the lock. A structural mutation never waits: if
//! another operation holds the lock it fails with
//! [`SimError::StructuralMutationConflict`] and the caller retries.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use flowtwin_core::SimError;
use flowtwin_core::fixed::Ticks;
use flowtwin_core::id::TransportId;
use flowtwin_core::mutation::MutationOutcome;
use flowtwin_core::query::FrameView;
use flowtwin_stats::{FrameKpis, SimulationReport};

use crate::error::RuntimeError;
use crate::simulation::{Simulation, SimulationRun};

/// Shared, thread-safe access to a [`Simulation`].
///
/// Ticking waits for the lock. Structural mutations fail with
/// `StructuralMutationConflict` instead of waiting while another operation
/// holds it.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    inner: Arc<Mutex<Simulation>>,
}

impl SimulationHandle {
    pub fn new(simulation: Simulation) -> Self {
        Self {
            inner: Arc::new(Mutex::new(simulation)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Simulation>, RuntimeError> {
        self.inner.lock().map_err(|_| RuntimeError::Poisoned)
    }

    fn try_lock(&self) -> Result<MutexGuard<'_, Simulation>, RuntimeError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("structural mutation rejected, simulation busy");
                Err(SimError::StructuralMutationConflict.into())
            }
            Err(TryLockError::Poisoned(_)) => Err(RuntimeError::Poisoned),
        }
    }

    /// Run `f` with exclusive access.
    pub fn with<R>(&self, f: impl FnOnce(&mut Simulation) -> R) -> Result<R, RuntimeError> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    // -- Timeline operations ------------------------------------------------

    /// Returns the number of frames computed.
    pub fn run(&self, ticks: Ticks) -> Result<usize, RuntimeError> {
        self.lock()?.run(ticks).map(|frames| frames.len())
    }

    /// Returns the tick of the new frame.
    pub fn tick_forward(&self) -> Result<Ticks, RuntimeError> {
        self.lock()?.tick_forward().map(|frame| frame.tick)
    }

    pub fn jump_to_tick(&self, tick: Ticks) -> Result<Ticks, RuntimeError> {
        self.lock()?.jump_to_tick(tick).map(|frame| frame.tick)
    }

    pub fn toggle_transport_system(&self, id: TransportId) -> Result<MutationOutcome, RuntimeError> {
        self.try_lock()?.toggle_transport_system(id)
    }

    pub fn set_transport_active(
        &self,
        id: TransportId,
        active: bool,
    ) -> Result<MutationOutcome, RuntimeError> {
        self.try_lock()?.set_transport_active(id, active)
    }

    // -- Read access --------------------------------------------------------

    pub fn current_tick(&self) -> Result<Option<Ticks>, RuntimeError> {
        Ok(self.lock()?.current_tick())
    }

    pub fn current_view(&self) -> Result<Option<FrameView>, RuntimeError> {
        Ok(self.lock()?.current_view())
    }

    pub fn latest_kpis(&self) -> Result<Option<FrameKpis>, RuntimeError> {
        Ok(self.lock()?.aggregator().latest().cloned())
    }

    pub fn simulation_run(&self) -> Result<SimulationRun, RuntimeError> {
        Ok(self.lock()?.simulation_run())
    }

    pub fn report(&self) -> Result<SimulationReport, RuntimeError> {
        Ok(self.lock()?.report())
    }
}
