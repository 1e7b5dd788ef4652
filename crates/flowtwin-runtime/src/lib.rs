//! Runtime layer of flowtwin: configuration, shared simulation handles,
//! tick drivers and logging setup around the core timeline.
//!
//! ```rust,ignore
//! flowtwin_runtime::logging::init();
//! let config = SimulationConfig::load(Path::new("plant.ron"))?;
//! let sim = Simulation::load(Path::new("plant.json"), &config)?;
//! let handle = SimulationHandle::new(sim);
//! let driver = LiveDriver::spawn(handle.clone(), config.live_interval());
//! // ... later
//! driver.stop();
//! println!("{}", handle.report()?.to_json_pretty()?);
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod handle;
pub mod logging;
pub mod simulation;

pub use config::SimulationConfig;
pub use driver::{LiveDriver, LiveStop, MockDriver};
pub use error::RuntimeError;
pub use handle::SimulationHandle;
pub use simulation::{Simulation, SimulationRun};
