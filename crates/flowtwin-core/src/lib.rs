//! flowtwin core -- the simulation engine of an intralogistics digital twin.
//!
//! A plant is modelled as locations holding process steps, connected by
//! transport systems through which units of material flow and customer
//! orders are fulfilled. This crate owns the entity graph, the pure tick
//! function, the frame timeline and its single structural mutation.
//!
//! # Five-Phase Tick Pipeline
//!
//! Each call to [`engine::advance`] turns the state at the end of tick
//! `t - 1` into the state at the end of tick `t`:
//!
//! 1. **Transport** -- Active links take entries in and deliver dwelled ones.
//! 2. **Production** -- Steps start recipe cycles on free resources and
//!    yield finished ones.
//! 3. **Orders** -- Orders whose units reached a terminal step complete.
//! 4. **Sensors** -- Sensors sample faults from the state's RNG.
//! 5. **Bookkeeping** -- Increment the tick counter and hash the state.
//!
//! # Timeline
//!
//! ```rust,ignore
//! let loaded = load_snapshot_json(&json, LoadOptions { seed: 42 })?;
//! let mut timeline = Timeline::new(loaded.state, TimelineConfig::default());
//! timeline.run(5)?;
//! timeline.jump_to_tick(2)?;
//! timeline.toggle_transport_system(TransportId(100))?; // frames 3.. dropped
//! timeline.jump_to_tick(5)?;                          // recomputed
//! ```
//!
//! # Key Types
//!
//! - [`graph::SimulationState`] -- Everything a tick reads and writes.
//! - [`graph::EntityGraph`] -- Arena of steps, links and locations keyed by
//!   external id.
//! - [`timeline::Timeline`] -- Append-only frames plus cursor.
//! - [`event::TickEvent`] -- What happened during a tick.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`serialize`] -- Versioned binary snapshots via bitcode.

pub mod engine;
pub mod error;
pub mod event;
pub mod fixed;
pub mod graph;
pub mod hash;
pub mod id;
pub mod inventory;
pub mod loader;
pub mod model;
pub mod mutation;
pub mod query;
pub mod registry;
pub mod replay;
pub mod rng;
pub mod serialize;
pub mod timeline;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::SimError;
pub use graph::SimulationState;
pub use timeline::{Frame, Timeline, TimelineConfig};
