//! Events recorded while a tick is applied.
//!
//! Every frame carries the events of the tick that produced it. Events are
//! plain data: capacity overflow, blocked steps and sensor faults are signals
//! for the aggregator, never failures.

use crate::fixed::Ticks;
use crate::id::{MaterialId, OrderId, SensorId, StepId, TransportId};
use crate::inventory::InventoryOwner;
use serde::{Deserialize, Serialize};

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickEvent {
    // -- Transport --
    /// Entries entered a transport system from its source.
    ItemsLoaded {
        transport: TransportId,
        quantity: u32,
        tick: Ticks,
    },
    /// Entries left a transport system into its destination step.
    ItemsDelivered {
        transport: TransportId,
        quantity: u32,
        tick: Ticks,
    },

    // -- Production --
    CycleStarted {
        step: StepId,
        consumed: u32,
        tick: Ticks,
    },
    CycleCompleted {
        step: StepId,
        produced: u32,
        tick: Ticks,
    },
    /// A step with a recipe had no free resource this tick.
    StepBlocked { step: StepId, tick: Ticks },

    // -- Capacity --
    /// An inventory could not take everything offered to it. `held` units
    /// stayed upstream, `dropped` units were discarded.
    CapacityExceeded {
        owner: InventoryOwner,
        material: Option<MaterialId>,
        held: u32,
        dropped: u32,
        tick: Ticks,
    },

    // -- Orders --
    OrderStarted { order: OrderId, tick: Ticks },
    OrderCompleted {
        order: OrderId,
        /// Finished units removed from terminal steps.
        removed: u32,
        tick: Ticks,
    },

    // -- Sensors --
    SensorFault {
        sensor: SensorId,
        owner: InventoryOwner,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickEventKind {
    ItemsLoaded,
    ItemsDelivered,
    CycleStarted,
    CycleCompleted,
    StepBlocked,
    CapacityExceeded,
    OrderStarted,
    OrderCompleted,
    SensorFault,
}

impl TickEvent {
    /// Discriminant used for filtering.
    pub fn kind(&self) -> TickEventKind {
        match self {
            TickEvent::ItemsLoaded { .. } => TickEventKind::ItemsLoaded,
            TickEvent::ItemsDelivered { .. } => TickEventKind::ItemsDelivered,
            TickEvent::CycleStarted { .. } => TickEventKind::CycleStarted,
            TickEvent::CycleCompleted { .. } => TickEventKind::CycleCompleted,
            TickEvent::StepBlocked { .. } => TickEventKind::StepBlocked,
            TickEvent::CapacityExceeded { .. } => TickEventKind::CapacityExceeded,
            TickEvent::OrderStarted { .. } => TickEventKind::OrderStarted,
            TickEvent::OrderCompleted { .. } => TickEventKind::OrderCompleted,
            TickEvent::SensorFault { .. } => TickEventKind::SensorFault,
        }
    }

    /// Tick during which the event happened.
    pub fn tick(&self) -> Ticks {
        match self {
            TickEvent::ItemsLoaded { tick, .. }
            | TickEvent::ItemsDelivered { tick, .. }
            | TickEvent::CycleStarted { tick, .. }
            | TickEvent::CycleCompleted { tick, .. }
            | TickEvent::StepBlocked { tick, .. }
            | TickEvent::CapacityExceeded { tick, .. }
            | TickEvent::OrderStarted { tick, .. }
            | TickEvent::OrderCompleted { tick, .. }
            | TickEvent::SensorFault { tick, .. } => *tick,
        }
    }
}

/// Count of events of `kind` in `events`.
pub fn count_kind(events: &[TickEvent], kind: TickEventKind) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}
