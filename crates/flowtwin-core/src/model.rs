//! Entity types of the intralogistics model.
//!
//! Relations between entities are stored as external ids and resolved
//! through the lookup tables of [`EntityGraph`](crate::graph::EntityGraph);
//! no entity owns or points at another, so snapshots clone cheaply and never
//! form reference cycles.

use crate::fixed::{Fixed64, Ticks};
use crate::id::{
    LocationId, MaterialId, OrderId, ResourceId, SensorId, StepId, TransportId,
};
use crate::inventory::Inventory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A site grouping process steps and the resources not yet assigned to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub description: Option<String>,
    /// Process steps in snapshot order.
    pub steps: Vec<StepId>,
    /// Resources listed on the location but not attached to any step.
    /// They are carried along and never gate production.
    pub unassigned_resources: Vec<Resource>,
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// What kind of capacity a resource provides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Machine,
    Worker { roles: Vec<String> },
}

/// A machine or worker. Each available resource is one production slot of
/// the step it is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub kind: ResourceKind,
    /// Unavailable resources (broken machine, worker off shift) never start
    /// a production cycle.
    pub available: bool,
}

impl Resource {
    pub fn is_machine(&self) -> bool {
        matches!(self.kind, ResourceKind::Machine)
    }
}

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// A `(material, quantity)` pair of a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub material: MaterialId,
    pub quantity: u32,
}

/// Consumption and yield of one production cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub inputs: Vec<RecipeLine>,
    pub outputs: Vec<RecipeLine>,
}

impl Recipe {
    /// Whether `material` is consumed by this recipe.
    pub fn consumes(&self, material: MaterialId) -> bool {
        self.inputs.iter().any(|line| line.material == material)
    }
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// One line of a sensor log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub tick: Ticks,
    pub message: String,
}

/// A sensor on a step or link that may report faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub name: String,
    /// Probability in `[0, 1]` of logging a fault per tick.
    pub faulty_rate: Fixed64,
    pub log: Vec<LogEntry>,
}

// ---------------------------------------------------------------------------
// Process step
// ---------------------------------------------------------------------------

/// Coarse production status of a process step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Nothing has run yet and nothing is running.
    #[default]
    Pending,
    /// At least one production cycle occupies a resource this tick.
    Proceeding,
    /// A recipe is configured but no resource is free to run it.
    Blocked,
    /// Idle after at least one completed cycle.
    Complete,
}

/// A station that receives, holds, transforms and releases materials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub id: StepId,
    pub name: String,
    pub location: LocationId,
    pub status: StepStatus,
    /// Maximum entries accepted per tick across all incoming links.
    pub input_speed: u32,
    /// Maximum entries released per tick across all outgoing links.
    pub output_speed: u32,
    /// Ticks a production cycle occupies its resource.
    pub recipe_rate: u32,
    pub inventory: Inventory,
    pub resources: Vec<Resource>,
    pub sensors: Vec<Sensor>,
    pub recipe: Option<Recipe>,
    /// Incoming transport systems.
    pub inputs: Vec<TransportId>,
    /// Outgoing transport systems.
    pub outputs: Vec<TransportId>,
}

impl ProcessStep {
    /// A step with no outgoing links is where finished goods end up.
    pub fn is_terminal(&self) -> bool {
        self.outputs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Transport system
// ---------------------------------------------------------------------------

/// Materials allowed through a transport system. An empty filter admits
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub materials: BTreeSet<MaterialId>,
}

impl Filter {
    /// An empty filter, which passes every material.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// A filter passing exactly `materials`.
    pub fn only(materials: impl IntoIterator<Item = MaterialId>) -> Self {
        Self {
            materials: materials.into_iter().collect(),
        }
    }

    /// Whether `material` passes. An empty filter passes everything.
    pub fn allows(&self, material: MaterialId) -> bool {
        self.materials.is_empty() || self.materials.contains(&material)
    }
}

/// A directed link between two steps, or from outside into a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSystem {
    pub id: TransportId,
    pub name: String,
    /// Source step. `None` marks an external inbound link.
    pub start: Option<StepId>,
    pub end: StepId,
    /// Ticks an entry must dwell in the link before it may exit.
    pub transport_delay: u32,
    /// Maximum entries delivered to the destination per tick.
    pub input_speed: u32,
    /// Maximum entries taken in from the source per tick.
    pub output_speed: u32,
    pub inventory: Inventory,
    pub filter: Filter,
    pub active: bool,
    pub sensors: Vec<Sensor>,
    /// Orders released or reserved through this link.
    pub orders: Vec<OrderId>,
}

impl TransportSystem {
    /// Whether entries enter the system through this link.
    pub fn is_external(&self) -> bool {
        self.start.is_none()
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// A request for units released or reserved through a transport link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub quantity: u32,
    /// Material requested. `None` lets the releasing link pick its first
    /// filter material, or reserve whatever passes.
    pub material: Option<MaterialId>,
    pub started_at: Option<Ticks>,
    pub completed_at: Option<Ticks>,
    /// Set once all `quantity` units have been released or reserved.
    pub materials_reserved: bool,
    /// Units released or reserved so far.
    pub reserved: u32,
    /// Orders whose outputs absorbed some of this order's units. This order
    /// is not done before they are.
    pub merged_into: BTreeSet<OrderId>,
}

impl Order {
    /// A pending order with nothing reserved.
    pub fn new(id: OrderId, quantity: u32, material: Option<MaterialId>) -> Self {
        Self {
            id,
            status: OrderStatus::Pending,
            quantity,
            material,
            started_at: None,
            completed_at: None,
            materials_reserved: false,
            reserved: 0,
            merged_into: BTreeSet::new(),
        }
    }

    /// Whether the order still needs units released or reserved.
    pub fn needs_units(&self) -> bool {
        self.status != OrderStatus::Completed && self.reserved < self.quantity
    }

    /// Whether a unit of `material` may be reserved for this order.
    pub fn accepts(&self, material: MaterialId) -> bool {
        self.material.is_none_or(|m| m == material)
    }

    /// Record one released or reserved unit. Returns `true` when this call
    /// moved the order from `Pending` to `InProgress`.
    pub(crate) fn reserve_unit(&mut self, tick: Ticks) -> bool {
        self.reserved += 1;
        if self.reserved >= self.quantity {
            self.materials_reserved = true;
        }
        if self.status == OrderStatus::Pending {
            self.status = OrderStatus::InProgress;
            self.started_at = Some(tick);
            return true;
        }
        false
    }
}
