use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Arena slot of a location in the entity graph.
    pub struct LocationKey;

    /// Arena slot of a process step in the entity graph.
    pub struct StepKey;

    /// Arena slot of a transport system in the entity graph.
    pub struct TransportKey;
}

macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

external_id!(
    /// Identifies a location. Assigned by the entity snapshot, stable for a run.
    LocationId,
    "location"
);
external_id!(
    /// Identifies a process step.
    StepId,
    "step"
);
external_id!(
    /// Identifies a transport system (a directed link between process steps).
    TransportId,
    "transport"
);
external_id!(
    /// Identifies a machine or worker.
    ResourceId,
    "resource"
);
external_id!(
    /// Identifies a sensor attached to a step or transport system.
    SensorId,
    "sensor"
);
external_id!(
    /// Identifies a customer order.
    OrderId,
    "order"
);
external_id!(
    /// Identifies a single inventory entry (one unit of material).
    EntryId,
    "entry"
);

/// Identifies a material in the [`MaterialRegistry`](crate::registry::MaterialRegistry).
/// Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// The kind of entity an id refers to. Used in lookup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Location,
    ProcessStep,
    TransportSystem,
    Order,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Location => "location",
            EntityKind::ProcessStep => "process step",
            EntityKind::TransportSystem => "transport system",
            EntityKind::Order => "order",
        };
        f.write_str(name)
    }
}
