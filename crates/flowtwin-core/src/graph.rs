//! The entity graph and the full simulation state.
//!
//! Entities live in `SlotMap` arenas. External integer ids resolve to arena
//! keys through ordered lookup tables, and every id-ordered iteration goes
//! through those tables so that processing order never depends on arena
//! layout.

use crate::fixed::Ticks;
use crate::id::{
    EntityKind, LocationId, LocationKey, OrderId, ResourceId, StepId, StepKey, TransportId,
    TransportKey,
};
use crate::model::{Location, Order, ProcessStep, TransportSystem};
use crate::rng::SimRng;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while assembling an entity graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: EntityKind, id: u64 },
    #[error("{kind} {id} not found")]
    Missing { kind: EntityKind, id: u64 },
}

// ---------------------------------------------------------------------------
// Production runtime state
// ---------------------------------------------------------------------------

/// A running production cycle. Inputs were consumed when it started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionCycle {
    pub resource: ResourceId,
    pub started_at: Ticks,
    /// Last tick the cycle occupies its resource; outputs appear at the end
    /// of this tick.
    pub completes_at: Ticks,
    /// Reserved input units consumed per order.
    pub orders: BTreeMap<OrderId, u32>,
}

impl ProductionCycle {
    /// Order tag carried by every output: the order that contributed the
    /// most reserved inputs, lowest id on ties.
    pub fn output_order(&self) -> Option<OrderId> {
        self.orders
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(id, _)| *id)
    }

    /// Whether inputs reserved for `order` are being processed.
    pub fn carries(&self, order: OrderId) -> bool {
        self.orders.contains_key(&order)
    }
}

/// Per-step production bookkeeping, stored beside the step (SoA).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionState {
    pub cycles: Vec<ProductionCycle>,
    pub completed_cycles: u64,
}

impl ProductionState {
    /// Whether `resource` is occupied by a cycle during `tick`.
    pub fn is_busy(&self, resource: ResourceId, tick: Ticks) -> bool {
        self.cycles
            .iter()
            .any(|c| c.resource == resource && c.started_at <= tick && tick <= c.completes_at)
    }
}

// ---------------------------------------------------------------------------
// EntityGraph
// ---------------------------------------------------------------------------

/// Locations, process steps and transport systems, keyed by external id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityGraph {
    locations: SlotMap<LocationKey, Location>,
    steps: SlotMap<StepKey, ProcessStep>,
    transports: SlotMap<TransportKey, TransportSystem>,
    production: SecondaryMap<StepKey, ProductionState>,

    location_index: BTreeMap<LocationId, LocationKey>,
    step_index: BTreeMap<StepId, StepKey>,
    transport_index: BTreeMap<TransportId, TransportKey>,
}

impl EntityGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // -- Insertion ---------------------------------------------------------

    /// Add a location. Fails on a duplicate location id.
    pub fn insert_location(&mut self, location: Location) -> Result<LocationKey, GraphError> {
        let id = location.id;
        if self.location_index.contains_key(&id) {
            return Err(GraphError::DuplicateId {
                kind: EntityKind::Location,
                id: id.0,
            });
        }
        let key = self.locations.insert(location);
        self.location_index.insert(id, key);
        Ok(key)
    }

    /// Add a process step with fresh production state. Fails on a duplicate step id.
    pub fn insert_step(&mut self, step: ProcessStep) -> Result<StepKey, GraphError> {
        let id = step.id;
        if self.step_index.contains_key(&id) {
            return Err(GraphError::DuplicateId {
                kind: EntityKind::ProcessStep,
                id: id.0,
            });
        }
        let key = self.steps.insert(step);
        self.production.insert(key, ProductionState::default());
        self.step_index.insert(id, key);
        Ok(key)
    }

    /// Insert a transport system and register it on the `outputs` of its
    /// start step and the `inputs` of its end step. Both steps must exist.
    pub fn insert_transport(
        &mut self,
        transport: TransportSystem,
    ) -> Result<TransportKey, GraphError> {
        let id = transport.id;
        if self.transport_index.contains_key(&id) {
            return Err(GraphError::DuplicateId {
                kind: EntityKind::TransportSystem,
                id: id.0,
            });
        }
        let missing = |step: StepId| GraphError::Missing {
            kind: EntityKind::ProcessStep,
            id: step.0,
        };
        let end_key = *self.step_index.get(&transport.end).ok_or(missing(transport.end))?;
        let start_key = match transport.start {
            Some(start) => Some(*self.step_index.get(&start).ok_or(missing(start))?),
            None => None,
        };

        if let Some(k) = start_key {
            let outputs = &mut self.steps[k].outputs;
            if !outputs.contains(&id) {
                outputs.push(id);
            }
        }
        let inputs = &mut self.steps[end_key].inputs;
        if !inputs.contains(&id) {
            inputs.push(id);
        }

        let key = self.transports.insert(transport);
        self.transport_index.insert(id, key);
        Ok(key)
    }

    // -- Lookup ------------------------------------------------------------

    /// Look up a location by external id.
    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.location_index.get(&id).map(|&k| &self.locations[k])
    }

    /// Look up a process step by external id.
    pub fn step(&self, id: StepId) -> Option<&ProcessStep> {
        self.step_index.get(&id).map(|&k| &self.steps[k])
    }

    /// Mutable access to a process step.
    pub fn step_mut(&mut self, id: StepId) -> Option<&mut ProcessStep> {
        let key = *self.step_index.get(&id)?;
        self.steps.get_mut(key)
    }

    /// Look up a transport system by external id.
    pub fn transport(&self, id: TransportId) -> Option<&TransportSystem> {
        self.transport_index.get(&id).map(|&k| &self.transports[k])
    }

    /// Mutable access to a transport system.
    pub fn transport_mut(&mut self, id: TransportId) -> Option<&mut TransportSystem> {
        let key = *self.transport_index.get(&id)?;
        self.transports.get_mut(key)
    }

    /// Running cycles and counters of a step.
    pub fn production(&self, id: StepId) -> Option<&ProductionState> {
        self.step_index.get(&id).and_then(|&k| self.production.get(k))
    }

    /// Borrow a step together with its production state.
    pub(crate) fn step_with_production_mut(
        &mut self,
        id: StepId,
    ) -> Option<(&mut ProcessStep, &mut ProductionState)> {
        let key = *self.step_index.get(&id)?;
        let step = self.steps.get_mut(key)?;
        let production = self.production.get_mut(key)?;
        Some((step, production))
    }

    /// Borrow a transport system and a step at the same time (they live in
    /// different arenas).
    pub(crate) fn transport_and_step_mut(
        &mut self,
        transport: TransportId,
        step: StepId,
    ) -> Option<(&mut TransportSystem, &mut ProcessStep)> {
        let tk = *self.transport_index.get(&transport)?;
        let sk = *self.step_index.get(&step)?;
        Some((self.transports.get_mut(tk)?, self.steps.get_mut(sk)?))
    }

    // -- Ordered iteration -------------------------------------------------

    /// Step ids in ascending order.
    pub fn step_ids(&self) -> impl Iterator<Item = StepId> + '_ {
        self.step_index.keys().copied()
    }

    /// Transport ids in ascending order.
    pub fn transport_ids(&self) -> impl Iterator<Item = TransportId> + '_ {
        self.transport_index.keys().copied()
    }

    /// Steps in ascending id order.
    pub fn steps(&self) -> impl Iterator<Item = &ProcessStep> + '_ {
        self.step_index.values().map(|&k| &self.steps[k])
    }

    /// Transport systems in ascending id order.
    pub fn transports(&self) -> impl Iterator<Item = &TransportSystem> + '_ {
        self.transport_index.values().map(|&k| &self.transports[k])
    }

    /// Locations in ascending id order.
    pub fn locations(&self) -> impl Iterator<Item = &Location> + '_ {
        self.location_index.values().map(|&k| &self.locations[k])
    }

    /// Number of process steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Number of transport systems.
    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Total entries held by all step and transport inventories.
    pub fn total_entries(&self) -> usize {
        self.steps().map(|s| s.inventory.len()).sum::<usize>()
            + self.transports().map(|t| t.inventory.len()).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// SimulationState
// ---------------------------------------------------------------------------

/// Everything the tick engine reads and writes. A frame stores one of these
/// in its tick-end condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationState {
    /// The tick the next call to [`advance`](crate::engine::advance) will
    /// process. Equals the number of ticks already applied.
    pub next_tick: Ticks,
    pub graph: EntityGraph,
    pub orders: BTreeMap<OrderId, Order>,
    pub rng: SimRng,
    pub(crate) next_entry_id: u64,
    pub(crate) next_log_id: u64,
}

impl SimulationState {
    /// State at tick 0 with the RNG seeded from `seed`.
    pub fn new(graph: EntityGraph, orders: BTreeMap<OrderId, Order>, seed: u64) -> Self {
        let next_entry_id = graph
            .steps()
            .flat_map(|s| s.inventory.iter())
            .chain(graph.transports().flat_map(|t| t.inventory.iter()))
            .map(|e| e.id.0 + 1)
            .max()
            .unwrap_or(1);
        let next_log_id = graph
            .steps()
            .flat_map(|s| s.sensors.iter())
            .chain(graph.transports().flat_map(|t| t.sensors.iter()))
            .flat_map(|s| s.log.iter())
            .map(|l| l.id + 1)
            .max()
            .unwrap_or(1);
        Self {
            next_tick: 0,
            graph,
            orders,
            rng: SimRng::new(seed),
            next_entry_id,
            next_log_id,
        }
    }

    /// Look up an order by id.
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Set a transport system's active flag. Returns the previous value.
    pub fn set_transport_active(
        &mut self,
        id: TransportId,
        active: bool,
    ) -> Option<bool> {
        let transport = self.graph.transport_mut(id)?;
        let previous = transport.active;
        transport.active = active;
        Some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Inventory, InventoryOwner};
    use crate::model::{Filter, StepStatus};

    fn step(id: u64) -> ProcessStep {
        ProcessStep {
            id: StepId(id),
            name: format!("step {id}"),
            location: LocationId(1),
            status: StepStatus::Pending,
            input_speed: 1,
            output_speed: 1,
            recipe_rate: 1,
            inventory: Inventory::new(InventoryOwner::Step(StepId(id)), 10),
            resources: Vec::new(),
            sensors: Vec::new(),
            recipe: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn link(id: u64, start: Option<u64>, end: u64) -> TransportSystem {
        TransportSystem {
            id: TransportId(id),
            name: format!("link {id}"),
            start: start.map(StepId),
            end: StepId(end),
            transport_delay: 0,
            input_speed: 1,
            output_speed: 1,
            inventory: Inventory::new(InventoryOwner::Transport(TransportId(id)), 5),
            filter: Filter::allow_all(),
            active: true,
            sensors: Vec::new(),
            orders: Vec::new(),
        }
    }

    #[test]
    fn insert_transport_wires_adjacency() {
        let mut graph = EntityGraph::new();
        graph.insert_step(step(1)).unwrap();
        graph.insert_step(step(2)).unwrap();
        graph.insert_transport(link(10, Some(1), 2)).unwrap();
        graph.insert_transport(link(11, None, 1)).unwrap();

        assert_eq!(graph.step(StepId(1)).unwrap().outputs, vec![TransportId(10)]);
        assert_eq!(graph.step(StepId(1)).unwrap().inputs, vec![TransportId(11)]);
        assert_eq!(graph.step(StepId(2)).unwrap().inputs, vec![TransportId(10)]);
        assert!(graph.step(StepId(2)).unwrap().is_terminal());
    }

    #[test]
    fn duplicate_and_dangling_ids_are_rejected() {
        let mut graph = EntityGraph::new();
        graph.insert_step(step(1)).unwrap();
        assert_eq!(
            graph.insert_step(step(1)),
            Err(GraphError::DuplicateId {
                kind: EntityKind::ProcessStep,
                id: 1
            })
        );
        assert_eq!(
            graph.insert_transport(link(5, Some(9), 1)),
            Err(GraphError::Missing {
                kind: EntityKind::ProcessStep,
                id: 9
            })
        );
        assert_eq!(graph.transport_count(), 0);
    }

    #[test]
    fn iteration_follows_external_id_order() {
        let mut graph = EntityGraph::new();
        for id in [5, 1, 3] {
            graph.insert_step(step(id)).unwrap();
        }
        let ids: Vec<_> = graph.step_ids().collect();
        assert_eq!(ids, vec![StepId(1), StepId(3), StepId(5)]);
    }

    #[test]
    fn outputs_follow_the_dominant_order() {
        let cycle = |orders: &[(u64, u32)]| ProductionCycle {
            resource: ResourceId(1),
            started_at: 0,
            completes_at: 0,
            orders: orders.iter().map(|&(id, n)| (OrderId(id), n)).collect(),
        };
        assert_eq!(cycle(&[]).output_order(), None);
        assert_eq!(cycle(&[(4, 1), (2, 3)]).output_order(), Some(OrderId(2)));
        assert_eq!(cycle(&[(7, 2), (3, 2)]).output_order(), Some(OrderId(3)));
        assert!(cycle(&[(7, 2)]).carries(OrderId(7)));
        assert!(!cycle(&[(7, 2)]).carries(OrderId(3)));
    }

    #[test]
    fn busy_window_is_inclusive() {
        let production = ProductionState {
            cycles: vec![ProductionCycle {
                resource: ResourceId(1),
                started_at: 2,
                completes_at: 4,
                orders: BTreeMap::new(),
            }],
            completed_cycles: 0,
        };
        assert!(!production.is_busy(ResourceId(1), 1));
        assert!(production.is_busy(ResourceId(1), 2));
        assert!(production.is_busy(ResourceId(1), 4));
        assert!(!production.is_busy(ResourceId(1), 5));
        assert!(!production.is_busy(ResourceId(2), 3));
    }
}
