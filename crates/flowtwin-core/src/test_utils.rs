//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature). Builders panic on malformed input.

use crate::engine::advance;
use crate::fixed::{Fixed64, Ticks};
use crate::graph::{EntityGraph, SimulationState};
use crate::id::*;
use crate::inventory::{Inventory, InventoryEntry, InventoryOwner};
use crate::model::*;
use crate::registry::{MaterialRegistry, MaterialRegistryBuilder};
use crate::timeline::Frame;
use std::collections::BTreeMap;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Entity specs
// ===========================================================================

/// Shape of a process step for [`SnapshotBuilder::step`].
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub limit: u32,
    pub input_speed: u32,
    pub output_speed: u32,
    pub recipe: Option<Recipe>,
    pub recipe_rate: u32,
    pub machines: u32,
    pub workers: u32,
}

impl StepSpec {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            input_speed: 10,
            output_speed: 10,
            recipe: None,
            recipe_rate: 1,
            machines: 0,
            workers: 0,
        }
    }

    pub fn speeds(mut self, input: u32, output: u32) -> Self {
        self.input_speed = input;
        self.output_speed = output;
        self
    }

    pub fn machines(mut self, n: u32) -> Self {
        self.machines = n;
        self
    }

    pub fn workers(mut self, n: u32) -> Self {
        self.workers = n;
        self
    }

    pub fn recipe(
        mut self,
        inputs: Vec<(MaterialId, u32)>,
        outputs: Vec<(MaterialId, u32)>,
        rate: u32,
    ) -> Self {
        let line = |(material, quantity)| RecipeLine { material, quantity };
        self.recipe = Some(Recipe {
            inputs: inputs.into_iter().map(line).collect(),
            outputs: outputs.into_iter().map(line).collect(),
        });
        self.recipe_rate = rate;
        self
    }
}

/// Shape of a transport system for [`SnapshotBuilder::link`].
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub input_speed: u32,
    pub output_speed: u32,
    pub limit: u32,
    pub delay: u32,
    pub filter: Vec<MaterialId>,
    pub active: bool,
}

impl LinkSpec {
    /// A link moving `speed` entries per tick in and out.
    pub fn new(speed: u32) -> Self {
        Self {
            input_speed: speed,
            output_speed: speed,
            limit: 10,
            delay: 0,
            filter: Vec::new(),
            active: true,
        }
    }

    pub fn filter(mut self, materials: Vec<MaterialId>) -> Self {
        self.filter = materials;
        self
    }

    pub fn delay(mut self, ticks: u32) -> Self {
        self.delay = ticks;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

// ===========================================================================
// SnapshotBuilder
// ===========================================================================

/// Assembles a single-location snapshot in code.
pub struct SnapshotBuilder {
    materials: MaterialRegistryBuilder,
    graph: EntityGraph,
    orders: BTreeMap<OrderId, Order>,
    steps: Vec<StepId>,
    seed: u64,
    next_entry: u64,
    next_resource: u64,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBuilder {
    pub const LOCATION: LocationId = LocationId(1);

    pub fn new() -> Self {
        Self {
            materials: MaterialRegistryBuilder::new(),
            graph: EntityGraph::new(),
            orders: BTreeMap::new(),
            steps: Vec::new(),
            seed: 7,
            next_entry: 1,
            next_resource: 1,
        }
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn material(&mut self, name: &str) -> MaterialId {
        self.materials.intern(name)
    }

    pub fn step(&mut self, id: u64, spec: StepSpec) -> StepId {
        let step_id = StepId(id);
        let mut resources = Vec::new();
        for _ in 0..spec.machines {
            resources.push(self.resource(ResourceKind::Machine));
        }
        for _ in 0..spec.workers {
            resources.push(self.resource(ResourceKind::Worker {
                roles: vec!["operator".to_string()],
            }));
        }
        let step = ProcessStep {
            id: step_id,
            name: format!("Step {id}"),
            location: Self::LOCATION,
            status: StepStatus::Pending,
            input_speed: spec.input_speed,
            output_speed: spec.output_speed,
            recipe_rate: spec.recipe_rate,
            inventory: Inventory::new(InventoryOwner::Step(step_id), spec.limit),
            resources,
            sensors: Vec::new(),
            recipe: spec.recipe,
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        self.graph.insert_step(step).expect("duplicate step id");
        self.steps.push(step_id);
        step_id
    }

    fn resource(&mut self, kind: ResourceKind) -> Resource {
        let id = ResourceId(self.next_resource);
        self.next_resource += 1;
        Resource {
            id,
            name: format!("Resource {}", id.0),
            kind,
            available: true,
        }
    }

    /// A link between two steps.
    pub fn link(&mut self, id: u64, from: StepId, to: StepId, spec: LinkSpec) -> TransportId {
        self.insert_link(id, Some(from), to, spec)
    }

    /// An external inbound link feeding `to`.
    pub fn inbound(&mut self, id: u64, to: StepId, spec: LinkSpec) -> TransportId {
        self.insert_link(id, None, to, spec)
    }

    fn insert_link(
        &mut self,
        id: u64,
        start: Option<StepId>,
        end: StepId,
        spec: LinkSpec,
    ) -> TransportId {
        let transport_id = TransportId(id);
        let transport = TransportSystem {
            id: transport_id,
            name: format!("Link {id}"),
            start,
            end,
            transport_delay: spec.delay,
            input_speed: spec.input_speed,
            output_speed: spec.output_speed,
            inventory: Inventory::new(InventoryOwner::Transport(transport_id), spec.limit),
            filter: Filter::only(spec.filter),
            active: spec.active,
            sensors: Vec::new(),
            orders: Vec::new(),
        };
        self.graph
            .insert_transport(transport)
            .expect("invalid transport");
        transport_id
    }

    /// Attach an order for `quantity` units to `link`.
    pub fn order(
        &mut self,
        id: u64,
        link: TransportId,
        quantity: u32,
        material: Option<MaterialId>,
    ) -> OrderId {
        let order_id = OrderId(id);
        self.orders
            .insert(order_id, Order::new(order_id, quantity, material));
        self.graph
            .transport_mut(link)
            .expect("unknown transport")
            .orders
            .push(order_id);
        order_id
    }

    /// Put `count` units of `material` into a step, entered at tick 0.
    pub fn stock(&mut self, step: StepId, material: MaterialId, count: u32) {
        let inventory = &mut self.graph.step_mut(step).expect("unknown step").inventory;
        for _ in 0..count {
            let entry = InventoryEntry {
                id: EntryId(self.next_entry),
                material,
                added_at: 0,
                order: None,
            };
            self.next_entry += 1;
            inventory.push(entry).expect("stock exceeds inventory limit");
        }
    }

    pub fn step_sensor(&mut self, step: StepId, id: u64, faulty_rate: f64) {
        self.graph
            .step_mut(step)
            .expect("unknown step")
            .sensors
            .push(sensor(id, faulty_rate));
    }

    pub fn link_sensor(&mut self, link: TransportId, id: u64, faulty_rate: f64) {
        self.graph
            .transport_mut(link)
            .expect("unknown transport")
            .sensors
            .push(sensor(id, faulty_rate));
    }

    pub fn build(self) -> SimulationState {
        self.build_with_registry().0
    }

    pub fn build_with_registry(mut self) -> (SimulationState, MaterialRegistry) {
        self.graph
            .insert_location(Location {
                id: Self::LOCATION,
                name: "Plant".to_string(),
                description: None,
                steps: self.steps,
                unassigned_resources: Vec::new(),
            })
            .expect("location inserted twice");
        (
            SimulationState::new(self.graph, self.orders, self.seed),
            self.materials.build(),
        )
    }
}

fn sensor(id: u64, faulty_rate: f64) -> Sensor {
    Sensor {
        id: SensorId(id),
        name: format!("Sensor {id}"),
        faulty_rate: fixed(faulty_rate),
        log: Vec::new(),
    }
}

// ===========================================================================
// Canned layouts
// ===========================================================================

/// Ids of the canned single-step line.
#[derive(Debug, Clone, Copy)]
pub struct LineIds {
    pub step: StepId,
    pub inbound: TransportId,
    pub a: MaterialId,
    pub b: MaterialId,
}

/// One step with one machine turning 1 A into 1 B each tick, fed by an
/// external link delivering 2 A per tick.
pub fn single_step_line() -> (SimulationState, LineIds) {
    let mut builder = SnapshotBuilder::new();
    let a = builder.material("A");
    let b = builder.material("B");
    let step = builder.step(
        1,
        StepSpec::new(10)
            .speeds(2, 2)
            .machines(1)
            .recipe(vec![(a, 1)], vec![(b, 1)], 1),
    );
    let inbound = builder.inbound(100, step, LinkSpec::new(2).filter(vec![a]));
    (
        builder.build(),
        LineIds {
            step,
            inbound,
            a,
            b,
        },
    )
}

/// Ids of the canned order line.
#[derive(Debug, Clone, Copy)]
pub struct OrderLineIds {
    pub press: StepId,
    pub dock: StepId,
    pub inbound: TransportId,
    pub conveyor: TransportId,
    pub order: OrderId,
    pub a: MaterialId,
    pub b: MaterialId,
}

/// An order for `quantity` units of A released by the inbound link, pressed
/// into B and conveyed to a terminal dock.
pub fn order_line(quantity: u32) -> (SimulationState, OrderLineIds) {
    let mut builder = SnapshotBuilder::new();
    let a = builder.material("A");
    let b = builder.material("B");
    let press = builder.step(
        1,
        StepSpec::new(10)
            .machines(1)
            .recipe(vec![(a, 1)], vec![(b, 1)], 1),
    );
    let dock = builder.step(2, StepSpec::new(20));
    let inbound = builder.inbound(100, press, LinkSpec::new(1).filter(vec![a]));
    let conveyor = builder.link(101, press, dock, LinkSpec::new(2).filter(vec![b]));
    let order = builder.order(1, inbound, quantity, Some(a));
    (
        builder.build(),
        OrderLineIds {
            press,
            dock,
            inbound,
            conveyor,
            order,
            a,
            b,
        },
    )
}

// ===========================================================================
// Queries
// ===========================================================================

/// Units of `material` held by `step`.
pub fn material_count(state: &SimulationState, step: StepId, material: MaterialId) -> usize {
    state
        .graph
        .step(step)
        .map_or(0, |s| s.inventory.quantity(material))
}

/// Apply `ticks` ticks starting from `state`, returning every frame.
pub fn run_ticks(state: &SimulationState, ticks: Ticks) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::with_capacity(ticks as usize);
    for _ in 0..ticks {
        let frame = advance(frames.last().map_or(state, |f| &f.state));
        frames.push(frame);
    }
    frames
}
