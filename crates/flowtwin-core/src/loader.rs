//! Entity snapshot loading from JSON.
//!
//! The snapshot nests transport systems under the `inputs` and `outputs` of
//! the steps they connect, so the same link usually appears twice. Listings
//! are merged by id: the step a link is listed under fills in a missing
//! endpoint, and a link whose start is never given is an external inbound
//! link.

use crate::fixed::{Ticks, f64_to_fixed64};
use crate::graph::{EntityGraph, GraphError, SimulationState};
use crate::id::*;
use crate::inventory::{Inventory, InventoryEntry, InventoryOwner};
use crate::model::*;
use crate::registry::{MaterialRegistry, MaterialRegistryBuilder};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while loading an entity snapshot.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("transport system {id}: {reason}")]
    InvalidTransport { id: u64, reason: &'static str },
    #[error("inventory of {owner:?} holds {count} entries, limit is {limit}")]
    InventoryOverflow {
        owner: InventoryOwner,
        count: usize,
        limit: u32,
    },
    #[error("sensor {id}: faulty rate {rate} is outside [0, 1]")]
    InvalidFaultyRate { id: u64, rate: f64 },
    #[error("duplicate {what} id {id}")]
    DuplicateId { what: &'static str, id: u64 },
    #[error("unknown {what} {id}")]
    UnknownReference { what: &'static str, id: u64 },
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    #[serde(default)]
    pub locations: Vec<LocationData>,
    /// Orders not attached to any transport system.
    #[serde(default)]
    pub orders: Vec<OrderData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationData {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub process_steps: Vec<StepData>,
    /// Resources not attached to a step.
    #[serde(default)]
    pub resources: Vec<ResourceData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub status: StepStatusData,
    #[serde(default = "one")]
    pub input_speed: u32,
    #[serde(default = "one")]
    pub output_speed: u32,
    #[serde(default = "one")]
    pub recipe_rate: u32,
    pub inventory: InventoryData,
    #[serde(default)]
    pub resources: Vec<ResourceData>,
    #[serde(default)]
    pub recipe: Option<RecipeData>,
    #[serde(default)]
    pub sensors: Vec<SensorData>,
    #[serde(default)]
    pub inputs: Vec<TransportData>,
    #[serde(default)]
    pub outputs: Vec<TransportData>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatusData {
    #[default]
    Pending,
    Proceeding,
    Blocked,
    Complete,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryData {
    pub limit: u32,
    #[serde(default)]
    pub entries: Vec<EntryData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryData {
    pub id: u64,
    pub material: String,
    #[serde(default)]
    pub added_at: Ticks,
    #[serde(default)]
    pub order_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceData {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ResourceKindData,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default = "yes")]
    pub available: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKindData {
    Machine,
    Worker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    #[serde(default)]
    pub inputs: Vec<RecipeLineData>,
    #[serde(default)]
    pub outputs: Vec<RecipeLineData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipeLineData {
    pub material: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorData {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub faulty_rate: f64,
    #[serde(default)]
    pub log_entries: Vec<LogEntryData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogEntryData {
    pub id: u64,
    #[serde(default)]
    pub tick: Ticks,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportData {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub start_step_id: Option<u64>,
    #[serde(default)]
    pub end_step_id: Option<u64>,
    /// Ticks an entry dwells before it may exit. Defaults to 0.
    #[serde(default)]
    pub transport_delay: Option<u32>,
    /// Defaults to 1.
    #[serde(default)]
    pub input_speed: Option<u32>,
    /// Defaults to 1.
    #[serde(default)]
    pub output_speed: Option<u32>,
    /// Defaults to `true`.
    #[serde(default)]
    pub active: Option<bool>,
    pub inventory: InventoryData,
    #[serde(default)]
    pub filter: FilterData,
    #[serde(default)]
    pub orders: Vec<OrderData>,
    #[serde(default)]
    pub sensors: Vec<SensorData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterData {
    #[serde(default)]
    pub materials: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    pub id: u64,
    #[serde(default)]
    pub status: OrderStatusData,
    pub quantity: u32,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub started_at: Option<Ticks>,
    #[serde(default)]
    pub completed_at: Option<Ticks>,
    #[serde(default)]
    pub materials_reserved: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusData {
    #[default]
    Pending,
    InProgress,
    Completed,
}

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Options that are not part of the snapshot itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Seed for sensor fault sampling.
    pub seed: u64,
}

/// A loaded snapshot: the initial state plus the material names it uses.
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub state: SimulationState,
    pub materials: MaterialRegistry,
}

/// Load a snapshot from a JSON string.
pub fn load_snapshot_json(json: &str, options: LoadOptions) -> Result<LoadedSnapshot, LoadError> {
    let data: SnapshotData = serde_json::from_str(json)?;
    build_snapshot(data, options)
}

/// Load a snapshot from JSON bytes.
pub fn load_snapshot_json_bytes(
    bytes: &[u8],
    options: LoadOptions,
) -> Result<LoadedSnapshot, LoadError> {
    let data: SnapshotData = serde_json::from_slice(bytes)?;
    build_snapshot(data, options)
}

/// A transport listing merged across the steps it appears under.
struct MergedTransport {
    data: TransportData,
    start: Option<u64>,
    end: Option<u64>,
}

/// Ids seen so far, per entity kind that the graph does not check itself.
#[derive(Default)]
struct SeenIds {
    entries: BTreeSet<u64>,
    resources: BTreeSet<u64>,
    sensors: BTreeSet<u64>,
}

impl SeenIds {
    fn claim(set: &mut BTreeSet<u64>, what: &'static str, id: u64) -> Result<(), LoadError> {
        if set.insert(id) {
            Ok(())
        } else {
            Err(LoadError::DuplicateId { what, id })
        }
    }
}

/// Turn parsed snapshot data into a state. Every listing of a link is merged
/// into one transport system.
pub fn build_snapshot(data: SnapshotData, options: LoadOptions) -> Result<LoadedSnapshot, LoadError> {
    let mut materials = MaterialRegistryBuilder::new();
    let mut graph = EntityGraph::new();
    let mut seen = SeenIds::default();
    let mut transports: BTreeMap<u64, MergedTransport> = BTreeMap::new();
    let mut order_data: BTreeMap<u64, OrderData> = BTreeMap::new();

    for location in data.locations {
        let location_id = LocationId(location.id);
        let mut step_ids = Vec::with_capacity(location.process_steps.len());

        for step in location.process_steps {
            for listing in step.outputs.iter().cloned() {
                let start = listing.start_step_id.or(Some(step.id));
                let end = listing.end_step_id;
                merge_transport(&mut transports, listing, start, end)?;
            }
            for listing in step.inputs.iter().cloned() {
                let start = listing.start_step_id;
                let end = listing.end_step_id.or(Some(step.id));
                merge_transport(&mut transports, listing, start, end)?;
            }

            let id = StepId(step.id);
            let owner = InventoryOwner::Step(id);
            let process_step = ProcessStep {
                id,
                name: step.name,
                location: location_id,
                status: match step.status {
                    StepStatusData::Pending => StepStatus::Pending,
                    StepStatusData::Proceeding => StepStatus::Proceeding,
                    StepStatusData::Blocked => StepStatus::Blocked,
                    StepStatusData::Complete => StepStatus::Complete,
                },
                input_speed: step.input_speed,
                output_speed: step.output_speed,
                recipe_rate: step.recipe_rate,
                inventory: build_inventory(owner, &step.inventory, &mut materials, &mut seen)?,
                resources: build_resources(&step.resources, &mut seen)?,
                sensors: build_sensors(&step.sensors, &mut seen)?,
                recipe: step.recipe.map(|r| Recipe {
                    inputs: build_lines(&r.inputs, &mut materials),
                    outputs: build_lines(&r.outputs, &mut materials),
                }),
                inputs: Vec::new(),
                outputs: Vec::new(),
            };
            graph.insert_step(process_step)?;
            step_ids.push(id);
        }

        graph.insert_location(Location {
            id: location_id,
            name: location.name,
            description: location.description,
            steps: step_ids,
            unassigned_resources: build_resources(&location.resources, &mut seen)?,
        })?;
    }

    for order in data.orders {
        order_data.entry(order.id).or_insert(order);
    }

    for (id, merged) in transports {
        let end = merged.end.ok_or(LoadError::InvalidTransport {
            id,
            reason: "no destination step",
        })?;
        let transport_id = TransportId(id);
        let owner = InventoryOwner::Transport(transport_id);
        let data = merged.data;

        let mut attached = Vec::with_capacity(data.orders.len());
        for order in data.orders {
            attached.push(OrderId(order.id));
            order_data.entry(order.id).or_insert(order);
        }

        let transport = TransportSystem {
            id: transport_id,
            name: data.name,
            start: merged.start.map(StepId),
            end: StepId(end),
            transport_delay: data.transport_delay.unwrap_or(0),
            input_speed: data.input_speed.unwrap_or(1),
            output_speed: data.output_speed.unwrap_or(1),
            inventory: build_inventory(owner, &data.inventory, &mut materials, &mut seen)?,
            filter: Filter::only(data.filter.materials.iter().map(|m| materials.intern(m))),
            active: data.active.unwrap_or(true),
            sensors: build_sensors(&data.sensors, &mut seen)?,
            orders: attached,
        };
        graph.insert_transport(transport)?;
    }

    let orders = build_orders(order_data, &graph, &mut materials)?;
    let state = SimulationState::new(graph, orders, options.seed);
    tracing::debug!(
        steps = state.graph.step_count(),
        transports = state.graph.transport_count(),
        orders = state.orders.len(),
        "snapshot loaded"
    );

    Ok(LoadedSnapshot {
        state,
        materials: materials.build(),
    })
}

/// Fold another listing of the same link into `transports`. Relations
/// (orders, sensors, log entries) are united by id; an attribute given by
/// both listings must agree.
fn merge_transport(
    transports: &mut BTreeMap<u64, MergedTransport>,
    data: TransportData,
    start: Option<u64>,
    end: Option<u64>,
) -> Result<(), LoadError> {
    let id = data.id;
    let Some(existing) = transports.get_mut(&id) else {
        transports.insert(id, MergedTransport { data, start, end });
        return Ok(());
    };
    existing.start = merge_value(id, existing.start, start, "listings disagree on an endpoint")?;
    existing.end = merge_value(id, existing.end, end, "listings disagree on an endpoint")?;
    merge_listing(&mut existing.data, data)
}

fn merge_listing(into: &mut TransportData, other: TransportData) -> Result<(), LoadError> {
    let id = into.id;
    let disagree = |reason| LoadError::InvalidTransport { id, reason };

    if into.name != other.name {
        return Err(disagree("listings disagree on the name"));
    }
    into.transport_delay = merge_value(
        id,
        into.transport_delay,
        other.transport_delay,
        "listings disagree on the delay",
    )?;
    into.input_speed = merge_value(
        id,
        into.input_speed,
        other.input_speed,
        "listings disagree on a speed",
    )?;
    into.output_speed = merge_value(
        id,
        into.output_speed,
        other.output_speed,
        "listings disagree on a speed",
    )?;
    into.active = merge_value(
        id,
        into.active,
        other.active,
        "listings disagree on the active flag",
    )?;

    if into.inventory.limit != other.inventory.limit {
        return Err(disagree("listings disagree on the inventory limit"));
    }
    if into.inventory.entries.is_empty() {
        into.inventory.entries = other.inventory.entries;
    } else if !other.inventory.entries.is_empty() {
        let ids = |entries: &[EntryData]| entries.iter().map(|e| e.id).collect::<BTreeSet<_>>();
        if ids(&into.inventory.entries) != ids(&other.inventory.entries) {
            return Err(disagree("listings disagree on inventory entries"));
        }
    }

    if into.filter.materials.is_empty() {
        into.filter = other.filter;
    } else if !other.filter.materials.is_empty() {
        let names = |f: &FilterData| f.materials.iter().cloned().collect::<BTreeSet<_>>();
        if names(&into.filter) != names(&other.filter) {
            return Err(disagree("listings disagree on the filter"));
        }
    }

    for order in other.orders {
        if !into.orders.iter().any(|o| o.id == order.id) {
            into.orders.push(order);
        }
    }
    for sensor in other.sensors {
        match into.sensors.iter_mut().find(|s| s.id == sensor.id) {
            Some(known) => {
                for entry in sensor.log_entries {
                    if !known.log_entries.iter().any(|l| l.id == entry.id) {
                        known.log_entries.push(entry);
                    }
                }
            }
            None => into.sensors.push(sensor),
        }
    }
    Ok(())
}

fn merge_value<T: PartialEq>(
    id: u64,
    a: Option<T>,
    b: Option<T>,
    reason: &'static str,
) -> Result<Option<T>, LoadError> {
    match (a, b) {
        (Some(x), Some(y)) if x != y => Err(LoadError::InvalidTransport { id, reason }),
        (a, b) => Ok(a.or(b)),
    }
}

fn build_inventory(
    owner: InventoryOwner,
    data: &InventoryData,
    materials: &mut MaterialRegistryBuilder,
    seen: &mut SeenIds,
) -> Result<Inventory, LoadError> {
    let mut inventory = Inventory::new(owner, data.limit);
    if data.entries.len() > data.limit as usize {
        return Err(LoadError::InventoryOverflow {
            owner,
            count: data.entries.len(),
            limit: data.limit,
        });
    }
    for entry in &data.entries {
        SeenIds::claim(&mut seen.entries, "inventory entry", entry.id)?;
        let entry = InventoryEntry {
            id: EntryId(entry.id),
            material: materials.intern(&entry.material),
            added_at: entry.added_at,
            order: entry.order_id.map(OrderId),
        };
        if inventory.push(entry).is_err() {
            return Err(LoadError::InventoryOverflow {
                owner,
                count: data.entries.len(),
                limit: data.limit,
            });
        }
    }
    Ok(inventory)
}

fn build_resources(data: &[ResourceData], seen: &mut SeenIds) -> Result<Vec<Resource>, LoadError> {
    data.iter()
        .map(|r| {
            SeenIds::claim(&mut seen.resources, "resource", r.id)?;
            Ok(Resource {
                id: ResourceId(r.id),
                name: r.name.clone(),
                kind: match r.kind {
                    ResourceKindData::Machine => ResourceKind::Machine,
                    ResourceKindData::Worker => ResourceKind::Worker {
                        roles: r.roles.clone(),
                    },
                },
                available: r.available,
            })
        })
        .collect()
}

fn build_sensors(data: &[SensorData], seen: &mut SeenIds) -> Result<Vec<Sensor>, LoadError> {
    let mut sensors = data
        .iter()
        .map(|s| {
            SeenIds::claim(&mut seen.sensors, "sensor", s.id)?;
            if !(0.0..=1.0).contains(&s.faulty_rate) {
                return Err(LoadError::InvalidFaultyRate {
                    id: s.id,
                    rate: s.faulty_rate,
                });
            }
            Ok(Sensor {
                id: SensorId(s.id),
                name: s.name.clone(),
                faulty_rate: f64_to_fixed64(s.faulty_rate),
                log: s
                    .log_entries
                    .iter()
                    .map(|l| LogEntry {
                        id: l.id,
                        tick: l.tick,
                        message: l.message.clone(),
                    })
                    .collect(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    sensors.sort_by_key(|s| s.id);
    Ok(sensors)
}

fn build_lines(data: &[RecipeLineData], materials: &mut MaterialRegistryBuilder) -> Vec<RecipeLine> {
    data.iter()
        .map(|l| RecipeLine {
            material: materials.intern(&l.material),
            quantity: l.quantity,
        })
        .collect()
}

/// Build orders and derive how many units each already has in flight from
/// the tagged entries of the snapshot.
fn build_orders(
    data: BTreeMap<u64, OrderData>,
    graph: &EntityGraph,
    materials: &mut MaterialRegistryBuilder,
) -> Result<BTreeMap<OrderId, Order>, LoadError> {
    let mut tagged: BTreeMap<OrderId, u32> = BTreeMap::new();
    let entries = graph
        .steps()
        .flat_map(|s| s.inventory.iter())
        .chain(graph.transports().flat_map(|t| t.inventory.iter()));
    for entry in entries {
        if let Some(order) = entry.order {
            *tagged.entry(order).or_default() += 1;
        }
    }
    if let Some((&unknown, _)) = tagged.iter().find(|(id, _)| !data.contains_key(&id.0)) {
        return Err(LoadError::UnknownReference {
            what: "order",
            id: unknown.0,
        });
    }

    let mut orders = BTreeMap::new();
    for (id, o) in data {
        let order_id = OrderId(id);
        let mut order = Order::new(order_id, o.quantity, o.material.as_deref().map(|m| materials.intern(m)));
        order.status = match o.status {
            OrderStatusData::Pending => OrderStatus::Pending,
            OrderStatusData::InProgress => OrderStatus::InProgress,
            OrderStatusData::Completed => OrderStatus::Completed,
        };
        order.started_at = o.started_at;
        order.completed_at = o.completed_at;
        order.reserved = tagged.get(&order_id).copied().unwrap_or(0).min(o.quantity);
        if o.materials_reserved || order.status == OrderStatus::Completed {
            order.reserved = o.quantity;
        }
        order.materials_reserved = order.reserved >= o.quantity && o.quantity > 0;
        // An order that already has units out is in progress.
        if order.status == OrderStatus::Pending && order.reserved > 0 {
            order.status = OrderStatus::InProgress;
            order.started_at = order.started_at.or(Some(0));
        }
        orders.insert(order_id, order);
    }
    Ok(orders)
}
