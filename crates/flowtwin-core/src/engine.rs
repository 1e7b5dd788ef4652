//! The tick engine: a pure `state -> frame` transform.
//!
//! # Pipeline
//!
//! Each [`advance`] call processes tick `t = state.next_tick` through a fixed
//! sequence of phases:
//!
//! 1. **Transport** -- every active transport system, in ascending id order,
//!    first takes entries in from its source (an upstream step, or thin air
//!    for external links) and then delivers dwelled entries to its
//!    destination step. Inactive links are skipped entirely.
//! 2. **Production** -- every step with a recipe starts one cycle per free
//!    resource (consuming inputs up front) and yields the outputs of cycles
//!    whose last tick is `t`.
//! 3. **Orders** -- fully reserved orders with nothing left in links,
//!    non-terminal steps or running cycles are completed, and their finished
//!    units leave the terminal steps.
//! 4. **Sensors** -- each sensor logs a fault with probability `faulty_rate`.
//! 5. **Bookkeeping** -- `next_tick` is incremented and the state hash taken.
//!
//! # Eligibility
//!
//! Moving an entry stamps `added_at = t`. An entry that entered a step during
//! tick `t` may neither be consumed nor picked up again before tick `t + 1`,
//! so a unit advances at most one step per tick. Entries inside a transport
//! system may exit once `t - added_at >= transport_delay`.

use crate::fixed::Ticks;
use crate::graph::{EntityGraph, ProductionCycle, SimulationState};
use crate::hash::state_hash;
use crate::id::{EntryId, MaterialId, OrderId, ResourceId, StepId, TransportId};
use crate::inventory::{Inventory, InventoryEntry, InventoryOwner};
use crate::model::{Order, OrderStatus, Recipe, StepStatus};
use crate::event::TickEvent;
use crate::timeline::Frame;
use std::collections::{BTreeMap, BTreeSet};

/// Apply one tick to `state`, returning the resulting frame. The input is
/// left untouched; identical inputs always yield identical frames.
pub fn advance(state: &SimulationState) -> Frame {
    let mut next = state.clone();
    let mut pass = TickPass::new(next.next_tick);

    // Phase 1: Transport.
    pass.phase_transport(&mut next);
    // Phase 2: Production.
    pass.phase_production(&mut next);
    // Phase 3: Orders.
    pass.phase_orders(&mut next);
    // Phase 4: Sensors.
    pass.phase_sensors(&mut next);
    // Phase 5: Bookkeeping.
    next.next_tick += 1;
    let hash = state_hash(&next);

    tracing::trace!(tick = pass.tick, events = pass.events.len(), hash, "tick applied");

    Frame {
        tick: pass.tick,
        state: next,
        events: pass.events,
        hash,
    }
}

// ---------------------------------------------------------------------------
// TickPass
// ---------------------------------------------------------------------------

/// Scratch state for one tick: per-step speed budgets and the event buffer.
struct TickPass {
    tick: Ticks,
    events: Vec<TickEvent>,
    /// Entries each step may still accept this tick.
    input_budget: BTreeMap<StepId, u32>,
    /// Entries each step may still release this tick.
    output_budget: BTreeMap<StepId, u32>,
}

impl TickPass {
    fn new(tick: Ticks) -> Self {
        Self {
            tick,
            events: Vec::new(),
            input_budget: BTreeMap::new(),
            output_budget: BTreeMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Phase 1: Transport
    // -----------------------------------------------------------------------

    fn phase_transport(&mut self, state: &mut SimulationState) {
        let ids: Vec<TransportId> = state.graph.transport_ids().collect();
        for id in ids {
            let Some(link) = state.graph.transport(id) else {
                continue;
            };
            if !link.active {
                continue;
            }
            let (start, end) = (link.start, link.end);

            let loaded = match start {
                None => self.release_external(state, id),
                Some(source) => self.load_from_step(state, id, source),
            };
            if loaded > 0 {
                self.events.push(TickEvent::ItemsLoaded {
                    transport: id,
                    quantity: loaded,
                    tick: self.tick,
                });
            }

            self.deliver(state, id, end);
        }
    }

    /// External links create entries: first for their open orders, otherwise
    /// as an unbounded supply of their filter materials.
    fn release_external(&mut self, state: &mut SimulationState, id: TransportId) -> u32 {
        let tick = self.tick;
        let SimulationState {
            graph,
            orders,
            next_entry_id,
            ..
        } = state;
        let Some(link) = graph.transport_mut(id) else {
            return 0;
        };

        let mut budget = link.output_speed.min(link.inventory.remaining());
        let mut created = 0;

        if !link.orders.is_empty() {
            let order_ids = link.orders.clone();
            for order_id in order_ids {
                let Some(order) = orders.get_mut(&order_id) else {
                    continue;
                };
                let Some(material) = order
                    .material
                    .or_else(|| link.filter.materials.iter().next().copied())
                else {
                    continue;
                };
                if !link.filter.allows(material) {
                    continue;
                }
                while budget > 0 && order.needs_units() {
                    let entry = InventoryEntry {
                        id: EntryId(*next_entry_id),
                        material,
                        added_at: tick,
                        order: Some(order.id),
                    };
                    if link.inventory.push(entry).is_err() {
                        budget = 0;
                        break;
                    }
                    *next_entry_id += 1;
                    budget -= 1;
                    created += 1;
                    if order.reserve_unit(tick) {
                        self.events.push(TickEvent::OrderStarted {
                            order: order.id,
                            tick,
                        });
                    }
                }
            }
            return created;
        }

        let materials: Vec<MaterialId> = link.filter.materials.iter().copied().collect();
        if materials.is_empty() {
            return 0;
        }
        let offset = (tick % materials.len() as u64) as usize;
        for i in 0..budget as usize {
            let entry = InventoryEntry {
                id: EntryId(*next_entry_id),
                material: materials[(offset + i) % materials.len()],
                added_at: tick,
                order: None,
            };
            if link.inventory.push(entry).is_err() {
                break;
            }
            *next_entry_id += 1;
            created += 1;
        }
        created
    }

    /// Pull entries from the source step into the link. A step only releases
    /// entries that entered it before this tick and that its own recipe does
    /// not consume.
    fn load_from_step(
        &mut self,
        state: &mut SimulationState,
        id: TransportId,
        source: StepId,
    ) -> u32 {
        let tick = self.tick;
        let SimulationState { graph, orders, .. } = state;
        let Some((link, step)) = graph.transport_and_step_mut(id, source) else {
            return 0;
        };

        let budget = self
            .output_budget
            .entry(source)
            .or_insert(step.output_speed);
        let max = link.output_speed.min(*budget) as usize;
        let filter = link.filter.clone();
        let recipe = step.recipe.clone();
        let link_orders = link.orders.clone();
        let mut started: Vec<OrderId> = Vec::new();

        let moved = step.inventory.transfer_to(
            &mut link.inventory,
            max,
            |e| {
                e.added_at < tick
                    && filter.allows(e.material)
                    && !recipe.as_ref().is_some_and(|r| r.consumes(e.material))
            },
            |e| {
                e.added_at = tick;
                if e.order.is_none() {
                    e.order = reserve_for(orders, &link_orders, e.material, tick, &mut started);
                }
            },
        );
        *budget -= moved;

        for order in started {
            self.events.push(TickEvent::OrderStarted { order, tick });
        }
        moved
    }

    /// Move dwelled entries from the link into its destination step.
    fn deliver(&mut self, state: &mut SimulationState, id: TransportId, end: StepId) {
        let tick = self.tick;
        let Some((link, step)) = state.graph.transport_and_step_mut(id, end) else {
            return;
        };

        let budget = self.input_budget.entry(end).or_insert(step.input_speed);
        let delay = link.transport_delay as Ticks;
        let filter = link.filter.clone();
        let ready = |e: &InventoryEntry| {
            tick.saturating_sub(e.added_at) >= delay && filter.allows(e.material)
        };

        let wanted = link
            .inventory
            .count_where(ready)
            .min(link.input_speed.min(*budget) as usize);
        let moved = link
            .inventory
            .transfer_to(&mut step.inventory, wanted, ready, |e| e.added_at = tick);
        *budget -= moved;

        if moved > 0 {
            self.events.push(TickEvent::ItemsDelivered {
                transport: id,
                quantity: moved,
                tick,
            });
        }
        let held = wanted as u32 - moved;
        if held > 0 {
            self.events.push(TickEvent::CapacityExceeded {
                owner: InventoryOwner::Step(end),
                material: None,
                held,
                dropped: 0,
                tick,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Phase 2: Production
    // -----------------------------------------------------------------------

    fn phase_production(&mut self, state: &mut SimulationState) {
        let tick = self.tick;
        let ids: Vec<StepId> = state.graph.step_ids().collect();

        for id in ids {
            let SimulationState {
                graph,
                orders,
                next_entry_id,
                ..
            } = &mut *state;
            let Some((step, production)) = graph.step_with_production_mut(id) else {
                continue;
            };
            let Some(recipe) = step.recipe.clone() else {
                continue;
            };
            let duration = step.recipe_rate.max(1) as Ticks;

            // Start one cycle per free resource while inputs last.
            let free: Vec<ResourceId> = step
                .resources
                .iter()
                .filter(|r| r.available && !production.is_busy(r.id, tick))
                .map(|r| r.id)
                .collect();
            let mut started = 0;
            for &resource in &free {
                if !inputs_ready(&step.inventory, &recipe, tick) {
                    break;
                }
                let mut consumed = 0;
                let mut reserved = BTreeMap::new();
                for line in &recipe.inputs {
                    let taken = step.inventory.take_where(line.quantity as usize, |e| {
                        e.material == line.material && e.added_at < tick
                    });
                    consumed += taken.len() as u32;
                    for order in taken.iter().filter_map(|e| e.order) {
                        *reserved.entry(order).or_insert(0) += 1;
                    }
                }
                let cycle = ProductionCycle {
                    resource,
                    started_at: tick,
                    completes_at: tick + duration - 1,
                    orders: reserved,
                };
                if let Some(output) = cycle.output_order() {
                    for &absorbed in cycle.orders.keys().filter(|&&o| o != output) {
                        record_merge(orders, absorbed, output);
                    }
                }
                production.cycles.push(cycle);
                started += 1;
                self.events.push(TickEvent::CycleStarted {
                    step: id,
                    consumed,
                    tick,
                });
            }

            // Yield cycles whose last tick is now.
            let (done, running): (Vec<_>, Vec<_>) = production
                .cycles
                .drain(..)
                .partition(|c| c.completes_at <= tick);
            production.cycles = running;
            let finished = done.len();

            for cycle in done {
                let order = cycle.output_order();
                let mut produced = 0;
                for line in &recipe.outputs {
                    let mut dropped = 0;
                    for _ in 0..line.quantity {
                        if step.inventory.is_full() {
                            dropped += 1;
                            continue;
                        }
                        let entry = InventoryEntry {
                            id: EntryId(*next_entry_id),
                            material: line.material,
                            added_at: tick,
                            order,
                        };
                        if step.inventory.push(entry).is_ok() {
                            *next_entry_id += 1;
                            produced += 1;
                        }
                    }
                    if dropped > 0 {
                        tracing::warn!(
                            step = %id,
                            dropped,
                            tick,
                            "production output exceeded inventory limit"
                        );
                        self.events.push(TickEvent::CapacityExceeded {
                            owner: InventoryOwner::Step(id),
                            material: Some(line.material),
                            held: 0,
                            dropped,
                            tick,
                        });
                    }
                }
                production.completed_cycles += 1;
                self.events.push(TickEvent::CycleCompleted {
                    step: id,
                    produced,
                    tick,
                });
            }

            step.status = if started > 0 || finished > 0 || !production.cycles.is_empty() {
                StepStatus::Proceeding
            } else if free.is_empty() {
                self.events.push(TickEvent::StepBlocked { step: id, tick });
                StepStatus::Blocked
            } else if production.completed_cycles > 0 {
                StepStatus::Complete
            } else {
                StepStatus::Pending
            };
        }
    }

    // -----------------------------------------------------------------------
    // Phase 3: Orders
    // -----------------------------------------------------------------------

    /// An order completes once all of its units are reserved and none of
    /// them is still on the way: nothing tagged sits in a link, in a
    /// non-terminal step or in a running cycle, and every order that absorbed
    /// its units has completed. Its finished units then leave the terminal
    /// steps.
    fn phase_orders(&mut self, state: &mut SimulationState) {
        let tick = self.tick;
        let SimulationState { graph, orders, .. } = state;
        let terminal: Vec<StepId> = graph
            .steps()
            .filter(|s| s.is_terminal())
            .map(|s| s.id)
            .collect();
        if terminal.is_empty() {
            return;
        }

        let ids: Vec<OrderId> = orders.keys().copied().collect();
        // Completing an order can release the orders merged into it.
        loop {
            let mut changed = false;
            for &id in &ids {
                if !ready_to_complete(orders, id, tick) || in_flight(graph, id) {
                    continue;
                }

                let mut removed = 0;
                for &sid in &terminal {
                    let Some(step) = graph.step_mut(sid) else {
                        continue;
                    };
                    let recipe = step.recipe.clone();
                    removed += step
                        .inventory
                        .take_where(usize::MAX, |e| is_finished_unit(e, id, recipe.as_ref()))
                        .len() as u32;
                }

                let Some(order) = orders.get_mut(&id) else {
                    continue;
                };
                order.status = OrderStatus::Completed;
                order.completed_at = Some(tick);
                self.events.push(TickEvent::OrderCompleted {
                    order: id,
                    removed,
                    tick,
                });
                changed = true;
            }
            if !changed {
                break;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase 4: Sensors
    // -----------------------------------------------------------------------

    fn phase_sensors(&mut self, state: &mut SimulationState) {
        let tick = self.tick;
        let SimulationState {
            graph,
            rng,
            next_log_id,
            ..
        } = state;

        let step_ids: Vec<StepId> = graph.step_ids().collect();
        for id in step_ids {
            let Some(step) = graph.step_mut(id) else {
                continue;
            };
            for sensor in &mut step.sensors {
                if rng.chance(sensor.faulty_rate) {
                    sensor.log.push(crate::model::LogEntry {
                        id: *next_log_id,
                        tick,
                        message: format!("{} reported a fault", sensor.name),
                    });
                    *next_log_id += 1;
                    self.events.push(TickEvent::SensorFault {
                        sensor: sensor.id,
                        owner: InventoryOwner::Step(id),
                        tick,
                    });
                }
            }
        }

        let transport_ids: Vec<TransportId> = graph.transport_ids().collect();
        for id in transport_ids {
            let Some(link) = graph.transport_mut(id) else {
                continue;
            };
            for sensor in &mut link.sensors {
                if rng.chance(sensor.faulty_rate) {
                    sensor.log.push(crate::model::LogEntry {
                        id: *next_log_id,
                        tick,
                        message: format!("{} reported a fault", sensor.name),
                    });
                    *next_log_id += 1;
                    self.events.push(TickEvent::SensorFault {
                        sensor: sensor.id,
                        owner: InventoryOwner::Transport(id),
                        tick,
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether every recipe input is present among entries that entered before
/// `tick`.
fn inputs_ready(inventory: &Inventory, recipe: &Recipe, tick: Ticks) -> bool {
    recipe.inputs.iter().all(|line| {
        inventory.count_where(|e| e.material == line.material && e.added_at < tick)
            >= line.quantity as usize
    })
}

/// A tagged unit sitting in a terminal step counts as finished unless that
/// step still has to process it.
fn is_finished_unit(entry: &InventoryEntry, order: OrderId, recipe: Option<&Recipe>) -> bool {
    entry.order == Some(order) && !recipe.is_some_and(|r| r.consumes(entry.material))
}

/// Order-level completion conditions. An order is visible as in-progress
/// for at least one frame.
fn ready_to_complete(orders: &BTreeMap<OrderId, Order>, id: OrderId, tick: Ticks) -> bool {
    orders.get(&id).is_some_and(|o| {
        o.status == OrderStatus::InProgress
            && o.materials_reserved
            && o.started_at.is_some_and(|s| s < tick)
            && o.merged_into.iter().all(|m| {
                orders
                    .get(m)
                    .is_none_or(|t| t.status == OrderStatus::Completed)
            })
    })
}

/// Note that `output` carries units of `absorbed`. A merge that would make
/// two orders wait on each other is skipped.
fn record_merge(orders: &mut BTreeMap<OrderId, Order>, absorbed: OrderId, output: OrderId) {
    let mut stack = vec![output];
    let mut seen = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if id == absorbed {
            return;
        }
        if seen.insert(id) {
            if let Some(order) = orders.get(&id) {
                stack.extend(order.merged_into.iter().copied());
            }
        }
    }
    if let Some(order) = orders.get_mut(&absorbed) {
        order.merged_into.insert(output);
    }
}

/// Whether any unit or running cycle of `order` has yet to reach a terminal
/// step.
fn in_flight(graph: &EntityGraph, order: OrderId) -> bool {
    let tagged = |e: &InventoryEntry| e.order == Some(order);
    let in_steps = graph.steps().any(|s| {
        let pending = if s.is_terminal() {
            s.inventory
                .count_where(|e| tagged(e) && !is_finished_unit(e, order, s.recipe.as_ref()))
        } else {
            s.inventory.count_where(tagged)
        };
        pending > 0
            || graph
                .production(s.id)
                .is_some_and(|p| p.cycles.iter().any(|c| c.carries(order)))
    });
    in_steps || graph.transports().any(|t| t.inventory.count_where(tagged) > 0)
}

/// Reserve an untagged unit for the first open order of the link that takes
/// its material.
fn reserve_for(
    orders: &mut BTreeMap<OrderId, Order>,
    link_orders: &[OrderId],
    material: MaterialId,
    tick: Ticks,
    started: &mut Vec<OrderId>,
) -> Option<OrderId> {
    for id in link_orders {
        let Some(order) = orders.get_mut(id) else {
            continue;
        };
        if order.needs_units() && order.accepts(material) {
            if order.reserve_unit(tick) {
                started.push(order.id);
            }
            return Some(order.id);
        }
    }
    None
}
