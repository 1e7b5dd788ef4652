//! Deterministic hashing of simulation state.
//!
//! Every frame stores the hash of its state so that two runs, a replay, or a
//! recomputation after a mutation can be compared cheaply.

use crate::graph::SimulationState;
use crate::inventory::{Inventory, InventoryEntry};
use crate::model::{OrderStatus, Sensor, StepStatus};

/// FNV-1a (64-bit) hasher. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Hasher at the FNV-1a offset basis.
    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Mix raw bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write(&[v]);
    }

    fn write_opt_u64(&mut self, v: Option<u64>) {
        match v {
            Some(v) => {
                self.write_u8(1);
                self.write_u64(v);
            }
            None => self.write_u8(0),
        }
    }

    fn write_entry(&mut self, entry: &InventoryEntry) {
        self.write_u64(entry.id.0);
        self.write_u32(entry.material.0);
        self.write_u64(entry.added_at);
        self.write_opt_u64(entry.order.map(|o| o.0));
    }

    fn write_inventory(&mut self, inventory: &Inventory) {
        self.write_u32(inventory.limit);
        self.write_u64(inventory.len() as u64);
        for entry in inventory.iter() {
            self.write_entry(entry);
        }
    }

    fn write_sensors(&mut self, sensors: &[Sensor]) {
        for sensor in sensors {
            self.write_u64(sensor.id.0);
            self.write_u64(sensor.log.len() as u64);
        }
    }

    /// Final 64-bit digest.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash everything that evolves during a run. Names and descriptions are
/// static and left out.
pub fn state_hash(state: &SimulationState) -> u64 {
    let mut h = StateHash::new();
    h.write_u64(state.next_tick);
    h.write_u64(state.rng.state());
    h.write_u64(state.next_entry_id);
    h.write_u64(state.next_log_id);

    for step in state.graph.steps() {
        h.write_u64(step.id.0);
        h.write_u8(match step.status {
            StepStatus::Pending => 0,
            StepStatus::Proceeding => 1,
            StepStatus::Blocked => 2,
            StepStatus::Complete => 3,
        });
        h.write_inventory(&step.inventory);
        h.write_sensors(&step.sensors);
        if let Some(production) = state.graph.production(step.id) {
            h.write_u64(production.completed_cycles);
            for cycle in &production.cycles {
                h.write_u64(cycle.resource.0);
                h.write_u64(cycle.started_at);
                h.write_u64(cycle.completes_at);
                h.write_u64(cycle.orders.len() as u64);
                for (order, units) in &cycle.orders {
                    h.write_u64(order.0);
                    h.write_u32(*units);
                }
            }
        }
    }

    for transport in state.graph.transports() {
        h.write_u64(transport.id.0);
        h.write_u8(transport.active as u8);
        h.write_inventory(&transport.inventory);
        h.write_sensors(&transport.sensors);
    }

    for order in state.orders.values() {
        h.write_u64(order.id.0);
        h.write_u8(match order.status {
            OrderStatus::Pending => 0,
            OrderStatus::InProgress => 1,
            OrderStatus::Completed => 2,
        });
        h.write_u32(order.reserved);
        h.write_opt_u64(order.started_at);
        h.write_opt_u64(order.completed_at);
        h.write_u64(order.merged_into.len() as u64);
        for merged in &order.merged_into {
            h.write_u64(merged.0);
        }
    }

    h.finish()
}
