use crate::fixed::{Fixed64, Ticks, ratio};
use crate::id::{EntryId, MaterialId, OrderId, StepId, TransportId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The entity that owns an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InventoryOwner {
    Step(StepId),
    Transport(TransportId),
}

/// One unit of material. Entries are moved between inventories, never copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub id: EntryId,
    pub material: MaterialId,
    /// Tick at which the entry entered its current inventory.
    pub added_at: Ticks,
    /// The order this unit is reserved for, if any.
    pub order: Option<OrderId>,
}

/// A bounded, ordered (FIFO) store of [`InventoryEntry`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub owner: InventoryOwner,
    pub limit: u32,
    entries: VecDeque<InventoryEntry>,
}

impl Inventory {
    /// An empty inventory holding at most `limit` entries.
    pub fn new(owner: InventoryOwner, limit: u32) -> Self {
        Self {
            owner,
            limit,
            entries: VecDeque::new(),
        }
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Free capacity.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.entries.len() as u32)
    }

    /// Whether the limit is reached; pushes fail until something leaves.
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Occupancy as `len / limit`. A zero limit reports zero.
    pub fn occupancy(&self) -> Fixed64 {
        ratio(self.entries.len() as u64, self.limit as u64)
    }

    /// Append an entry. A full inventory hands the entry back to the caller.
    #[must_use = "a rejected entry must be accounted for"]
    pub fn push(&mut self, entry: InventoryEntry) -> Result<(), InventoryEntry> {
        if self.is_full() {
            return Err(entry);
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Remove up to `max` entries matching `pred`, oldest first, preserving
    /// the relative order of everything left behind.
    pub fn take_where<F>(&mut self, max: usize, mut pred: F) -> Vec<InventoryEntry>
    where
        F: FnMut(&InventoryEntry) -> bool,
    {
        if max == 0 {
            return Vec::new();
        }
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_front() {
            if taken.len() < max && pred(&entry) {
                taken.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        taken
    }

    /// Move up to `max` entries matching `pred` into `dest`, bounded by the
    /// free capacity of `dest`. `on_move` sees each entry before it lands.
    /// Returns the number of entries moved.
    pub fn transfer_to<P, F>(
        &mut self,
        dest: &mut Inventory,
        max: usize,
        pred: P,
        mut on_move: F,
    ) -> u32
    where
        P: FnMut(&InventoryEntry) -> bool,
        F: FnMut(&mut InventoryEntry),
    {
        let max = max.min(dest.remaining() as usize);
        let moved = self.take_where(max, pred);
        let count = moved.len() as u32;
        for mut entry in moved {
            on_move(&mut entry);
            dest.entries.push_back(entry);
        }
        count
    }

    /// Number of entries matching `pred`.
    pub fn count_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&InventoryEntry) -> bool,
    {
        self.entries.iter().filter(|e| pred(e)).count()
    }

    /// Quantity of a given material.
    pub fn quantity(&self, material: MaterialId) -> usize {
        self.count_where(|e| e.material == material)
    }

    /// Per-material totals in material-id order.
    pub fn contents(&self) -> Vec<(MaterialId, u32)> {
        let mut totals: Vec<(MaterialId, u32)> = Vec::new();
        for entry in &self.entries {
            match totals.iter_mut().find(|(m, _)| *m == entry.material) {
                Some((_, q)) => *q += 1,
                None => totals.push((entry.material, 1)),
            }
        }
        totals.sort_by_key(|(m, _)| *m);
        totals
    }

    /// Entries in FIFO order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut InventoryEntry> {
        self.entries.iter_mut()
    }
}
