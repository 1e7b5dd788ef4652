use crate::id::MaterialId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Builder that interns material names into dense [`MaterialId`]s.
///
/// Ids are assigned in first-seen order, so loading the same snapshot twice
/// yields the same numbering.
#[derive(Debug, Default)]
pub struct MaterialRegistryBuilder {
    names: Vec<String>,
    by_name: BTreeMap<String, MaterialId>,
}

impl MaterialRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `name`, registering it on first use.
    pub fn intern(&mut self, name: &str) -> MaterialId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = MaterialId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Look up an already registered material.
    pub fn get(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    /// Freeze the registry.
    pub fn build(self) -> MaterialRegistry {
        MaterialRegistry {
            names: self.names,
            by_name: self.by_name,
        }
    }
}

/// Immutable mapping between material names and ids, frozen at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRegistry {
    names: Vec<String>,
    by_name: BTreeMap<String, MaterialId>,
}

impl MaterialRegistry {
    /// Id of the material called `name`.
    pub fn id(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    /// Name of a material id.
    pub fn name(&self, id: MaterialId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    /// Number of registered materials.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (MaterialId(i as u32), n.as_str()))
    }
}
