//! Binary snapshots of simulation state.
//!
//! Snapshots are `bitcode`-encoded with a versioned header so that replay
//! logs and saved runs can be checked before they are decoded.

use crate::fixed::Ticks;
use crate::graph::SimulationState;
use crate::registry::MaterialRegistry;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a flowtwin state snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xF10A_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header stored in front of every snapshot payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// `next_tick` of the stored state.
    pub tick: Ticks,
}

impl SnapshotHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateSnapshot {
    header: SnapshotHeader,
    state: SimulationState,
    materials: MaterialRegistry,
}

/// Encode a state and its material registry.
pub fn serialize_state(
    state: &SimulationState,
    materials: &MaterialRegistry,
) -> Result<Vec<u8>, SerializeError> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        header: SnapshotHeader,
        state: &'a SimulationState,
        materials: &'a MaterialRegistry,
    }
    let snapshot = Borrowed {
        header: SnapshotHeader::new(state.next_tick),
        state,
        materials,
    };
    bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
}

/// Decode a snapshot written by [`serialize_state`].
pub fn deserialize_state(
    data: &[u8],
) -> Result<(SimulationState, MaterialRegistry), DeserializeError> {
    let snapshot: StateSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    snapshot.header.validate()?;
    Ok((snapshot.state, snapshot.materials))
}

/// Read just the header of a snapshot. bitcode has no partial decoding, so
/// this decodes the whole payload.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    let snapshot: StateSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::advance;
    use crate::hash::state_hash;
    use crate::test_utils::*;

    #[test]
    fn snapshot_preserves_state_hash() {
        let (state, _) = single_step_line();
        let frame = advance(&advance(&state).state);
        let registry = {
            let mut builder = crate::registry::MaterialRegistryBuilder::new();
            builder.intern("A");
            builder.intern("B");
            builder.build()
        };

        let bytes = serialize_state(&frame.state, &registry).unwrap();
        let (decoded, materials) = deserialize_state(&bytes).unwrap();
        assert_eq!(state_hash(&decoded), frame.hash);
        assert_eq!(materials, registry);
        assert_eq!(read_snapshot_header(&bytes).unwrap().tick, 2);
    }

    #[test]
    fn decoded_state_continues_identically() {
        let (state, _) = order_line(2);
        let mid = advance(&advance(&state).state).state;
        let bytes = serialize_state(&mid, &MaterialRegistry::default()).unwrap();
        let (decoded, _) = deserialize_state(&bytes).unwrap();

        let a = run_ticks(&mid, 5);
        let b = run_ticks(&decoded, 5);
        let ha: Vec<_> = a.iter().map(|f| f.hash).collect();
        let hb: Vec<_> = b.iter().map(|f| f.hash).collect();
        assert_eq!(ha, hb);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            deserialize_state(&[1, 2, 3]),
            Err(DeserializeError::Decode(_))
        ));
    }

    #[test]
    fn header_validation() {
        assert!(SnapshotHeader::new(0).validate().is_ok());
        let mut header = SnapshotHeader::new(0);
        header.magic = 0;
        assert!(matches!(header.validate(), Err(DeserializeError::InvalidMagic(0))));
        header.magic = SNAPSHOT_MAGIC;
        header.version = FORMAT_VERSION + 1;
        assert!(matches!(header.validate(), Err(DeserializeError::FutureVersion(_))));
    }
}
