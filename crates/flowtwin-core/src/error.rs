use crate::fixed::Ticks;
use crate::id::EntityKind;

/// Failures surfaced by the timeline and mutation operations. None of them
/// leaves the timeline partially modified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },
    #[error("tick {requested} is out of range (timeline holds {len} frames)")]
    OutOfRange { requested: Ticks, len: usize },
    #[error("another structural mutation is in progress")]
    StructuralMutationConflict,
}
