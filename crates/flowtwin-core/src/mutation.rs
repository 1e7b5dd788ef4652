//! Structural mutation of a running timeline.
//!
//! The only supported edit is switching a transport system on or off. The
//! edit lands on the cursor frame; every later frame described a future that
//! no longer exists and is discarded. The cursor stays put, and the next
//! `tick_forward` or forward `jump_to_tick` recomputes from the edited frame.

use crate::error::SimError;
use crate::fixed::Ticks;
use crate::hash::state_hash;
use crate::id::{EntityKind, TransportId};
use crate::timeline::Timeline;
use serde::{Deserialize, Serialize};

/// A transport toggle applied at `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub tick: Ticks,
    pub transport: TransportId,
    /// Flag value after the mutation.
    pub active: bool,
}

/// What a mutation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub transport: TransportId,
    pub active: bool,
    /// Frames dropped after the cursor.
    pub discarded: usize,
}

impl Timeline {
    /// Flip the `active` flag of `id` in the cursor frame and drop all later
    /// frames.
    pub fn toggle_transport_system(&mut self, id: TransportId) -> Result<MutationOutcome, SimError> {
        let active = self.transport_flag(id)?;
        self.apply_transport_flag(id, !active)
    }

    /// Set the `active` flag of `id` in the cursor frame. Setting the value
    /// it already has is a no-op and keeps the future frames.
    pub fn set_transport_active(
        &mut self,
        id: TransportId,
        active: bool,
    ) -> Result<MutationOutcome, SimError> {
        if self.transport_flag(id)? == active {
            return Ok(MutationOutcome {
                transport: id,
                active,
                discarded: 0,
            });
        }
        self.apply_transport_flag(id, active)
    }

    /// Current flag of `id` in the cursor frame.
    fn transport_flag(&self, id: TransportId) -> Result<bool, SimError> {
        let frame = self.current_frame().ok_or(SimError::OutOfRange {
            requested: self.cursor as Ticks,
            len: self.frames.len(),
        })?;
        frame
            .state
            .graph
            .transport(id)
            .map(|t| t.active)
            .ok_or(SimError::NotFound {
                kind: EntityKind::TransportSystem,
                id: id.0,
            })
    }

    fn apply_transport_flag(
        &mut self,
        id: TransportId,
        active: bool,
    ) -> Result<MutationOutcome, SimError> {
        let len = self.frames.len();
        let cursor = self.cursor;
        let frame = self.frames.get_mut(cursor).ok_or(SimError::OutOfRange {
            requested: cursor as Ticks,
            len,
        })?;
        frame
            .state
            .set_transport_active(id, active)
            .ok_or(SimError::NotFound {
                kind: EntityKind::TransportSystem,
                id: id.0,
            })?;
        frame.hash = state_hash(&frame.state);
        let tick = frame.tick;

        let discarded = self.truncate_after_cursor();
        self.mutations.retain(|m| m.tick <= tick);
        self.mutations.push(MutationRecord {
            tick,
            transport: id,
            active,
        });

        tracing::debug!(transport = %id, active, tick, discarded, "transport toggled");
        Ok(MutationOutcome {
            transport: id,
            active,
            discarded,
        })
    }
}
