//! The frame timeline: an append-only sequence of frames plus a cursor.
//!
//! Frame `i` holds the state at the end of tick `i`. The initial snapshot is
//! kept separately so that [`Timeline::run`] can always restart from it.
//! Frames are never edited in place except by the mutation controller, which
//! edits the cursor frame and discards everything after it.

use crate::engine::advance;
use crate::error::SimError;
use crate::event::TickEvent;
use crate::fixed::Ticks;
use crate::graph::SimulationState;
use crate::mutation::MutationRecord;
use serde::{Deserialize, Serialize};

/// Default upper bound on the number of frames a timeline may hold.
pub const DEFAULT_MAX_TICKS: Ticks = 100_000;

/// Full state of the system at the end of one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub tick: Ticks,
    pub state: SimulationState,
    /// Events recorded while the tick was applied.
    pub events: Vec<TickEvent>,
    /// [`state_hash`](crate::hash::state_hash) of `state`.
    pub hash: u64,
}

/// Limits applied to a [`Timeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Frames with index `>= max_ticks` are never produced.
    pub max_ticks: Ticks,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }
}

/// Frames computed so far from one initial state, plus a cursor into them.
///
/// Frame `i` is always the result of applying tick `i`, and frames are only
/// ever appended or truncated from the end.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub(crate) initial: SimulationState,
    pub(crate) frames: Vec<Frame>,
    /// Index of the current frame. Meaningless while `frames` is empty.
    pub(crate) cursor: usize,
    pub(crate) config: TimelineConfig,
    pub(crate) mutations: Vec<MutationRecord>,
}

impl Timeline {
    /// An empty timeline over `initial`.
    pub fn new(initial: SimulationState, config: TimelineConfig) -> Self {
        Self {
            initial,
            frames: Vec::new(),
            cursor: 0,
            config,
            mutations: Vec::new(),
        }
    }

    /// Discard all frames and mutations, then compute `ticks` frames from the
    /// initial snapshot. The cursor lands on the last frame.
    pub fn run(&mut self, ticks: Ticks) -> Result<&[Frame], SimError> {
        if ticks > self.config.max_ticks {
            return Err(SimError::OutOfRange {
                requested: ticks,
                len: self.frames.len(),
            });
        }
        tracing::debug!(ticks, "running timeline from initial snapshot");

        self.frames.clear();
        self.mutations.clear();
        self.cursor = 0;
        self.frames.reserve(ticks as usize);
        for _ in 0..ticks {
            self.append_next();
        }
        self.cursor = self.frames.len().saturating_sub(1);
        Ok(&self.frames)
    }

    /// Compute one frame after the last one and move the cursor onto it.
    pub fn tick_forward(&mut self) -> Result<&Frame, SimError> {
        let len = self.frames.len();
        if len == 0 || len as Ticks >= self.config.max_ticks {
            return Err(SimError::OutOfRange {
                requested: len as Ticks,
                len,
            });
        }
        self.append_next();
        self.cursor = len;
        Ok(&self.frames[len])
    }

    /// Move the cursor to `target`, computing missing frames from the last
    /// one when `target` lies beyond the end. Seeking to an existing frame
    /// never recomputes it.
    pub fn jump_to_tick(&mut self, target: Ticks) -> Result<&Frame, SimError> {
        let len = self.frames.len();
        if len == 0 || target >= self.config.max_ticks {
            return Err(SimError::OutOfRange {
                requested: target,
                len,
            });
        }
        if (target as usize) >= len {
            tracing::debug!(from = len, to = target, "extending timeline");
            while self.frames.len() <= target as usize {
                self.append_next();
            }
        }
        self.cursor = target as usize;
        Ok(&self.frames[self.cursor])
    }

    fn append_next(&mut self) {
        let base = self.frames.last().map_or(&self.initial, |f| &f.state);
        let frame = advance(base);
        debug_assert_eq!(frame.tick, self.frames.len() as Ticks);
        self.frames.push(frame);
    }

    /// Drop every frame after the cursor. Returns how many were dropped.
    pub(crate) fn truncate_after_cursor(&mut self) -> usize {
        let keep = self.cursor + 1;
        let discarded = self.frames.len().saturating_sub(keep);
        self.frames.truncate(keep);
        discarded
    }

    // -- Read access --------------------------------------------------------

    /// Tick of the cursor frame, `None` while the timeline is empty.
    pub fn current_tick(&self) -> Option<Ticks> {
        (!self.frames.is_empty()).then_some(self.cursor as Ticks)
    }

    /// Frame under the cursor.
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.get(self.cursor)
    }

    /// Frame produced by `tick`, if it has been computed.
    pub fn frame(&self, tick: Ticks) -> Option<&Frame> {
        self.frames.get(usize::try_from(tick).ok()?)
    }

    /// All computed frames, indexed by tick.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Most recently computed frame, regardless of the cursor.
    pub fn last_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Number of computed frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no tick has been computed yet.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// State that tick 0 is applied to.
    pub fn initial(&self) -> &SimulationState {
        &self.initial
    }

    /// Limits this timeline was created with.
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Structural mutations still reflected by the frames, oldest first.
    pub fn mutations(&self) -> &[MutationRecord] {
        &self.mutations
    }
}
