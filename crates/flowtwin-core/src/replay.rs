//! Replay recording and playback.
//!
//! A replay log is an initial snapshot plus the timeline commands applied to
//! it. Playing it back rebuilds the same timeline; checkpoints recorded along
//! the way let playback confirm that every frame hash still matches.

use crate::error::SimError;
use crate::fixed::Ticks;
use crate::graph::SimulationState;
use crate::hash::state_hash;
use crate::id::TransportId;
use crate::registry::MaterialRegistry;
use crate::serialize::{DeserializeError, SerializeError, deserialize_state, serialize_state};
use crate::timeline::{Timeline, TimelineConfig};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ReplayCommand
// ---------------------------------------------------------------------------

/// A timeline operation that can be recorded and replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayCommand {
    Run { ticks: Ticks },
    TickForward,
    JumpToTick { tick: Ticks },
    ToggleTransport { transport: TransportId },
}

impl ReplayCommand {
    /// Apply the command to `timeline`.
    pub fn apply(&self, timeline: &mut Timeline) -> Result<(), SimError> {
        match *self {
            ReplayCommand::Run { ticks } => {
                timeline.run(ticks)?;
            }
            ReplayCommand::TickForward => {
                timeline.tick_forward()?;
            }
            ReplayCommand::JumpToTick { tick } => {
                timeline.jump_to_tick(tick)?;
            }
            ReplayCommand::ToggleTransport { transport } => {
                timeline.toggle_transport_system(transport)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("snapshot decode failed: {0}")]
    Deserialize(#[from] DeserializeError),
    #[error("command {index} failed: {source}")]
    Command {
        index: usize,
        #[source]
        source: SimError,
    },
}

/// Details about where replay verification failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayMismatch {
    pub command_index: usize,
    pub expected_hash: u64,
    pub actual_hash: u64,
}

// ---------------------------------------------------------------------------
// ReplayLog
// ---------------------------------------------------------------------------

/// A recorded sequence of commands starting from a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLog {
    /// [`serialize_state`] bytes of the initial state.
    pub initial_snapshot: Vec<u8>,
    pub config: TimelineConfig,
    pub commands: Vec<ReplayCommand>,
    /// `(command_index, cursor hash after that command)`.
    pub hash_checkpoints: Vec<(usize, u64)>,
}

impl ReplayLog {
    pub fn new(
        initial: &SimulationState,
        materials: &MaterialRegistry,
        config: TimelineConfig,
    ) -> Result<Self, SerializeError> {
        Ok(Self {
            initial_snapshot: serialize_state(initial, materials)?,
            config,
            commands: Vec::new(),
            hash_checkpoints: Vec::new(),
        })
    }

    /// Append a command without a hash checkpoint.
    pub fn record(&mut self, cmd: ReplayCommand) {
        self.commands.push(cmd);
    }

    pub fn record_with_hash(&mut self, cmd: ReplayCommand, hash: u64) {
        let index = self.commands.len();
        self.commands.push(cmd);
        self.hash_checkpoints.push((index, hash));
    }

    /// Number of recorded commands.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Encode the log with bitcode.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        bitcode::serialize(self).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Decode a log written by [`ReplayLog::serialize`].
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))
    }
}

/// Hash of the cursor frame, or of the initial state while the timeline is
/// empty.
pub fn cursor_hash(timeline: &Timeline) -> u64 {
    timeline
        .current_frame()
        .map_or_else(|| state_hash(timeline.initial()), |f| f.hash)
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ReplayResult {
    pub timeline: Timeline,
    pub commands_executed: usize,
    pub is_verified: bool,
    pub first_mismatch: Option<ReplayMismatch>,
}

fn start(log: &ReplayLog) -> Result<Timeline, ReplayError> {
    let (state, _) = deserialize_state(&log.initial_snapshot)?;
    Ok(Timeline::new(state, log.config))
}

/// Replay a log and compare every hash checkpoint.
pub fn replay_and_verify(log: &ReplayLog) -> Result<ReplayResult, ReplayError> {
    let mut timeline = start(log)?;
    let mut first_mismatch = None;
    let mut checkpoints = log.hash_checkpoints.iter().peekable();

    for (index, cmd) in log.commands.iter().enumerate() {
        cmd.apply(&mut timeline)
            .map_err(|source| ReplayError::Command { index, source })?;

        while let Some(&&(at, expected_hash)) = checkpoints.peek() {
            if at != index {
                break;
            }
            checkpoints.next();
            let actual_hash = cursor_hash(&timeline);
            if actual_hash != expected_hash && first_mismatch.is_none() {
                first_mismatch = Some(ReplayMismatch {
                    command_index: index,
                    expected_hash,
                    actual_hash,
                });
            }
        }
    }

    if let Some(mismatch) = &first_mismatch {
        tracing::warn!(
            command = mismatch.command_index,
            expected = mismatch.expected_hash,
            actual = mismatch.actual_hash,
            "replay diverged"
        );
    }
    Ok(ReplayResult {
        timeline,
        commands_executed: log.commands.len(),
        is_verified: first_mismatch.is_none(),
        first_mismatch,
    })
}

/// Replay a log without verification.
pub fn replay(log: &ReplayLog) -> Result<Timeline, ReplayError> {
    let mut timeline = start(log)?;
    for (index, cmd) in log.commands.iter().enumerate() {
        cmd.apply(&mut timeline)
            .map_err(|source| ReplayError::Command { index, source })?;
    }
    Ok(timeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn recorded() -> ReplayLog {
        let (state, ids) = single_step_line();
        let config = TimelineConfig { max_ticks: 20 };
        let mut log = ReplayLog::new(&state, &MaterialRegistry::default(), config).unwrap();
        let mut live = Timeline::new(state, config);

        let commands = [
            ReplayCommand::Run { ticks: 4 },
            ReplayCommand::JumpToTick { tick: 2 },
            ReplayCommand::ToggleTransport {
                transport: ids.inbound,
            },
            ReplayCommand::JumpToTick { tick: 6 },
            ReplayCommand::TickForward,
        ];
        for cmd in commands {
            cmd.apply(&mut live).unwrap();
            log.record_with_hash(cmd, cursor_hash(&live));
        }
        log
    }

    #[test]
    fn replay_reproduces_timeline() {
        let log = recorded();
        let result = replay_and_verify(&log).unwrap();
        assert!(result.is_verified);
        assert_eq!(result.commands_executed, 5);
        assert_eq!(result.timeline.len(), 8);
        assert_eq!(result.timeline.current_tick(), Some(7));
    }

    #[test]
    fn tampered_checkpoint_is_reported() {
        let mut log = recorded();
        log.hash_checkpoints[3].1 ^= 1;
        let result = replay_and_verify(&log).unwrap();
        assert!(!result.is_verified);
        assert_eq!(result.first_mismatch.unwrap().command_index, 3);
    }

    #[test]
    fn failing_command_reports_index() {
        let (state, _) = single_step_line();
        let mut log =
            ReplayLog::new(&state, &MaterialRegistry::default(), TimelineConfig::default())
                .unwrap();
        log.record(ReplayCommand::TickForward);
        let err = replay(&log).unwrap_err();
        assert!(matches!(err, ReplayError::Command { index: 0, .. }));
    }

    #[test]
    fn log_survives_encoding() {
        let log = recorded();
        let bytes = log.serialize().unwrap();
        let decoded = ReplayLog::deserialize(&bytes).unwrap();
        assert_eq!(decoded.commands, log.commands);
        assert!(replay_and_verify(&decoded).unwrap().is_verified);
    }
}
