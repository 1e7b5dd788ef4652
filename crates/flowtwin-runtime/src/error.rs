use std::path::PathBuf;

use flowtwin_core::SimError;
use flowtwin_core::loader::LoadError;
use flowtwin_core::replay::ReplayError;
use flowtwin_core::serialize::SerializeError;
use flowtwin_stats::StatsError;

use crate::config::ConfigError;

/// Everything that can go wrong while driving a simulation.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("failed to load snapshot: {0}")]
    Load(#[from] LoadError),

    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("failed to write report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A thread holding the simulation lock panicked.
    #[error("simulation lock poisoned")]
    Poisoned,
}

impl RuntimeError {
    /// Whether this is a rejected concurrent structural mutation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RuntimeError::Sim(SimError::StructuralMutationConflict))
    }
}
