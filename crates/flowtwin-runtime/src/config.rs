use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use flowtwin_core::TimelineConfig;
use flowtwin_core::fixed::{Ticks, f64_to_fixed64};
use flowtwin_core::timeline::DEFAULT_MAX_TICKS;
use flowtwin_stats::StatsConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported config format: {file}")]
    UnsupportedFormat { file: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a config file from its extension.
pub fn detect_format(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

/// Bottleneck and throughput settings in file-friendly units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    pub bottleneck_threshold: f64,
    pub bottleneck_min_ticks: u32,
    pub throughput_window: Ticks,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            bottleneck_threshold: 0.8,
            bottleneck_min_ticks: 3,
            throughput_window: 60,
        }
    }
}

impl StatsSettings {
    pub fn to_stats_config(&self) -> StatsConfig {
        StatsConfig {
            bottleneck_threshold: f64_to_fixed64(self.bottleneck_threshold),
            bottleneck_min_ticks: self.bottleneck_min_ticks,
            throughput_window: self.throughput_window,
        }
    }
}

/// Settings for one simulation instance. Every field has a default, so an
/// empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub name: String,
    /// Seed for sensor fault sampling.
    pub seed: u64,
    /// Ticks the headless runner computes.
    pub ticks: Ticks,
    pub max_ticks: Ticks,
    /// Wall-clock period of the live driver.
    pub live_interval_ms: u64,
    pub stats: StatsSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: "simulation".to_string(),
            seed: 0,
            ticks: 100,
            max_ticks: DEFAULT_MAX_TICKS,
            live_interval_ms: 1_000,
            stats: StatsSettings::default(),
        }
    }
}

impl SimulationConfig {
    /// Read a config file, choosing the format by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let parse = |detail: String| ConfigError::Parse {
            file: path.to_path_buf(),
            detail,
        };
        let config: Self = match format {
            Format::Ron => ron::from_str(&content).map_err(|e| parse(e.to_string()))?,
            Format::Toml => toml::from_str(&content).map_err(|e| parse(e.to_string()))?,
            Format::Json => serde_json::from_str(&content).map_err(|e| parse(e.to_string()))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_ticks == 0 {
            return Err(ConfigError::Invalid("max_ticks must be positive".into()));
        }
        if self.ticks > self.max_ticks {
            return Err(ConfigError::Invalid(format!(
                "ticks ({}) exceeds max_ticks ({})",
                self.ticks, self.max_ticks
            )));
        }
        if !(0.0..=1.0).contains(&self.stats.bottleneck_threshold) {
            return Err(ConfigError::Invalid(format!(
                "bottleneck_threshold {} outside [0, 1]",
                self.stats.bottleneck_threshold
            )));
        }
        if self.stats.throughput_window == 0 {
            return Err(ConfigError::Invalid(
                "throughput_window must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn timeline_config(&self) -> TimelineConfig {
        TimelineConfig {
            max_ticks: self.max_ticks,
        }
    }

    pub fn stats_config(&self) -> StatsConfig {
        self.stats.to_stats_config()
    }

    pub fn live_interval(&self) -> Duration {
        Duration::from_millis(self.live_interval_ms)
    }
}
