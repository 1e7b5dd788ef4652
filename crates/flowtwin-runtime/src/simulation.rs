use std::path::Path;

use flowtwin_core::fixed::Ticks;
use flowtwin_core::id::TransportId;
use flowtwin_core::loader::{LoadOptions, LoadedSnapshot, load_snapshot_json};
use flowtwin_core::mutation::MutationOutcome;
use flowtwin_core::query::{FrameView, frame_view};
use flowtwin_core::registry::MaterialRegistry;
use flowtwin_core::replay::ReplayLog;
use flowtwin_core::serialize::serialize_state;
use flowtwin_core::{Frame, Timeline};
use flowtwin_stats::{Bottleneck, FrameKpis, KpiAggregator, SimulationReport, StatsConfig};

use crate::config::SimulationConfig;
use crate::error::RuntimeError;

/// Frames of a run together with the metrics derived from them.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub frames: Vec<Frame>,
    pub kpis: Vec<FrameKpis>,
    pub bottlenecks: Vec<Bottleneck>,
}

/// A timeline paired with an aggregator that always covers every frame.
#[derive(Debug)]
pub struct Simulation {
    name: String,
    timeline: Timeline,
    materials: MaterialRegistry,
    stats_config: StatsConfig,
    aggregator: KpiAggregator,
}

impl Simulation {
    pub fn new(name: impl Into<String>, loaded: LoadedSnapshot, config: &SimulationConfig) -> Self {
        let stats_config = config.stats_config();
        Self {
            name: name.into(),
            timeline: Timeline::new(loaded.state, config.timeline_config()),
            materials: loaded.materials,
            stats_config,
            aggregator: KpiAggregator::new(stats_config),
        }
    }

    /// Parse a JSON snapshot using the seed and limits of `config`.
    pub fn from_json(json: &str, config: &SimulationConfig) -> Result<Self, RuntimeError> {
        let loaded = load_snapshot_json(json, LoadOptions { seed: config.seed })?;
        Ok(Self::new(config.name.clone(), loaded, config))
    }

    /// Read a JSON snapshot from `path`.
    pub fn load(path: &Path, config: &SimulationConfig) -> Result<Self, RuntimeError> {
        let json = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json, config)
    }

    // -- Timeline operations ------------------------------------------------

    /// Recompute the timeline from scratch for `ticks` ticks.
    pub fn run(&mut self, ticks: Ticks) -> Result<&[Frame], RuntimeError> {
        self.timeline.run(ticks)?;
        self.reaggregate()?;
        Ok(self.timeline.frames())
    }

    pub fn tick_forward(&mut self) -> Result<&Frame, RuntimeError> {
        self.timeline.tick_forward()?;
        self.catch_up()?;
        self.current_frame()
    }

    /// Move the cursor to `tick`, computing missing frames.
    pub fn jump_to_tick(&mut self, tick: Ticks) -> Result<&Frame, RuntimeError> {
        self.timeline.jump_to_tick(tick)?;
        self.catch_up()?;
        self.current_frame()
    }

    /// Flip a link and recompute the metrics of the truncated timeline.
    pub fn toggle_transport_system(
        &mut self,
        id: TransportId,
    ) -> Result<MutationOutcome, RuntimeError> {
        let outcome = self.timeline.toggle_transport_system(id)?;
        self.reaggregate()?;
        Ok(outcome)
    }

    pub fn set_transport_active(
        &mut self,
        id: TransportId,
        active: bool,
    ) -> Result<MutationOutcome, RuntimeError> {
        let outcome = self.timeline.set_transport_active(id, active)?;
        if outcome.discarded > 0 || self.aggregator.frames_observed() != self.timeline.len() {
            self.reaggregate()?;
        }
        Ok(outcome)
    }

    /// Observe frames appended since the last sync.
    fn catch_up(&mut self) -> Result<(), RuntimeError> {
        let observed = self.aggregator.frames_observed();
        for frame in &self.timeline.frames()[observed..] {
            self.aggregator.observe(frame)?;
        }
        Ok(())
    }

    /// Rebuild the aggregates after frames were replaced or discarded.
    fn reaggregate(&mut self) -> Result<(), RuntimeError> {
        self.aggregator = KpiAggregator::aggregate(self.stats_config, self.timeline.frames())?;
        Ok(())
    }

    fn current_frame(&self) -> Result<&Frame, RuntimeError> {
        self.timeline.current_frame().ok_or_else(|| {
            RuntimeError::Sim(flowtwin_core::SimError::OutOfRange {
                requested: 0,
                len: self.timeline.len(),
            })
        })
    }

    // -- Read access --------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    pub fn aggregator(&self) -> &KpiAggregator {
        &self.aggregator
    }

    pub fn current_tick(&self) -> Option<Ticks> {
        self.timeline.current_tick()
    }

    pub fn frame_view(&self, tick: Ticks) -> Option<FrameView> {
        self.timeline.frame(tick).map(frame_view)
    }

    pub fn current_view(&self) -> Option<FrameView> {
        self.timeline.current_frame().map(frame_view)
    }

    pub fn simulation_run(&self) -> SimulationRun {
        SimulationRun {
            frames: self.timeline.frames().to_vec(),
            kpis: self.aggregator.kpis().to_vec(),
            bottlenecks: self.aggregator.bottlenecks().to_vec(),
        }
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport::from_aggregator(&self.name, &self.aggregator)
    }

    /// Binary snapshot of the cursor frame, or of the initial state while
    /// the timeline is empty.
    pub fn snapshot(&self) -> Result<Vec<u8>, RuntimeError> {
        let state = self
            .timeline
            .current_frame()
            .map_or(self.timeline.initial(), |f| &f.state);
        Ok(serialize_state(state, &self.materials)?)
    }

    /// An empty replay log starting from the initial snapshot.
    pub fn replay_log(&self) -> Result<ReplayLog, RuntimeError> {
        Ok(ReplayLog::new(
            self.timeline.initial(),
            &self.materials,
            *self.timeline.config(),
        )?)
    }
}
