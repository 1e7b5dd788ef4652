//! KPI and bottleneck aggregation over flowtwin frames.
//!
//! Derives order counts, throughput and queue metrics from every frame of a
//! simulation run and flags inventories that stay congested. Aggregation
//! reads frames only; it never writes to the timeline.
//!
//! # Usage
//!
//! ```ignore
//! let mut kpis = KpiAggregator::new(StatsConfig::default());
//! // Incrementally, as frames are appended:
//! kpis.observe(timeline.last_frame().unwrap())?;
//! // Or in one pass over a finished run:
//! let kpis = KpiAggregator::aggregate(StatsConfig::default(), timeline.frames())?;
//! let report = SimulationReport::from_aggregator("line 1", &kpis);
//! ```

pub mod report;

pub use report::{BottleneckRecord, KpiRecord, SimulationReport};

use std::collections::BTreeMap;

use flowtwin_core::Frame;
use flowtwin_core::event::TickEvent;
use flowtwin_core::fixed::{Fixed64, Ticks, ratio};
use flowtwin_core::inventory::InventoryOwner;
use flowtwin_core::model::OrderStatus;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsConfig {
    /// Occupancy (`len / limit`) above which an inventory counts as congested.
    pub bottleneck_threshold: Fixed64,
    /// Congested ticks in a row tolerated before a bottleneck is recorded.
    pub bottleneck_min_ticks: u32,
    /// Window size in ticks for trailing throughput.
    pub throughput_window: Ticks,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            bottleneck_threshold: Fixed64::from_num(0.8),
            bottleneck_min_ticks: 3,
            throughput_window: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    #[error("frame for tick {got} observed, expected tick {expected}")]
    OutOfOrder { expected: Ticks, got: Ticks },
}

// ---------------------------------------------------------------------------
// Rolling window counter
// ---------------------------------------------------------------------------

/// Per-tick counts over the most recent `window_size` ticks.
///
/// Call [`add`](Self::add) during a tick and [`commit`](Self::commit) once at
/// its end.
#[derive(Debug, Clone)]
struct RollingWindow {
    tick_counts: Vec<u64>,
    write_pos: usize,
    committed_total: u64,
    current: u64,
    committed_count: usize,
}

impl RollingWindow {
    fn new(window_size: usize) -> Self {
        Self {
            tick_counts: vec![0; window_size.max(1)],
            write_pos: 0,
            committed_total: 0,
            current: 0,
            committed_count: 0,
        }
    }

    fn add(&mut self, count: u64) {
        self.current += count;
    }

    /// Close the current tick, evicting the oldest one when full.
    fn commit(&mut self) {
        let size = self.tick_counts.len();
        if self.committed_count == size {
            self.committed_total -= self.tick_counts[self.write_pos];
        }
        self.tick_counts[self.write_pos] = self.current;
        self.committed_total += self.current;
        self.current = 0;
        self.write_pos = (self.write_pos + 1) % size;
        if self.committed_count < size {
            self.committed_count += 1;
        }
    }

    /// Average per committed tick.
    fn rate(&self) -> Fixed64 {
        ratio(self.committed_total, self.committed_count as u64)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Metrics derived from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameKpis {
    pub tick: Ticks,
    pub pending_orders: u32,
    pub in_progress_orders: u32,
    pub completed_orders: u32,
    /// Orders completed during this tick.
    pub orders_completed: u32,
    pub orders_completed_total: u64,
    /// Units yielded by production cycles during this tick.
    pub units_produced: u32,
    pub units_produced_total: u64,
    /// Entries held by process steps.
    pub queue_depth: u32,
    /// Entries held by transport systems.
    pub in_transit: u32,
    /// Orders per tick over the trailing window.
    pub order_throughput: Fixed64,
    /// Units per tick over the trailing window.
    pub unit_throughput: Fixed64,
    /// Orders per tick since tick 0.
    pub avg_order_throughput: Fixed64,
    /// Units per tick since tick 0.
    pub avg_unit_throughput: Fixed64,
    /// Mean `completed_at - started_at` of completed orders.
    pub avg_cycle_time: Option<Fixed64>,
    pub blocked_steps: u32,
    pub sensor_faults: u32,
}

/// An inventory that stayed above the occupancy threshold for longer than
/// allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Bottleneck {
    pub tick: Ticks,
    pub name: String,
    pub entity: InventoryOwner,
    pub occupancy: Fixed64,
}

/// Highest occupancy seen for one inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakOccupancy {
    pub name: String,
    pub occupancy: Fixed64,
    pub tick: Ticks,
}

// ---------------------------------------------------------------------------
// KpiAggregator
// ---------------------------------------------------------------------------

/// Incremental KPI and bottleneck aggregation over a frame sequence.
#[derive(Debug, Clone)]
pub struct KpiAggregator {
    config: StatsConfig,
    order_window: RollingWindow,
    unit_window: RollingWindow,
    orders_total: u64,
    units_total: u64,
    /// Consecutive congested ticks per inventory.
    streaks: BTreeMap<InventoryOwner, u32>,
    peaks: BTreeMap<InventoryOwner, PeakOccupancy>,
    kpis: Vec<FrameKpis>,
    bottlenecks: Vec<Bottleneck>,
}

impl KpiAggregator {
    pub fn new(config: StatsConfig) -> Self {
        let window = config.throughput_window as usize;
        Self {
            config,
            order_window: RollingWindow::new(window),
            unit_window: RollingWindow::new(window),
            orders_total: 0,
            units_total: 0,
            streaks: BTreeMap::new(),
            peaks: BTreeMap::new(),
            kpis: Vec::new(),
            bottlenecks: Vec::new(),
        }
    }

    /// Aggregate a whole run in one pass. Gives the same result as observing
    /// each frame in turn.
    pub fn aggregate(config: StatsConfig, frames: &[Frame]) -> Result<Self, StatsError> {
        let mut aggregator = Self::new(config);
        for frame in frames {
            aggregator.observe(frame)?;
        }
        Ok(aggregator)
    }

    /// Fold the next frame of the run into the aggregates. Frames must arrive
    /// in tick order starting at 0.
    pub fn observe(&mut self, frame: &Frame) -> Result<&FrameKpis, StatsError> {
        let expected = self.kpis.len() as Ticks;
        if frame.tick != expected {
            return Err(StatsError::OutOfOrder {
                expected,
                got: frame.tick,
            });
        }

        let state = &frame.state;
        let mut orders_completed = 0;
        let mut units_produced = 0;
        let mut blocked_steps = 0;
        let mut sensor_faults = 0;
        for event in &frame.events {
            match event {
                TickEvent::OrderCompleted { .. } => orders_completed += 1,
                TickEvent::CycleCompleted { produced, .. } => units_produced += produced,
                TickEvent::StepBlocked { .. } => blocked_steps += 1,
                TickEvent::SensorFault { .. } => sensor_faults += 1,
                _ => {}
            }
        }

        self.order_window.add(orders_completed as u64);
        self.unit_window.add(units_produced as u64);
        self.order_window.commit();
        self.unit_window.commit();
        self.orders_total += orders_completed as u64;
        self.units_total += units_produced as u64;

        let (mut pending, mut in_progress, mut completed) = (0, 0, 0);
        let (mut cycle_sum, mut cycle_count) = (0u64, 0u64);
        for order in state.orders.values() {
            match order.status {
                OrderStatus::Pending => pending += 1,
                OrderStatus::InProgress => in_progress += 1,
                OrderStatus::Completed => {
                    completed += 1;
                    if let (Some(start), Some(end)) = (order.started_at, order.completed_at) {
                        cycle_sum += end.saturating_sub(start);
                        cycle_count += 1;
                    }
                }
            }
        }

        self.detect_bottlenecks(frame);

        let ticks_seen = frame.tick + 1;
        self.kpis.push(FrameKpis {
            tick: frame.tick,
            pending_orders: pending,
            in_progress_orders: in_progress,
            completed_orders: completed,
            orders_completed,
            orders_completed_total: self.orders_total,
            units_produced,
            units_produced_total: self.units_total,
            queue_depth: state.graph.steps().map(|s| s.inventory.len() as u32).sum(),
            in_transit: state
                .graph
                .transports()
                .map(|t| t.inventory.len() as u32)
                .sum(),
            order_throughput: self.order_window.rate(),
            unit_throughput: self.unit_window.rate(),
            avg_order_throughput: ratio(self.orders_total, ticks_seen),
            avg_unit_throughput: ratio(self.units_total, ticks_seen),
            avg_cycle_time: (cycle_count > 0).then(|| ratio(cycle_sum, cycle_count)),
            blocked_steps,
            sensor_faults,
        });
        Ok(&self.kpis[self.kpis.len() - 1])
    }

    fn detect_bottlenecks(&mut self, frame: &Frame) {
        let graph = &frame.state.graph;
        let inventories = graph
            .steps()
            .map(|s| (s.name.as_str(), &s.inventory))
            .chain(graph.transports().map(|t| (t.name.as_str(), &t.inventory)));

        for (name, inventory) in inventories {
            let owner = inventory.owner;
            let occupancy = inventory.occupancy();

            let peak = self.peaks.entry(owner).or_insert_with(|| PeakOccupancy {
                name: name.to_string(),
                occupancy,
                tick: frame.tick,
            });
            if occupancy > peak.occupancy {
                peak.occupancy = occupancy;
                peak.tick = frame.tick;
            }

            let streak = self.streaks.entry(owner).or_insert(0);
            if occupancy > self.config.bottleneck_threshold {
                *streak += 1;
            } else {
                *streak = 0;
            }
            if *streak > self.config.bottleneck_min_ticks {
                self.bottlenecks.push(Bottleneck {
                    tick: frame.tick,
                    name: name.to_string(),
                    entity: owner,
                    occupancy,
                });
            }
        }
    }

    // -- Queries ------------------------------------------------------------

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Per-frame KPIs, indexed by tick.
    pub fn kpis(&self) -> &[FrameKpis] {
        &self.kpis
    }

    pub fn latest(&self) -> Option<&FrameKpis> {
        self.kpis.last()
    }

    /// Bottleneck records in tick order.
    pub fn bottlenecks(&self) -> &[Bottleneck] {
        &self.bottlenecks
    }

    /// Peak occupancy per inventory, steps before transports, in id order.
    pub fn peaks(&self) -> impl Iterator<Item = (&InventoryOwner, &PeakOccupancy)> {
        self.peaks.iter()
    }

    /// Number of frames observed.
    pub fn frames_observed(&self) -> usize {
        self.kpis.len()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use flowtwin_core::test_utils::*;
    use flowtwin_core::{Timeline, TimelineConfig};

    fn small_config() -> StatsConfig {
        StatsConfig {
            bottleneck_threshold: fixed(0.5),
            bottleneck_min_ticks: 2,
            throughput_window: 4,
        }
    }

    #[test]
    fn rolling_window_evicts_oldest() {
        let mut window = RollingWindow::new(2);
        window.add(4);
        window.commit();
        window.add(2);
        window.commit();
        assert_eq!(window.rate(), fixed(3.0));
        window.add(0);
        window.commit();
        assert_eq!(window.rate(), fixed(1.0));
    }

    #[test]
    fn empty_window_rate_is_zero() {
        assert_eq!(RollingWindow::new(5).rate(), Fixed64::ZERO);
    }

    #[test]
    fn counts_units_and_queue() {
        let (state, _) = single_step_line();
        let mut tl = Timeline::new(state, TimelineConfig::default());
        tl.run(3).unwrap();
        let agg = KpiAggregator::aggregate(small_config(), tl.frames()).unwrap();

        let kpis = agg.kpis();
        assert_eq!(kpis.len(), 3);
        assert_eq!(kpis[0].units_produced, 0);
        assert_eq!(kpis[0].queue_depth, 2);
        assert_eq!(kpis[1].units_produced, 1);
        assert_eq!(kpis[2].units_produced_total, 2);
        assert_eq!(kpis[2].queue_depth, 6);
        assert_eq!(kpis[2].in_transit, 0);
        // Two units over three ticks.
        assert_eq!(kpis[2].avg_unit_throughput, ratio(2, 3));
    }

    #[test]
    fn order_counts_and_cycle_time() {
        let (state, _) = order_line(3);
        let mut tl = Timeline::new(state, TimelineConfig::default());
        tl.run(6).unwrap();
        let agg = KpiAggregator::aggregate(StatsConfig::default(), tl.frames()).unwrap();

        let before = &agg.kpis()[3];
        assert_eq!(before.in_progress_orders, 1);
        assert_eq!(before.avg_cycle_time, None);

        let done = &agg.kpis()[4];
        assert_eq!(done.completed_orders, 1);
        assert_eq!(done.orders_completed, 1);
        assert_eq!(done.orders_completed_total, 1);
        assert_eq!(done.avg_cycle_time, Some(fixed(4.0)));
        assert_eq!(done.avg_order_throughput, ratio(1, 5));
        assert_eq!(agg.latest().unwrap().orders_completed, 0);
    }

    #[test]
    fn incremental_equals_batch() {
        let (state, _) = single_step_line();
        let mut tl = Timeline::new(state, TimelineConfig::default());
        tl.run(12).unwrap();

        let batch = KpiAggregator::aggregate(small_config(), tl.frames()).unwrap();
        let mut incremental = KpiAggregator::new(small_config());
        for frame in tl.frames() {
            incremental.observe(frame).unwrap();
        }
        assert_eq!(batch.kpis(), incremental.kpis());
        assert_eq!(batch.bottlenecks(), incremental.bottlenecks());
    }

    #[test]
    fn out_of_order_frame_is_rejected() {
        let (state, _) = single_step_line();
        let mut tl = Timeline::new(state, TimelineConfig::default());
        tl.run(2).unwrap();
        let mut agg = KpiAggregator::new(StatsConfig::default());
        let err = agg.observe(&tl.frames()[1]).unwrap_err();
        assert_eq!(err, StatsError::OutOfOrder { expected: 0, got: 1 });
        assert_eq!(agg.frames_observed(), 0);
    }

    #[test]
    fn sustained_congestion_becomes_bottleneck() {
        // The step gains one A per tick: 2 in, 1 consumed.
        let (state, ids) = single_step_line();
        let mut tl = Timeline::new(state, TimelineConfig::default());
        tl.run(8).unwrap();
        let agg = KpiAggregator::aggregate(small_config(), tl.frames()).unwrap();

        // Step occupancy per tick: 0.2, 0.4, 0.6, 0.8, 1.0, 1.0 ...
        // Above 0.5 from tick 2; more than two ticks in a row from tick 4.
        let step_ticks: Vec<_> = agg
            .bottlenecks()
            .iter()
            .filter(|b| b.entity == InventoryOwner::Step(ids.step))
            .map(|b| b.tick)
            .collect();
        assert_eq!(step_ticks, vec![4, 5, 6, 7]);
        assert_eq!(agg.bottlenecks()[0].name, "Step 1");

        let (_, peak) = agg
            .peaks()
            .find(|(owner, _)| **owner == InventoryOwner::Step(ids.step))
            .unwrap();
        assert_eq!(peak.occupancy, Fixed64::ONE);
        assert_eq!(peak.tick, 4);
    }

    #[test]
    fn aggregation_leaves_frames_untouched() {
        let (state, _) = single_step_line();
        let mut tl = Timeline::new(state, TimelineConfig::default());
        tl.run(5).unwrap();
        let before: Vec<_> = tl.frames().iter().map(|f| f.hash).collect();
        let _ = KpiAggregator::aggregate(small_config(), tl.frames()).unwrap();
        let after: Vec<_> = tl.frames().iter().map(|f| f.hash).collect();
        assert_eq!(before, after);
    }
}
