//! Read-only views of a frame for consumers that poll the simulation.
//!
//! All types are owned copies -- no references into frame storage -- so a
//! view can outlive the timeline lock it was taken under.

use crate::fixed::{Fixed64, Ticks};
use crate::graph::SimulationState;
use crate::id::{LocationId, MaterialId, StepId, TransportId};
use crate::model::{Order, StepStatus};
use crate::timeline::Frame;

// ---------------------------------------------------------------------------
// Step view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StepView {
    pub id: StepId,
    pub name: String,
    pub location: LocationId,
    pub status: StepStatus,
    /// `(material, quantity)` in material order.
    pub contents: Vec<(MaterialId, u32)>,
    pub queue_len: u32,
    pub limit: u32,
    /// `queue_len / limit`, 0..1.
    pub occupancy: Fixed64,
    /// Resources currently occupied by a production cycle.
    pub busy_resources: u32,
    pub completed_cycles: u64,
    /// Fault entries logged by the step's sensors.
    pub sensor_faults: u32,
}

// ---------------------------------------------------------------------------
// Transport view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TransportView {
    pub id: TransportId,
    pub name: String,
    pub start: Option<StepId>,
    pub end: StepId,
    pub active: bool,
    pub in_transit: u32,
    pub limit: u32,
    pub occupancy: Fixed64,
    pub sensor_faults: u32,
}

// ---------------------------------------------------------------------------
// Frame view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FrameView {
    pub tick: Ticks,
    pub hash: u64,
    pub steps: Vec<StepView>,
    pub transports: Vec<TransportView>,
    pub orders: Vec<Order>,
    pub event_count: usize,
}

/// Owned read model of one step, `None` for an unknown id.
pub fn step_view(state: &SimulationState, id: StepId) -> Option<StepView> {
    let step = state.graph.step(id)?;
    let production = state.graph.production(id);
    let tick = state.next_tick.saturating_sub(1);
    Some(StepView {
        id,
        name: step.name.clone(),
        location: step.location,
        status: step.status,
        contents: step.inventory.contents(),
        queue_len: step.inventory.len() as u32,
        limit: step.inventory.limit,
        occupancy: step.inventory.occupancy(),
        busy_resources: step
            .resources
            .iter()
            .filter(|r| production.is_some_and(|p| p.is_busy(r.id, tick)))
            .count() as u32,
        completed_cycles: production.map_or(0, |p| p.completed_cycles),
        sensor_faults: step.sensors.iter().map(|s| s.log.len() as u32).sum(),
    })
}

/// Owned read model of one link, `None` for an unknown id.
pub fn transport_view(state: &SimulationState, id: TransportId) -> Option<TransportView> {
    let transport = state.graph.transport(id)?;
    Some(TransportView {
        id,
        name: transport.name.clone(),
        start: transport.start,
        end: transport.end,
        active: transport.active,
        in_transit: transport.inventory.len() as u32,
        limit: transport.inventory.limit,
        occupancy: transport.inventory.occupancy(),
        sensor_faults: transport.sensors.iter().map(|s| s.log.len() as u32).sum(),
    })
}

/// Views of every step and link in `frame`, in id order.
pub fn frame_view(frame: &Frame) -> FrameView {
    let state = &frame.state;
    FrameView {
        tick: frame.tick,
        hash: frame.hash,
        steps: state
            .graph
            .step_ids()
            .filter_map(|id| step_view(state, id))
            .collect(),
        transports: state
            .graph
            .transport_ids()
            .filter_map(|id| transport_view(state, id))
            .collect(),
        orders: state.orders.values().cloned().collect(),
        event_count: frame.events.len(),
    }
}
