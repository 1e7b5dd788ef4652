//! JSON report of a simulation run.

use serde::{Deserialize, Serialize};

use flowtwin_core::fixed::{Ticks, fixed64_to_f64 as to_f64};

use crate::KpiAggregator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiRecord {
    pub key: String,
    pub value: f64,
    /// Entity the value belongs to, for per-inventory figures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottleneckRecord {
    pub tick: Ticks,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub simulation_name: String,
    pub kpis: Vec<KpiRecord>,
    pub bottlenecks: Vec<BottleneckRecord>,
}

impl KpiRecord {
    fn new(key: &str, value: f64) -> Self {
        Self {
            key: key.to_string(),
            value,
            name: None,
        }
    }
}

impl SimulationReport {
    /// Summarise the frames observed so far. An aggregator that has seen no
    /// frames yields a report with no KPIs.
    pub fn from_aggregator(simulation_name: &str, aggregator: &KpiAggregator) -> Self {
        let mut kpis = Vec::new();
        if let Some(last) = aggregator.latest() {
            kpis.push(KpiRecord::new("ticks", aggregator.frames_observed() as f64));
            kpis.push(KpiRecord::new("pendingOrders", last.pending_orders as f64));
            kpis.push(KpiRecord::new("inProgressOrders", last.in_progress_orders as f64));
            kpis.push(KpiRecord::new("completedOrders", last.completed_orders as f64));
            kpis.push(KpiRecord::new(
                "unitsProduced",
                last.units_produced_total as f64,
            ));
            kpis.push(KpiRecord::new("queueDepth", last.queue_depth as f64));
            kpis.push(KpiRecord::new("inTransit", last.in_transit as f64));
            kpis.push(KpiRecord::new(
                "orderThroughput",
                to_f64(last.avg_order_throughput),
            ));
            kpis.push(KpiRecord::new(
                "unitThroughput",
                to_f64(last.avg_unit_throughput),
            ));
            if let Some(cycle) = last.avg_cycle_time {
                kpis.push(KpiRecord::new("avgCycleTime", to_f64(cycle)));
            }
            let faults: u64 = aggregator.kpis().iter().map(|k| k.sensor_faults as u64).sum();
            kpis.push(KpiRecord::new("sensorFaults", faults as f64));

            for (_, peak) in aggregator.peaks() {
                kpis.push(KpiRecord {
                    key: "peakOccupancy".to_string(),
                    value: to_f64(peak.occupancy),
                    name: Some(peak.name.clone()),
                });
            }
        }

        Self {
            simulation_name: simulation_name.to_string(),
            kpis,
            bottlenecks: aggregator
                .bottlenecks()
                .iter()
                .map(|b| BottleneckRecord {
                    tick: b.tick,
                    name: b.name.clone(),
                })
                .collect(),
        }
    }

    /// Value of the unnamed KPI `key`.
    pub fn kpi(&self, key: &str) -> Option<f64> {
        self.kpis
            .iter()
            .find(|k| k.key == key && k.name.is_none())
            .map(|k| k.value)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
