//! Core types shared across the resource model: horizon timing, resource
//! kinds, storage parameters, and exported schedules.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Fixed-length, fixed-resolution schedule horizon.
///
/// All forecast and profile arrays in a tree share this shape. The timestep
/// duration in hours is derived once from the resolution.
///
/// # Examples
///
/// ```
/// use der_dispatch::resources::Horizon;
///
/// let horizon = Horizon::new(24, 60);
/// assert_eq!(horizon.dt_hours, 1.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Horizon {
    /// Number of points in the schedule.
    pub points: usize,
    /// Time resolution of one point, in minutes.
    pub resolution_min: u32,
    /// Duration of one timestep in hours, derived as `resolution_min / 60`.
    pub dt_hours: f32,
}

impl Horizon {
    /// Creates a new schedule horizon.
    ///
    /// # Panics
    ///
    /// Panics if `points` or `resolution_min` is zero.
    pub fn new(points: usize, resolution_min: u32) -> Self {
        assert!(points > 0, "horizon points must be > 0");
        assert!(resolution_min > 0, "horizon resolution must be > 0");
        Self {
            points,
            resolution_min,
            dt_hours: resolution_min as f32 / 60.0,
        }
    }

    /// Builds the schedule-labeling timestamp vector starting at `start`.
    pub fn timestamps(&self, start: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        (0..self.points)
            .map(|i| start + Duration::minutes(i as i64 * i64::from(self.resolution_min)))
            .collect()
    }
}

/// Resource categories recognized by the optimizer.
///
/// Only `EnergyStorage` nodes are controllable; aggregate kinds recompute
/// their state from their children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Battery or other storage plant with SOE limits and efficiencies.
    EnergyStorage,
    /// Solar generation (demand forecast is negative during daylight).
    SolarGeneration,
    /// Load that can be shifted in time by an external program.
    ShiftableLoad,
    /// Non-dispatchable load.
    FixedLoad,
    /// Top-level system aggregate.
    AggregateSystem,
    /// Intermediate aggregation node (e.g. storage + solar plant pairing).
    GenericAggregate,
}

impl ResourceKind {
    /// Whether the optimizer may perturb this resource's dispatch.
    pub fn is_controllable(self) -> bool {
        matches!(self, ResourceKind::EnergyStorage)
    }

    /// Whether this node's state is recomputed from its children.
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            ResourceKind::AggregateSystem | ResourceKind::GenericAggregate
        )
    }
}

fn default_efficiency() -> f32 {
    0.95
}

/// Physical operating envelope and current state of a storage resource.
///
/// Sign convention follows the rest of the tree: positive power charges the
/// storage (consumption), negative power discharges it (generation).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageParams {
    /// Upper state-of-energy bound (kWh).
    pub max_soe_kwh: f32,
    /// Lower state-of-energy bound (kWh).
    pub min_soe_kwh: f32,
    /// State of energy at the start of the pass (kWh).
    pub soe_kwh: f32,
    /// Charging efficiency (0..=1).
    #[serde(default = "default_efficiency")]
    pub eta_charge: f32,
    /// Discharging efficiency (0..=1).
    #[serde(default = "default_efficiency")]
    pub eta_discharge: f32,
    /// Maximum charging power (kW, positive magnitude).
    pub max_charge_kw: f32,
    /// Maximum discharging power (kW, positive magnitude).
    pub max_discharge_kw: f32,
}

/// Per-node output of one optimization pass.
///
/// Written once during the export step; empty until a pass completes.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Chosen demand profile (kW; generation negative, consumption positive).
    pub demand_kw: Vec<f32>,
    /// Stored-energy trajectory if the chosen demand is executed (kWh).
    pub energy_available_kwh: Vec<f32>,
    /// Per-step change in stored energy, after efficiency losses (kWh).
    pub delta_energy_kwh: Vec<f32>,
    /// Timestamps labeling each schedule point.
    pub timestamps: Vec<DateTime<Utc>>,
    /// Aggregated cost of this node and all its descendants.
    pub total_cost: f32,
}
