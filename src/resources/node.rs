//! Resource hierarchy: construction, traversal, aggregation, and schedule
//! export.
//!
//! The tree is stored as a flat arena in depth-first pre-order; children are
//! referenced by index. A node therefore always has a smaller index than
//! every node in its subtree, which makes bottom-up passes a reverse index
//! walk.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::PassError;
use crate::objective::{ObjectiveConfig, ObjectiveFunction, TariffContext};
use crate::resources::profile::ResourceProfile;
use crate::resources::types::{Horizon, ResourceKind, Schedule, StorageParams};

/// Nested resource description used to construct a [`ResourceTree`].
///
/// This is the boundary format the external configuration layer hands over
/// once per deployment or reconfiguration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    /// Unique resource identifier.
    pub id: String,
    /// Resource category.
    pub kind: ResourceKind,
    /// Rated capacity (kW). Zero is allowed and disables weight scaling.
    #[serde(default)]
    pub nameplate_kw: f32,
    /// Storage operating envelope; required for `energy_storage` nodes.
    #[serde(default)]
    pub storage: Option<StorageParams>,
    /// Baseline demand forecast (kW); empty means flat zero.
    #[serde(default)]
    pub demand_forecast_kw: Vec<f32>,
    /// Objective-function bindings applying to this node only.
    #[serde(default)]
    pub objectives: Vec<ObjectiveConfig>,
    /// Child resources.
    #[serde(default)]
    pub children: Vec<ResourceSpec>,
}

/// One node of the resource hierarchy.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Resource category.
    pub kind: ResourceKind,
    /// Unique resource identifier.
    pub id: String,
    /// Rated capacity (kW), used to normalize dispatch into a weight.
    pub nameplate_kw: f32,
    /// Storage envelope and state, present on storage nodes (and filled on
    /// aggregates by summation over storage-bearing children).
    pub storage: Option<StorageParams>,
    /// Baseline demand forecast (kW; generation negative).
    pub demand_forecast_kw: Vec<f32>,
    /// Baseline stored-energy forecast (kWh; zero-filled for non-storage).
    pub energy_available_kwh: Vec<f32>,
    /// Objective-function bindings applying to this node only.
    pub objective_configs: Vec<ObjectiveConfig>,
    /// Objective functions resolved for the current pass.
    pub(crate) objectives: Vec<ObjectiveFunction>,
    /// Child node indices in the arena.
    pub children: Vec<usize>,
    /// Parent node index; `None` for the root.
    pub parent: Option<usize>,
    /// Whether profile copies must refresh this node between iterations
    /// (controllable nodes and their ancestors).
    pub(crate) update_required: bool,
    /// Output of the last optimization pass.
    pub schedule: Schedule,
}

impl ResourceNode {
    /// Whether the optimizer may perturb this node's dispatch.
    pub fn is_controllable(&self) -> bool {
        self.kind.is_controllable()
    }
}

/// Arena-backed resource hierarchy. The root is always index 0.
#[derive(Debug, Clone)]
pub struct ResourceTree {
    /// Nodes in depth-first pre-order.
    pub nodes: Vec<ResourceNode>,
    horizon: Horizon,
}

impl ResourceTree {
    /// Builds a tree from a nested spec.
    ///
    /// Empty demand forecasts are zero-filled to the horizon; storage energy
    /// forecasts are initialized flat at the current SOE.
    ///
    /// # Panics
    ///
    /// Panics if a non-empty forecast does not match the horizon, if a
    /// storage node lacks storage parameters, or if a nameplate is negative.
    /// Validate user-supplied configuration with
    /// [`crate::config::ScenarioConfig::validate`] first.
    pub fn from_spec(spec: &ResourceSpec, horizon: Horizon) -> Self {
        let mut nodes = Vec::new();
        push_node(&mut nodes, spec, None, &horizon);
        let mut tree = Self { nodes, horizon };
        tree.flag_update_required();
        tree
    }

    /// Schedule horizon shared by every array in the tree.
    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    /// Number of points in the schedule horizon.
    pub fn points(&self) -> usize {
        self.horizon.points
    }

    /// The root node.
    pub fn root(&self) -> &ResourceNode {
        &self.nodes[0]
    }

    /// Finds the node with the given id by depth-first traversal.
    pub fn find(&self, resource_id: &str) -> Option<usize> {
        // arena order is depth-first pre-order, so a scan visits nodes in
        // traversal order
        self.nodes.iter().position(|n| n.id == resource_id)
    }

    /// Returns all nodes of the given kind, in depth-first order.
    pub fn find_all(&self, kind: ResourceKind) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of every controllable node, in depth-first order.
    pub fn controllable_indices(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_controllable())
            .map(|(i, _)| i)
            .collect()
    }

    /// Recomputes every summable field of each non-leaf node as the sum of
    /// its children's corresponding fields.
    ///
    /// Timestamp labeling is excluded (all children share the schedule time
    /// base by precondition), as are storage efficiencies: capacity, SOE,
    /// bounds, and power limits sum, while the aggregate efficiency is fixed
    /// at 1.0 since projection only runs on leaf storage nodes.
    pub fn aggregate_from_children(&mut self) {
        let points = self.horizon.points;
        for idx in (0..self.nodes.len()).rev() {
            if self.nodes[idx].children.is_empty() {
                continue;
            }
            let children = self.nodes[idx].children.clone();
            let mut nameplate_kw = 0.0_f32;
            let mut demand = vec![0.0_f32; points];
            let mut energy = vec![0.0_f32; points];
            let mut storage: Option<StorageParams> = None;
            for &c in &children {
                let child = &self.nodes[c];
                nameplate_kw += child.nameplate_kw;
                for t in 0..points {
                    demand[t] += child.demand_forecast_kw[t];
                    energy[t] += child.energy_available_kwh[t];
                }
                if let Some(cs) = &child.storage {
                    let agg = storage.get_or_insert(StorageParams {
                        max_soe_kwh: 0.0,
                        min_soe_kwh: 0.0,
                        soe_kwh: 0.0,
                        eta_charge: 1.0,
                        eta_discharge: 1.0,
                        max_charge_kw: 0.0,
                        max_discharge_kw: 0.0,
                    });
                    agg.max_soe_kwh += cs.max_soe_kwh;
                    agg.min_soe_kwh += cs.min_soe_kwh;
                    agg.soe_kwh += cs.soe_kwh;
                    agg.max_charge_kw += cs.max_charge_kw;
                    agg.max_discharge_kw += cs.max_discharge_kw;
                }
            }
            let node = &mut self.nodes[idx];
            node.nameplate_kw = nameplate_kw;
            node.demand_forecast_kw = demand;
            node.energy_available_kwh = energy;
            node.storage = storage;
        }
    }

    /// Applies this node's objective functions to the supplied power series.
    pub fn compute_cost(&self, idx: usize, profile: &[f32]) -> f32 {
        self.nodes[idx]
            .objectives
            .iter()
            .map(|f| f.evaluate(profile))
            .sum()
    }

    /// Resolves every node's objective bindings against the tariff context.
    ///
    /// # Errors
    ///
    /// Returns the first [`PassError`] encountered; the pass must not start
    /// with a node left unconfigured.
    pub fn configure_objectives(&mut self, tariffs: &TariffContext) -> Result<(), PassError> {
        let points = self.horizon.points;
        for idx in 0..self.nodes.len() {
            let id = self.nodes[idx].id.clone();
            let configs = self.nodes[idx].objective_configs.clone();
            let mut objectives = Vec::with_capacity(configs.len());
            for config in &configs {
                objectives.push(config.configure(tariffs, points, &id)?);
            }
            self.nodes[idx].objectives = objectives;
        }
        Ok(())
    }

    /// Copies a winning profile into each node's schedule fields, paired
    /// with the supplied timestamp vector.
    pub fn export_schedule(&mut self, profile: &ResourceProfile, timestamps: &[DateTime<Utc>]) {
        for (node, soln) in self.nodes.iter_mut().zip(&profile.nodes) {
            node.schedule.demand_kw.clone_from(&soln.demand_kw);
            node.schedule
                .energy_available_kwh
                .clone_from(&soln.energy_available_kwh);
            node.schedule
                .delta_energy_kwh
                .clone_from(&soln.delta_energy_kwh);
            node.schedule.timestamps = timestamps.to_vec();
            node.schedule.total_cost = soln.total_cost;
        }
    }

    /// Shifts every leaf forecast by the given fraction of one timestep and
    /// re-aggregates, for forecasts that arrive out of phase with the
    /// schedule grid.
    #[cfg(feature = "forecast-interp")]
    pub fn interpolate_forecasts(&mut self, fraction: f32) {
        for node in &mut self.nodes {
            if node.children.is_empty() {
                node.demand_forecast_kw = phase_shift_forecast(&node.demand_forecast_kw, fraction);
            }
        }
        self.aggregate_from_children();
    }

    fn flag_update_required(&mut self) {
        for idx in (0..self.nodes.len()).rev() {
            let from_children = self.nodes[idx]
                .children
                .clone()
                .iter()
                .any(|&c| self.nodes[c].update_required);
            let node = &mut self.nodes[idx];
            node.update_required = node.is_controllable() || from_children;
        }
    }
}

fn push_node(
    nodes: &mut Vec<ResourceNode>,
    spec: &ResourceSpec,
    parent: Option<usize>,
    horizon: &Horizon,
) -> usize {
    let points = horizon.points;
    assert!(
        spec.nameplate_kw >= 0.0,
        "resource \"{}\": nameplate must be >= 0",
        spec.id
    );
    assert!(
        spec.demand_forecast_kw.is_empty() || spec.demand_forecast_kw.len() == points,
        "resource \"{}\": demand forecast has {} points, horizon has {points}",
        spec.id,
        spec.demand_forecast_kw.len()
    );
    assert!(
        spec.kind != ResourceKind::EnergyStorage || spec.storage.is_some(),
        "resource \"{}\": energy_storage requires storage parameters",
        spec.id
    );

    let demand_forecast_kw = if spec.demand_forecast_kw.is_empty() {
        vec![0.0; points]
    } else {
        spec.demand_forecast_kw.clone()
    };
    let energy_available_kwh = match &spec.storage {
        Some(s) => vec![s.soe_kwh; points],
        None => vec![0.0; points],
    };

    let idx = nodes.len();
    nodes.push(ResourceNode {
        kind: spec.kind,
        id: spec.id.clone(),
        nameplate_kw: spec.nameplate_kw,
        storage: spec.storage.clone(),
        demand_forecast_kw,
        energy_available_kwh,
        objective_configs: spec.objectives.clone(),
        objectives: Vec::new(),
        children: Vec::new(),
        parent,
        update_required: false,
        schedule: Schedule::default(),
    });
    for child in &spec.children {
        let child_idx = push_node(nodes, child, Some(idx), horizon);
        nodes[idx].children.push(child_idx);
    }
    idx
}

/// Linearly interpolates a forecast `fraction` of one timestep forward,
/// padding the final point.
#[cfg(feature = "forecast-interp")]
pub fn phase_shift_forecast(values: &[f32], fraction: f32) -> Vec<f32> {
    if values.len() < 2 {
        return values.to_vec();
    }
    let mut shifted = Vec::with_capacity(values.len());
    for i in 1..values.len() {
        shifted.push(values[i - 1] + (values[i] - values[i - 1]) * fraction);
    }
    shifted.push(values[values.len() - 1]);
    shifted
}
