//! Candidate dispatch profiles.
//!
//! A [`ResourceProfile`] mirrors the tree arena one-to-one and holds the
//! state the annealing search actually mutates: per-timestep weights and
//! the demand/energy/delta arrays they imply, plus per-node costs. Three or
//! four of these exist per pass and copy into each other every iteration,
//! so all copies overwrite arrays in place.

use crate::resources::node::ResourceTree;
use crate::resources::storage::ProjectionOutcome;

/// Per-node slice of a candidate solution.
#[derive(Debug, Clone)]
pub struct ProfileNode {
    /// Dispatch normalized by nameplate; the search variable for
    /// controllable nodes. Fixed at 1.0 when the nameplate is zero.
    pub weight: Vec<f32>,
    /// Proposed demand (kW; generation negative).
    pub demand_kw: Vec<f32>,
    /// Stored-energy trajectory implied by the proposed demand (kWh).
    pub energy_available_kwh: Vec<f32>,
    /// Per-step stored-energy change after losses (kWh).
    pub delta_energy_kwh: Vec<f32>,
    /// Cost of this node's own objective functions for this profile.
    pub cost: f32,
    /// `cost` plus the sum of all children's `total_cost`.
    pub total_cost: f32,
}

/// A full candidate solution, one [`ProfileNode`] per tree node.
#[derive(Debug, Clone)]
pub struct ResourceProfile {
    /// Profile nodes, indexed identically to the tree arena.
    pub nodes: Vec<ProfileNode>,
}

impl ResourceProfile {
    /// Builds a profile seeded with the tree's baseline forecasts.
    ///
    /// Storage trajectories are immediately run through the feasibility
    /// projection so that even a zero-improvement pass exports a trajectory
    /// within bounds, and costs are computed for the seeded state.
    pub fn from_tree(tree: &ResourceTree) -> Self {
        let points = tree.points();
        let nodes = tree
            .nodes
            .iter()
            .map(|n| ProfileNode {
                weight: if n.nameplate_kw == 0.0 {
                    vec![1.0; points]
                } else {
                    n.demand_forecast_kw
                        .iter()
                        .map(|d| d / n.nameplate_kw)
                        .collect()
                },
                demand_kw: n.demand_forecast_kw.clone(),
                energy_available_kwh: n.energy_available_kwh.clone(),
                delta_energy_kwh: vec![0.0; points],
                cost: 0.0,
                total_cost: 0.0,
            })
            .collect();

        let mut profile = Self { nodes };
        for idx in tree.controllable_indices() {
            profile.project_storage(tree, idx);
            profile.resum_ancestors(tree, idx);
        }
        profile.recompute_costs(tree);
        profile
    }

    /// Aggregated cost of the whole candidate (root `total_cost`).
    pub fn total_cost(&self) -> f32 {
        self.nodes[0].total_cost
    }

    /// Sets one weight and recomputes the node's demand from it.
    pub fn set_weight(&mut self, tree: &ResourceTree, idx: usize, timestep: usize, weight: f32) {
        let nameplate_kw = tree.nodes[idx].nameplate_kw;
        let node = &mut self.nodes[idx];
        node.weight[timestep] = weight;
        for (demand, w) in node.demand_kw.iter_mut().zip(&node.weight) {
            *demand = w * nameplate_kw;
        }
    }

    /// Runs the storage feasibility projection for `idx` and re-derives the
    /// weight from the corrected power. Non-storage nodes pass through
    /// unmodified.
    pub fn project_storage(&mut self, tree: &ResourceTree, idx: usize) -> ProjectionOutcome {
        let tree_node = &tree.nodes[idx];
        let Some(storage) = &tree_node.storage else {
            return ProjectionOutcome::default();
        };
        let node = &mut self.nodes[idx];
        let outcome = storage.project(
            &mut node.demand_kw,
            &mut node.energy_available_kwh,
            &mut node.delta_energy_kwh,
            tree.horizon().dt_hours,
        );
        if tree_node.nameplate_kw == 0.0 {
            node.weight.fill(1.0);
        } else {
            for (w, demand) in node.weight.iter_mut().zip(&node.demand_kw) {
                *w = demand / tree_node.nameplate_kw;
            }
        }
        outcome
    }

    /// Recomputes each ancestor of `idx` by full resummation over its
    /// children, bottom-up to the root.
    pub fn resum_ancestors(&mut self, tree: &ResourceTree, idx: usize) {
        let mut current = tree.nodes[idx].parent;
        while let Some(a) = current {
            // take/refill to avoid aliasing the arena while reading children
            let mut demand = std::mem::take(&mut self.nodes[a].demand_kw);
            let mut energy = std::mem::take(&mut self.nodes[a].energy_available_kwh);
            let mut delta = std::mem::take(&mut self.nodes[a].delta_energy_kwh);
            demand.fill(0.0);
            energy.fill(0.0);
            delta.fill(0.0);
            for &c in &tree.nodes[a].children {
                let child = &self.nodes[c];
                for t in 0..demand.len() {
                    demand[t] += child.demand_kw[t];
                    energy[t] += child.energy_available_kwh[t];
                    delta[t] += child.delta_energy_kwh[t];
                }
            }
            let node = &mut self.nodes[a];
            node.demand_kw = demand;
            node.energy_available_kwh = energy;
            node.delta_energy_kwh = delta;
            current = tree.nodes[a].parent;
        }
    }

    /// Recomputes `cost` and `total_cost` bottom-up for every node and
    /// returns the root total.
    pub fn recompute_costs(&mut self, tree: &ResourceTree) -> f32 {
        for idx in (0..self.nodes.len()).rev() {
            let own = tree.compute_cost(idx, &self.nodes[idx].demand_kw);
            let child_total: f32 = tree.nodes[idx]
                .children
                .iter()
                .map(|&c| self.nodes[c].total_cost)
                .sum();
            let node = &mut self.nodes[idx];
            node.cost = own;
            node.total_cost = own + child_total;
        }
        self.nodes[0].total_cost
    }

    /// Overwrites this profile from `source`, touching only nodes flagged
    /// as requiring updates (controllable nodes and their ancestors).
    ///
    /// Arrays are overwritten in place; no allocation occurs.
    pub fn copy_updated_from(&mut self, source: &ResourceProfile, tree: &ResourceTree) {
        for (idx, tree_node) in tree.nodes.iter().enumerate() {
            if !tree_node.update_required {
                continue;
            }
            let src = &source.nodes[idx];
            let dst = &mut self.nodes[idx];
            dst.weight.copy_from_slice(&src.weight);
            dst.demand_kw.copy_from_slice(&src.demand_kw);
            dst.energy_available_kwh
                .copy_from_slice(&src.energy_available_kwh);
            dst.delta_energy_kwh.copy_from_slice(&src.delta_energy_kwh);
            dst.cost = src.cost;
            dst.total_cost = src.total_cost;
        }
    }
}
