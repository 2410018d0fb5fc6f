//! Simulated-annealing search over candidate dispatch profiles.
//!
//! One call to [`SimulatedAnnealingOptimizer::run`] is one self-contained
//! optimization pass: it seeds candidate profiles from the tree snapshot,
//! anneals for a fixed number of iterations, and exports the least-cost
//! schedule back onto the tree. The pass is single-threaded, CPU-bound, and
//! runs to completion; callers wanting bounded latency cap `iterations`.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::PassError;
use crate::objective::TariffContext;
use crate::resources::node::ResourceTree;
use crate::resources::profile::ResourceProfile;
use crate::resources::storage::SOE_TOLERANCE_KWH;

/// Floor applied to the annealing temperature. The temperature divides an
/// exponent, so it must stay strictly positive even when the initial cost
/// is exactly zero.
pub const MIN_TEMPERATURE: f32 = 1e-6;

/// Iterations between periodic progress log lines.
const DISPLAY_PD: usize = 5000;

fn default_iterations() -> usize {
    50_000
}
fn default_temp_decrease_pd() -> usize {
    600
}
fn default_jump_decrease_pd() -> usize {
    100
}
fn default_initial_jump() -> f32 {
    1.0
}
fn default_fract_jump() -> f32 {
    0.95
}
fn default_fract_temp() -> f32 {
    0.85
}
fn default_cost_to_temp() -> f32 {
    0.05
}
fn default_seed() -> u64 {
    42
}

/// Cooling-schedule and search parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnnealingParams {
    /// Total number of perturbation trials in one pass.
    pub iterations: usize,
    /// Iterations between temperature decreases.
    pub temp_decrease_pd: usize,
    /// Iterations between jump-size decreases.
    pub jump_decrease_pd: usize,
    /// Initial maximum weight perturbation per trial.
    pub initial_jump: f32,
    /// Factor applied to the jump every `jump_decrease_pd` iterations.
    pub fract_jump: f32,
    /// Factor applied to the temperature every `temp_decrease_pd` iterations.
    pub fract_temp: f32,
    /// Conversion of the initial cost into the starting temperature.
    pub cost_to_temp: f32,
    /// RNG seed; identical seeds reproduce identical schedules.
    pub seed: u64,
}

impl Default for AnnealingParams {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            temp_decrease_pd: default_temp_decrease_pd(),
            jump_decrease_pd: default_jump_decrease_pd(),
            initial_jump: default_initial_jump(),
            fract_jump: default_fract_jump(),
            fract_temp: default_fract_temp(),
            cost_to_temp: default_cost_to_temp(),
            seed: default_seed(),
        }
    }
}

impl AnnealingParams {
    /// Validates parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::InvalidAnnealingParameter`] naming the first
    /// out-of-range parameter.
    pub fn validate(&self) -> Result<(), PassError> {
        if self.temp_decrease_pd == 0 {
            return Err(PassError::InvalidAnnealingParameter {
                name: "temp_decrease_pd",
                constraint: "> 0",
                value: 0.0,
            });
        }
        if self.jump_decrease_pd == 0 {
            return Err(PassError::InvalidAnnealingParameter {
                name: "jump_decrease_pd",
                constraint: "> 0",
                value: 0.0,
            });
        }
        if !(self.initial_jump > 0.0) {
            return Err(PassError::InvalidAnnealingParameter {
                name: "initial_jump",
                constraint: "> 0",
                value: self.initial_jump,
            });
        }
        if !(self.fract_jump > 0.0 && self.fract_jump < 1.0) {
            return Err(PassError::InvalidAnnealingParameter {
                name: "fract_jump",
                constraint: "in (0, 1)",
                value: self.fract_jump,
            });
        }
        if !(self.fract_temp > 0.0 && self.fract_temp < 1.0) {
            return Err(PassError::InvalidAnnealingParameter {
                name: "fract_temp",
                constraint: "in (0, 1)",
                value: self.fract_temp,
            });
        }
        if !(self.cost_to_temp > 0.0) {
            return Err(PassError::InvalidAnnealingParameter {
                name: "cost_to_temp",
                constraint: "> 0",
                value: self.cost_to_temp,
            });
        }
        Ok(())
    }
}

/// Counters and costs describing one completed pass.
#[derive(Debug, Clone)]
pub struct PassSummary {
    /// Total cost of the seeded baseline profile.
    pub initial_cost: f32,
    /// Total cost of the exported least-cost profile.
    pub best_cost: f32,
    /// Iterations executed.
    pub iterations: usize,
    /// Trials that improved on the incumbent.
    pub improving_moves: usize,
    /// Cost-increasing trials retained by the Metropolis criterion.
    pub worse_moves_accepted: usize,
    /// Trials discarded.
    pub rejected_moves: usize,
    /// Trials whose storage trajectory needed correction.
    pub projection_corrections: usize,
    /// Corrections that left a bound excursion beyond tolerance.
    pub feasibility_warnings: usize,
    /// Least cost seen so far, sampled at every temperature decrease
    /// (starting with the initial cost). Non-increasing by construction.
    pub best_cost_trace: Vec<f32>,
    /// Wall-clock duration of the pass in seconds.
    pub elapsed_s: f32,
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Optimization Summary ---")?;
        writeln!(f, "Initial cost:          {:.2}", self.initial_cost)?;
        writeln!(f, "Best cost:             {:.2}", self.best_cost)?;
        writeln!(f, "Iterations:            {}", self.iterations)?;
        writeln!(f, "Improving moves:       {}", self.improving_moves)?;
        writeln!(f, "Worse moves accepted:  {}", self.worse_moves_accepted)?;
        writeln!(f, "Rejected moves:        {}", self.rejected_moves)?;
        writeln!(f, "Trajectory corrections: {}", self.projection_corrections)?;
        writeln!(f, "Feasibility warnings:  {}", self.feasibility_warnings)?;
        write!(f, "Elapsed:               {:.2} s", self.elapsed_s)
    }
}

/// Drives one annealing pass over a resource tree.
#[derive(Debug, Clone)]
pub struct SimulatedAnnealingOptimizer {
    params: AnnealingParams,
}

impl SimulatedAnnealingOptimizer {
    /// Creates an optimizer with the given parameters.
    pub fn new(params: AnnealingParams) -> Self {
        Self { params }
    }

    /// The configured parameters.
    pub fn params(&self) -> &AnnealingParams {
        &self.params
    }

    /// Runs one optimization pass and exports the winning schedule onto the
    /// tree.
    ///
    /// The tree snapshot is read-only for the duration of the pass except
    /// for objective configuration up front and the final export step. At
    /// most one pass may be active per tree; the invoking loop serializes
    /// calls.
    ///
    /// # Errors
    ///
    /// Returns a [`PassError`] before the first iteration if the annealing
    /// parameters are out of range, the timestamp vector does not match the
    /// horizon or is unordered, an objective binding cannot be configured,
    /// or the tree holds no controllable resource.
    pub fn run(
        &self,
        tree: &mut ResourceTree,
        tariffs: &TariffContext,
        timestamps: &[DateTime<Utc>],
    ) -> Result<PassSummary, PassError> {
        let params = &self.params;
        params.validate()?;

        let points = tree.points();
        if timestamps.len() != points {
            return Err(PassError::TimestampCount {
                expected: points,
                actual: timestamps.len(),
            });
        }
        if let Some(i) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(PassError::UnorderedTimestamps { index: i + 1 });
        }

        tree.aggregate_from_children();
        tree.configure_objectives(tariffs)?;
        let controllables = tree.controllable_indices();
        if controllables.is_empty() {
            return Err(PassError::NoControllableResource);
        }

        let started = Instant::now();

        // Initializing: seed the candidate profiles and the temperature
        let initial = ResourceProfile::from_tree(tree);
        let mut current = initial.clone();
        let mut incumbent = initial.clone();
        let mut best = initial.clone();
        let initial_cost = initial.total_cost();

        let mut temperature = (params.cost_to_temp * initial_cost)
            .abs()
            .max(MIN_TEMPERATURE);
        let mut jump = params.initial_jump;
        // jump decays absorbed between two temperature decreases
        let jump_resets = (params.temp_decrease_pd / params.jump_decrease_pd) as i32;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut improving_moves = 0_usize;
        let mut worse_moves_accepted = 0_usize;
        let mut rejected_moves = 0_usize;
        let mut projection_corrections = 0_usize;
        let mut feasibility_warnings = 0_usize;
        let mut best_cost_trace = vec![initial_cost];

        info!(
            initial_cost,
            t0 = temperature,
            controllables = controllables.len(),
            "starting annealing pass"
        );

        // Annealing
        for ii in 0..params.iterations {
            if ii % DISPLAY_PD == 0 {
                debug!(
                    iteration = ii,
                    temperature,
                    jump,
                    best_cost = best.total_cost(),
                    "annealing progress"
                );
            }
            if (ii + 1) % params.jump_decrease_pd == 0 {
                jump *= params.fract_jump;
            }
            if (ii + 1) % params.temp_decrease_pd == 0 {
                temperature = (temperature * params.fract_temp).max(MIN_TEMPERATURE);
                // reset the jump in lock-step with the cooling step
                jump /= params.fract_jump.powi(jump_resets);
                best_cost_trace.push(best.total_cost());
            }

            // restore the trial profile from the incumbent
            current.copy_updated_from(&incumbent, tree);

            // perturb one (resource, timestep) pair chosen uniformly
            let r = controllables[rng.random_range(0..controllables.len())];
            let t = rng.random_range(0..points);
            let old_weight = current.nodes[r].weight[t];
            let new_weight =
                (old_weight + (rng.random::<f32>() - 0.5) * 2.0 * jump).clamp(-1.0, 1.0);
            current.set_weight(tree, r, t, new_weight);

            let outcome = current.project_storage(tree, r);
            if outcome.corrected() {
                projection_corrections += 1;
            }
            if outcome.residual_kwh > SOE_TOLERANCE_KWH {
                feasibility_warnings += 1;
            }
            current.resum_ancestors(tree, r);

            let total = current.recompute_costs(tree);
            let delta = total - incumbent.total_cost();

            if delta < 0.0 {
                incumbent.copy_updated_from(&current, tree);
                improving_moves += 1;
                if total < best.total_cost() {
                    best.copy_updated_from(&current, tree);
                }
            } else if delta > 0.0 && rng.random::<f32>() < (-delta / temperature).exp() {
                // keep exploring from the worse candidate; the exported best
                // is only ever replaced by an improvement
                incumbent.copy_updated_from(&current, tree);
                worse_moves_accepted += 1;
            } else {
                rejected_moves += 1;
            }
        }
        best_cost_trace.push(best.total_cost());

        // Exporting
        tree.export_schedule(&best, timestamps);

        let summary = PassSummary {
            initial_cost,
            best_cost: best.total_cost(),
            iterations: params.iterations,
            improving_moves,
            worse_moves_accepted,
            rejected_moves,
            projection_corrections,
            feasibility_warnings,
            best_cost_trace,
            elapsed_s: started.elapsed().as_secs_f32(),
        };
        info!(
            best_cost = summary.best_cost,
            improving = summary.improving_moves,
            elapsed_s = summary.elapsed_s,
            "annealing pass complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::ObjectiveConfig;
    use crate::resources::node::ResourceSpec;
    use crate::resources::types::{Horizon, ResourceKind, StorageParams};
    use std::collections::BTreeMap;

    fn horizon() -> Horizon {
        Horizon::new(24, 60)
    }

    fn timestamps() -> Vec<DateTime<Utc>> {
        let start = "2026-06-01T00:00:00Z".parse().unwrap_or_default();
        horizon().timestamps(start)
    }

    fn storage_spec() -> ResourceSpec {
        ResourceSpec {
            id: "ess".to_string(),
            kind: ResourceKind::EnergyStorage,
            nameplate_kw: 500.0,
            storage: Some(StorageParams {
                max_soe_kwh: 2000.0,
                min_soe_kwh: 0.0,
                soe_kwh: 500.0,
                eta_charge: 0.95,
                eta_discharge: 0.95,
                max_charge_kw: 500.0,
                max_discharge_kw: 500.0,
            }),
            demand_forecast_kw: Vec::new(),
            objectives: vec![ObjectiveConfig::EnergyCost {
                price: Some(vec![1.0; 24]),
                extra: BTreeMap::new(),
            }],
            children: Vec::new(),
        }
    }

    fn short_params(iterations: usize) -> AnnealingParams {
        AnnealingParams {
            iterations,
            ..AnnealingParams::default()
        }
    }

    #[test]
    fn validate_rejects_bad_fractions() {
        let params = AnnealingParams {
            fract_jump: 1.5,
            ..AnnealingParams::default()
        };
        assert!(params.validate().is_err());
        let params = AnnealingParams {
            fract_temp: 0.0,
            ..AnnealingParams::default()
        };
        assert!(params.validate().is_err());
        let params = AnnealingParams {
            cost_to_temp: -0.05,
            ..AnnealingParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(AnnealingParams::default().validate().is_ok());
    }

    #[test]
    fn run_rejects_wrong_timestamp_count() {
        let mut tree = ResourceTree::from_spec(&storage_spec(), horizon());
        let optimizer = SimulatedAnnealingOptimizer::new(short_params(10));
        let ts = timestamps();
        let result = optimizer.run(&mut tree, &TariffContext::default(), &ts[..12]);
        assert!(matches!(result, Err(PassError::TimestampCount { .. })));
    }

    #[test]
    fn run_rejects_unordered_timestamps() {
        let mut tree = ResourceTree::from_spec(&storage_spec(), horizon());
        let optimizer = SimulatedAnnealingOptimizer::new(short_params(10));
        let mut ts = timestamps();
        ts.swap(3, 4);
        let result = optimizer.run(&mut tree, &TariffContext::default(), &ts);
        assert!(matches!(
            result,
            Err(PassError::UnorderedTimestamps { index: 4 })
        ));
    }

    #[test]
    fn run_rejects_tree_without_controllables() {
        let spec = ResourceSpec {
            id: "load".to_string(),
            kind: ResourceKind::FixedLoad,
            nameplate_kw: 100.0,
            storage: None,
            demand_forecast_kw: Vec::new(),
            objectives: Vec::new(),
            children: Vec::new(),
        };
        let mut tree = ResourceTree::from_spec(&spec, horizon());
        let optimizer = SimulatedAnnealingOptimizer::new(short_params(10));
        let result = optimizer.run(&mut tree, &TariffContext::default(), &timestamps());
        assert!(matches!(result, Err(PassError::NoControllableResource)));
    }

    #[test]
    fn best_cost_never_exceeds_initial() {
        let mut tree = ResourceTree::from_spec(&storage_spec(), horizon());
        let optimizer = SimulatedAnnealingOptimizer::new(short_params(2000));
        let summary = optimizer.run(&mut tree, &TariffContext::default(), &timestamps());
        let summary = summary.ok();
        assert!(summary.is_some());
        let summary = summary.as_ref();
        let best = summary.map(|s| s.best_cost).unwrap_or(f32::NAN);
        let initial = summary.map(|s| s.initial_cost).unwrap_or(f32::NAN);
        assert!(best <= initial);
    }

    #[test]
    fn best_cost_trace_is_monotone() {
        let mut tree = ResourceTree::from_spec(&storage_spec(), horizon());
        let optimizer = SimulatedAnnealingOptimizer::new(short_params(5000));
        let summary = optimizer.run(&mut tree, &TariffContext::default(), &timestamps());
        let trace = summary.map(|s| s.best_cost_trace).unwrap_or_default();
        assert!(trace.len() > 2);
        for w in trace.windows(2) {
            assert!(w[1] <= w[0], "best cost increased: {} -> {}", w[0], w[1]);
        }
    }

    #[test]
    fn exported_schedule_is_populated() {
        let mut tree = ResourceTree::from_spec(&storage_spec(), horizon());
        let optimizer = SimulatedAnnealingOptimizer::new(short_params(500));
        let ts = timestamps();
        let result = optimizer.run(&mut tree, &TariffContext::default(), &ts);
        assert!(result.is_ok());
        let schedule = &tree.root().schedule;
        assert_eq!(schedule.demand_kw.len(), 24);
        assert_eq!(schedule.energy_available_kwh.len(), 24);
        assert_eq!(schedule.timestamps, ts);
    }

    #[test]
    fn identical_seeds_reproduce_identical_schedules() {
        let run = || {
            let mut tree = ResourceTree::from_spec(&storage_spec(), horizon());
            let optimizer = SimulatedAnnealingOptimizer::new(short_params(1000));
            let result = optimizer.run(&mut tree, &TariffContext::default(), &timestamps());
            assert!(result.is_ok());
            tree.root().schedule.clone()
        };
        let a = run();
        let b = run();
        assert_eq!(a.demand_kw, b.demand_kw);
        assert_eq!(a.energy_available_kwh, b.energy_available_kwh);
        assert_eq!(a.total_cost, b.total_cost);
    }

    #[test]
    fn zero_initial_cost_uses_temperature_floor() {
        // no objectives anywhere: initial cost is exactly zero
        let mut spec = storage_spec();
        spec.objectives.clear();
        let mut tree = ResourceTree::from_spec(&spec, horizon());
        let optimizer = SimulatedAnnealingOptimizer::new(short_params(200));
        let summary = optimizer.run(&mut tree, &TariffContext::default(), &timestamps());
        let summary = summary.ok();
        assert!(summary.is_some());
        assert_eq!(summary.map(|s| s.best_cost), Some(0.0));
    }
}
