//! Shared fixtures for integration tests.

use chrono::{DateTime, Utc};
use der_dispatch::config::ScenarioConfig;
use der_dispatch::optimizer::{AnnealingParams, PassSummary, SimulatedAnnealingOptimizer};
use der_dispatch::resources::ResourceTree;

/// Loads a preset, overriding the iteration count for faster runs.
pub fn preset_with_iterations(name: &str, iterations: usize) -> ScenarioConfig {
    let cfg = ScenarioConfig::from_preset(name);
    assert!(cfg.is_ok(), "preset \"{name}\" should load");
    let mut cfg = cfg.unwrap_or_else(|_| ScenarioConfig::single_storage());
    cfg.annealing = AnnealingParams {
        iterations,
        ..cfg.annealing
    };
    cfg
}

/// Runs one full pass for a scenario, returning the tree, the timestamps,
/// and the pass summary.
pub fn run_pass(cfg: &ScenarioConfig) -> (ResourceTree, Vec<DateTime<Utc>>, PassSummary) {
    let errors = cfg.validate();
    assert!(errors.is_empty(), "scenario should validate: {errors:?}");

    let mut tree = cfg.build_tree();
    let timestamps = cfg.build_timestamps();
    let optimizer = SimulatedAnnealingOptimizer::new(cfg.annealing.clone());
    let summary = optimizer
        .run(&mut tree, &cfg.tariffs, &timestamps)
        .expect("pass should succeed");
    (tree, timestamps, summary)
}
