//! End-to-end optimization passes over the single-storage scenario.

mod common;

use der_dispatch::config::ScenarioConfig;
use der_dispatch::error::PassError;
use der_dispatch::optimizer::SimulatedAnnealingOptimizer;
use der_dispatch::resources::ResourceKind;

#[test]
fn single_storage_full_pass_meets_cost_and_soe_bounds() {
    // 500 kW / 2000 kWh storage, SOE 500, flat zero forecast, unit price,
    // full default iteration budget
    let cfg = ScenarioConfig::single_storage();
    let (tree, timestamps, summary) = common::run_pass(&cfg);

    assert!(summary.best_cost <= summary.initial_cost);

    let schedule = &tree.root().schedule;
    assert_eq!(schedule.demand_kw.len(), 24);
    assert_eq!(schedule.timestamps, timestamps);
    for (t, &soe) in schedule.energy_available_kwh.iter().enumerate() {
        assert!(
            (0.0 - 0.001..=2000.0 + 0.001).contains(&soe),
            "SOE out of bounds at t={t}: {soe}"
        );
    }
}

#[test]
fn single_storage_discharging_earns_energy_credit() {
    // with a uniform positive price and zero demand, the least-cost schedule
    // discharges: best cost must drop below the zero-cost baseline
    let cfg = common::preset_with_iterations("single_storage", 20_000);
    let (_, _, summary) = common::run_pass(&cfg);
    assert_eq!(summary.initial_cost, 0.0);
    assert!(
        summary.best_cost < 0.0,
        "expected energy credit, got {}",
        summary.best_cost
    );
}

#[test]
fn best_cost_trace_is_monotone_nonincreasing() {
    let cfg = common::preset_with_iterations("single_storage", 10_000);
    let (_, _, summary) = common::run_pass(&cfg);
    assert!(summary.best_cost_trace.len() > 2);
    for w in summary.best_cost_trace.windows(2) {
        assert!(
            w[1] <= w[0],
            "best cost increased along the trace: {} -> {}",
            w[0],
            w[1]
        );
    }
}

#[test]
fn acceptance_counters_partition_the_iterations() {
    let cfg = common::preset_with_iterations("single_storage", 5_000);
    let (_, _, summary) = common::run_pass(&cfg);
    assert_eq!(
        summary.improving_moves + summary.worse_moves_accepted + summary.rejected_moves,
        summary.iterations
    );
}

#[test]
fn identical_seeds_reproduce_identical_schedules() {
    let cfg = common::preset_with_iterations("single_storage", 3_000);
    let (tree_a, _, summary_a) = common::run_pass(&cfg);
    let (tree_b, _, summary_b) = common::run_pass(&cfg);

    assert_eq!(summary_a.best_cost, summary_b.best_cost);
    assert_eq!(
        tree_a.root().schedule.demand_kw,
        tree_b.root().schedule.demand_kw
    );
    assert_eq!(
        tree_a.root().schedule.energy_available_kwh,
        tree_b.root().schedule.energy_available_kwh
    );
}

#[test]
fn missing_energy_price_aborts_the_pass() {
    let mut cfg = common::preset_with_iterations("single_storage", 100);
    cfg.tariffs.energy_price = None;

    let mut tree = cfg.build_tree();
    let timestamps = cfg.build_timestamps();
    let optimizer = SimulatedAnnealingOptimizer::new(cfg.annealing.clone());
    let result = optimizer.run(&mut tree, &cfg.tariffs, &timestamps);
    assert!(matches!(result, Err(PassError::MissingParameter { .. })));

    // nothing was exported
    assert!(tree.root().schedule.demand_kw.is_empty());
}

#[test]
fn nested_aggregate_with_two_storages_is_optimized_consistently() {
    let toml = r#"
[horizon]
points = 24
resolution_min = 60
start_time = "2026-06-01T00:00:00Z"

[annealing]
iterations = 10000

[tariffs]
energy_price = [
    0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2,
    0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.2, 0.2, 0.2, 0.1, 0.1, 0.1,
]

[system]
id = "system"
kind = "aggregate_system"

[[system.objectives]]
kind = "energy_cost"

[[system.children]]
id = "plant"
kind = "generic_aggregate"

[[system.children.children]]
id = "ess-a"
kind = "energy_storage"
nameplate_kw = 100.0

[system.children.children.storage]
max_soe_kwh = 400.0
min_soe_kwh = 0.0
soe_kwh = 200.0
max_charge_kw = 100.0
max_discharge_kw = 100.0

[[system.children.children]]
id = "ess-b"
kind = "energy_storage"
nameplate_kw = 50.0

[system.children.children.storage]
max_soe_kwh = 100.0
min_soe_kwh = 10.0
soe_kwh = 60.0
max_charge_kw = 50.0
max_discharge_kw = 50.0

[[system.children]]
id = "load"
kind = "fixed_load"
nameplate_kw = 200.0
demand_forecast_kw = [
    80.0, 80.0, 80.0, 80.0, 90.0, 110.0, 140.0, 170.0, 180.0, 175.0, 170.0, 165.0,
    170.0, 175.0, 180.0, 185.0, 180.0, 160.0, 150.0, 140.0, 120.0, 100.0, 90.0, 85.0,
]
"#;
    let cfg = der_dispatch::config::ScenarioConfig::from_toml_str(toml)
        .expect("nested scenario should parse");
    let (tree, _, summary) = common::run_pass(&cfg);

    assert!(summary.best_cost < summary.initial_cost);

    // both storage nodes were searched and stay within their own bounds
    let storages = tree.find_all(ResourceKind::EnergyStorage);
    assert_eq!(storages.len(), 2);
    for &idx in &storages {
        let node = &tree.nodes[idx];
        let params = node.storage.as_ref().expect("storage params");
        for &soe in &node.schedule.energy_available_kwh {
            assert!(
                soe >= params.min_soe_kwh - 0.001 && soe <= params.max_soe_kwh + 0.001,
                "\"{}\" SOE out of bounds: {soe}",
                node.id
            );
        }
    }

    // aggregation holds at both levels of the exported schedule
    let plant = tree.find("plant").expect("plant node exists");
    for t in 0..24 {
        let plant_children: f32 = tree.nodes[plant]
            .children
            .iter()
            .map(|&c| tree.nodes[c].schedule.demand_kw[t])
            .sum();
        assert!((tree.nodes[plant].schedule.demand_kw[t] - plant_children).abs() < 0.01);

        let system_children: f32 = tree
            .root()
            .children
            .iter()
            .map(|&c| tree.nodes[c].schedule.demand_kw[t])
            .sum();
        assert!((tree.root().schedule.demand_kw[t] - system_children).abs() < 0.01);
    }
}

#[test]
fn exported_storage_trajectory_is_consistent_with_demand() {
    let cfg = common::preset_with_iterations("single_storage", 10_000);
    let (tree, _, _) = common::run_pass(&cfg);

    let idx = tree.find_all(ResourceKind::EnergyStorage)[0];
    let node = &tree.nodes[idx];
    let storage = node.storage.as_ref().expect("storage node has params");

    let mut soe = storage.soe_kwh;
    for t in 0..24 {
        soe += storage.delta_energy_kwh(node.schedule.demand_kw[t], 1.0);
        assert!(
            (node.schedule.energy_available_kwh[t] - soe).abs() < 0.01,
            "trajectory inconsistent at t={t}"
        );
    }
}
