//! Dispatch optimizer entry point: CLI wiring and config-driven passes.

use std::path::Path;
use std::process;

use der_dispatch::config::ScenarioConfig;
use der_dispatch::optimizer::SimulatedAnnealingOptimizer;
use der_dispatch::report::{export_diagnostics, export_schedule_csv};
use der_dispatch::resources::ResourceKind;
use tracing_subscriber::EnvFilter;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    iterations_override: Option<usize>,
    schedule_out: Option<String>,
    diagnostics_out: Option<String>,
}

fn print_help() {
    eprintln!("der-dispatch — least-cost dispatch scheduling for DER hierarchies");
    eprintln!();
    eprintln!("Usage: der-dispatch [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>         Load scenario from TOML config file");
    eprintln!("  --preset <name>           Use a built-in preset (single_storage, campus)");
    eprintln!("  --seed <u64>              Override random seed");
    eprintln!("  --iterations <usize>      Override annealing iteration count");
    eprintln!("  --schedule-out <path>     Export the schedule table to CSV");
    eprintln!("  --diagnostics-out <path>  Export the diagnostic dump to CSV");
    eprintln!("  --help                    Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the campus preset is used.");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        iterations_override: None,
        schedule_out: None,
        diagnostics_out: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --scenario requires a path argument");
                    process::exit(1);
                }
                cli.scenario_path = Some(args[i].clone());
            }
            "--preset" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --preset requires a name argument");
                    process::exit(1);
                }
                cli.preset = Some(args[i].clone());
            }
            "--seed" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --seed requires a u64 argument");
                    process::exit(1);
                }
                if let Ok(s) = args[i].parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{}\" is not a valid u64", args[i]);
                    process::exit(1);
                }
            }
            "--iterations" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --iterations requires a count argument");
                    process::exit(1);
                }
                if let Ok(n) = args[i].parse::<usize>() {
                    cli.iterations_override = Some(n);
                } else {
                    eprintln!("error: --iterations value \"{}\" is not valid", args[i]);
                    process::exit(1);
                }
            }
            "--schedule-out" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --schedule-out requires a path argument");
                    process::exit(1);
                }
                cli.schedule_out = Some(args[i].clone());
            }
            "--diagnostics-out" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --diagnostics-out requires a path argument");
                    process::exit(1);
                }
                cli.diagnostics_out = Some(args[i].clone());
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = parse_args();

    // Load config: --scenario takes priority, then --preset, then campus
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        match ScenarioConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match ScenarioConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        ScenarioConfig::campus()
    };

    if let Some(seed) = cli.seed_override {
        scenario.annealing.seed = seed;
    }
    if let Some(iterations) = cli.iterations_override {
        scenario.annealing.iterations = iterations;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    // Build and run one pass
    let mut tree = scenario.build_tree();
    let timestamps = scenario.build_timestamps();
    let optimizer = SimulatedAnnealingOptimizer::new(scenario.annealing.clone());
    let summary = match optimizer.run(&mut tree, &scenario.tariffs, &timestamps) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    // Print the system schedule, with the first storage trajectory if any
    let storage_idx = tree.find_all(ResourceKind::EnergyStorage).first().copied();
    let root = tree.root();
    for (t, ts) in root.schedule.timestamps.iter().enumerate() {
        let storage = storage_idx.map(|idx| &tree.nodes[idx].schedule);
        match storage {
            Some(s) => println!(
                "{} | system={:>8.2} kW | storage={:>8.2} kW soe={:>8.2} kWh",
                ts.format("%Y-%m-%d %H:%M"),
                root.schedule.demand_kw[t],
                s.demand_kw[t],
                s.energy_available_kwh[t],
            ),
            None => println!(
                "{} | system={:>8.2} kW",
                ts.format("%Y-%m-%d %H:%M"),
                root.schedule.demand_kw[t],
            ),
        }
    }

    println!("\n{summary}");

    if let Some(ref path) = cli.schedule_out {
        if let Err(e) = export_schedule_csv(&tree, Path::new(path)) {
            eprintln!("error: failed to write schedule CSV: {e}");
            process::exit(1);
        }
        eprintln!("Schedule written to {path}");
    }
    if let Some(ref path) = cli.diagnostics_out {
        if let Err(e) = export_diagnostics(&tree, Path::new(path)) {
            eprintln!("error: failed to write diagnostics CSV: {e}");
            process::exit(1);
        }
        eprintln!("Diagnostics written to {path}");
    }
}
