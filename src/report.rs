//! CSV artifacts for offline inspection of an optimization pass.
//!
//! Two layouts are produced: a diagnostic dump with one labeled row per
//! named series (system and per-resource profiles), and a per-timestep
//! schedule table. Both are deterministic for identical inputs.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::resources::node::ResourceTree;
use crate::resources::types::ResourceKind;

/// Writes the diagnostic dump for the last exported pass.
///
/// Rows: chosen system demand, initial (baseline) system demand, then per
/// storage node its chosen demand and energy trajectory, and per solar and
/// fixed-load node its chosen demand. Each row is the series name followed
/// by one value per schedule point.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_diagnostics<W: Write>(tree: &ResourceTree, writer: W) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let root = tree.root();
    write_series(&mut wtr, "system-demand-kw", &root.schedule.demand_kw)?;
    write_series(&mut wtr, "system-demand-initial-kw", &root.demand_forecast_kw)?;

    for &idx in &tree.find_all(ResourceKind::EnergyStorage) {
        let node = &tree.nodes[idx];
        write_series(&mut wtr, &format!("{}-demand-kw", node.id), &node.schedule.demand_kw)?;
        write_series(
            &mut wtr,
            &format!("{}-energy-kwh", node.id),
            &node.schedule.energy_available_kwh,
        )?;
    }
    for kind in [ResourceKind::SolarGeneration, ResourceKind::FixedLoad] {
        for &idx in &tree.find_all(kind) {
            let node = &tree.nodes[idx];
            write_series(&mut wtr, &format!("{}-demand-kw", node.id), &node.schedule.demand_kw)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Writes the diagnostic dump to a file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_diagnostics(tree: &ResourceTree, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_diagnostics(tree, buf)
}

/// Writes the exported schedule as one row per timestep.
///
/// Columns: the timestamp, one demand column per node, and one energy
/// column per storage node.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_schedule_csv<W: Write>(tree: &ResourceTree, writer: W) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    let storage_nodes = tree.find_all(ResourceKind::EnergyStorage);

    let mut header = vec!["timestamp".to_string()];
    for node in &tree.nodes {
        header.push(format!("{}_kw", node.id));
    }
    for &idx in &storage_nodes {
        header.push(format!("{}_kwh", tree.nodes[idx].id));
    }
    wtr.write_record(&header)?;

    let root = tree.root();
    for t in 0..root.schedule.demand_kw.len() {
        let mut row = Vec::with_capacity(header.len());
        row.push(
            root.schedule
                .timestamps
                .get(t)
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default(),
        );
        for node in &tree.nodes {
            row.push(format!("{:.4}", node.schedule.demand_kw[t]));
        }
        for &idx in &storage_nodes {
            row.push(format!("{:.4}", tree.nodes[idx].schedule.energy_available_kwh[t]));
        }
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes the schedule table to a file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_schedule_csv(tree: &ResourceTree, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_schedule_csv(tree, buf)
}

fn write_series<W: Write>(
    wtr: &mut csv::Writer<W>,
    name: &str,
    values: &[f32],
) -> io::Result<()> {
    let mut row = Vec::with_capacity(values.len() + 1);
    row.push(name.to_string());
    for v in values {
        row.push(format!("{v:.4}"));
    }
    wtr.write_record(&row)?;
    Ok(())
}
