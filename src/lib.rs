//! Least-cost dispatch scheduling for hierarchies of distributed energy resources.

pub mod config;
pub mod error;
pub mod objective;
pub mod optimizer;
pub mod report;
/// Resource hierarchy, candidate profiles, and storage feasibility projection.
pub mod resources;
