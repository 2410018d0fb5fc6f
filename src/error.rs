//! Fatal preconditions that abort an optimization pass before it starts.

use thiserror::Error;

/// A precondition violation detected while preparing an optimization pass.
///
/// Feasibility residue and numeric edge cases are handled in place and never
/// surface here; only configuration-class failures do.
#[derive(Debug, Error)]
pub enum PassError {
    /// An objective function is missing a required parameter and no tariff
    /// value or default covers it.
    #[error("resource \"{resource}\": objective \"{objective}\" is missing required parameter \"{parameter}\"")]
    MissingParameter {
        resource: String,
        objective: &'static str,
        parameter: &'static str,
    },

    /// A configured series does not match the schedule horizon.
    #[error("resource \"{resource}\": \"{series}\" has {actual} points, schedule horizon has {expected}")]
    SeriesLength {
        resource: String,
        series: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The timestamp vector does not match the schedule horizon.
    #[error("timestamp vector has {actual} points, schedule horizon has {expected}")]
    TimestampCount { expected: usize, actual: usize },

    /// The timestamp vector is not strictly increasing.
    #[error("timestamp vector is not monotonically increasing at index {index}")]
    UnorderedTimestamps { index: usize },

    /// The tree holds no controllable resource to perturb.
    #[error("no controllable resource in the tree; nothing to optimize")]
    NoControllableResource,

    /// An annealing parameter is outside its valid range.
    #[error("annealing parameter {name} must be {constraint}, got {value}")]
    InvalidAnnealingParameter {
        name: &'static str,
        constraint: &'static str,
        value: f32,
    },
}
