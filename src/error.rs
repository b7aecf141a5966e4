use thiserror::Error;

use crate::geometry::Point;

/// Errors raised while learning or checking an invariant.
#[derive(Debug, Error)]
pub enum Error {
    /// The product of two non-constant terms reached the solver.
    #[error("nonlinear term `{0}` is outside linear integer arithmetic")]
    Nonlinear(String),

    /// An integer term was used where a formula was expected, or vice versa.
    #[error("expected {expected}, found `{found}`")]
    Sort { expected: &'static str, found: String },

    /// A model value or an intermediate coefficient left the `i64` range.
    #[error("integer overflow while {0}")]
    Overflow(&'static str),

    /// The solver kept answering `unknown` after every budget relaxation.
    #[error("solver returned unknown after {attempts} attempts")]
    SolverUnknown { attempts: usize },

    /// Symbolic execution of the loop did not reach an exit state.
    #[error("loop unrolling from {start} did not exit within {limit} iterations")]
    UnrollLimit { start: Point, limit: usize },

    /// A sample satisfies none of the path partitions.
    #[error("sample {point} lies in none of the {partitions} path partitions")]
    PartitionGap { point: Point, partitions: usize },

    /// A point does not have one coordinate per program variable.
    #[error("point {point} has {found} coordinates, expected {expected}")]
    Dimension { point: Point, found: usize, expected: usize },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// The separator hit its iteration cap before the optimality conditions held.
    #[error("separator did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },

    /// A wall-clock deadline passed while learning.
    #[error("deadline passed")]
    Deadline,

    /// The separator was asked to train without both labels present.
    #[error("cannot train a separator without positive and negative samples")]
    EmptyTrainingSet,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
