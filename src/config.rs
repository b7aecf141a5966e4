//! Tunable settings of the refinement loop.

use std::time::Duration;

/// How the learner combines half-spaces.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Strategy {
    /// A single conjunction of half-spaces.
    Conjunctive,
    /// One conjunction per path partition, joined by disjunction.
    Disjunctive {
        /// Also split every path partition by the loop condition.
        split_on_cond: bool,
    },
}

/// Settings of the linear separator.
#[derive(Debug, Clone)]
pub struct SvmConfig {
    /// Soft-margin penalty (default: 1000)
    pub c: f64,
    /// Stopping tolerance on the KKT violation (default: 1e-3)
    pub tolerance: f64,
    /// Cap on SMO iterations; training fails once it is reached (default: 10000000)
    pub max_iterations: usize,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 1000.0,
            tolerance: 1e-3,
            max_iterations: 10_000_000,
        }
    }
}

/// Settings of a [`Verifier`][crate::verify::Verifier].
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of random points drawn before the first round (default: 200)
    pub initial_samples: usize,
    /// Inclusive lower bound of sampled coordinates (default: -20)
    pub sample_low: i64,
    /// Exclusive upper bound of sampled coordinates (default: 20)
    pub sample_high: i64,
    /// Offset used when mirroring a point lying on a hyperplane (default: 20)
    pub mirror_margin: i64,
    /// Scale applied to separator weights before rounding (default: 10)
    pub hesse_multiplier: f64,
    /// Seed of the sampling and selection RNG (default: 42)
    pub seed: u64,
    /// Maximal number of loop iterations when simulating a sample (default: 10000)
    pub unroll_limit: usize,
    /// Maximal number of refinement rounds, `None` for no limit (default: 500)
    pub max_rounds: Option<usize>,
    /// Wall-clock limit, checked before classifying and before every separator training
    /// (default: none)
    pub timeout: Option<Duration>,
    /// Initial budget of every solver query: search steps for the built-in solver,
    /// milliseconds for z3 (default: 20000)
    pub solver_budget: u64,
    /// How many times an unknown answer is retried (default: 3)
    pub solver_retries: usize,
    /// Budget multiplier between retries (default: 4)
    pub budget_growth: u64,
    /// Shape of candidate invariants (default: conjunctive)
    pub strategy: Strategy,
    pub svm: SvmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_samples: 200,
            sample_low: -20,
            sample_high: 20,
            mirror_margin: 20,
            hesse_multiplier: 10.0,
            seed: 42,
            unroll_limit: 10_000,
            max_rounds: Some(500),
            timeout: None,
            solver_budget: 20_000,
            solver_retries: 3,
            budget_growth: 4,
            strategy: Strategy::Conjunctive,
            svm: SvmConfig::default(),
        }
    }
}
