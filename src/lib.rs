//! # inv-learn: loop invariants by learning half-spaces
//!
//! **`inv-learn`** infers inductive invariants of simple integer loops by alternating between a
//! linear classifier and a solver. Sample states are labelled by running the loop, a support
//! vector machine separates good states from bad ones, and the solver either proves the
//! resulting candidate or returns a state that refutes it. The refuting state, together with
//! its mirror images across the candidate's hyperplanes, feeds the next round.
//!
//! ## Loops
//!
//! A loop is given as a [`ProgramSpec`][crate::program::ProgramSpec]: a precondition, a loop
//! condition, a transition relation and a postcondition, all as [`Expr`][crate::expr::Expr]
//! formulas over SSA copies of the program variables (`x@1` before an iteration, `x@2` after).
//!
//! ## Basic Usage
//!
//! ```rust
//! use inv_learn::config::Config;
//! use inv_learn::programs::example1;
//! use inv_learn::verify::{Verdict, Verifier};
//!
//! let config = Config {
//!     initial_samples: 50,
//!     max_rounds: Some(20),
//!     ..Config::default()
//! };
//! let report = Verifier::with_defaults(config).verify(&example1()).unwrap();
//! match report.verdict {
//!     Verdict::Invariant(inv) => println!("invariant: {}", inv),
//!     other => println!("{}", other),
//! }
//! ```
//!
//! ## Core Components
//!
//! - **[`verify`]**: the refinement loop and its [`Verdict`][crate::verify::Verdict].
//! - **[`classify`]** and **[`samples`]**: labelling states by simulating the loop.
//! - **[`learn`]**: conjunctive and disjunctive candidates from labelled samples.
//! - **[`check`]**: initiation, consecution and exit checks.
//! - **[`solver`]**: the [`Solver`][crate::solver::Solver] interface and the built-in linear
//!   integer arithmetic procedure, built on [`linear`] and [`simplex`]. The `z3` feature adds
//!   a Z3 backend.
//! - **[`svm`]**: the [`LinearSeparator`][crate::svm::LinearSeparator] interface and the
//!   built-in SVM.
//! - **[`geometry`]**: points, integer half-spaces and reflection.

pub mod check;
pub mod classify;
pub mod config;
pub mod error;
pub mod expr;
pub mod geometry;
pub mod learn;
pub mod linear;
pub mod program;
pub mod programs;
pub mod samples;
pub mod simplex;
pub mod solver;
pub mod svm;
pub mod utils;
pub mod verify;
