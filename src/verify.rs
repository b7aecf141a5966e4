//! The refinement loop.
//!
//! A [`Verifier`] alternates between learning a candidate invariant from classified samples
//! and checking it with the solver:
//!
//! ```text
//! Sampling -> Classifying -> Learning -> Verifying -> Done
//!                  ^                        |
//!                  +------- Refining <------+
//! ```
//!
//! When a candidate fails, the violating state and its mirror images across every half-space
//! of the candidate become the next batch of samples.
//!
//! # Example
//!
//! ```
//! use inv_learn::config::Config;
//! use inv_learn::expr::Expr;
//! use inv_learn::program::{ProgramSpec, StateVar};
//! use inv_learn::verify::{Verdict, Verifier};
//!
//! // assume(x >= 0); while (x < 0) { x += 1 }; assert(x >= 0)
//! let x1 = Expr::ssa("x", 1);
//! let x2 = Expr::ssa("x", 2);
//! let spec = ProgramSpec::new(
//!     vec![StateVar::new("x", 1, 2)],
//!     x1.clone().ge(0),
//!     x1.clone().lt(0),
//!     x2.clone().equals(x1 + 1),
//!     x2.ge(0),
//! );
//!
//! let config = Config {
//!     initial_samples: 20,
//!     ..Config::default()
//! };
//! let report = Verifier::with_defaults(config).verify(&spec).unwrap();
//! assert!(matches!(report.verdict, Verdict::Invariant(_)));
//! ```

use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::check::{check_invariant, Validity};
use crate::classify::{classify, Classification};
use crate::config::{Config, Strategy};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::geometry::{Halfspace, Point};
use crate::learn::{Learned, Learner};
use crate::program::ProgramSpec;
use crate::samples::SampleSet;
use crate::solver::{DefaultSolver, Session, Solver};
use crate::svm::{LinearSeparator, Svm};

/// Why a run ended without an answer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Reason {
    /// `max_rounds` candidates were rejected.
    RoundLimit(usize),
    /// The wall-clock limit passed.
    Timeout(Duration),
    /// Simulating a sample did not leave the loop.
    Unroll { start: Point, limit: usize },
    /// The solver kept answering unknown.
    Solver { attempts: usize },
    /// The separator hit its iteration cap.
    Separator { iterations: usize },
}

impl Display for Reason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::RoundLimit(n) => write!(f, "no invariant after {} rounds", n),
            Reason::Timeout(t) => write!(f, "timeout after {:?}", t),
            Reason::Unroll { start, limit } => {
                write!(f, "loop from {} still running after {} iterations", start, limit)
            }
            Reason::Solver { attempts } => {
                write!(f, "solver unknown after {} attempts", attempts)
            }
            Reason::Separator { iterations } => {
                write!(f, "separator did not converge in {} iterations", iterations)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// A proven invariant over the unindexed program variables.
    Invariant(Expr),
    /// A sample starting in `pre` exits the loop violating `post`.
    Disproved,
    Inconclusive(Reason),
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Invariant(inv) => write!(f, "invariant {}", inv),
            Verdict::Disproved => write!(f, "disproved"),
            Verdict::Inconclusive(reason) => write!(f, "inconclusive: {}", reason),
        }
    }
}

/// Counters of a single run.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Stats {
    /// Candidates learned.
    pub rounds: usize,
    /// Start states simulated through the loop.
    pub classified: usize,
    /// Points filed in the sample set, traces included.
    pub samples: usize,
    pub solver_queries: usize,
    pub trainings: usize,
    pub elapsed: Duration,
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rounds, {} classified, {} samples, {} queries, {} trainings in {:.2?}",
            self.rounds,
            self.classified,
            self.samples,
            self.solver_queries,
            self.trainings,
            self.elapsed
        )
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub verdict: Verdict,
    pub stats: Stats,
}

/// Where the refinement loop is.
#[derive(Debug)]
enum Phase {
    Sampling,
    Classifying,
    Learning,
    Verifying {
        invariant: Expr,
        halfspaces: Vec<Halfspace>,
    },
    Refining {
        witness: Point,
        halfspaces: Vec<Halfspace>,
    },
    Done(Verdict),
}

/// Turns a give-up error into a verdict, passing every other error through.
fn give_up(err: Error, timeout: Option<Duration>) -> Result<Phase> {
    let reason = match err {
        Error::UnrollLimit { start, limit } => Reason::Unroll { start, limit },
        Error::SolverUnknown { attempts } => Reason::Solver { attempts },
        Error::NotConverged { iterations } => Reason::Separator { iterations },
        Error::Deadline => Reason::Timeout(timeout.unwrap_or_default()),
        other => return Err(other),
    };
    Ok(Phase::Done(Verdict::Inconclusive(reason)))
}

pub struct Verifier<S, L> {
    config: Config,
    session: Session<S>,
    learner: Learner<L>,
}

impl Verifier<DefaultSolver, Svm> {
    /// A verifier with the default solver and the built-in SVM.
    ///
    /// The solver is `Z3Solver` when the `z3` feature is enabled
    /// and [`LiaSolver`][crate::solver::LiaSolver] otherwise.
    pub fn with_defaults(config: Config) -> Self {
        let svm = Svm::new(config.svm.clone());
        Self::new(config, DefaultSolver::new(), svm)
    }
}

impl<S: Solver, L: LinearSeparator> Verifier<S, L> {
    pub fn new(config: Config, solver: S, separator: L) -> Self {
        let session = Session::new(
            solver,
            config.solver_budget,
            config.solver_retries,
            config.budget_growth,
        );
        let learner = Learner::new(separator, config.hesse_multiplier);
        Self {
            config,
            session,
            learner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the refinement loop on `spec` until a verdict is reached.
    ///
    /// Every call starts from a fresh sample set and RNG seeded with `config.seed`, so
    /// repeated calls give the same result.
    pub fn verify(&mut self, spec: &ProgramSpec) -> Result<Report> {
        if self.config.sample_low >= self.config.sample_high {
            return Err(Error::Config("sample_low must be below sample_high"));
        }
        if self.config.budget_growth == 0 {
            return Err(Error::Config("budget_growth must be positive"));
        }
        if spec.dim() == 0 {
            return Err(Error::Config("a loop needs at least one state variable"));
        }

        let started = Instant::now();
        let queries_before = self.session.queries();
        let trainings_before = self.learner.trainings();

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut samples = SampleSet::new();
        let mut stats = Stats::default();
        let mut phase = Phase::Sampling;
        let deadline = self
            .config
            .timeout
            .and_then(|timeout| started.checked_add(timeout));
        self.learner.set_deadline(deadline);

        let verdict = loop {
            debug!("verify: {:?}", phase);
            phase = match phase {
                Phase::Sampling => {
                    for _ in 0..self.config.initial_samples {
                        let coords = (0..spec.dim())
                            .map(|_| rng.random_range(self.config.sample_low..self.config.sample_high))
                            .collect();
                        samples.add(Classification::Unknown, Point::new(coords));
                    }
                    Phase::Classifying
                }

                Phase::Classifying => match self.config.timeout {
                    Some(timeout) if started.elapsed() >= timeout => {
                        Phase::Done(Verdict::Inconclusive(Reason::Timeout(timeout)))
                    }
                    _ => match self.classify_unknown(spec, &mut samples, &mut stats) {
                        Ok(()) => Phase::Learning,
                        Err(err) => give_up(err, self.config.timeout)?,
                    },
                },

                Phase::Learning => {
                    if let Some(max) = self.config.max_rounds {
                        if stats.rounds >= max {
                            break Verdict::Inconclusive(Reason::RoundLimit(max));
                        }
                    }
                    stats.rounds += 1;

                    let learned = match self.config.strategy {
                        Strategy::Conjunctive => {
                            self.learner
                                .conjunctive(&mut rng, &samples, &spec.invariant_vars())
                        }
                        Strategy::Disjunctive { split_on_cond } => self.learner.disjunctive(
                            &mut rng,
                            &mut self.session,
                            &samples,
                            spec,
                            split_on_cond,
                        ),
                    };
                    match learned {
                        Ok(Learned::Disproved) => Phase::Done(Verdict::Disproved),
                        Ok(Learned::Candidate {
                            invariant,
                            halfspaces,
                        }) => Phase::Verifying {
                            invariant,
                            halfspaces,
                        },
                        Err(err) => give_up(err, self.config.timeout)?,
                    }
                }

                Phase::Verifying {
                    invariant,
                    halfspaces,
                } => match check_invariant(&mut self.session, spec, &invariant) {
                    Ok(Validity::Valid) => Phase::Done(Verdict::Invariant(invariant.simplify())),
                    Ok(Validity::Invalid { check, witness }) => {
                        info!(
                            "Round {}: {} fails {} at {}",
                            stats.rounds, invariant, check, witness
                        );
                        Phase::Refining {
                            witness,
                            halfspaces,
                        }
                    }
                    Err(err) => give_up(err, self.config.timeout)?,
                },

                Phase::Refining {
                    witness,
                    halfspaces,
                } => {
                    let mirrored: Vec<Point> = halfspaces
                        .iter()
                        .flat_map(|h| h.reflect(&witness, self.config.mirror_margin))
                        .collect();
                    debug!("verify: {} mirror points of {}", mirrored.len(), witness);
                    samples.add(Classification::Unknown, witness);
                    samples.extend(Classification::Unknown, mirrored);
                    Phase::Classifying
                }

                Phase::Done(verdict) => break verdict,
            };
        };

        stats.samples = samples.len();
        stats.solver_queries = self.session.queries() - queries_before;
        stats.trainings = self.learner.trainings() - trainings_before;
        stats.elapsed = started.elapsed();
        info!("Verdict: {} ({})", verdict, stats);
        Ok(Report { verdict, stats })
    }

    fn classify_unknown(
        &mut self,
        spec: &ProgramSpec,
        samples: &mut SampleSet,
        stats: &mut Stats,
    ) -> Result<()> {
        for point in samples.take_unknown() {
            let (class, trace) =
                classify(&mut self.session, spec, &point, self.config.unroll_limit)?;
            samples.extend(class, trace);
            stats.classified += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::StateVar;

    fn small() -> Config {
        Config {
            initial_samples: 40,
            max_rounds: Some(30),
            ..Config::default()
        }
    }

    fn counter(pre: Expr, cond: Expr, post: Expr) -> ProgramSpec {
        let x1 = Expr::ssa("x", 1);
        let x2 = Expr::ssa("x", 2);
        ProgramSpec::new(
            vec![StateVar::new("x", 1, 2)],
            pre,
            cond,
            x2.equals(x1 + 1),
            post,
        )
    }

    #[test]
    fn test_trivial_invariant() {
        let x1 = Expr::ssa("x", 1);
        let spec = counter(x1.clone().ge(0), x1.lt(0), Expr::ssa("x", 2).ge(0));
        let report = Verifier::with_defaults(small()).verify(&spec).unwrap();
        println!("{} ({})", report.verdict, report.stats);
        assert_eq!(report.verdict, Verdict::Invariant(Expr::tt()));
        assert_eq!(report.stats.rounds, 1);
        assert_eq!(report.stats.classified, 40);
    }

    #[test]
    fn test_disproved() {
        let x1 = Expr::ssa("x", 1);
        let spec = counter(x1.clone().ge(0), x1.lt(10), Expr::ssa("x", 2).gt(100));
        let report = Verifier::with_defaults(small()).verify(&spec).unwrap();
        assert_eq!(report.verdict, Verdict::Disproved);
    }

    #[test]
    fn test_round_limit() {
        let x1 = Expr::ssa("x", 1);
        let spec = counter(x1.clone().ge(0), x1.lt(0), Expr::ssa("x", 2).ge(0));
        let config = Config {
            max_rounds: Some(0),
            ..small()
        };
        let report = Verifier::with_defaults(config).verify(&spec).unwrap();
        assert_eq!(report.verdict, Verdict::Inconclusive(Reason::RoundLimit(0)));
        assert_eq!(report.stats.rounds, 0);
    }

    #[test]
    fn test_timeout() {
        let x1 = Expr::ssa("x", 1);
        let spec = counter(x1.clone().ge(0), x1.lt(0), Expr::ssa("x", 2).ge(0));
        let config = Config {
            timeout: Some(Duration::ZERO),
            ..small()
        };
        let report = Verifier::with_defaults(config).verify(&spec).unwrap();
        assert_eq!(
            report.verdict,
            Verdict::Inconclusive(Reason::Timeout(Duration::ZERO))
        );
    }

    #[test]
    fn test_deadline_during_learning() {
        let phase = give_up(Error::Deadline, Some(Duration::from_secs(3))).unwrap();
        assert!(matches!(
            phase,
            Phase::Done(Verdict::Inconclusive(Reason::Timeout(t))) if t == Duration::from_secs(3)
        ));
        let phase = give_up(Error::NotConverged { iterations: 7 }, None).unwrap();
        assert!(matches!(
            phase,
            Phase::Done(Verdict::Inconclusive(Reason::Separator { iterations: 7 }))
        ));
        assert!(matches!(
            give_up(Error::EmptyTrainingSet, None),
            Err(Error::EmptyTrainingSet)
        ));
    }

    #[test]
    fn test_no_state_variables() {
        let spec = ProgramSpec::new(vec![], Expr::tt(), Expr::ff(), Expr::tt(), Expr::tt());
        assert!(matches!(
            Verifier::with_defaults(small()).verify(&spec),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unroll_limit() {
        // while (true) x += 1
        let spec = counter(Expr::tt(), Expr::tt(), Expr::tt());
        let config = Config {
            unroll_limit: 10,
            ..small()
        };
        let report = Verifier::with_defaults(config).verify(&spec).unwrap();
        assert!(matches!(
            report.verdict,
            Verdict::Inconclusive(Reason::Unroll { limit: 10, .. })
        ));
    }

    #[test]
    fn test_invalid_config() {
        let x1 = Expr::ssa("x", 1);
        let spec = counter(x1.clone().ge(0), x1.lt(0), Expr::ssa("x", 2).ge(0));
        let config = Config {
            sample_low: 5,
            sample_high: 5,
            ..small()
        };
        assert!(matches!(
            Verifier::with_defaults(config).verify(&spec),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_repeatable() {
        let x1 = Expr::ssa("x", 1);
        let spec = counter(x1.clone().ge(0), x1.lt(0), Expr::ssa("x", 2).ge(0));
        let mut verifier = Verifier::with_defaults(small());
        let first = verifier.verify(&spec).unwrap();
        let second = verifier.verify(&spec).unwrap();
        assert_eq!(first.verdict, second.verdict);
        assert_eq!(first.stats.classified, second.stats.classified);
        assert_eq!(first.stats.solver_queries, second.stats.solver_queries);
    }
}
