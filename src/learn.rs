//! Candidate invariants from labelled samples.
//!
//! The conjunctive learner separates the positive samples from the negative ones by a
//! conjunction of half-spaces. It repeatedly picks a random negative sample that is not yet
//! excluded, trains a separator on all positives against that single negative, and keeps the
//! resulting half-space. Every negative the new separator already labels negative is dropped
//! from the working set, so each round shrinks it by at least one point.
//!
//! The disjunctive learner first splits the state space by the path predicates of the program
//! (and optionally by the loop condition), runs the conjunctive learner inside every partition,
//! and joins the guarded results by disjunction.

use std::time::Instant;

use log::debug;
use rand::Rng;

use crate::error::{Error, Result};
use crate::expr::{Expr, Var};
use crate::geometry::{Halfspace, Point};
use crate::program::{ProgramSpec, Stage};
use crate::samples::SampleSet;
use crate::solver::{Session, Solver};
use crate::svm::{Label, LinearSeparator};

/// Outcome of one learning step.
#[derive(Debug, Clone, PartialEq)]
pub enum Learned {
    /// A counterexample was sampled; no invariant exists.
    Disproved,
    Candidate {
        /// Formula over the unindexed program variables.
        invariant: Expr,
        /// Every half-space used in `invariant`, in training order.
        halfspaces: Vec<Halfspace>,
    },
}

pub struct Learner<L> {
    separator: L,
    multiplier: f64,
    trainings: usize,
    deadline: Option<Instant>,
}

impl<L: LinearSeparator> Learner<L> {
    /// `multiplier` scales separator weights before they are rounded to integers.
    pub fn new(separator: L, multiplier: f64) -> Self {
        Self {
            separator,
            multiplier,
            trainings: 0,
            deadline: None,
        }
    }

    /// Makes every later training fail with [`Error::Deadline`] once `deadline` has passed.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Number of separator trainings so far.
    pub fn trainings(&self) -> usize {
        self.trainings
    }

    /// A conjunction of half-spaces over `vars` containing the positive samples and excluding
    /// the negative ones.
    ///
    /// Without negative samples the candidate is `true`. Negative samples without any positive
    /// one give `false`.
    pub fn conjunctive(
        &mut self,
        rng: &mut impl Rng,
        samples: &SampleSet,
        vars: &[Var],
    ) -> Result<Learned> {
        if !samples.counterexamples().is_empty() {
            return Ok(Learned::Disproved);
        }
        let (invariant, halfspaces) =
            self.separate(rng, samples.positives(), samples.negatives(), vars)?;
        Ok(Learned::Candidate {
            invariant,
            halfspaces,
        })
    }

    /// The disjunction, over all path partitions, of the conjunctive candidate learned inside
    /// the partition and the partition guard.
    ///
    /// A partition without positive or without negative samples contributes its guard alone.
    pub fn disjunctive<S: Solver>(
        &mut self,
        rng: &mut impl Rng,
        session: &mut Session<S>,
        samples: &SampleSet,
        spec: &ProgramSpec,
        split_on_cond: bool,
    ) -> Result<Learned> {
        if !samples.counterexamples().is_empty() {
            return Ok(Learned::Disproved);
        }

        let guards = partitions(spec, split_on_cond);
        let positives = file(session, spec, &guards, samples.positives())?;
        let negatives = file(session, spec, &guards, samples.negatives())?;

        let vars = spec.invariant_vars();
        let mut disjuncts = Vec::with_capacity(guards.len());
        let mut halfspaces = Vec::new();
        for ((guard, pos), neg) in guards.iter().zip(&positives).zip(&negatives) {
            debug!(
                "disjunctive: partition {} has {} positive and {} negative samples",
                guard,
                pos.len(),
                neg.len()
            );
            let part = if pos.is_empty() || neg.is_empty() {
                Expr::tt()
            } else {
                let (part, hs) = self.separate(rng, pos, neg, &vars)?;
                halfspaces.extend(hs);
                part
            };
            disjuncts.push(Expr::and([part, spec.from_pre(guard)]));
        }

        Ok(Learned::Candidate {
            invariant: Expr::or(disjuncts),
            halfspaces,
        })
    }

    fn separate(
        &mut self,
        rng: &mut impl Rng,
        positives: &[Point],
        negatives: &[Point],
        vars: &[Var],
    ) -> Result<(Expr, Vec<Halfspace>)> {
        debug!(
            "separate(positives = {}, negatives = {})",
            positives.len(),
            negatives.len()
        );
        if negatives.is_empty() {
            return Ok((Expr::tt(), Vec::new()));
        }
        if positives.is_empty() {
            return Ok((Expr::ff(), Vec::new()));
        }

        let mut training: Vec<(Point, Label)> =
            positives.iter().map(|p| (p.clone(), Label::Positive)).collect();
        let mut working = negatives.to_vec();
        let mut halfspaces = Vec::new();

        while !working.is_empty() {
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                debug!("separate: deadline passed after {} half-spaces", halfspaces.len());
                return Err(Error::Deadline);
            }
            let picked = working.swap_remove(rng.random_range(0..working.len()));
            training.push((picked, Label::Negative));
            let model = self.separator.train(&training)?;
            self.trainings += 1;
            training.pop();

            let h = Halfspace::from_model(&model.weights, model.bias, self.multiplier);
            debug!("separate: {} from {}", h, model);
            let before = working.len();
            working.retain(|p| model.predict(p) == Label::Positive);
            debug!(
                "separate: excluded {} more, {} left",
                before - working.len(),
                working.len()
            );
            halfspaces.push(h);
        }

        let invariant = Expr::and(halfspaces.iter().map(|h| h.to_expr(vars)));
        Ok((invariant, halfspaces))
    }
}

/// Guards of the path partitions, over the pre-state.
///
/// With `k` predicates (the loop condition first when `split_on_cond` is set, then the path
/// predicates of `spec`) there are `2^k` guards. Bit `i` of the partition index selects
/// predicate `i` or its negation, so the guards are mutually exclusive and jointly exhaustive.
pub fn partitions(spec: &ProgramSpec, split_on_cond: bool) -> Vec<Expr> {
    let mut predicates = Vec::new();
    if split_on_cond {
        predicates.push(spec.cond().clone());
    }
    predicates.extend(spec.paths().iter().cloned());

    let k = predicates.len();
    assert!(k < usize::BITS as usize, "Too many path predicates");
    (0..1usize << k)
        .map(|mask| {
            Expr::and(predicates.iter().enumerate().map(|(i, p)| {
                if mask & (1 << i) != 0 {
                    p.clone()
                } else {
                    !p.clone()
                }
            }))
        })
        .collect()
}

/// Files every point under each guard satisfiable at it.
fn file<S: Solver>(
    session: &mut Session<S>,
    spec: &ProgramSpec,
    guards: &[Expr],
    points: &[Point],
) -> Result<Vec<Vec<Point>>> {
    let mut filed = vec![Vec::new(); guards.len()];
    for point in points {
        let state = spec.state(point, Stage::Pre)?;
        let mut matched = false;
        for (guard, bucket) in guards.iter().zip(filed.iter_mut()) {
            if session.is_sat(&Expr::and([guard.clone(), state.clone()]))? {
                bucket.push(point.clone());
                matched = true;
            }
        }
        if !matched {
            return Err(Error::PartitionGap {
                point: point.clone(),
                partitions: guards.len(),
            });
        }
    }
    Ok(filed)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    use super::*;
    use crate::classify::Classification;
    use crate::programs::example1;
    use crate::solver::LiaSolver;
    use crate::svm::Svm;

    fn vars() -> Vec<Var> {
        vec![Var::new("x"), Var::new("y")]
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn learner() -> Learner<Svm> {
        Learner::new(Svm::default(), 10.0)
    }

    fn candidate(learned: Learned) -> (Expr, Vec<Halfspace>) {
        match learned {
            Learned::Candidate {
                invariant,
                halfspaces,
            } => (invariant, halfspaces),
            Learned::Disproved => panic!("unexpected disproval"),
        }
    }

    #[test]
    fn test_counterexample_disproves() {
        let mut samples = SampleSet::new();
        samples.add(Classification::Positive, Point::from([1, 2]));
        samples.add(Classification::Counterexample, Point::from([0, 0]));
        let learned = learner().conjunctive(&mut rng(), &samples, &vars()).unwrap();
        assert_eq!(learned, Learned::Disproved);
    }

    #[test]
    fn test_trivial_candidates() {
        let mut samples = SampleSet::new();
        samples.add(Classification::Positive, Point::from([1, 2]));
        let mut l = learner();
        let (inv, hs) = candidate(l.conjunctive(&mut rng(), &samples, &vars()).unwrap());
        assert!(inv.simplify().is_true());
        assert!(hs.is_empty());

        let mut samples = SampleSet::new();
        samples.add(Classification::Negative, Point::from([1, 2]));
        let (inv, hs) = candidate(l.conjunctive(&mut rng(), &samples, &vars()).unwrap());
        assert!(inv.is_false());
        assert!(hs.is_empty());
        assert_eq!(l.trainings(), 0);
    }

    #[test]
    fn test_single_cut() {
        let mut samples = SampleSet::new();
        for y in -3..=3 {
            for x in 3..=6 {
                samples.add(Classification::Positive, Point::from([x, y]));
                samples.add(Classification::Negative, Point::from([-x, y]));
            }
        }
        let mut l = learner();
        let (inv, hs) = candidate(l.conjunctive(&mut rng(), &samples, &vars()).unwrap());
        println!("invariant = {}", inv);
        assert_eq!(l.trainings(), 1);
        assert_eq!(hs.len(), 1);
        for p in samples.positives() {
            assert!(hs[0].contains(p), "positive {} excluded", p);
        }
        for p in samples.negatives() {
            assert!(!hs[0].contains(p), "negative {} included", p);
        }
    }

    #[test]
    fn test_box_needs_several_cuts() {
        let mut samples = SampleSet::new();
        for x in -2..=2 {
            for y in -2..=2 {
                samples.add(Classification::Positive, Point::from([x, y]));
            }
        }
        for p in [[8, 0], [-8, 0], [0, 8], [0, -8]] {
            samples.add(Classification::Negative, Point::from(p));
        }
        let mut l = learner();
        let (inv, hs) = candidate(l.conjunctive(&mut rng(), &samples, &vars()).unwrap());
        println!("invariant = {}", inv);
        assert!(l.trainings() <= samples.negatives().len());
        assert_eq!(hs.len(), l.trainings());
        for p in samples.positives() {
            assert!(hs.iter().all(|h| h.contains(p)), "positive {} excluded", p);
        }
        for p in samples.negatives() {
            assert!(hs.iter().any(|h| !h.contains(p)), "negative {} included", p);
        }
    }

    #[test]
    fn test_deadline_stops_training() {
        let mut samples = SampleSet::new();
        samples.add(Classification::Positive, Point::from([1, 1]));
        samples.add(Classification::Negative, Point::from([-5, -5]));
        let mut l = learner();
        l.set_deadline(Some(Instant::now()));
        assert!(matches!(
            l.conjunctive(&mut rng(), &samples, &vars()),
            Err(Error::Deadline)
        ));
        assert_eq!(l.trainings(), 0);

        l.set_deadline(None);
        let (_, hs) = candidate(l.conjunctive(&mut rng(), &samples, &vars()).unwrap());
        assert_eq!(hs.len(), 1);
    }

    #[test]
    fn test_partitions() {
        let spec = example1();
        let guards = partitions(&spec, false);
        assert_eq!(guards.len(), 4);
        assert_eq!(guards[0].to_string(), "(!x@1 < 0 && !y@1 < 0)");
        assert_eq!(guards[3].to_string(), "(x@1 < 0 && y@1 < 0)");
        assert_eq!(partitions(&spec, true).len(), 8);
    }

    #[test]
    fn test_partitions_cover_samples() {
        let spec = example1();
        let guards = partitions(&spec, true);
        let mut session = Session::new(LiaSolver::new(), 20_000, 3, 4);
        let points: Vec<Point> = (-3..=3)
            .flat_map(|x| (-3..=3).map(move |y| Point::from([x, y])))
            .collect();
        let filed = file(&mut session, &spec, &guards, &points).unwrap();
        assert_eq!(filed.iter().map(Vec::len).sum::<usize>(), points.len());
        // x = -1, y = 2 is inside the loop, x < 0 and y >= 0: bits 0 and 1
        assert!(filed[0b011].contains(&Point::from([-1, 2])));
    }

    #[test]
    fn test_disjunctive_shape() {
        let spec = example1();
        let mut samples = SampleSet::new();
        samples.add(Classification::Positive, Point::from([1, 2]));
        samples.add(Classification::Positive, Point::from([-5, 3]));
        samples.add(Classification::Negative, Point::from([20, 0]));
        samples.add(Classification::Negative, Point::from([-2, -20]));

        let mut session = Session::new(LiaSolver::new(), 20_000, 3, 4);
        let mut l = learner();
        let learned = l
            .disjunctive(&mut rng(), &mut session, &samples, &spec, false)
            .unwrap();
        let (inv, hs) = candidate(learned);
        println!("invariant = {}", inv);
        let Expr::Or(disjuncts) = &inv else {
            panic!("expected a disjunction, got {}", inv);
        };
        assert_eq!(disjuncts.len(), 4);
        // Only the partition x >= 0, y >= 0 holds both labels.
        assert_eq!(l.trainings(), 1);
        assert_eq!(hs.len(), 1);
        assert!(inv.vars().iter().all(|v| v.index().is_none()));
    }
}
