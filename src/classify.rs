//! Labelling sample states by simulating the loop.
//!
//! A start state is run through the loop with solver queries only: the loop condition is
//! checked, a successor is read off a model of the body, and the process repeats until the
//! condition fails. Whether the start satisfies `pre` and the exit state satisfies `post`
//! then decides the label.

use std::fmt::{Display, Formatter};

use log::debug;

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::geometry::Point;
use crate::program::{ProgramSpec, Stage};
use crate::solver::{Pick, Session, Solver};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Classification {
    /// Starts in `pre` and exits violating `post`: the program is wrong.
    Counterexample,
    /// Starts in `pre` and exits satisfying `post`.
    Positive,
    /// Starts outside `pre` and exits violating `post`.
    Negative,
    /// Any other combination.
    Undetermined,
    /// Not classified yet.
    Unknown,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::Counterexample,
        Classification::Positive,
        Classification::Negative,
        Classification::Undetermined,
        Classification::Unknown,
    ];

    /// Decision table over the start and exit facts.
    pub fn from_flags(in_pre: bool, in_cond: bool, in_post: bool) -> Self {
        match (in_pre, in_cond, in_post) {
            (true, false, false) => Classification::Counterexample,
            (true, false, true) => Classification::Positive,
            (false, false, false) => Classification::Negative,
            _ => Classification::Undetermined,
        }
    }
}

impl Display for Classification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Classification::Counterexample => "counterexample",
            Classification::Positive => "positive",
            Classification::Negative => "negative",
            Classification::Undetermined => "undetermined",
            Classification::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Label of `start` together with every state the loop visits from it, `start` first.
///
/// A state inside the loop condition for which the body has no successor ends the run early,
/// and the start is then undetermined. Running more than `unroll_limit` iterations is
/// [`Error::UnrollLimit`].
pub fn classify<S: Solver>(
    session: &mut Session<S>,
    spec: &ProgramSpec,
    start: &Point,
    unroll_limit: usize,
) -> Result<(Classification, Vec<Point>)> {
    debug!("classify(start = {})", start);

    let in_pre = session.is_sat(&Expr::and([
        spec.pre().clone(),
        spec.state(start, Stage::Pre)?,
    ]))?;

    let mut trace = vec![start.clone()];
    let mut in_cond = false;
    let mut iterations = 0;
    loop {
        let current = spec.state(&trace[trace.len() - 1], Stage::Pre)?;
        if !session.is_sat(&Expr::and([spec.cond().clone(), current.clone()]))? {
            break;
        }
        if iterations >= unroll_limit {
            return Err(Error::UnrollLimit {
                start: start.clone(),
                limit: unroll_limit,
            });
        }
        iterations += 1;

        let Some(model) = session.model(&Expr::and([spec.body().clone(), current]))? else {
            debug!("classify: loop is stuck after {} iterations", iterations - 1);
            in_cond = true;
            break;
        };
        trace.push(model.project(spec.names(), Pick::Highest));
    }

    let last = &trace[trace.len() - 1];
    let in_post = session.is_sat(&Expr::and([
        spec.post().clone(),
        spec.state(last, Stage::Post)?,
    ]))?;

    let class = Classification::from_flags(in_pre, in_cond, in_post);
    debug!(
        "classify: {} is {} (pre = {}, post = {}, {} steps)",
        start,
        class,
        in_pre,
        in_post,
        trace.len() - 1
    );
    Ok((class, trace))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::StateVar;
    use crate::programs::example1;
    use crate::solver::LiaSolver;

    fn session() -> Session<LiaSolver> {
        Session::new(LiaSolver::new(), 20_000, 3, 4)
    }

    #[test]
    fn test_decision_table() {
        use Classification::*;
        assert_eq!(Classification::from_flags(true, false, false), Counterexample);
        assert_eq!(Classification::from_flags(true, false, true), Positive);
        assert_eq!(Classification::from_flags(false, false, false), Negative);
        assert_eq!(Classification::from_flags(false, false, true), Undetermined);
        for in_post in [false, true] {
            for in_pre in [false, true] {
                assert_eq!(Classification::from_flags(in_pre, true, in_post), Undetermined);
            }
        }
    }

    #[test]
    fn test_example1_positive() {
        let spec = example1();
        let (class, trace) = classify(&mut session(), &spec, &Point::from([1, 2]), 100).unwrap();
        assert_eq!(class, Classification::Positive);
        assert_eq!(trace, vec![Point::from([1, 2]), Point::from([11, 5])]);

        let (class, trace) = classify(&mut session(), &spec, &Point::from([-5, 3]), 100).unwrap();
        assert_eq!(class, Classification::Positive);
        assert_eq!(
            trace,
            vec![Point::from([-5, 3]), Point::from([2, 6]), Point::from([12, 9])]
        );
    }

    #[test]
    fn test_example1_negative_and_undetermined() {
        let spec = example1();
        // Outside pre, loop not entered, 20 > 0 + 16.
        let (class, trace) = classify(&mut session(), &spec, &Point::from([20, 0]), 100).unwrap();
        assert_eq!(class, Classification::Negative);
        assert_eq!(trace.len(), 1);

        // Outside pre, loop not entered, but post holds.
        let (class, _) = classify(&mut session(), &spec, &Point::from([5, 5]), 100).unwrap();
        assert_eq!(class, Classification::Undetermined);
    }

    #[test]
    fn test_counterexample() {
        // x >= 0; while (x < 10) x += 1; assert(x > 100)
        let x1 = Expr::ssa("x", 1);
        let x2 = Expr::ssa("x", 2);
        let spec = ProgramSpec::new(
            vec![StateVar::new("x", 1, 2)],
            x1.clone().ge(0),
            x1.clone().lt(10),
            x2.clone().equals(x1 + 1),
            x2.gt(100),
        );
        let (class, trace) = classify(&mut session(), &spec, &Point::from([7]), 100).unwrap();
        assert_eq!(class, Classification::Counterexample);
        assert_eq!(trace.last(), Some(&Point::from([10])));
    }

    #[test]
    fn test_unroll_limit() {
        // while (x >= 0) x += 1 never exits from x = 0
        let x1 = Expr::ssa("x", 1);
        let x2 = Expr::ssa("x", 2);
        let spec = ProgramSpec::new(
            vec![StateVar::new("x", 1, 2)],
            Expr::tt(),
            x1.clone().ge(0),
            x2.clone().equals(x1 + 1),
            x2.ge(0),
        );
        let err = classify(&mut session(), &spec, &Point::from([0]), 5).unwrap_err();
        assert!(matches!(err, Error::UnrollLimit { limit: 5, .. }));
    }

    #[test]
    fn test_stuck_loop() {
        // The body has no successor for x = 3.
        let x1 = Expr::ssa("x", 1);
        let x2 = Expr::ssa("x", 2);
        let spec = ProgramSpec::new(
            vec![StateVar::new("x", 1, 2)],
            Expr::tt(),
            x1.clone().lt(5),
            x2.clone().equals(x1.clone() + 1) & x1.distinct(3),
            x2.ge(0),
        );
        let (class, trace) = classify(&mut session(), &spec, &Point::from([1]), 100).unwrap();
        assert_eq!(class, Classification::Undetermined);
        assert_eq!(trace.last(), Some(&Point::from([3])));
    }
}
