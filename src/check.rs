//! Inductive invariant checking.
//!
//! A formula `inv` over the unindexed program variables is a loop invariant that proves the
//! postcondition when the three queries below are all unsatisfiable:
//!
//! | Check       | Query                                           |
//! |-------------|-------------------------------------------------|
//! | Initiation  | `pre ∧ ¬inv@pre`                                |
//! | Consecution | `cond ∧ body ∧ inv@pre ∧ ¬inv@post`             |
//! | Exit        | `inv@post ∧ ¬cond[pre → post] ∧ ¬post`          |
//!
//! They are issued in this order and the first satisfiable one is reported along with a
//! witness state read from its model.

use std::fmt::{Display, Formatter};

use log::debug;

use crate::error::Result;
use crate::expr::Expr;
use crate::geometry::Point;
use crate::program::ProgramSpec;
use crate::solver::{Pick, Session, Solver};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Check {
    Initiation,
    Consecution,
    Exit,
}

impl Display for Check {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Check::Initiation => write!(f, "initiation"),
            Check::Consecution => write!(f, "consecution"),
            Check::Exit => write!(f, "exit"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Validity {
    Valid,
    Invalid {
        check: Check,
        /// Lowest SSA copy of every program variable in the violating model.
        witness: Point,
    },
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// The three verification conditions of `invariant`, in checking order.
pub fn conditions(spec: &ProgramSpec, invariant: &Expr) -> [(Check, Expr); 3] {
    let inv_pre = spec.to_pre(invariant);
    let inv_post = spec.to_post(invariant);
    [
        (
            Check::Initiation,
            Expr::and([spec.pre().clone(), !inv_pre.clone()]),
        ),
        (
            Check::Consecution,
            Expr::and([
                spec.cond().clone(),
                spec.body().clone(),
                inv_pre,
                !inv_post.clone(),
            ]),
        ),
        (
            Check::Exit,
            Expr::and([
                inv_post,
                !spec.pre_to_post(spec.cond()),
                !spec.post().clone(),
            ]),
        ),
    ]
}

/// Checks whether `invariant` proves the loop correct.
pub fn check_invariant<S: Solver>(
    session: &mut Session<S>,
    spec: &ProgramSpec,
    invariant: &Expr,
) -> Result<Validity> {
    debug!("check_invariant(invariant = {})", invariant);
    for (check, query) in conditions(spec, invariant) {
        if let Some(model) = session.model(&query)? {
            let witness = model.project(spec.names(), Pick::Lowest);
            debug!("check_invariant: {} fails at {} ({})", check, witness, model);
            return Ok(Validity::Invalid { check, witness });
        }
    }
    Ok(Validity::Valid)
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

    fn x() -> Expr {
        Expr::var("x")
    }

    fn y() -> Expr {
        Expr::var("y")
    }

    #[test]
    fn test_example1_valid() {
        let spec = example1();
        let inv = x().le(y() + 16);
        assert_eq!(
            check_invariant(&mut session(), &spec, &inv).unwrap(),
            Validity::Valid
        );
    }

    #[test]
    fn test_example1_consecution_fails() {
        let spec = example1();
        let inv = x().le(y() + 15);
        let res = check_invariant(&mut session(), &spec, &inv).unwrap();
        println!("{:?}", res);
        let Validity::Invalid { check, witness } = res else {
            panic!("expected a violation");
        };
        assert_eq!(check, Check::Consecution);
        // Only x < 0 and y < 0 gains 17 on x - y per step, from x - y = -1 to 16.
        let (wx, wy) = (witness.coords()[0], witness.coords()[1]);
        assert_eq!(wx - wy, -1);
        assert!(wx < 0 && wy < 0);
    }

    #[test]
    fn test_example1_initiation_fails() {
        let spec = example1();
        let res = check_invariant(&mut session(), &spec, &x().ge(0)).unwrap();
        let Validity::Invalid { check, witness } = res else {
            panic!("expected a violation");
        };
        assert_eq!(check, Check::Initiation);
        assert!(witness.coords()[0] < 0);
        assert!(witness.coords()[0] < witness.coords()[1]);
    }

    #[test]
    fn test_example1_exit_fails() {
        let spec = example1();
        let res = check_invariant(&mut session(), &spec, &Expr::tt()).unwrap();
        let Validity::Invalid { check, .. } = res else {
            panic!("expected a violation");
        };
        assert_eq!(check, Check::Exit);
    }

    #[test]
    fn test_witness_defaults_missing_vars() {
        // The invariant and the loop never mention y.
        let x1 = Expr::ssa("x", 1);
        let x2 = Expr::ssa("x", 2);
        let spec = ProgramSpec::new(
            vec![StateVar::new("x", 1, 2), StateVar::new("y", 1, 2)],
            x1.clone().equals(5),
            x1.clone().lt(0),
            x2.clone().equals(x1),
            x2.ge(0),
        );
        let res = check_invariant(&mut session(), &spec, &x().lt(0)).unwrap();
        assert_eq!(
            res,
            Validity::Invalid {
                check: Check::Initiation,
                witness: Point::from([5, 0]),
            }
        );
    }
}
