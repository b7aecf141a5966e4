//! Satisfiability of linear integer formulas.
//!
//! The [`Solver`] trait is the seam between the learning loop and whatever decides the
//! queries. [`LiaSolver`] is the built-in decision procedure: the formula is put into negation
//! normal form, disjunctions are explored depth-first, every partial conjunction is pruned by an
//! exact rational simplex, and the leaves are finished by branch and bound. With the `z3`
//! feature, `Z3Solver` hands the queries to Z3 instead and becomes the [`DefaultSolver`].
//!
//! A solver may give up: each query carries a step budget, and running out of it yields
//! [`SatResult::Unknown`]. A [`Session`] retries such queries with a growing budget before
//! reporting [`Error::SolverUnknown`].

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use log::{debug, warn};
use num_traits::ToPrimitive;

use crate::error::{Error, Result};
use crate::expr::{BinaryOp, Expr, UnaryOp, Var};
use crate::geometry::Point;
use crate::linear::{to_nnf, Constraint, LinExpr, Nnf};
use crate::simplex::Simplex;

/// Integer assignment to indexed and unindexed variables.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Model(BTreeMap<Var, i64>);

/// Which SSA copy [`Model::project`] reads.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Pick {
    /// The smallest index present, i.e. the pre-state.
    Lowest,
    /// The largest index present, i.e. the post-state.
    Highest,
}

impl Model {
    pub fn new(values: BTreeMap<Var, i64>) -> Self {
        Self(values)
    }

    pub fn get(&self, var: &Var) -> Option<i64> {
        self.0.get(var).copied()
    }

    /// Value of `var`, where variables absent from the model read as zero.
    pub fn value(&self, var: &Var) -> i64 {
        self.get(var).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Var, &i64)> {
        self.0.iter()
    }

    /// Reads one coordinate per name.
    ///
    /// Among the copies of a name the model mentions, the one with the lowest (or highest)
    /// index is taken. A name with no copy at all reads as zero.
    pub fn project(&self, names: &[String], pick: Pick) -> Point {
        let coords = names
            .iter()
            .map(|name| {
                let mut copies = self.0.iter().filter(|(v, _)| v.name() == name);
                let found = match pick {
                    Pick::Lowest => copies.next(),
                    Pick::Highest => copies.next_back(),
                };
                found.map_or(0, |(_, &value)| value)
            })
            .collect();
        Point::new(coords)
    }

    /// Evaluates an integer term.
    pub fn eval_int(&self, term: &Expr) -> Result<i64> {
        let overflow = || Error::Overflow("evaluating a term");
        match term {
            Expr::Int(n) => Ok(*n),
            Expr::Var(v) => Ok(self.value(v)),
            Expr::Unary(UnaryOp::Neg, a) => self.eval_int(a)?.checked_neg().ok_or_else(overflow),
            Expr::Binary(op @ (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul), a, b) => {
                let (a, b) = (self.eval_int(a)?, self.eval_int(b)?);
                let res = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                res.ok_or_else(overflow)
            }
            Expr::Ite(c, t, e) => {
                if self.eval_bool(c)? {
                    self.eval_int(t)
                } else {
                    self.eval_int(e)
                }
            }
            _ => Err(Error::Sort {
                expected: "an integer term",
                found: term.to_string(),
            }),
        }
    }

    /// Evaluates a formula.
    pub fn eval_bool(&self, formula: &Expr) -> Result<bool> {
        match formula {
            Expr::Bool(b) => Ok(*b),
            Expr::Unary(UnaryOp::Not, a) => Ok(!self.eval_bool(a)?),
            Expr::Binary(BinaryOp::Implies, a, b) => Ok(!self.eval_bool(a)? || self.eval_bool(b)?),
            Expr::Cmp(op, a, b) => Ok(op.holds(self.eval_int(a)?, self.eval_int(b)?)),
            Expr::And(args) => {
                for a in args {
                    if !self.eval_bool(a)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Or(args) => {
                for a in args {
                    if self.eval_bool(a)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Ite(c, t, e) => {
                if self.eval_bool(c)? {
                    self.eval_bool(t)
                } else {
                    self.eval_bool(e)
                }
            }
            _ => Err(Error::Sort {
                expected: "a formula",
                found: formula.to_string(),
            }),
        }
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (v, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", v, value)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SatResult {
    Sat(Model),
    Unsat,
    /// The step budget ran out before a decision.
    Unknown,
}

/// A decision procedure for quantifier-free linear integer arithmetic.
pub trait Solver {
    /// Decides `formula`, spending at most `budget` steps.
    fn check(&mut self, formula: &Expr, budget: u64) -> Result<SatResult>;
}

/// Depth-first search over disjunctions with simplex pruning and branch and bound.
#[derive(Debug, Default)]
pub struct LiaSolver {
    steps: u64,
    budget: u64,
    exhausted: bool,
}

/// A partial conjunction on the search stack.
#[derive(Debug, Clone)]
struct Branch {
    constraints: Vec<Constraint>,
    pending: Vec<Nnf>,
    choices: Vec<Vec<Nnf>>,
}

impl LiaSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// One simplex solve. Returns `None` once the budget is spent.
    fn feasible(&mut self, constraints: &[Constraint]) -> Option<Simplex> {
        if self.steps >= self.budget {
            self.exhausted = true;
            return None;
        }
        self.steps += 1;
        let mut simplex = Simplex::new(constraints);
        if simplex.check() {
            Some(simplex)
        } else {
            None
        }
    }

    /// Integer point of a conjunction, by branch and bound. `Ok(None)` means either no integer
    /// point or an exhausted budget; the caller tells them apart by `self.exhausted`.
    fn integer_point(&mut self, constraints: &[Constraint]) -> Result<Option<Vec<(Var, i64)>>> {
        let mut stack: Vec<Vec<Constraint>> = vec![constraints.to_vec()];
        while let Some(current) = stack.pop() {
            let Some(simplex) = self.feasible(&current) else {
                if self.exhausted {
                    return Ok(None);
                }
                continue;
            };
            let Some((var, value)) = simplex.fractional() else {
                return simplex.integer_values().map(Some);
            };
            let floor = value
                .floor()
                .to_integer()
                .to_i64()
                .ok_or(Error::Overflow("branching"))?;
            debug!("integer_point: branching on {} = {}", var, value);

            let x = LinExpr::var(var.clone());
            // x >= floor + 1
            let mut up = current.clone();
            up.push(Constraint::nonneg(x.shift(-floor)?.shift(-1)?));
            // x <= floor
            let mut down = current;
            down.push(Constraint::nonneg(x.scale(-1)?.shift(floor)?));
            stack.push(up);
            stack.push(down);
        }
        Ok(None)
    }

    fn search(&mut self, root: Nnf) -> Result<Option<Vec<(Var, i64)>>> {
        let mut stack = vec![Branch {
            constraints: Vec::new(),
            pending: vec![root],
            choices: Vec::new(),
        }];

        'branches: while let Some(mut branch) = stack.pop() {
            if self.exhausted {
                return Ok(None);
            }

            while let Some(item) = branch.pending.pop() {
                match item {
                    Nnf::True => {}
                    Nnf::False => continue 'branches,
                    Nnf::Atom(c) => {
                        branch.constraints.push(c);
                        if self.feasible(&branch.constraints).is_none() {
                            continue 'branches;
                        }
                    }
                    Nnf::And(args) => branch.pending.extend(args),
                    Nnf::Or(args) => branch.choices.push(args),
                }
            }

            match branch.choices.pop() {
                Some(alternatives) => {
                    // Pushed in reverse so the first alternative is explored first.
                    for alt in alternatives.into_iter().rev() {
                        let mut next = branch.clone();
                        next.pending.push(alt);
                        stack.push(next);
                    }
                }
                None => {
                    if let Some(values) = self.integer_point(&branch.constraints)? {
                        return Ok(Some(values));
                    }
                }
            }
        }
        Ok(None)
    }
}

impl Solver for LiaSolver {
    fn check(&mut self, formula: &Expr, budget: u64) -> Result<SatResult> {
        debug!("check(formula = {}, budget = {})", formula, budget);
        self.steps = 0;
        self.budget = budget;
        self.exhausted = false;

        let nnf = to_nnf(formula, true)?;
        let found = self.search(nnf)?;
        debug!("check: {} steps", self.steps);

        match found {
            Some(values) => {
                let mut model: BTreeMap<Var, i64> =
                    formula.vars().into_iter().map(|v| (v, 0)).collect();
                model.extend(values);
                Ok(SatResult::Sat(Model(model)))
            }
            None if self.exhausted => Ok(SatResult::Unknown),
            None => Ok(SatResult::Unsat),
        }
    }
}

/// A solver together with its budget policy.
///
/// Every query starts with `budget` steps. An unknown answer is retried up to `retries` more
/// times, multiplying the budget by `growth` each time.
#[derive(Debug)]
pub struct Session<S> {
    solver: S,
    budget: u64,
    retries: usize,
    growth: u64,
    queries: usize,
}

impl<S: Solver> Session<S> {
    pub fn new(solver: S, budget: u64, retries: usize, growth: u64) -> Self {
        Self {
            solver,
            budget,
            retries,
            growth,
            queries: 0,
        }
    }

    /// A model of `formula`, or `None` if it is unsatisfiable.
    pub fn model(&mut self, formula: &Expr) -> Result<Option<Model>> {
        self.queries += 1;
        let mut budget = self.budget;
        for attempt in 0..=self.retries {
            match self.solver.check(formula, budget)? {
                SatResult::Sat(model) => return Ok(Some(model)),
                SatResult::Unsat => return Ok(None),
                SatResult::Unknown => {
                    warn!(
                        "Solver gave up on attempt {} with budget {}",
                        attempt + 1,
                        budget
                    );
                    budget = budget.saturating_mul(self.growth);
                }
            }
        }
        Err(Error::SolverUnknown {
            attempts: self.retries + 1,
        })
    }

    pub fn is_sat(&mut self, formula: &Expr) -> Result<bool> {
        Ok(self.model(formula)?.is_some())
    }

    /// Number of queries issued so far.
    pub fn queries(&self) -> usize {
        self.queries
    }
}

/// The solver [`Verifier::with_defaults`][crate::verify::Verifier::with_defaults] uses.
#[cfg(feature = "z3")]
pub type DefaultSolver = z3_solver::Z3Solver;
/// The solver [`Verifier::with_defaults`][crate::verify::Verifier::with_defaults] uses.
#[cfg(not(feature = "z3"))]
pub type DefaultSolver = LiaSolver;

#[cfg(feature = "z3")]
pub use z3_solver::Z3Solver;

/// Z3 backend, available with `--features z3` (requires libz3).
#[cfg(feature = "z3")]
pub mod z3_solver {
    use std::collections::BTreeMap;

    use log::debug;
    use z3::ast::{Ast, Bool, Int};
    use z3::{Config, Context, Params};

    use super::{Model, SatResult, Solver};
    use crate::error::{Error, Result};
    use crate::expr::{BinaryOp, CmpOp, Expr, UnaryOp, Var};

    /// Decides every query in a fresh Z3 context. The budget is a timeout in milliseconds.
    #[derive(Debug, Default)]
    pub struct Z3Solver;

    impl Z3Solver {
        pub fn new() -> Self {
            Self
        }
    }

    /// Builds Z3 terms, declaring one integer constant per variable on first use.
    struct Translator<'ctx> {
        ctx: &'ctx Context,
        vars: BTreeMap<Var, Int<'ctx>>,
    }

    impl<'ctx> Translator<'ctx> {
        fn var(&mut self, var: &Var) -> Int<'ctx> {
            let ctx = self.ctx;
            self.vars
                .entry(var.clone())
                .or_insert_with(|| Int::new_const(ctx, var.to_string()))
                .clone()
        }

        fn int(&mut self, term: &Expr) -> Result<Int<'ctx>> {
            match term {
                Expr::Int(n) => Ok(Int::from_i64(self.ctx, *n)),
                Expr::Var(v) => Ok(self.var(v)),
                Expr::Unary(UnaryOp::Neg, a) => Ok(self.int(a)?.unary_minus()),
                Expr::Binary(op @ (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul), a, b) => {
                    let (a, b) = (self.int(a)?, self.int(b)?);
                    Ok(match op {
                        BinaryOp::Add => Int::add(self.ctx, &[&a, &b]),
                        BinaryOp::Sub => Int::sub(self.ctx, &[&a, &b]),
                        _ => Int::mul(self.ctx, &[&a, &b]),
                    })
                }
                Expr::Ite(c, t, e) => {
                    let c = self.bool(c)?;
                    let (t, e) = (self.int(t)?, self.int(e)?);
                    Ok(c.ite(&t, &e))
                }
                _ => Err(Error::Sort {
                    expected: "an integer term",
                    found: term.to_string(),
                }),
            }
        }

        fn bool(&mut self, formula: &Expr) -> Result<Bool<'ctx>> {
            match formula {
                Expr::Bool(b) => Ok(Bool::from_bool(self.ctx, *b)),
                Expr::Unary(UnaryOp::Not, a) => Ok(self.bool(a)?.not()),
                Expr::Binary(BinaryOp::Implies, a, b) => {
                    let (a, b) = (self.bool(a)?, self.bool(b)?);
                    Ok(a.implies(&b))
                }
                Expr::Cmp(op, a, b) => {
                    let (a, b) = (self.int(a)?, self.int(b)?);
                    Ok(match op {
                        CmpOp::Lt => a.lt(&b),
                        CmpOp::Le => a.le(&b),
                        CmpOp::Gt => a.gt(&b),
                        CmpOp::Ge => a.ge(&b),
                        CmpOp::Eq => a._eq(&b),
                        CmpOp::Ne => a._eq(&b).not(),
                    })
                }
                Expr::And(args) | Expr::Or(args) => {
                    let args = args
                        .iter()
                        .map(|a| self.bool(a))
                        .collect::<Result<Vec<_>>>()?;
                    let refs: Vec<&Bool<'ctx>> = args.iter().collect();
                    Ok(if matches!(formula, Expr::And(_)) {
                        Bool::and(self.ctx, &refs)
                    } else {
                        Bool::or(self.ctx, &refs)
                    })
                }
                Expr::Ite(c, t, e) => {
                    let c = self.bool(c)?;
                    let (t, e) = (self.bool(t)?, self.bool(e)?);
                    Ok(c.ite(&t, &e))
                }
                _ => Err(Error::Sort {
                    expected: "a formula",
                    found: formula.to_string(),
                }),
            }
        }
    }

    impl Solver for Z3Solver {
        fn check(&mut self, formula: &Expr, budget: u64) -> Result<SatResult> {
            let mut cfg = Config::new();
            cfg.set_model_generation(true);
            let ctx = Context::new(&cfg);

            let mut translator = Translator {
                ctx: &ctx,
                vars: BTreeMap::new(),
            };
            let query = translator.bool(formula)?;

            let mut params = Params::new(&ctx);
            params.set_u32("timeout", u32::try_from(budget).unwrap_or(u32::MAX));
            params.set_u32("smt.random_seed", 0);
            params.set_u32("sat.random_seed", 0);
            let solver = z3::Solver::new(&ctx);
            solver.set_params(&params);
            solver.assert(&query);

            let res = match solver.check() {
                z3::SatResult::Unsat => SatResult::Unsat,
                z3::SatResult::Unknown => SatResult::Unknown,
                z3::SatResult::Sat => match solver.get_model() {
                    Some(model) => {
                        let mut values = BTreeMap::new();
                        for (var, constant) in &translator.vars {
                            let value = model
                                .eval(constant, true)
                                .and_then(|v| v.as_i64())
                                .ok_or(Error::Overflow("reading a z3 model"))?;
                            values.insert(var.clone(), value);
                        }
                        SatResult::Sat(Model::new(values))
                    }
                    None => SatResult::Unknown,
                },
            };
            debug!("z3: {} -> {:?}", formula, res);
            Ok(res)
        }
    }

    #[cfg(test)]
    mod tests {
        use test_log::test;

        use super::*;
        use crate::check::{check_invariant, Validity};
        use crate::programs::example1;
        use crate::solver::Session;

        fn x() -> Expr {
            Expr::var("x")
        }

        fn y() -> Expr {
            Expr::var("y")
        }

        #[test]
        fn test_sat_model() {
            let f = Expr::and([x().gt(3), y().equals(x() * 2), x().lt(5)]);
            let SatResult::Sat(model) = Z3Solver::new().check(&f, 10_000).unwrap() else {
                panic!("expected sat");
            };
            println!("{}", model);
            assert_eq!(model.get(&Var::new("x")), Some(4));
            assert_eq!(model.get(&Var::new("y")), Some(8));
            assert!(model.eval_bool(&f).unwrap());
        }

        #[test]
        fn test_unsat() {
            let f = (x() * 2).equals(y() * 2 + 1);
            assert_eq!(Z3Solver::new().check(&f, 10_000).unwrap(), SatResult::Unsat);
        }

        #[test]
        fn test_ite_and_implies() {
            let f = Expr::and([
                Expr::ite(x().lt(0), -x(), x()).equals(7),
                Expr::implies(x().lt(0), y().equals(1)),
                Expr::implies(x().ge(0), y().equals(2)),
                y().equals(1),
            ]);
            let SatResult::Sat(model) = Z3Solver::new().check(&f, 10_000).unwrap() else {
                panic!("expected sat");
            };
            assert_eq!(model.get(&Var::new("x")), Some(-7));
        }

        #[test]
        fn test_sort_error() {
            assert!(matches!(
                Z3Solver::new().check(&x(), 10_000),
                Err(Error::Sort { .. })
            ));
        }

        #[test]
        fn test_example1_checks() {
            let mut session = Session::new(Z3Solver::new(), 20_000, 3, 4);
            let spec = example1();
            let valid = check_invariant(&mut session, &spec, &x().le(y() + 16)).unwrap();
            assert_eq!(valid, Validity::Valid);
            let invalid = check_invariant(&mut session, &spec, &x().le(y() + 15)).unwrap();
            assert!(!invalid.is_valid());
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn x() -> Expr {
        Expr::var("x")
    }

    fn y() -> Expr {
        Expr::var("y")
    }

    fn solve(formula: &Expr) -> SatResult {
        LiaSolver::new().check(formula, 10_000).unwrap()
    }

    fn model_of(formula: &Expr) -> Model {
        match solve(formula) {
            SatResult::Sat(m) => {
                println!("model of {} is {}", formula, m);
                assert!(m.eval_bool(formula).unwrap());
                m
            }
            other => panic!("expected sat, got {:?}", other),
        }
    }

    #[test]
    fn test_sat_simple() {
        let f = x().gt(3) & y().lt(x()) & y().ge(2);
        model_of(&f);
    }

    #[test]
    fn test_unsat_simple() {
        let f = x().lt(y()) & y().lt(x());
        assert_eq!(solve(&f), SatResult::Unsat);
    }

    #[test]
    fn test_integrality() {
        // 2 < 2x < 4 has no integer solution
        let f = (x() * 2).gt(2) & (x() * 2).lt(4);
        assert_eq!(solve(&f), SatResult::Unsat);

        // 3x + 3y == 2 is rationally feasible only
        let g = (x() * 3 + y() * 3).equals(2);
        assert_eq!(solve(&g), SatResult::Unsat);

        // 2x - 3y == 1 needs branch and bound
        let h = (x() * 2 - y() * 3).equals(1) & x().ge(0) & y().ge(0);
        model_of(&h);
    }

    #[test]
    fn test_disjunction() {
        let f = (x().lt(0) | x().gt(10)) & x().ge(-5) & x().le(5);
        let m = model_of(&f);
        assert!(m.value(&Var::new("x")) < 0);

        let g = (x().lt(0) | x().gt(10)) & x().ge(0) & x().le(10);
        assert_eq!(solve(&g), SatResult::Unsat);
    }

    #[test]
    fn test_ite_and_implies() {
        let x1 = Expr::ssa("x", 1);
        let x2 = Expr::ssa("x", 2);
        // x2 = ite(x1 < 0, x1 + 7, x1 + 10), x2 == 3
        let f = x2
            .clone()
            .equals(Expr::ite(x1.clone().lt(0), x1.clone() + 7, x1.clone() + 10))
            & x2.clone().equals(3);
        let m = model_of(&f);
        assert_eq!(m.get(&Var::indexed("x", 1)), Some(-4));

        let g = Expr::implies(x().gt(0), y().gt(0)) & x().equals(1) & y().le(0);
        assert_eq!(solve(&g), SatResult::Unsat);
    }

    #[test]
    fn test_model_covers_all_vars() {
        // z occurs only in a tautological comparison
        let f = x().ge(1) & (Expr::var("z") - Expr::var("z")).equals(0);
        let m = model_of(&f);
        assert_eq!(m.get(&Var::new("z")), Some(0));
    }

    #[test]
    fn test_budget_exhaustion() {
        let f = (x().lt(0) | x().gt(10)) & (y().lt(0) | y().gt(10)) & (x() + y()).equals(5);
        assert_eq!(LiaSolver::new().check(&f, 1).unwrap(), SatResult::Unknown);
        model_of(&f);
    }

    #[test]
    fn test_session_retries() {
        let f = (x().lt(0) | x().gt(10)) & (y().lt(0) | y().gt(10)) & (x() + y()).equals(5);
        let mut session = Session::new(LiaSolver::new(), 1, 0, 4);
        let err = session.model(&f).unwrap_err();
        assert!(matches!(err, Error::SolverUnknown { attempts: 1 }));

        let mut session = Session::new(LiaSolver::new(), 1, 8, 4);
        assert!(session.is_sat(&f).unwrap());
        assert_eq!(session.queries(), 1);
    }

    #[test]
    fn test_project() {
        let model = Model::new(BTreeMap::from([
            (Var::indexed("x", 1), 1),
            (Var::indexed("x", 2), 11),
            (Var::indexed("y", 1), 2),
            (Var::indexed("y", 2), 5),
        ]));
        let names = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        assert_eq!(model.project(&names, Pick::Lowest), Point::from([1, 2, 0]));
        assert_eq!(model.project(&names, Pick::Highest), Point::from([11, 5, 0]));
    }

    #[test]
    fn test_eval() {
        let model = Model::new(BTreeMap::from([(Var::new("x"), -3)]));
        let t = Expr::ite(x().lt(0), x() + 7, x() + 10);
        assert_eq!(model.eval_int(&t).unwrap(), 4);
        assert!(model.eval_bool(&(x().lt(y()))).unwrap());
        assert!(model.eval_int(&x().lt(0)).is_err());
        let big = Model::new(BTreeMap::from([(Var::new("x"), i64::MAX)]));
        assert!(matches!(
            big.eval_int(&(x() + 1)),
            Err(Error::Overflow(_))
        ));
    }
}
