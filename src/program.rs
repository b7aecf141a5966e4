//! The loop under analysis.
//!
//! A [`ProgramSpec`] describes the loop
//!
//! ```text
//! assume(pre);
//! while (cond) { body }
//! assert(post);
//! ```
//!
//! as four formulas over SSA copies of the program variables. `pre` and `cond` speak about the
//! pre-state copies, `post` about the post-state copies, and `body` relates the two. Candidate
//! invariants use the unindexed variables, and the renaming helpers here move formulas between
//! these three vocabularies.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::expr::{Expr, Var};
use crate::geometry::Point;

/// A program variable with the SSA indices of its pre- and post-state copies.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StateVar {
    pub name: String,
    pub pre: u32,
    pub post: u32,
}

impl StateVar {
    pub fn new(name: impl Into<String>, pre: u32, post: u32) -> Self {
        Self {
            name: name.into(),
            pre,
            post,
        }
    }

    pub fn unindexed(&self) -> Var {
        Var::new(&self.name)
    }

    pub fn pre_var(&self) -> Var {
        Var::indexed(&self.name, self.pre)
    }

    pub fn post_var(&self) -> Var {
        Var::indexed(&self.name, self.post)
    }
}

/// Which copy of the variables a state is pinned to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Stage {
    Pre,
    Post,
}

#[derive(Debug, Clone)]
pub struct ProgramSpec {
    vars: Vec<StateVar>,
    names: Vec<String>,
    pre: Expr,
    cond: Expr,
    body: Expr,
    post: Expr,
    paths: Vec<Expr>,
}

impl ProgramSpec {
    /// The order of `vars` fixes the coordinate order of sample points.
    pub fn new(vars: Vec<StateVar>, pre: Expr, cond: Expr, body: Expr, post: Expr) -> Self {
        let names = vars.iter().map(|v| v.name.clone()).collect();
        Self {
            vars,
            names,
            pre,
            cond,
            body,
            post,
            paths: Vec::new(),
        }
    }

    /// Adds path predicates over the pre-state, used to partition the disjunctive learner.
    pub fn with_paths(mut self, paths: Vec<Expr>) -> Self {
        self.paths = paths;
        self
    }

    pub fn vars(&self) -> &[StateVar] {
        &self.vars
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dim(&self) -> usize {
        self.vars.len()
    }

    pub fn pre(&self) -> &Expr {
        &self.pre
    }

    pub fn cond(&self) -> &Expr {
        &self.cond
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn post(&self) -> &Expr {
        &self.post
    }

    pub fn paths(&self) -> &[Expr] {
        &self.paths
    }

    /// Unindexed variables in coordinate order.
    pub fn invariant_vars(&self) -> Vec<Var> {
        self.vars.iter().map(StateVar::unindexed).collect()
    }

    fn renamed(&self, formula: &Expr, pair: impl Fn(&StateVar) -> (Var, Var)) -> Expr {
        let renaming: HashMap<Var, Var> = self.vars.iter().map(pair).collect();
        formula.rename(&renaming)
    }

    /// `x` to `x@pre`.
    pub fn to_pre(&self, formula: &Expr) -> Expr {
        self.renamed(formula, |v| (v.unindexed(), v.pre_var()))
    }

    /// `x` to `x@post`.
    pub fn to_post(&self, formula: &Expr) -> Expr {
        self.renamed(formula, |v| (v.unindexed(), v.post_var()))
    }

    /// `x@pre` to `x@post`.
    pub fn pre_to_post(&self, formula: &Expr) -> Expr {
        self.renamed(formula, |v| (v.pre_var(), v.post_var()))
    }

    /// `x@pre` to `x`.
    pub fn from_pre(&self, formula: &Expr) -> Expr {
        self.renamed(formula, |v| (v.pre_var(), v.unindexed()))
    }

    /// The conjunction `x@stage == point.x ∧ y@stage == point.y ∧ ...`.
    pub fn state(&self, point: &Point, stage: Stage) -> Result<Expr> {
        if point.dim() != self.dim() {
            return Err(Error::Dimension {
                point: point.clone(),
                found: point.dim(),
                expected: self.dim(),
            });
        }
        Ok(Expr::and(self.vars.iter().zip(point.coords()).map(|(v, &value)| {
            let var = match stage {
                Stage::Pre => v.pre_var(),
                Stage::Post => v.post_var(),
            };
            Expr::Var(var).equals(value)
        })))
    }
}
