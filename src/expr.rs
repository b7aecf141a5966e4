//! Formula and term trees.
//!
//! Program specifications, candidate invariants and solver queries are all values of the single
//! tagged tree [`Expr`]. Integer terms and boolean formulas share the type; the solver rejects
//! ill-sorted trees when it linearizes them.
//!
//! Variables carry an optional SSA index: `x` is the unindexed variable an invariant talks
//! about, `x@1` and `x@2` are its pre- and post-state copies inside a transition relation.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//!
//! use inv_learn::expr::{Expr, Var};
//!
//! // x < y + 16
//! let inv = Expr::var("x").lt(Expr::var("y") + 16);
//! assert_eq!(inv.to_string(), "x < (y + 16)");
//!
//! // Move it into the pre-state.
//! let renaming = HashMap::from([
//!     (Var::new("x"), Var::indexed("x", 1)),
//!     (Var::new("y"), Var::indexed("y", 1)),
//! ]);
//! assert_eq!(inv.rename(&renaming).to_string(), "x@1 < (y@1 + 16)");
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::ops::{Add, BitAnd, BitOr, Mul, Neg, Not, Sub};

/// A program variable, optionally pinned to an SSA index.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var {
    name: String,
    index: Option<u32>,
}

impl Var {
    /// Creates an unindexed variable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    /// Creates the SSA copy `name@index`.
    pub fn indexed(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}@{}", self.name, index),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Implies,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Implies => "->",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    /// The comparison that holds exactly when `self` does not.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
        }
    }

    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }
}

/// Linear integer arithmetic formula or term.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    Var(Var),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    /// Conjunction; empty means `true`.
    And(Vec<Expr>),
    /// Disjunction; empty means `false`.
    Or(Vec<Expr>),
    /// If-then-else over either sort.
    Ite(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn tt() -> Self {
        Expr::Bool(true)
    }

    pub fn ff() -> Self {
        Expr::Bool(false)
    }

    pub fn int(value: i64) -> Self {
        Expr::Int(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(Var::new(name))
    }

    /// The SSA copy `name@index` as a term.
    pub fn ssa(name: impl Into<String>, index: u32) -> Self {
        Expr::Var(Var::indexed(name, index))
    }

    /// Conjunction of `args`, flattening nested conjunctions.
    pub fn and(args: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for arg in args {
            match arg {
                Expr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Expr::And(flat)
    }

    /// Disjunction of `args`, flattening nested disjunctions.
    pub fn or(args: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for arg in args {
            match arg {
                Expr::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Expr::Or(flat)
    }

    pub fn implies(lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(BinaryOp::Implies, Box::new(lhs), Box::new(rhs))
    }

    pub fn ite(cond: Expr, then: Expr, else_: Expr) -> Self {
        Expr::Ite(Box::new(cond), Box::new(then), Box::new(else_))
    }

    fn cmp(self, op: CmpOp, rhs: impl Into<Expr>) -> Self {
        Expr::Cmp(op, Box::new(self), Box::new(rhs.into()))
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        self.cmp(CmpOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        self.cmp(CmpOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        self.cmp(CmpOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        self.cmp(CmpOp::Ge, rhs)
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        self.cmp(CmpOp::Eq, rhs)
    }

    pub fn distinct(self, rhs: impl Into<Expr>) -> Self {
        self.cmp(CmpOp::Ne, rhs)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Bool(true)) || matches!(self, Expr::And(args) if args.is_empty())
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Expr::Bool(false)) || matches!(self, Expr::Or(args) if args.is_empty())
    }
}

impl Expr {
    /// Replaces every variable found in `renaming` by its image.
    pub fn rename(&self, renaming: &HashMap<Var, Var>) -> Expr {
        match self {
            Expr::Bool(_) | Expr::Int(_) => self.clone(),
            Expr::Var(v) => match renaming.get(v) {
                Some(target) => Expr::Var(target.clone()),
                None => self.clone(),
            },
            Expr::Unary(op, a) => Expr::Unary(*op, Box::new(a.rename(renaming))),
            Expr::Binary(op, a, b) => Expr::Binary(
                *op,
                Box::new(a.rename(renaming)),
                Box::new(b.rename(renaming)),
            ),
            Expr::Cmp(op, a, b) => Expr::Cmp(
                *op,
                Box::new(a.rename(renaming)),
                Box::new(b.rename(renaming)),
            ),
            Expr::And(args) => Expr::And(args.iter().map(|a| a.rename(renaming)).collect()),
            Expr::Or(args) => Expr::Or(args.iter().map(|a| a.rename(renaming)).collect()),
            Expr::Ite(c, t, e) => Expr::Ite(
                Box::new(c.rename(renaming)),
                Box::new(t.rename(renaming)),
                Box::new(e.rename(renaming)),
            ),
        }
    }

    /// All variables occurring in the expression.
    pub fn vars(&self) -> BTreeSet<Var> {
        let mut vars = BTreeSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, vars: &mut BTreeSet<Var>) {
        match self {
            Expr::Bool(_) | Expr::Int(_) => {}
            Expr::Var(v) => {
                vars.insert(v.clone());
            }
            Expr::Unary(_, a) => a.collect_vars(vars),
            Expr::Binary(_, a, b) | Expr::Cmp(_, a, b) => {
                a.collect_vars(vars);
                b.collect_vars(vars);
            }
            Expr::And(args) | Expr::Or(args) => {
                for a in args {
                    a.collect_vars(vars);
                }
            }
            Expr::Ite(c, t, e) => {
                c.collect_vars(vars);
                t.collect_vars(vars);
                e.collect_vars(vars);
            }
        }
    }

    /// Bottom-up constant folding and flattening.
    ///
    /// The result is logically equivalent to `self`. Folding that would overflow `i64` is
    /// skipped.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Bool(_) | Expr::Int(_) | Expr::Var(_) => self.clone(),
            Expr::Unary(UnaryOp::Neg, a) => match a.simplify() {
                Expr::Int(n) => match n.checked_neg() {
                    Some(m) => Expr::Int(m),
                    None => -Expr::Int(n),
                },
                Expr::Unary(UnaryOp::Neg, inner) => *inner,
                other => -other,
            },
            Expr::Unary(UnaryOp::Not, a) => match a.simplify() {
                Expr::Bool(b) => Expr::Bool(!b),
                Expr::Unary(UnaryOp::Not, inner) => *inner,
                Expr::Cmp(op, l, r) => Expr::Cmp(op.negate(), l, r),
                other => !other,
            },
            Expr::Binary(op, a, b) => simplify_binary(*op, a.simplify(), b.simplify()),
            Expr::Cmp(op, a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Int(l), Expr::Int(r)) => Expr::Bool(op.holds(l, r)),
                (l, r) => Expr::Cmp(*op, Box::new(l), Box::new(r)),
            },
            Expr::And(args) => {
                let mut out = Vec::new();
                for a in args {
                    match a.simplify() {
                        Expr::Bool(true) => {}
                        Expr::Bool(false) => return Expr::ff(),
                        Expr::And(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                match out.len() {
                    0 => Expr::tt(),
                    1 => out.pop().unwrap_or_else(Expr::tt),
                    _ => Expr::And(out),
                }
            }
            Expr::Or(args) => {
                let mut out = Vec::new();
                for a in args {
                    match a.simplify() {
                        Expr::Bool(false) => {}
                        Expr::Bool(true) => return Expr::tt(),
                        Expr::Or(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                match out.len() {
                    0 => Expr::ff(),
                    1 => out.pop().unwrap_or_else(Expr::ff),
                    _ => Expr::Or(out),
                }
            }
            Expr::Ite(c, t, e) => match c.simplify() {
                Expr::Bool(true) => t.simplify(),
                Expr::Bool(false) => e.simplify(),
                c => {
                    let (t, e) = (t.simplify(), e.simplify());
                    if t == e {
                        t
                    } else {
                        Expr::ite(c, t, e)
                    }
                }
            },
        }
    }
}

fn simplify_binary(op: BinaryOp, a: Expr, b: Expr) -> Expr {
    match (op, a, b) {
        (BinaryOp::Add, Expr::Int(x), Expr::Int(y)) if x.checked_add(y).is_some() => {
            Expr::Int(x + y)
        }
        (BinaryOp::Sub, Expr::Int(x), Expr::Int(y)) if x.checked_sub(y).is_some() => {
            Expr::Int(x - y)
        }
        (BinaryOp::Mul, Expr::Int(x), Expr::Int(y)) if x.checked_mul(y).is_some() => {
            Expr::Int(x * y)
        }
        (BinaryOp::Add, Expr::Int(0), e) | (BinaryOp::Add | BinaryOp::Sub, e, Expr::Int(0)) => e,
        (BinaryOp::Mul, Expr::Int(1), e) | (BinaryOp::Mul, e, Expr::Int(1)) => e,
        (BinaryOp::Mul, Expr::Int(0), _) | (BinaryOp::Mul, _, Expr::Int(0)) => Expr::Int(0),
        (BinaryOp::Implies, Expr::Bool(false), _) | (BinaryOp::Implies, _, Expr::Bool(true)) => {
            Expr::tt()
        }
        (BinaryOp::Implies, Expr::Bool(true), e) => e,
        (op, a, b) => Expr::Binary(op, Box::new(a), Box::new(b)),
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Int(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Int(value as i64)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Bool(value)
    }
}

impl From<Var> for Expr {
    fn from(var: Var) -> Self {
        Expr::Var(var)
    }
}

impl<R: Into<Expr>> Add<R> for Expr {
    type Output = Expr;

    fn add(self, rhs: R) -> Self::Output {
        Expr::Binary(BinaryOp::Add, Box::new(self), Box::new(rhs.into()))
    }
}

impl<R: Into<Expr>> Sub<R> for Expr {
    type Output = Expr;

    fn sub(self, rhs: R) -> Self::Output {
        Expr::Binary(BinaryOp::Sub, Box::new(self), Box::new(rhs.into()))
    }
}

impl<R: Into<Expr>> Mul<R> for Expr {
    type Output = Expr;

    fn mul(self, rhs: R) -> Self::Output {
        Expr::Binary(BinaryOp::Mul, Box::new(self), Box::new(rhs.into()))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Self::Output {
        Expr::Unary(UnaryOp::Neg, Box::new(self))
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Self::Output {
        Expr::Unary(UnaryOp::Not, Box::new(self))
    }
}

impl BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Self) -> Self::Output {
        Expr::and([self, rhs])
    }
}

impl BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Self) -> Self::Output {
        Expr::or([self, rhs])
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Int(n) => write!(f, "{}", n),
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Unary(UnaryOp::Neg, a) => write!(f, "-{}", a),
            Expr::Unary(UnaryOp::Not, a) => write!(f, "!{}", a),
            Expr::Binary(op, a, b) => write!(f, "({} {} {})", a, op.symbol(), b),
            Expr::Cmp(op, a, b) => write!(f, "{} {} {}", a, op.symbol(), b),
            Expr::And(args) | Expr::Or(args) if args.is_empty() => {
                write!(f, "{}", matches!(self, Expr::And(_)))
            }
            Expr::And(args) | Expr::Or(args) => {
                let sep = if matches!(self, Expr::And(_)) { " && " } else { " || " };
                write!(f, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", sep)?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expr::Ite(c, t, e) => write!(f, "ite({}, {}, {})", c, t, e),
        }
    }
}
