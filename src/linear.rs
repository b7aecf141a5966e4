//! Translation of formulas into linear integer constraints.
//!
//! Every comparison becomes either `Σ aᵢ·xᵢ + c ≥ 0` or `Σ aᵢ·xᵢ + c = 0`. Strict
//! comparisons are shifted by one, which is exact over the integers. Integer-sorted `ite`
//! terms are lifted into guarded cases, so the result of [`to_nnf`] is a negation-free
//! and/or tree over such constraints.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::error::{Error, Result};
use crate::expr::{BinaryOp, CmpOp, Expr, UnaryOp, Var};
use crate::utils::{div_floor, gcd_all};

/// Affine integer expression `Σ coeffs[v]·v + constant`.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct LinExpr {
    coeffs: BTreeMap<Var, i64>,
    constant: i64,
}

impl LinExpr {
    pub fn constant(value: i64) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn var(var: Var) -> Self {
        Self {
            coeffs: BTreeMap::from([(var, 1)]),
            constant: 0,
        }
    }

    pub fn coeffs(&self) -> &BTreeMap<Var, i64> {
        &self.coeffs
    }

    pub fn constant_term(&self) -> i64 {
        self.constant
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn add(&self, other: &LinExpr) -> Result<LinExpr> {
        let mut res = self.clone();
        for (v, &a) in &other.coeffs {
            let entry = res.coeffs.entry(v.clone()).or_insert(0);
            *entry = entry.checked_add(a).ok_or(Error::Overflow("adding terms"))?;
        }
        res.coeffs.retain(|_, a| *a != 0);
        res.constant = res
            .constant
            .checked_add(other.constant)
            .ok_or(Error::Overflow("adding terms"))?;
        Ok(res)
    }

    pub fn scale(&self, k: i64) -> Result<LinExpr> {
        if k == 0 {
            return Ok(LinExpr::default());
        }
        let mut coeffs = BTreeMap::new();
        for (v, &a) in &self.coeffs {
            let a = a.checked_mul(k).ok_or(Error::Overflow("scaling terms"))?;
            coeffs.insert(v.clone(), a);
        }
        let constant = self
            .constant
            .checked_mul(k)
            .ok_or(Error::Overflow("scaling terms"))?;
        Ok(LinExpr { coeffs, constant })
    }

    pub fn sub(&self, other: &LinExpr) -> Result<LinExpr> {
        self.add(&other.scale(-1)?)
    }

    pub fn shift(&self, delta: i64) -> Result<LinExpr> {
        self.add(&LinExpr::constant(delta))
    }
}

impl Display for LinExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (v, a) in &self.coeffs {
            write!(f, "{}*{} + ", a, v)?;
        }
        write!(f, "{}", self.constant)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Relation {
    /// `expr ≥ 0`
    Ge,
    /// `expr = 0`
    Eq,
}

/// A single linear constraint against zero.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Constraint {
    pub expr: LinExpr,
    pub relation: Relation,
}

impl Constraint {
    pub fn nonneg(expr: LinExpr) -> Self {
        Self {
            expr,
            relation: Relation::Ge,
        }
    }

    pub fn zero(expr: LinExpr) -> Self {
        Self {
            expr,
            relation: Relation::Eq,
        }
    }

    /// Divides by the gcd of the coefficients and tightens the constant.
    ///
    /// Constant constraints collapse to `True`/`False`, as do equalities whose constant is not
    /// a multiple of the gcd.
    fn normalize(self) -> Nnf {
        let Constraint { expr, relation } = self;
        if expr.is_constant() {
            let holds = match relation {
                Relation::Ge => expr.constant >= 0,
                Relation::Eq => expr.constant == 0,
            };
            return if holds { Nnf::True } else { Nnf::False };
        }

        let g = gcd_all(expr.coeffs.values().copied());
        if g <= 1 {
            return Nnf::Atom(Constraint { expr, relation });
        }

        let constant = match relation {
            Relation::Ge => div_floor(expr.constant, g),
            Relation::Eq => {
                if expr.constant % g != 0 {
                    return Nnf::False;
                }
                expr.constant / g
            }
        };
        let coeffs = expr.coeffs.into_iter().map(|(v, a)| (v, a / g)).collect();
        Nnf::Atom(Constraint {
            expr: LinExpr { coeffs, constant },
            relation,
        })
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.relation {
            Relation::Ge => write!(f, "{} >= 0", self.expr),
            Relation::Eq => write!(f, "{} == 0", self.expr),
        }
    }
}

/// Negation normal form over linear constraints.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Nnf {
    True,
    False,
    Atom(Constraint),
    And(Vec<Nnf>),
    Or(Vec<Nnf>),
}

impl Nnf {
    fn and(args: Vec<Nnf>) -> Nnf {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            match a {
                Nnf::True => {}
                Nnf::False => return Nnf::False,
                Nnf::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Nnf::True,
            1 => out.pop().unwrap_or(Nnf::True),
            _ => Nnf::And(out),
        }
    }

    fn or(args: Vec<Nnf>) -> Nnf {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            match a {
                Nnf::False => {}
                Nnf::True => return Nnf::True,
                Nnf::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Nnf::False,
            1 => out.pop().unwrap_or(Nnf::False),
            _ => Nnf::Or(out),
        }
    }
}

/// Converts `formula` (negated when `positive` is false) into negation normal form.
pub fn to_nnf(formula: &Expr, positive: bool) -> Result<Nnf> {
    match formula {
        Expr::Bool(b) => Ok(if *b == positive { Nnf::True } else { Nnf::False }),
        Expr::Unary(UnaryOp::Not, a) => to_nnf(a, !positive),
        Expr::And(args) | Expr::Or(args) => {
            let parts = args
                .iter()
                .map(|a| to_nnf(a, positive))
                .collect::<Result<Vec<_>>>()?;
            // De Morgan: a negated conjunction is a disjunction and vice versa.
            if matches!(formula, Expr::And(_)) == positive {
                Ok(Nnf::and(parts))
            } else {
                Ok(Nnf::or(parts))
            }
        }
        Expr::Binary(BinaryOp::Implies, a, b) => {
            if positive {
                Ok(Nnf::or(vec![to_nnf(a, false)?, to_nnf(b, true)?]))
            } else {
                Ok(Nnf::and(vec![to_nnf(a, true)?, to_nnf(b, false)?]))
            }
        }
        Expr::Ite(c, t, e) => Ok(Nnf::or(vec![
            Nnf::and(vec![to_nnf(c, true)?, to_nnf(t, positive)?]),
            Nnf::and(vec![to_nnf(c, false)?, to_nnf(e, positive)?]),
        ])),
        Expr::Cmp(op, l, r) => {
            let op = if positive { *op } else { op.negate() };
            let lhs = linearize(l)?;
            let rhs = linearize(r)?;
            let mut cases = Vec::with_capacity(lhs.len() * rhs.len());
            for (lg, le) in &lhs {
                for (rg, re) in &rhs {
                    let mut parts = Vec::with_capacity(lg.len() + rg.len() + 1);
                    parts.extend(lg.iter().cloned());
                    parts.extend(rg.iter().cloned());
                    parts.push(compare(op, le.sub(re)?)?);
                    cases.push(Nnf::and(parts));
                }
            }
            Ok(Nnf::or(cases))
        }
        Expr::Int(_) | Expr::Var(_) | Expr::Unary(UnaryOp::Neg, _) | Expr::Binary(..) => {
            Err(Error::Sort {
                expected: "a formula",
                found: formula.to_string(),
            })
        }
    }
}

/// The constraint `diff op 0`.
fn compare(op: CmpOp, diff: LinExpr) -> Result<Nnf> {
    let nnf = match op {
        CmpOp::Ge => Constraint::nonneg(diff).normalize(),
        CmpOp::Gt => Constraint::nonneg(diff.shift(-1)?).normalize(),
        CmpOp::Le => Constraint::nonneg(diff.scale(-1)?).normalize(),
        CmpOp::Lt => Constraint::nonneg(diff.scale(-1)?.shift(-1)?).normalize(),
        CmpOp::Eq => Constraint::zero(diff).normalize(),
        CmpOp::Ne => Nnf::or(vec![
            Constraint::nonneg(diff.shift(-1)?).normalize(),
            Constraint::nonneg(diff.scale(-1)?.shift(-1)?).normalize(),
        ]),
    };
    Ok(nnf)
}

/// A term split into guarded linear cases, one per combination of `ite` branches.
type Cases = Vec<(Vec<Nnf>, LinExpr)>;

fn linearize(term: &Expr) -> Result<Cases> {
    match term {
        Expr::Int(n) => Ok(vec![(Vec::new(), LinExpr::constant(*n))]),
        Expr::Var(v) => Ok(vec![(Vec::new(), LinExpr::var(v.clone()))]),
        Expr::Unary(UnaryOp::Neg, a) => linearize(a)?
            .into_iter()
            .map(|(g, e)| -> Result<(Vec<Nnf>, LinExpr)> { Ok((g, e.scale(-1)?)) })
            .collect(),
        Expr::Binary(op @ (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul), a, b) => {
            let lhs = linearize(a)?;
            let rhs = linearize(b)?;
            let mut cases = Vec::with_capacity(lhs.len() * rhs.len());
            for (lg, le) in &lhs {
                for (rg, re) in &rhs {
                    let e = match op {
                        BinaryOp::Add => le.add(re)?,
                        BinaryOp::Sub => le.sub(re)?,
                        _ if le.is_constant() => re.scale(le.constant)?,
                        _ if re.is_constant() => le.scale(re.constant)?,
                        _ => return Err(Error::Nonlinear(term.to_string())),
                    };
                    let mut guards = lg.clone();
                    guards.extend(rg.iter().cloned());
                    cases.push((guards, e));
                }
            }
            Ok(cases)
        }
        Expr::Ite(c, t, e) => {
            let then_guard = to_nnf(c, true)?;
            let else_guard = to_nnf(c, false)?;
            let mut cases = Vec::new();
            for (mut g, l) in linearize(t)? {
                g.insert(0, then_guard.clone());
                cases.push((g, l));
            }
            for (mut g, l) in linearize(e)? {
                g.insert(0, else_guard.clone());
                cases.push((g, l));
            }
            Ok(cases)
        }
        _ => Err(Error::Sort {
            expected: "an integer term",
            found: term.to_string(),
        }),
    }
}
