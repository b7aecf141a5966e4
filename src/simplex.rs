//! Exact rational feasibility of a conjunction of linear constraints.
//!
//! This is the bounded general simplex of Dutertre and de Moura: every constraint row gets a
//! slack variable `s = Σ aᵢ·xᵢ` carrying the bound, the tableau keeps basic variables expressed
//! over non-basic ones, and `check` repairs bound violations by pivoting. Bland's rule
//! (smallest index first, for both the leaving and the entering variable) guarantees
//! termination.

use std::collections::BTreeMap;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};

use crate::error::{Error, Result};
use crate::expr::Var;
use crate::linear::{Constraint, Relation};

pub struct Simplex {
    /// Original variables; column `j < vars.len()` is `vars[j]`, the rest are slacks.
    vars: Vec<Var>,
    /// `rows[r]` expresses `basic[r]` over the non-basic columns.
    rows: Vec<Vec<BigRational>>,
    basic: Vec<usize>,
    is_basic: Vec<bool>,
    lower: Vec<Option<BigRational>>,
    upper: Vec<Option<BigRational>>,
    value: Vec<BigRational>,
}

fn rational(v: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(v))
}

impl Simplex {
    pub fn new(constraints: &[Constraint]) -> Self {
        let mut index = BTreeMap::new();
        for c in constraints {
            for v in c.expr.coeffs().keys() {
                let next = index.len();
                index.entry(v.clone()).or_insert(next);
            }
        }
        let mut vars = vec![Var::new(""); index.len()];
        for (v, &j) in &index {
            vars[j] = v.clone();
        }

        let n = vars.len();
        let m = constraints.len();
        let width = n + m;

        let mut rows = Vec::with_capacity(m);
        let mut lower = vec![None; width];
        let mut upper = vec![None; width];
        for (r, c) in constraints.iter().enumerate() {
            let mut row = vec![BigRational::zero(); width];
            for (v, &a) in c.expr.coeffs() {
                row[index[v]] = rational(a);
            }
            rows.push(row);

            // Σ a·x + c ≥ 0  <=>  s ≥ -c
            let bound = rational(-c.expr.constant_term());
            let slack = n + r;
            if c.relation == Relation::Eq {
                upper[slack] = Some(bound.clone());
            }
            lower[slack] = Some(bound);
        }

        let mut is_basic = vec![false; width];
        for flag in is_basic.iter_mut().skip(n) {
            *flag = true;
        }

        Self {
            vars,
            rows,
            basic: (n..width).collect(),
            is_basic,
            lower,
            upper,
            value: vec![BigRational::zero(); width],
        }
    }

    fn can_increase(&self, j: usize) -> bool {
        self.upper[j].as_ref().is_none_or(|u| self.value[j] < *u)
    }

    fn can_decrease(&self, j: usize) -> bool {
        self.lower[j].as_ref().is_none_or(|l| self.value[j] > *l)
    }

    /// Smallest basic variable outside its bounds, with the row it lives in and whether it is
    /// below its lower bound.
    fn violated(&self) -> Option<(usize, bool)> {
        let mut best: Option<(usize, bool)> = None;
        for (r, &b) in self.basic.iter().enumerate() {
            let below = matches!(&self.lower[b], Some(l) if self.value[b] < *l);
            let above = matches!(&self.upper[b], Some(u) if self.value[b] > *u);
            if (below || above) && best.is_none_or(|(br, _)| b < self.basic[br]) {
                best = Some((r, below));
            }
        }
        best
    }

    /// Decides rational feasibility. On success the current assignment satisfies every bound.
    pub fn check(&mut self) -> bool {
        loop {
            let Some((r, below)) = self.violated() else {
                return true;
            };
            let b = self.basic[r];

            let entering = (0..self.value.len()).find(|&j| {
                if self.is_basic[j] {
                    return false;
                }
                let a = &self.rows[r][j];
                if a.is_zero() {
                    return false;
                }
                let positive = *a > BigRational::zero();
                if below == positive {
                    self.can_increase(j)
                } else {
                    self.can_decrease(j)
                }
            });
            let Some(j) = entering else {
                return false;
            };

            let target = if below {
                self.lower[b].clone()
            } else {
                self.upper[b].clone()
            };
            let Some(target) = target else {
                unreachable!("violated bound must exist");
            };
            self.pivot_and_update(r, j, target);
        }
    }

    fn pivot_and_update(&mut self, r: usize, j: usize, target: BigRational) {
        let b = self.basic[r];
        let a = self.rows[r][j].clone();

        let theta = (&target - &self.value[b]) / &a;
        self.value[b] = target;
        self.value[j] += &theta;
        for k in 0..self.rows.len() {
            if k != r && !self.rows[k][j].is_zero() {
                let delta = &self.rows[k][j] * &theta;
                self.value[self.basic[k]] += delta;
            }
        }

        // b = a·x_j + rest  =>  x_j = (b - rest) / a
        let width = self.value.len();
        let mut pivot_row = vec![BigRational::zero(); width];
        for (l, coeff) in self.rows[r].iter().enumerate() {
            if l != j && !coeff.is_zero() {
                pivot_row[l] = -coeff / &a;
            }
        }
        pivot_row[b] = BigRational::one() / &a;

        for k in 0..self.rows.len() {
            if k == r {
                continue;
            }
            let factor = std::mem::replace(&mut self.rows[k][j], BigRational::zero());
            if factor.is_zero() {
                continue;
            }
            for (l, coeff) in pivot_row.iter().enumerate() {
                if !coeff.is_zero() {
                    self.rows[k][l] += &factor * coeff;
                }
            }
        }

        self.rows[r] = pivot_row;
        self.basic[r] = j;
        self.is_basic[b] = false;
        self.is_basic[j] = true;
    }

    /// First original variable with a non-integral value.
    pub fn fractional(&self) -> Option<(&Var, &BigRational)> {
        self.vars
            .iter()
            .zip(&self.value)
            .find(|(_, value)| !value.is_integer())
    }

    /// Values of the original variables, which must all be integral.
    pub fn integer_values(&self) -> Result<Vec<(Var, i64)>> {
        self.vars
            .iter()
            .zip(&self.value)
            .map(|(v, value)| {
                let n = value
                    .to_integer()
                    .to_i64()
                    .ok_or(Error::Overflow("reading a model"))?;
                Ok((v.clone(), n))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::linear::LinExpr;

    fn lin(terms: &[(&str, i64)], constant: i64) -> LinExpr {
        let mut e = LinExpr::constant(constant);
        for &(name, a) in terms {
            e = e.add(&LinExpr::var(Var::new(name)).scale(a).unwrap()).unwrap();
        }
        e
    }

    #[test]
    fn test_feasible_box() {
        // x >= 2, y >= 3, x + y <= 10
        let cs = vec![
            Constraint::nonneg(lin(&[("x", 1)], -2)),
            Constraint::nonneg(lin(&[("y", 1)], -3)),
            Constraint::nonneg(lin(&[("x", -1), ("y", -1)], 10)),
        ];
        let mut s = Simplex::new(&cs);
        assert!(s.check());
        let values = s.integer_values().unwrap();
        let x = values[0].1;
        let y = values[1].1;
        assert!(x >= 2 && y >= 3 && x + y <= 10, "x = {}, y = {}", x, y);
    }

    #[test]
    fn test_infeasible() {
        // x - y >= 1, y - x >= 0
        let cs = vec![
            Constraint::nonneg(lin(&[("x", 1), ("y", -1)], -1)),
            Constraint::nonneg(lin(&[("x", -1), ("y", 1)], 0)),
        ];
        let mut s = Simplex::new(&cs);
        assert!(!s.check());
    }

    #[test]
    fn test_equalities() {
        // x = y + 10, y = 5
        let cs = vec![
            Constraint::zero(lin(&[("x", 1), ("y", -1)], -10)),
            Constraint::zero(lin(&[("y", 1)], -5)),
        ];
        let mut s = Simplex::new(&cs);
        assert!(s.check());
        assert!(s.fractional().is_none());
        let values = s.integer_values().unwrap();
        assert_eq!(values, vec![(Var::new("x"), 15), (Var::new("y"), 5)]);
    }

    #[test]
    fn test_fractional_vertex() {
        // 2x = 1 is rationally feasible, x = 1/2
        let cs = vec![Constraint {
            expr: lin(&[("x", 2)], -1),
            relation: Relation::Eq,
        }];
        let mut s = Simplex::new(&cs);
        assert!(s.check());
        let (v, value) = s.fractional().unwrap();
        assert_eq!(v, &Var::new("x"));
        assert_eq!(*value, BigRational::new(BigInt::from(1), BigInt::from(2)));
    }
}
