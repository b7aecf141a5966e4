//! Integer points and half-spaces.
//!
//! A [`Halfspace`] is the integer Hesse form `a·x + b·y + c > 0` of a separating hyperplane.
//! Besides becoming a conjunct of a candidate invariant, it is the mirror used to manufacture
//! new samples: reflecting a violating state across every hyperplane of the failed candidate
//! gives points near the decision boundary without any extra solver call.
//!
//! # Example
//!
//! ```
//! use inv_learn::geometry::{Halfspace, Point};
//!
//! // x - y > 0
//! let h = Halfspace::new(vec![1, -1], 0);
//! let p = Point::from([3, 0]);
//! assert!(h.contains(&p));
//!
//! let mirrored = h.reflect(&p, 20);
//! assert_eq!(mirrored, vec![Point::from([0, 3])]);
//! assert!(!h.contains(&mirrored[0]));
//! ```

use std::fmt::{Display, Formatter};

use crate::expr::{Expr, Var};

/// A sample state: one integer coordinate per program variable.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Point(Vec<i64>);

impl Point {
    pub fn new(coords: Vec<i64>) -> Self {
        Point(coords)
    }

    pub fn coords(&self) -> &[i64] {
        &self.0
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Coordinates as floats, for the separator.
    pub fn to_f64(&self) -> Vec<f64> {
        self.0.iter().map(|&v| v as f64).collect()
    }
}

impl<const N: usize> From<[i64; N]> for Point {
    fn from(coords: [i64; N]) -> Self {
        Point(coords.to_vec())
    }
}

impl From<Vec<i64>> for Point {
    fn from(coords: Vec<i64>) -> Self {
        Point(coords)
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

/// Integer half-space `Σ coeffs[i]·x[i] + constant > 0`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Halfspace {
    coeffs: Vec<i64>,
    constant: i64,
}

impl Halfspace {
    pub fn new(coeffs: Vec<i64>, constant: i64) -> Self {
        Self { coeffs, constant }
    }

    /// Scales a real-valued separator into the integer Hesse form.
    ///
    /// Every weight and the bias are multiplied by `multiplier` and rounded half to even.
    pub fn from_model(weights: &[f64], bias: f64, multiplier: f64) -> Self {
        let scale = |v: f64| (v * multiplier).round_ties_even() as i64;
        Self {
            coeffs: weights.iter().map(|&w| scale(w)).collect(),
            constant: scale(bias),
        }
    }

    pub fn coeffs(&self) -> &[i64] {
        &self.coeffs
    }

    pub fn constant(&self) -> i64 {
        self.constant
    }

    /// A zero normal vector describes no hyperplane at all.
    pub fn is_degenerate(&self) -> bool {
        self.coeffs.iter().all(|&a| a == 0)
    }

    /// Value of `w·p + c`.
    pub fn eval(&self, point: &Point) -> i128 {
        assert_eq!(point.dim(), self.coeffs.len(), "Dimension mismatch");
        self.coeffs
            .iter()
            .zip(point.coords())
            .map(|(&a, &x)| a as i128 * x as i128)
            .sum::<i128>()
            + self.constant as i128
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.eval(point) > 0
    }

    /// The predicate `Σ aᵢ·vᵢ + c > 0` over `vars`.
    pub fn to_expr(&self, vars: &[Var]) -> Expr {
        assert_eq!(vars.len(), self.coeffs.len(), "Dimension mismatch");
        let mut sum: Option<Expr> = None;
        for (&a, v) in self.coeffs.iter().zip(vars) {
            let term = Expr::int(a) * Expr::Var(v.clone());
            sum = Some(match sum {
                None => term,
                Some(acc) => acc + term,
            });
        }
        let lhs = match sum {
            None => Expr::int(self.constant),
            Some(acc) => acc + self.constant,
        };
        lhs.gt(0)
    }

    /// Mirrors `point` across the hyperplane `w·x + c = 0`.
    ///
    /// - Degenerate half-spaces give no point.
    /// - A point on the hyperplane gives the `2·dim` points at distance `margin` along each axis
    ///   (minus first, then plus).
    /// - Otherwise the exact reflection is rounded away from `point`, coordinate-wise, which puts
    ///   it strictly on the other side.
    pub fn reflect(&self, point: &Point, margin: i64) -> Vec<Point> {
        let norm2: i128 = self.coeffs.iter().map(|&a| a as i128 * a as i128).sum();
        if norm2 == 0 {
            return Vec::new();
        }

        let distance = self.eval(point);
        if distance == 0 {
            let mut offsets = Vec::with_capacity(2 * point.dim());
            for axis in 0..point.dim() {
                for delta in [-margin, margin] {
                    let mut coords = point.coords().to_vec();
                    coords[axis] += delta;
                    offsets.push(Point(coords));
                }
            }
            return offsets;
        }

        let t = -2.0 * distance as f64 / norm2 as f64;
        let coords = self
            .coeffs
            .iter()
            .zip(point.coords())
            .map(|(&a, &x)| {
                let r = x as f64 + t * a as f64;
                if r > x as f64 {
                    r.ceil() as i64
                } else {
                    r.floor() as i64
                }
            })
            .collect();
        vec![Point(coords)]
    }
}

impl Display for Halfspace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}·x + {} > 0", self.coeffs, self.constant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_degenerate() {
        let h = Halfspace::new(vec![0, 0], 5);
        assert!(h.is_degenerate());
        assert!(h.reflect(&Point::from([1, 2]), 20).is_empty());
    }

    #[test]
    fn test_reflect_on_line() {
        // x + y - 3 = 0 passes through (1, 2)
        let h = Halfspace::new(vec![1, 1], -3);
        let points = h.reflect(&Point::from([1, 2]), 20);
        assert_eq!(
            points,
            vec![
                Point::from([-19, 2]),
                Point::from([21, 2]),
                Point::from([1, -18]),
                Point::from([1, 22]),
            ]
        );
    }

    #[test]
    fn test_reflect_exact() {
        // y - 1 > 0, mirror of (4, 5) is (4, -3)
        let h = Halfspace::new(vec![0, 1], -1);
        assert_eq!(h.reflect(&Point::from([4, 5]), 20), vec![Point::from([4, -3])]);
    }

    #[test]
    fn test_reflect_rounds_outward() {
        // 2x + y - 1 = 0; (0, 0) has value -1, exact mirror is (0.8, 0.4)
        let h = Halfspace::new(vec![2, 1], -1);
        let p = Point::from([0, 0]);
        let r = h.reflect(&p, 20);
        assert_eq!(r, vec![Point::from([1, 1])]);
        assert!(h.contains(&r[0]));
    }

    #[test]
    fn test_reflect_crosses_line() {
        let mut checked = 0;
        for a in -4..=4 {
            for b in -4..=4 {
                for c in [-7, -1, 0, 3, 11] {
                    let h = Halfspace::new(vec![a, b], c);
                    if h.is_degenerate() {
                        continue;
                    }
                    for x in (-9..=9).step_by(3) {
                        for y in (-9..=9).step_by(3) {
                            let p = Point::from([x, y]);
                            let before = h.eval(&p);
                            if before == 0 {
                                continue;
                            }
                            let mirrored = h.reflect(&p, 20);
                            assert_eq!(mirrored.len(), 1);
                            let after = h.eval(&mirrored[0]);
                            assert!(
                                before.signum() == -after.signum() && after != 0,
                                "h = {}, p = {}, mirrored = {}",
                                h,
                                p,
                                mirrored[0]
                            );
                            checked += 1;
                        }
                    }
                }
            }
        }
        assert!(checked > 1000);
    }

    #[test]
    fn test_from_model_rounding() {
        let h = Halfspace::from_model(&[0.25, -0.149], 0.03, 10.0);
        // 2.5 rounds to even
        assert_eq!(h.coeffs(), &[2, -1]);
        assert_eq!(h.constant(), 0);
    }

    #[test]
    fn test_to_expr() {
        let h = Halfspace::new(vec![3, -2], 5);
        let f = h.to_expr(&[Var::new("x"), Var::new("y")]);
        assert_eq!(f.to_string(), "(((3 * x) + (-2 * y)) + 5) > 0");
    }
}
