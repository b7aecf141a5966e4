//! Linear soft-margin classification.
//!
//! [`Svm`] solves the dual of the soft-margin SVM with a linear kernel by sequential minimal
//! optimization, choosing the working pair with second-order information the way libsvm does.
//! The result is an explicit hyperplane `w·x + b`, which is all the learners need.

use std::fmt::{Display, Formatter};

use log::{debug, warn};

use crate::config::SvmConfig;
use crate::error::{Error, Result};
use crate::geometry::Point;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Label {
    Positive,
    Negative,
}

impl Label {
    fn sign(self) -> f64 {
        match self {
            Label::Positive => 1.0,
            Label::Negative => -1.0,
        }
    }
}

/// A trained linear classifier `w·x + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearModel {
    pub fn decision(&self, point: &Point) -> f64 {
        assert_eq!(point.dim(), self.weights.len(), "Dimension mismatch");
        self.weights
            .iter()
            .zip(point.coords())
            .map(|(w, &x)| w * x as f64)
            .sum::<f64>()
            + self.bias
    }

    pub fn predict(&self, point: &Point) -> Label {
        if self.decision(point) > 0.0 {
            Label::Positive
        } else {
            Label::Negative
        }
    }
}

impl Display for LinearModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}·x + {}", self.weights, self.bias)
    }
}

/// Anything that fits a hyperplane to labelled points.
pub trait LinearSeparator {
    /// Trains on `samples`, which must contain both labels.
    fn train(&mut self, samples: &[(Point, Label)]) -> Result<LinearModel>;
}

/// Used when the curvature along a pair vanishes.
const TAU: f64 = 1e-12;

#[derive(Debug, Clone, Default)]
pub struct Svm {
    config: SvmConfig,
}

impl Svm {
    pub fn new(config: SvmConfig) -> Self {
        Self { config }
    }
}

/// Working state of one SMO run.
///
/// The kernel is linear, so the solver keeps `w = Σ αᵢ·yᵢ·xᵢ` and every gradient entry is
/// `yₖ·⟨w, xₖ⟩ - 1`. Bounded variables that cannot move are shrunk out of `active`; their
/// gradients go stale and are rebuilt from `w` before optimality is declared.
struct Smo<'a> {
    dim: usize,
    /// Row-major, one row of `dim` coordinates per sample.
    xs: Vec<f64>,
    ys: Vec<f64>,
    alpha: Vec<f64>,
    grad: Vec<f64>,
    diag: Vec<f64>,
    w: Vec<f64>,
    active: Vec<usize>,
    unshrunk: bool,
    config: &'a SvmConfig,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl<'a> Smo<'a> {
    fn new(samples: &[(Point, Label)], dim: usize, config: &'a SvmConfig) -> Self {
        let n = samples.len();
        let xs: Vec<f64> = samples.iter().flat_map(|(p, _)| p.to_f64()).collect();
        let diag = (0..n)
            .map(|i| {
                let x = &xs[i * dim..(i + 1) * dim];
                dot(x, x)
            })
            .collect();
        Self {
            dim,
            diag,
            xs,
            ys: samples.iter().map(|(_, l)| l.sign()).collect(),
            alpha: vec![0.0; n],
            grad: vec![-1.0; n],
            w: vec![0.0; dim],
            active: (0..n).collect(),
            unshrunk: false,
            config,
        }
    }

    fn len(&self) -> usize {
        self.ys.len()
    }

    fn x(&self, i: usize) -> &[f64] {
        &self.xs[i * self.dim..(i + 1) * self.dim]
    }

    /// `Q[i][j] = yᵢ·yⱼ·⟨xᵢ, xⱼ⟩`
    fn q(&self, i: usize, j: usize) -> f64 {
        self.ys[i] * self.ys[j] * dot(self.x(i), self.x(j))
    }

    fn is_upper(&self, i: usize) -> bool {
        self.alpha[i] >= self.config.c
    }

    fn is_lower(&self, i: usize) -> bool {
        self.alpha[i] <= 0.0
    }

    /// Maximal violating pair among the active variables, with second-order selection of the
    /// partner. `None` once the KKT conditions hold up to the tolerance.
    fn select(&self) -> Option<(usize, usize)> {
        let mut gmax = f64::NEG_INFINITY;
        let mut best_i = None;
        for &t in &self.active {
            if self.ys[t] > 0.0 {
                if !self.is_upper(t) && -self.grad[t] >= gmax {
                    gmax = -self.grad[t];
                    best_i = Some(t);
                }
            } else if !self.is_lower(t) && self.grad[t] >= gmax {
                gmax = self.grad[t];
                best_i = Some(t);
            }
        }
        let i = best_i?;

        let mut gmax2 = f64::NEG_INFINITY;
        let mut best_j = None;
        let mut obj_min = f64::INFINITY;
        for &j in &self.active {
            let (grad_diff, quad) = if self.ys[j] > 0.0 {
                if self.is_lower(j) {
                    continue;
                }
                gmax2 = gmax2.max(self.grad[j]);
                (gmax + self.grad[j], self.diag[i] + self.diag[j] - 2.0 * self.ys[i] * self.q(i, j))
            } else {
                if self.is_upper(j) {
                    continue;
                }
                gmax2 = gmax2.max(-self.grad[j]);
                (gmax - self.grad[j], self.diag[i] + self.diag[j] + 2.0 * self.ys[i] * self.q(i, j))
            };
            if grad_diff > 0.0 {
                let quad = if quad > 0.0 { quad } else { TAU };
                let obj = -(grad_diff * grad_diff) / quad;
                if obj <= obj_min {
                    obj_min = obj;
                    best_j = Some(j);
                }
            }
        }

        if gmax + gmax2 < self.config.tolerance {
            return None;
        }
        best_j.map(|j| (i, j))
    }

    fn update(&mut self, i: usize, j: usize) {
        let c = self.config.c;
        let qij = self.q(i, j);
        let (old_i, old_j) = (self.alpha[i], self.alpha[j]);

        if self.ys[i] != self.ys[j] {
            let quad = self.diag[i] + self.diag[j] + 2.0 * qij;
            let quad = if quad > 0.0 { quad } else { TAU };
            let delta = (-self.grad[i] - self.grad[j]) / quad;
            let diff = old_i - old_j;
            let (mut ai, mut aj) = (old_i + delta, old_j + delta);
            if diff > 0.0 {
                if aj < 0.0 {
                    aj = 0.0;
                    ai = diff;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = -diff;
            }
            if diff > 0.0 {
                if ai > c {
                    ai = c;
                    aj = c - diff;
                }
            } else if aj > c {
                aj = c;
                ai = c + diff;
            }
            self.alpha[i] = ai;
            self.alpha[j] = aj;
        } else {
            let quad = self.diag[i] + self.diag[j] - 2.0 * qij;
            let quad = if quad > 0.0 { quad } else { TAU };
            let delta = (self.grad[i] - self.grad[j]) / quad;
            let sum = old_i + old_j;
            let (mut ai, mut aj) = (old_i - delta, old_j + delta);
            if sum > c {
                if ai > c {
                    ai = c;
                    aj = sum - c;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > c {
                if aj > c {
                    aj = c;
                    ai = sum - c;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }
            self.alpha[i] = ai;
            self.alpha[j] = aj;
        }

        let si = (self.alpha[i] - old_i) * self.ys[i];
        let sj = (self.alpha[j] - old_j) * self.ys[j];
        let dw: Vec<f64> = self
            .x(i)
            .iter()
            .zip(self.x(j))
            .map(|(xi, xj)| si * xi + sj * xj)
            .collect();
        for (w, d) in self.w.iter_mut().zip(&dw) {
            *w += d;
        }
        let dim = self.dim;
        for &k in &self.active {
            let xk = &self.xs[k * dim..(k + 1) * dim];
            self.grad[k] += self.ys[k] * dot(&dw, xk);
        }
    }

    /// Recomputes every gradient entry from `w`.
    fn reconstruct(&mut self) {
        for k in 0..self.len() {
            let wx = dot(&self.w, self.x(k));
            self.grad[k] = self.ys[k] * wx - 1.0;
        }
    }

    /// Whether bounded variable `i` stays at its bound given the current violation extremes.
    fn is_shrinkable(&self, i: usize, gmax1: f64, gmax2: f64) -> bool {
        let g = self.grad[i];
        if self.is_upper(i) {
            if self.ys[i] > 0.0 {
                -g > gmax1
            } else {
                -g > gmax2
            }
        } else if self.is_lower(i) {
            if self.ys[i] > 0.0 {
                g > gmax2
            } else {
                g > gmax1
            }
        } else {
            false
        }
    }

    fn shrink(&mut self) {
        let mut gmax1 = f64::NEG_INFINITY;
        let mut gmax2 = f64::NEG_INFINITY;
        for &t in &self.active {
            let g = self.grad[t];
            let (up, low, in_up, in_low) = if self.ys[t] > 0.0 {
                (-g, g, !self.is_upper(t), !self.is_lower(t))
            } else {
                (g, -g, !self.is_lower(t), !self.is_upper(t))
            };
            if in_up {
                gmax1 = gmax1.max(up);
            }
            if in_low {
                gmax2 = gmax2.max(low);
            }
        }

        if !self.unshrunk && gmax1 + gmax2 <= self.config.tolerance * 10.0 {
            self.unshrunk = true;
            self.reconstruct();
            self.active = (0..self.len()).collect();
        }

        let before = self.active.len();
        let kept: Vec<usize> = self
            .active
            .iter()
            .copied()
            .filter(|&t| !self.is_shrinkable(t, gmax1, gmax2))
            .collect();
        self.active = kept;
        debug!("shrink: {} of {} active", self.active.len(), before);
    }

    /// Brings every variable back with exact gradients and selects again.
    fn restore(&mut self) -> Option<(usize, usize)> {
        self.reconstruct();
        self.active = (0..self.len()).collect();
        self.select()
    }

    /// Offset `ρ` of the decision function `Σ αᵢ·yᵢ·⟨xᵢ, x⟩ - ρ`.
    fn rho(&self) -> f64 {
        let mut ub = f64::INFINITY;
        let mut lb = f64::NEG_INFINITY;
        let mut sum_free = 0.0;
        let mut nr_free = 0usize;
        for i in 0..self.len() {
            let yg = self.ys[i] * self.grad[i];
            if self.is_upper(i) {
                if self.ys[i] < 0.0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else if self.is_lower(i) {
                if self.ys[i] > 0.0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else {
                nr_free += 1;
                sum_free += yg;
            }
        }
        if nr_free > 0 {
            sum_free / nr_free as f64
        } else {
            (ub + lb) / 2.0
        }
    }
}

impl LinearSeparator for Svm {
    fn train(&mut self, samples: &[(Point, Label)]) -> Result<LinearModel> {
        debug!("train(samples = {})", samples.len());
        let has = |label: Label| samples.iter().any(|(_, l)| *l == label);
        if !has(Label::Positive) || !has(Label::Negative) {
            return Err(Error::EmptyTrainingSet);
        }
        let dim = samples[0].0.dim();
        if let Some((p, _)) = samples.iter().find(|(p, _)| p.dim() != dim) {
            return Err(Error::Dimension {
                point: p.clone(),
                found: p.dim(),
                expected: dim,
            });
        }

        let n = samples.len();
        let mut smo = Smo::new(samples, dim, &self.config);

        let mut iterations = 0;
        let mut counter = n.min(1000) + 1;
        let converged = loop {
            counter -= 1;
            if counter == 0 {
                counter = n.min(1000);
                smo.shrink();
            }
            let (i, j) = match smo.select() {
                Some(pair) => pair,
                None => match smo.restore() {
                    Some(pair) => {
                        counter = 1;
                        pair
                    }
                    None => break true,
                },
            };
            if iterations >= self.config.max_iterations {
                break false;
            }
            smo.update(i, j);
            iterations += 1;
        };

        if !converged {
            warn!(
                "SMO stopped after {} iterations without reaching tolerance {}",
                iterations, self.config.tolerance
            );
            return Err(Error::NotConverged { iterations });
        }

        let model = LinearModel {
            bias: -smo.rho(),
            weights: smo.w,
        };
        debug!("train: {} after {} iterations", model, iterations);
        Ok(model)
    }
}
