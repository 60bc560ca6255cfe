//! Anderson mixing for the successive-substitution K-value update.
//!
//! The accelerator keeps a ring of recent (x, f) pairs with f = g(x) − x and
//! proposes x + f − (ΔX + ΔF)γ, where γ solves the least-squares system
//! min ‖f − ΔF γ‖ via a QR factorization of the difference matrix. The
//! caller remains in charge of step-quality rejections; ill-conditioning is
//! rejected here. Two consecutive rejections shrink the mixing depth, four
//! reset the history.

use nalgebra::{DMatrix, DVector};
use ndarray::Array1;

const MAX_HISTORY: usize = 5;
const MAX_CONDITION: f64 = 1e14;

pub(crate) struct AndersonAccelerator {
    max_depth: usize,
    depth: usize,
    x_hist: Vec<DVector<f64>>,
    f_hist: Vec<DVector<f64>>,
    consecutive_rejections: usize,
}

impl AndersonAccelerator {
    pub fn new() -> Self {
        Self::with_depth(MAX_HISTORY)
    }

    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            depth: max_depth,
            x_hist: Vec::with_capacity(max_depth + 1),
            f_hist: Vec::with_capacity(max_depth + 1),
            consecutive_rejections: 0,
        }
    }

    pub fn reset(&mut self) {
        self.x_hist.clear();
        self.f_hist.clear();
        self.depth = self.max_depth;
        self.consecutive_rejections = 0;
    }

    /// Record the pair and propose an accelerated iterate. `None` means the
    /// caller should fall back to the damped successive-substitution step.
    pub fn accelerate(&mut self, x: &Array1<f64>, f: &Array1<f64>) -> Option<Array1<f64>> {
        let n = x.len();
        self.x_hist
            .push(DVector::from_iterator(n, x.iter().cloned()));
        self.f_hist
            .push(DVector::from_iterator(n, f.iter().cloned()));
        while self.x_hist.len() > self.max_depth + 1 {
            self.x_hist.remove(0);
            self.f_hist.remove(0);
        }

        let m = (self.x_hist.len() - 1).min(self.depth);
        if m == 0 {
            return None;
        }
        let last = self.x_hist.len() - 1;
        let first = last - m;
        let df = DMatrix::from_fn(n, m, |i, j| {
            self.f_hist[first + j + 1][i] - self.f_hist[first + j][i]
        });
        let dx = DMatrix::from_fn(n, m, |i, j| {
            self.x_hist[first + j + 1][i] - self.x_hist[first + j][i]
        });

        let qr = df.clone().qr();
        let r = qr.r();
        let mut diag_max = 0.0f64;
        let mut diag_min = f64::INFINITY;
        for i in 0..m {
            let d = r[(i, i)].abs();
            diag_max = diag_max.max(d);
            diag_min = diag_min.min(d);
        }
        if !(diag_min > 0.0) || diag_max / diag_min > MAX_CONDITION {
            self.note_rejection();
            return None;
        }

        let f_k = &self.f_hist[last];
        let qtf = qr.q().transpose() * f_k;
        let gamma = match r.solve_upper_triangular(&qtf) {
            Some(gamma) => gamma,
            None => {
                self.note_rejection();
                return None;
            }
        };

        let accelerated = &self.x_hist[last] + f_k - (dx + df) * gamma;
        if accelerated.iter().any(|v| !v.is_finite()) {
            self.note_rejection();
            return None;
        }
        Some(Array1::from_iter(accelerated.iter().cloned()))
    }

    /// Register a rejection of the proposed step, whether internal or from
    /// the caller's step-quality checks.
    pub fn note_rejection(&mut self) {
        self.consecutive_rejections += 1;
        if self.consecutive_rejections == 2 && self.depth > 1 {
            self.depth -= 1;
        }
        if self.consecutive_rejections >= 4 {
            self.reset();
        }
    }

    pub fn note_accepted(&mut self) {
        self.consecutive_rejections = 0;
    }

    /// Whether the last proposals were rejected; the VLE loop halves its
    /// damping while this holds.
    pub fn failing(&self) -> bool {
        self.consecutive_rejections > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    // affine contraction g(x) = A x + b with fixed point (1, 2)
    fn g(x: &Array1<f64>) -> Array1<f64> {
        arr1(&[
            0.7 * x[0] + 0.2 * x[1] - 0.1,
            0.1 * x[0] + 0.8 * x[1] + 0.3,
        ])
    }

    #[test]
    fn accelerates_affine_fixed_point() {
        let mut accel = AndersonAccelerator::new();
        let mut x = arr1(&[0.0, 0.0]);
        for _ in 0..12 {
            let f = &g(&x) - &x;
            x = match accel.accelerate(&x, &f) {
                Some(acc) => acc,
                None => &x + &f,
            };
        }
        let f = &g(&x) - &x;
        let res = f.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        // plain substitution contracts by ~0.9 per step; Anderson must do
        // far better on an affine map
        assert!(res < 1e-8, "residual {} after 12 iterations", res);
    }

    #[test]
    fn degenerate_history_is_rejected() {
        let mut accel = AndersonAccelerator::new();
        let x = arr1(&[1.0, 1.0]);
        let f = arr1(&[0.5, -0.5]);
        // identical pairs produce a zero difference matrix
        assert!(accel.accelerate(&x, &f).is_none());
        assert!(accel.accelerate(&x, &f).is_none());
        assert!(accel.failing());
    }

    #[test]
    fn rejection_cascade_resets() {
        let mut accel = AndersonAccelerator::new();
        for _ in 0..4 {
            accel.note_rejection();
        }
        // after the reset the accelerator starts over without history
        assert!(!accel.failing());
        let x = arr1(&[0.0, 0.0]);
        let f = arr1(&[1.0, 1.0]);
        assert!(accel.accelerate(&x, &f).is_none());
    }
}
