//! Rachford-Rice material balance: the vapor fraction for a given feed and
//! set of equilibrium ratios.

use crate::errors::{FlashError, FlashResult};
use ndarray::Array1;

const MAX_ITER_RR: usize = 30;
const TOL_RR: f64 = 1e-10;
const TOL_BRACKET: f64 = 1e-12;

/// Outcome of the Rachford-Rice solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RachfordRiceSolution {
    /// Interior root; clipped to [0, 1].
    TwoPhase(f64),
    /// g(1) ≥ 0: the hypothetical root lies at or beyond β = 1. The feed is
    /// a single-phase vapor candidate, not an error.
    AllVapor,
    /// g(0) ≤ 0: single-phase liquid candidate.
    AllLiquid,
}

fn g_and_slope(z: &Array1<f64>, k: &Array1<f64>, beta: f64) -> (f64, f64) {
    let mut g = 0.0;
    let mut slope = 0.0;
    for (&zi, &ki) in z.iter().zip(k.iter()) {
        if zi <= 0.0 {
            continue;
        }
        let km1 = ki - 1.0;
        let denom = 1.0 + beta * km1;
        g += zi * km1 / denom;
        slope -= zi * km1 * km1 / (denom * denom);
    }
    (g, slope)
}

/// Solve g(β) = Σ z_i (K_i − 1) / (1 + β (K_i − 1)) = 0.
///
/// Two or three bisection steps narrow the bracket before Newton takes over
/// with the analytic slope; Newton iterates falling outside the bracket are
/// replaced by its midpoint.
pub fn solve_rachford_rice(
    z: &Array1<f64>,
    k: &Array1<f64>,
) -> FlashResult<RachfordRiceSolution> {
    if k.iter().any(|&ki| !(ki > 0.0) || !ki.is_finite()) {
        return Err(FlashError::InvalidResult {
            routine: "solve_rachford_rice",
            iteration: 0,
        });
    }

    let (mut k_min, mut k_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (&zi, &ki) in z.iter().zip(k.iter()) {
        if zi > 0.0 {
            k_min = k_min.min(ki);
            k_max = k_max.max(ki);
        }
    }

    let (g0, _) = g_and_slope(z, k, 0.0);
    let (g1, _) = g_and_slope(z, k, 1.0);
    if g0 <= 0.0 {
        return Ok(RachfordRiceSolution::AllLiquid);
    }
    if g1 >= 0.0 {
        return Ok(RachfordRiceSolution::AllVapor);
    }

    // all K equal: g has no interior zero, use the secant through the
    // endpoints instead
    if k_max - k_min < 1e-10 {
        let beta = (g0 / (g0 - g1)).clamp(0.0, 1.0);
        return Ok(RachfordRiceSolution::TwoPhase(beta));
    }

    // the root is bracketed by (0, 1) since g is strictly decreasing
    let mut lo = 0.0;
    let mut hi = 1.0;
    for _ in 0..3 {
        let mid = 0.5 * (lo + hi);
        let (g, _) = g_and_slope(z, k, mid);
        if g > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let mut beta = 0.5 * (lo + hi);
    let mut residual = f64::INFINITY;
    for _ in 0..MAX_ITER_RR {
        let (g, slope) = g_and_slope(z, k, beta);
        residual = g;
        if g.abs() < TOL_RR {
            return Ok(RachfordRiceSolution::TwoPhase(beta.clamp(0.0, 1.0)));
        }
        if g > 0.0 {
            lo = beta;
        } else {
            hi = beta;
        }
        if hi - lo < TOL_BRACKET {
            return Ok(RachfordRiceSolution::TwoPhase(beta.clamp(0.0, 1.0)));
        }
        let newton = beta - g / slope;
        beta = if newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }
    Err(FlashError::RachfordRice { beta, residual })
}
