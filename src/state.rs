//! The converged flash state and its consistency checks.

use crate::errors::{FlashError, FlashResult};
use crate::phase_equilibria::Phase;
use crate::Component;
use ndarray::Array1;
use std::fmt;

const TOL_COMP_SUM: f64 = 1e-8;
const TOL_K_VALUE: f64 = 1e-6;
const TOL_FUGACITY: f64 = 1e-7;

/// Outcome classification of an accepted flash result.
///
/// Warning-level variants are valid outputs; error conditions are reported
/// through [`FlashError`](crate::FlashError) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStatus {
    /// Converged within the enthalpy tolerance.
    Converged,
    /// The feed is stable as a single phase at the solution temperature.
    SinglePhase(Phase),
    /// Iteration cap reached with the residual inside five times the
    /// tolerance; the result is usable but degraded.
    ToleranceRelaxed,
    /// Converged, but the phases are nearly indistinguishable.
    CriticalRegion,
}

impl FlashStatus {
    /// Whether this status carries a warning rather than full convergence.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            FlashStatus::ToleranceRelaxed | FlashStatus::CriticalRegion
        )
    }
}

/// Complete thermodynamic state returned by the flash.
#[derive(Debug, Clone)]
pub struct StateProperties {
    /// temperature in K
    pub temperature: f64,
    /// pressure in Pa
    pub pressure: f64,
    /// vapor molar fraction
    pub beta: f64,
    /// feed composition
    pub z: Array1<f64>,
    /// liquid composition
    pub x: Array1<f64>,
    /// vapor composition
    pub y: Array1<f64>,
    /// equilibrium ratios y/x
    pub k: Array1<f64>,
    /// liquid compressibility factor
    pub z_l: f64,
    /// vapor compressibility factor
    pub z_v: f64,
    /// liquid fugacity coefficients
    pub phi_l: Array1<f64>,
    /// vapor fugacity coefficients
    pub phi_v: Array1<f64>,
    /// liquid molar enthalpy in J/mol
    pub h_l: f64,
    /// vapor molar enthalpy in J/mol
    pub h_v: f64,
    /// mixture molar enthalpy in J/mol
    pub h_calc: f64,
    /// specified molar enthalpy in J/mol
    pub h_spec: f64,
    /// outer-loop iterations used
    pub iterations: usize,
    pub status: FlashStatus,
}

impl StateProperties {
    pub fn is_single_phase(&self) -> bool {
        matches!(self.status, FlashStatus::SinglePhase(_))
    }

    /// Re-check the solution invariants: composition closure, the overall
    /// mole balance, K-value consistency and (for interior vapor fractions)
    /// the isofugacity condition.
    pub fn validate(&self) -> FlashResult<()> {
        for &v in [self.temperature, self.beta, self.h_calc, self.z_l, self.z_v].iter() {
            if !v.is_finite() {
                return Err(FlashError::InvalidResult {
                    routine: "validate_solution",
                    iteration: self.iterations,
                });
            }
        }
        if !(-TOL_COMP_SUM..=1.0 + TOL_COMP_SUM).contains(&self.beta) {
            return Err(FlashError::ImpossibleState(format!(
                "vapor fraction {} outside [0, 1]",
                self.beta
            )));
        }
        for w in [&self.x, &self.y].iter() {
            if w.iter().any(|&wi| wi < -TOL_COMP_SUM) {
                return Err(FlashError::NegativeComposition("validate_solution"));
            }
            if (w.sum() - 1.0).abs() > TOL_COMP_SUM {
                return Err(FlashError::ImpossibleState(format!(
                    "phase composition sums to {}",
                    w.sum()
                )));
            }
        }
        for i in 0..self.z.len() {
            let recon = self.beta * self.y[i] + (1.0 - self.beta) * self.x[i];
            if (recon - self.z[i]).abs() > 10.0 * TOL_COMP_SUM {
                return Err(FlashError::ImpossibleState(format!(
                    "mole balance off by {:.3e} for component {}",
                    recon - self.z[i],
                    i
                )));
            }
            if self.x[i] > TOL_COMP_SUM {
                let k = self.y[i] / self.x[i];
                if (k - self.k[i]).abs() > TOL_K_VALUE * k.abs().max(1.0) {
                    return Err(FlashError::ImpossibleState(format!(
                        "stored K inconsistent with y/x for component {}",
                        i
                    )));
                }
            }
        }
        if self.beta > 1e-6 && self.beta < 1.0 - 1e-6 && !self.status.is_warning() {
            let mut worst = 0.0f64;
            for i in 0..self.z.len() {
                let f_l = self.phi_l[i] * self.x[i];
                let f_v = self.phi_v[i] * self.y[i];
                worst = worst.max((f_l - f_v).abs() / f_l.abs().max(1.0));
            }
            if worst > 100.0 * TOL_FUGACITY {
                return Err(FlashError::FugacityImbalance(worst));
            }
        }
        Ok(())
    }
}

impl fmt::Display for StateProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "T = {:.3} K, P = {:.1} Pa, beta = {:.6}", self.temperature, self.pressure, self.beta)?;
        writeln!(
            f,
            "H = {:.2} J/mol (specified {:.2}), H_L = {:.2}, H_V = {:.2}",
            self.h_calc, self.h_spec, self.h_l, self.h_v
        )?;
        writeln!(f, "Z_L = {:.6}, Z_V = {:.6}, status: {:?}", self.z_l, self.z_v, self.status)?;
        writeln!(f, "component        z          x          y          K")?;
        for (i, c) in Component::ALL.iter().enumerate() {
            writeln!(
                f,
                "{:<9} {:>10.6} {:>10.6} {:>10.6} {:>10.4e}",
                c.name(),
                self.z[i],
                self.x[i],
                self.y[i],
                self.k[i]
            )?;
        }
        write!(f, "{} outer iteration(s)", self.iterations)
    }
}
