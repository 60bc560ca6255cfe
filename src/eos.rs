//! Peng-Robinson equation of state for the fixed five-component mixture:
//! mixing rules, cubic root selection, fugacity coefficients and the
//! enthalpy departure, with an optional quantum correction for hydrogen.

use crate::enthalpy;
use crate::errors::{FlashError, FlashResult};
use crate::parameter::FlashParameters;
use crate::phase_equilibria::Phase;
use crate::{Component, R};
use ndarray::Array1;
use std::f64::consts::{PI, SQRT_2};
use std::rc::Rc;

const OMEGA_A: f64 = 0.45724;
const OMEGA_B: f64 = 0.07780;

// Chueh-Prausnitz effective critical constants of quantum gases. The
// classical limits below replace the stored H2 constants when the quantum
// correction is active.
const H2_TC_CLASSICAL: f64 = 43.6; // K
const H2_PC_CLASSICAL: f64 = 20.5 * 101325.0; // Pa
const QUANTUM_C_TC: f64 = 21.8;
const QUANTUM_C_PC: f64 = 44.2;

/// Mixture-state Peng-Robinson parameters at a given temperature and
/// composition. `tc_used`/`pc_used` equal the stored critical constants
/// except for hydrogen under quantum correction.
#[derive(Debug, Clone)]
pub struct PrMixtureParams {
    pub a_pure: Array1<f64>,
    pub b_pure: Array1<f64>,
    pub tc_used: Array1<f64>,
    pub pc_used: Array1<f64>,
    pub a_mix: f64,
    pub b_mix: f64,
    pub da_dt: f64,
}

pub struct PengRobinson {
    parameters: Rc<FlashParameters>,
}

impl PengRobinson {
    pub fn new(parameters: Rc<FlashParameters>) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &FlashParameters {
        &self.parameters
    }

    /// Critical constants effective at `t`, shifting hydrogen when the
    /// quantum correction is enabled.
    fn effective_criticals(&self, t: f64) -> (Array1<f64>, Array1<f64>) {
        let mut tc = self.parameters.tc();
        let mut pc = self.parameters.pc();
        if self.parameters.quantum_h2 {
            let i = Component::Hydrogen.index();
            let m = self.parameters.critical[i].molar_mass;
            tc[i] = H2_TC_CLASSICAL / (1.0 + QUANTUM_C_TC / (m * t));
            pc[i] = H2_PC_CLASSICAL / (1.0 + QUANTUM_C_PC / (m * t));
        }
        (tc, pc)
    }

    /// Pure-component and mixture parameters at `(t, x)`, including the
    /// temperature derivative of the mixture attraction parameter.
    pub fn mixture_params(&self, t: f64, x: &Array1<f64>) -> PrMixtureParams {
        let (tc_used, pc_used) = self.effective_criticals(t);
        let omega = self.parameters.acentric_factor();
        let kij = &self.parameters.kij;

        let n = x.len();
        let mut a_pure = Array1::zeros(n);
        let mut b_pure = Array1::zeros(n);
        let mut da_pure = Array1::<f64>::zeros(n);
        for i in 0..n {
            let w = omega[i];
            let kappa = 0.37464 + (1.54226 - 0.26992 * w) * w;
            let a_crit = OMEGA_A * R * R * tc_used[i] * tc_used[i] / pc_used[i];
            let sqrt_alpha = 1.0 + kappa * (1.0 - (t / tc_used[i]).sqrt());
            a_pure[i] = a_crit * sqrt_alpha * sqrt_alpha;
            b_pure[i] = OMEGA_B * R * tc_used[i] / pc_used[i];
            da_pure[i] = -a_crit * kappa * sqrt_alpha / (t * tc_used[i]).sqrt();
        }

        let mut a_mix = 0.0;
        let mut da_dt = 0.0;
        for i in 0..n {
            for j in 0..n {
                let weight = x[i] * x[j] * (1.0 - kij[(i, j)]);
                let sqrt_aij = (a_pure[i] * a_pure[j]).sqrt();
                a_mix += weight * sqrt_aij;
                if sqrt_aij > 0.0 {
                    da_dt += weight * (a_pure[j] * da_pure[i] + a_pure[i] * da_pure[j])
                        / (2.0 * sqrt_aij);
                }
            }
        }
        let b_mix = (x * &b_pure).sum();

        PrMixtureParams {
            a_pure,
            b_pure,
            tc_used,
            pc_used,
            a_mix,
            b_mix,
            da_dt,
        }
    }

    /// Compressibility factor of the requested phase at `(t, p, x)`.
    pub fn compressibility(&self, t: f64, p: f64, x: &Array1<f64>, phase: Phase) -> FlashResult<f64> {
        let params = self.mixture_params(t, x);
        self.compressibility_with(&params, t, p, phase)
    }

    pub(crate) fn compressibility_with(
        &self,
        params: &PrMixtureParams,
        t: f64,
        p: f64,
        phase: Phase,
    ) -> FlashResult<f64> {
        let big_a = params.a_mix * p / (R * R * t * t);
        let big_b = params.b_mix * p / (R * t);
        solve_cubic(big_a, big_b, phase)
    }

    /// Logarithmic fugacity coefficients and the compressibility factor of
    /// the requested phase.
    pub fn ln_fugacity_coeffs(
        &self,
        t: f64,
        p: f64,
        x: &Array1<f64>,
        phase: Phase,
    ) -> FlashResult<(Array1<f64>, f64)> {
        let params = self.mixture_params(t, x);
        let z = self.compressibility_with(&params, t, p, phase)?;
        let ln_phi = self.ln_phi_with(&params, t, p, x, z)?;
        Ok((ln_phi, z))
    }

    fn ln_phi_with(
        &self,
        params: &PrMixtureParams,
        t: f64,
        p: f64,
        x: &Array1<f64>,
        z: f64,
    ) -> FlashResult<Array1<f64>> {
        let kij = &self.parameters.kij;
        let big_a = params.a_mix * p / (R * R * t * t);
        let big_b = params.b_mix * p / (R * t);
        let log_term = ((z + (1.0 + SQRT_2) * big_b) / (z + (1.0 - SQRT_2) * big_b)).ln();

        let n = x.len();
        let mut ln_phi = Array1::zeros(n);
        for i in 0..n {
            let mut a_bar = 0.0;
            for j in 0..n {
                a_bar += x[j] * (1.0 - kij[(i, j)]) * (params.a_pure[i] * params.a_pure[j]).sqrt();
            }
            let b_ratio = params.b_pure[i] / params.b_mix;
            ln_phi[i] = b_ratio * (z - 1.0)
                - (z - big_b).ln()
                - big_a / (2.0 * SQRT_2 * big_b) * (2.0 * a_bar / params.a_mix - b_ratio)
                    * log_term;
            if !ln_phi[i].is_finite() {
                return Err(FlashError::InvalidResult {
                    routine: "ln_fugacity_coeffs",
                    iteration: 0,
                });
            }
        }
        Ok(ln_phi)
    }

    /// Fugacity coefficients with minimum-Gibbs root selection: both cubic
    /// roots are evaluated when present and the one with the lower mixture
    /// fugacity sum wins. Used by the stability analysis where the phase
    /// identity of a trial composition is not known up front.
    pub(crate) fn ln_phi_min_gibbs(
        &self,
        t: f64,
        p: f64,
        x: &Array1<f64>,
    ) -> FlashResult<Array1<f64>> {
        let params = self.mixture_params(t, x);
        let liquid = self.compressibility_with(&params, t, p, Phase::Liquid);
        let vapor = self.compressibility_with(&params, t, p, Phase::Vapor);
        match (liquid, vapor) {
            (Ok(z_l), Ok(z_v)) if (z_l - z_v).abs() > 1e-12 => {
                let phi_l = self.ln_phi_with(&params, t, p, x, z_l)?;
                let phi_v = self.ln_phi_with(&params, t, p, x, z_v)?;
                let g_l: f64 = x.iter().zip(phi_l.iter()).map(|(xi, pi)| xi * pi).sum();
                let g_v: f64 = x.iter().zip(phi_v.iter()).map(|(xi, pi)| xi * pi).sum();
                Ok(if g_l < g_v { phi_l } else { phi_v })
            }
            (Ok(z), _) | (_, Ok(z)) => self.ln_phi_with(&params, t, p, x, z),
            (Err(e), Err(_)) => Err(e),
        }
    }

    /// Enthalpy departure of the requested phase in J/mol, together with
    /// the compressibility factor it was evaluated at.
    pub fn enthalpy_departure(
        &self,
        t: f64,
        p: f64,
        x: &Array1<f64>,
        phase: Phase,
    ) -> FlashResult<(f64, f64)> {
        let params = self.mixture_params(t, x);
        let z = self.compressibility_with(&params, t, p, phase)?;
        Ok((self.departure_with(&params, t, p, z), z))
    }

    pub(crate) fn departure_with(&self, params: &PrMixtureParams, t: f64, p: f64, z: f64) -> f64 {
        let big_b = params.b_mix * p / (R * t);
        let log_term = ((z + (1.0 + SQRT_2) * big_b) / (z + (1.0 - SQRT_2) * big_b)).ln();
        R * t * (z - 1.0)
            + (t * params.da_dt - params.a_mix) / (2.0 * SQRT_2 * params.b_mix) * log_term
    }

    /// Total molar enthalpy of one phase: ideal-gas part plus departure.
    pub fn phase_enthalpy(
        &self,
        t: f64,
        p: f64,
        w: &Array1<f64>,
        phase: Phase,
    ) -> FlashResult<(f64, f64)> {
        let (h_dep, z) = self.enthalpy_departure(t, p, w, phase)?;
        let h_ig = enthalpy::ideal_gas_enthalpy(&self.parameters.models, t, w);
        Ok((h_ig + h_dep, z))
    }
}

/// Solve Z³ − (1−B)Z² + (A − 3B² − 2B)Z − (AB − B² − B³) = 0 and select the
/// root for the requested phase: the largest root above the covolume for the
/// vapor, the smallest for the liquid. A single remaining root serves either
/// phase.
pub(crate) fn solve_cubic(big_a: f64, big_b: f64, phase: Phase) -> FlashResult<f64> {
    let c2 = big_b - 1.0;
    let c1 = big_a - 3.0 * big_b * big_b - 2.0 * big_b;
    let c0 = big_b * big_b + big_b.powi(3) - big_a * big_b;

    let mut selected: Option<f64> = None;
    for z in cubic_roots(c2, c1, c0) {
        if z <= big_b {
            continue;
        }
        selected = Some(match (selected, phase) {
            (None, _) => z,
            (Some(best), Phase::Vapor) => best.max(z),
            (Some(best), Phase::Liquid) => best.min(z),
        });
    }
    selected.ok_or(FlashError::NoCubicRoot(phase))
}

/// Real roots of z³ + c2 z² + c1 z + c0 via Cardano's method, with the
/// discriminant compared against a magnitude-relative threshold to keep the
/// repeated-root region stable.
fn cubic_roots(c2: f64, c1: f64, c0: f64) -> Vec<f64> {
    let p = c1 - c2 * c2 / 3.0;
    let q = 2.0 * c2.powi(3) / 27.0 - c2 * c1 / 3.0 + c0;
    let shift = -c2 / 3.0;

    let half_q = 0.5 * q;
    let third_p = p / 3.0;
    let disc = half_q * half_q + third_p.powi(3);
    let scale = (half_q * half_q)
        .max(third_p.powi(3).abs())
        .max(f64::MIN_POSITIVE);

    if disc.abs() <= 1e-12 * scale {
        if p.abs() < 1e-30 {
            // triple root
            vec![shift]
        } else {
            // one single and one double root
            vec![3.0 * q / p + shift, -1.5 * q / p + shift]
        }
    } else if disc > 0.0 {
        let s = disc.sqrt();
        vec![(-half_q + s).cbrt() + (-half_q - s).cbrt() + shift]
    } else {
        let r = (-third_p).sqrt();
        let theta = (-half_q / r.powi(3)).clamp(-1.0, 1.0).acos();
        (0..3)
            .map(|k| 2.0 * r * ((theta - 2.0 * PI * k as f64) / 3.0).cos() + shift)
            .collect()
    }
}
