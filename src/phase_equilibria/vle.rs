//! Isothermal two-phase flash at fixed temperature and pressure:
//! successive substitution over ln K with Anderson mixing, coordinated
//! damping, an optional Armijo line search and stability-driven restarts.

use super::anderson::AndersonAccelerator;
use super::rachford_rice::{solve_rachford_rice, RachfordRiceSolution};
use super::stability::tpd_analysis;
use super::Phase;
use crate::eos::PengRobinson;
use crate::errors::{FlashError, FlashResult};
use crate::options::FlashOptions;
use crate::parameter::FlashParameters;
use crate::utils::max_abs_diff;
use crate::{log_iter, log_result};
use ndarray::Array1;

const MAX_ITER_VLE: usize = 100;
const TOL_LNK: f64 = 1e-7;
const TOL_COMP_SUM: f64 = 1e-8;
/// |K − 1| below this means the iteration is collapsing onto the feed.
const TOL_TRIVIAL_K: f64 = 1e-4;
const K_MIN: f64 = 1e-8;
const K_MAX: f64 = 1e8;
const Z_EPS: f64 = 1e-15;

/// Converged (or best-effort) isothermal equilibrium state.
#[derive(Debug, Clone)]
pub struct VleSolution {
    pub beta: f64,
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub k: Array1<f64>,
    pub z_l: f64,
    pub z_v: f64,
    pub phi_l: Array1<f64>,
    pub phi_v: Array1<f64>,
    pub iterations: usize,
    /// Set when the feed is stable as one phase; `beta` is then exactly 0
    /// or 1 and both phase compositions equal the feed.
    pub single_phase: Option<Phase>,
    /// False when the iteration cap was reached; the carried state is the
    /// smallest-residual iterate seen.
    pub converged: bool,
    pub residual: f64,
}

/// Wilson correlation K-values at `(t, p)` from the stored critical
/// constants.
pub(crate) fn wilson_k(parameters: &FlashParameters, t: f64, p: f64) -> Array1<f64> {
    Array1::from_iter(parameters.critical.iter().map(|r| {
        let k = r.pc / p * (5.373 * (1.0 + r.acentric_factor) * (1.0 - r.tc / t)).exp();
        k.clamp(K_MIN, K_MAX)
    }))
}

/// Bubble/dew indicator for a feed that the stability test declared stable.
pub(crate) fn classify_single_phase(
    parameters: &FlashParameters,
    t: f64,
    p: f64,
    z: &Array1<f64>,
) -> Phase {
    let k = wilson_k(parameters, t, p);
    let bubble: f64 = (z * &k).sum();
    let dew: f64 = z.iter().zip(k.iter()).map(|(zi, ki)| zi / ki).sum();
    if bubble <= 1.0 {
        Phase::Liquid
    } else if dew <= 1.0 || dew < bubble {
        Phase::Vapor
    } else {
        Phase::Liquid
    }
}

/// Equilibrium-ratio estimate from an unstable tangent-plane direction,
/// orienting the ratio by whether the trial is vapor-like or liquid-like
/// relative to the feed.
fn k_from_trial(z: &Array1<f64>, trial: &Array1<f64>, wilson: &Array1<f64>) -> Array1<f64> {
    let score: f64 = z
        .iter()
        .zip(trial.iter())
        .zip(wilson.iter())
        .map(|((zi, ti), wi)| (ti - zi) * wi.ln())
        .sum();
    let vapor_like = score > 0.0;
    Array1::from_shape_fn(z.len(), |i| {
        if z[i] > Z_EPS && trial[i] > Z_EPS {
            let k = if vapor_like {
                trial[i] / z[i]
            } else {
                z[i] / trial[i]
            };
            k.clamp(K_MIN, K_MAX)
        } else {
            wilson[i]
        }
    })
}

/// Fugacity coefficients with the other phase's root as tentative fallback
/// when the requested phase has no valid cubic root.
fn ln_phi_with_fallback(
    eos: &PengRobinson,
    t: f64,
    p: f64,
    w: &Array1<f64>,
    phase: Phase,
) -> FlashResult<(Array1<f64>, f64)> {
    match eos.ln_fugacity_coeffs(t, p, w, phase) {
        Err(FlashError::NoCubicRoot(_)) => eos.ln_fugacity_coeffs(t, p, w, phase.other()),
        other => other,
    }
}

fn single_phase_solution(
    eos: &PengRobinson,
    t: f64,
    p: f64,
    z: &Array1<f64>,
    phase: Phase,
    iterations: usize,
) -> FlashResult<VleSolution> {
    let (ln_phi, z_factor) = ln_phi_with_fallback(eos, t, p, z, phase)?;
    let phi = ln_phi.mapv(f64::exp);
    Ok(VleSolution {
        beta: match phase {
            Phase::Vapor => 1.0,
            Phase::Liquid => 0.0,
        },
        x: z.clone(),
        y: z.clone(),
        k: Array1::ones(z.len()),
        z_l: z_factor,
        z_v: z_factor,
        phi_l: phi.clone(),
        phi_v: phi,
        iterations,
        single_phase: Some(phase),
        converged: true,
        residual: 0.0,
    })
}

fn split_compositions(
    z: &Array1<f64>,
    k: &Array1<f64>,
    beta: f64,
) -> (Array1<f64>, Array1<f64>, f64, f64) {
    let n = z.len();
    let mut x = Array1::zeros(n);
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let denom = 1.0 + beta * (k[i] - 1.0);
        x[i] = z[i] / denom;
        y[i] = k[i] * x[i];
    }
    let sum_x = x.sum();
    let sum_y = y.sum();
    if sum_x > 0.0 {
        x.mapv_inplace(|v| v / sum_x);
    }
    if sum_y > 0.0 {
        y.mapv_inplace(|v| v / sum_y);
    }
    (x, y, sum_x, sum_y)
}

/// Squared residual norm of the fixed-point map at a trial ln K, for the
/// Armijo backtracking. `None` marks an unevaluable trial point.
fn residual_norm_sq(
    eos: &PengRobinson,
    t: f64,
    p: f64,
    z: &Array1<f64>,
    lnk: &Array1<f64>,
    beta_guess: f64,
) -> Option<f64> {
    let k = lnk.mapv(f64::exp);
    let beta = match solve_rachford_rice(z, &k) {
        Ok(RachfordRiceSolution::TwoPhase(b)) => b,
        Ok(RachfordRiceSolution::AllVapor) => 1.0,
        Ok(RachfordRiceSolution::AllLiquid) => 0.0,
        Err(_) => beta_guess,
    };
    let (x, y, _, _) = split_compositions(z, &k, beta);
    let (ln_phi_l, _) = ln_phi_with_fallback(eos, t, p, &x, Phase::Liquid).ok()?;
    let (ln_phi_v, _) = ln_phi_with_fallback(eos, t, p, &y, Phase::Vapor).ok()?;
    let f = &ln_phi_l - &ln_phi_v - lnk;
    let norm = f.iter().map(|v| v * v).sum::<f64>();
    norm.is_finite().then(|| norm)
}

/// Two-phase split of the feed `z` at fixed `(t, p)`.
///
/// The entry stability test decides whether a split exists at all; Wilson
/// K-values (or the unstable tangent-plane direction, or a caller-supplied
/// warm start) seed the successive-substitution loop.
pub fn isothermal_flash(
    eos: &PengRobinson,
    t: f64,
    p: f64,
    z: &Array1<f64>,
    options: &FlashOptions,
    k_init: Option<&Array1<f64>>,
) -> FlashResult<VleSolution> {
    let parameters = eos.parameters();
    let verbosity = options.verbosity;

    let stability = tpd_analysis(eos, t, p, z, verbosity)?;
    if !stability.unstable {
        let phase = classify_single_phase(parameters, t, p, z);
        log_result!(verbosity, "stability: feed is single-phase {}", phase);
        return single_phase_solution(eos, t, p, z, phase, 0);
    }

    let wilson = wilson_k(parameters, t, p);
    let mut lnk: Array1<f64> = match (k_init, stability.trial.as_ref()) {
        (Some(k), _) => k.mapv(|ki| ki.clamp(K_MIN, K_MAX).ln()),
        (None, Some(trial)) => k_from_trial(z, trial, &wilson).mapv(f64::ln),
        (None, None) => wilson.mapv(f64::ln),
    };

    let mut accel = AndersonAccelerator::new();
    let mut damping = options.damping;
    let mut beta = 0.5;
    let mut prev_res = f64::INFINITY;
    let mut increase_streak = 0usize;
    let mut rr_failures = 0usize;
    let mut reseeds = 0usize;
    let mut best: Option<(f64, VleSolution)> = None;

    log_iter!(verbosity, " iter |   residual   |    beta    | damping");
    for iteration in 1..=MAX_ITER_VLE {
        if options.is_cancelled() {
            return Err(FlashError::Cancelled);
        }
        let k = lnk.mapv(f64::exp);

        let mut rr_failed = false;
        let mut hint: Option<Phase> = None;
        match solve_rachford_rice(z, &k) {
            Ok(RachfordRiceSolution::TwoPhase(b)) => beta = b,
            Ok(RachfordRiceSolution::AllVapor) => {
                beta = 1.0;
                hint = Some(Phase::Vapor);
            }
            Ok(RachfordRiceSolution::AllLiquid) => {
                beta = 0.0;
                hint = Some(Phase::Liquid);
            }
            Err(e) => {
                rr_failures += 1;
                rr_failed = true;
                if rr_failures > 2 {
                    // two retries exhausted: re-seed from the runner-up
                    // stability direction
                    match stability
                        .second_trial
                        .as_ref()
                        .or(stability.trial.as_ref())
                    {
                        Some(trial) => {
                            lnk = k_from_trial(z, trial, &wilson).mapv(f64::ln);
                            accel.reset();
                            rr_failures = 0;
                            prev_res = f64::INFINITY;
                            continue;
                        }
                        None => return Err(e),
                    }
                }
                // keep the previous beta, damp the next step
            }
        }

        let (x, y, sum_x, sum_y) = split_compositions(z, &k, beta);
        let (ln_phi_l, z_l) = ln_phi_with_fallback(eos, t, p, &x, Phase::Liquid)?;
        let (ln_phi_v, z_v) = ln_phi_with_fallback(eos, t, p, &y, Phase::Vapor)?;

        let f = &ln_phi_l - &ln_phi_v - &lnk;
        let res = f.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        log_iter!(
            verbosity,
            " {:4} | {:12.6e} | {:10.6} | {:.3}",
            iteration,
            res,
            beta,
            damping
        );

        if res < TOL_LNK {
            if let Some(phase) = hint {
                // equilibrium ratios converged but the material balance
                // admits no interior root: the feed is single-phase
                return single_phase_solution(eos, t, p, z, phase, iteration);
            }
            if (sum_y - sum_x).abs() < TOL_COMP_SUM {
                log_result!(
                    verbosity,
                    "isothermal flash converged in {} iteration(s), beta = {:.6}",
                    iteration,
                    beta
                );
                return Ok(VleSolution {
                    beta,
                    x,
                    y,
                    k,
                    z_l,
                    z_v,
                    phi_l: ln_phi_l.mapv(f64::exp),
                    phi_v: ln_phi_v.mapv(f64::exp),
                    iterations: iteration,
                    single_phase: None,
                    converged: true,
                    residual: res,
                });
            }
        }

        // trivial-solution guard
        if k.iter().fold(0.0f64, |m, ki| m.max((ki - 1.0).abs())) < TOL_TRIVIAL_K {
            reseeds += 1;
            let reseed = stability
                .second_trial
                .as_ref()
                .or(stability.trial.as_ref());
            match reseed {
                Some(trial) if reseeds < 2 => {
                    lnk = k_from_trial(z, trial, &wilson).mapv(f64::ln);
                    accel.reset();
                    prev_res = f64::INFINITY;
                    continue;
                }
                _ => {
                    let phase = classify_single_phase(parameters, t, p, z);
                    return single_phase_solution(eos, t, p, z, phase, iteration);
                }
            }
        }

        if best.as_ref().map_or(true, |(r, _)| res < *r) {
            best = Some((
                res,
                VleSolution {
                    beta,
                    x: x.clone(),
                    y: y.clone(),
                    k: k.clone(),
                    z_l,
                    z_v,
                    phi_l: ln_phi_l.mapv(f64::exp),
                    phi_v: ln_phi_v.mapv(f64::exp),
                    iterations: iteration,
                    single_phase: None,
                    converged: false,
                    residual: res,
                },
            ));
        }

        // coordinated damping: grow on monotone decrease, halve on an
        // increase, halve again while Anderson is failing
        if prev_res.is_finite() {
            if res < prev_res {
                damping = (damping * 1.2).min(0.9);
                increase_streak = 0;
            } else {
                damping = (damping * 0.5).max(0.1);
                increase_streak += 1;
            }
        }

        let mut target = &lnk + &f;
        if options.use_anderson {
            if let Some(accelerated) = accel.accelerate(&lnk, &f) {
                let step = max_abs_diff(&accelerated, &lnk);
                let limit = 10.0 * if prev_res.is_finite() { prev_res } else { res };
                if step > limit || increase_streak >= 2 {
                    accel.note_rejection();
                } else {
                    target = accelerated;
                    accel.note_accepted();
                }
            }
        }

        let mut step_damping = damping;
        if accel.failing() {
            step_damping *= 0.5;
        }
        if rr_failed {
            step_damping *= 0.5;
        }

        let direction = &target - &lnk;
        let mut lambda = step_damping;
        if options.use_line_search {
            let phi0 = f.iter().map(|v| v * v).sum::<f64>();
            let mut lam = lambda;
            let mut accepted = false;
            for _ in 0..4 {
                let trial_lnk = &lnk + &direction.mapv(|d| d * lam);
                if let Some(phi_trial) = residual_norm_sq(eos, t, p, z, &trial_lnk, beta) {
                    if phi_trial <= (1.0 - 1e-4 * lam) * phi0 {
                        lambda = lam;
                        accepted = true;
                        break;
                    }
                }
                lam *= 0.5;
            }
            if !accepted {
                lambda = lam;
            }
        }

        lnk = &lnk + &direction.mapv(|d| d * lambda);
        lnk.mapv_inplace(|v| v.clamp(K_MIN.ln(), K_MAX.ln()));
        prev_res = res;
    }

    // iteration cap: hand the smallest-residual iterate back to the caller
    match best {
        Some((res, solution)) => {
            log_result!(
                verbosity,
                "isothermal flash hit the iteration cap, best residual {:12.6e}",
                res
            );
            Ok(solution)
        }
        None => Err(FlashError::NotConverged {
            routine: "isothermal_flash",
            iterations: MAX_ITER_VLE,
            residual: f64::INFINITY,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::FlashParameters;
    use approx::assert_relative_eq;
    use ndarray::arr1;
    use std::rc::Rc;

    fn eos() -> PengRobinson {
        let options = FlashOptions::default();
        PengRobinson::new(Rc::new(FlashParameters::from_options(&options).unwrap()))
    }

    #[test]
    fn wilson_k_orders_by_volatility() {
        let parameters = FlashParameters::from_options(&FlashOptions::default()).unwrap();
        let k = wilson_k(&parameters, 300.0, 101325.0);
        // hydrogen is the lightest, water the heaviest
        assert!(k[0] > k[1]);
        assert!(k[1] > k[3]);
        assert!(k[3] > k[4]);
        assert!(k[4] < 1.0);
    }

    #[test]
    fn ammonia_water_split_is_consistent() {
        let eos = eos();
        let options = FlashOptions::default();
        let z = arr1(&[0.0, 0.0, 0.0, 0.5, 0.5]);
        let sol = isothermal_flash(&eos, 400.0, 1e6, &z, &options, None).unwrap();
        assert!(sol.converged);
        assert!(sol.single_phase.is_none(), "expected a two-phase split");
        assert!(sol.beta > 0.0 && sol.beta < 1.0);

        // closure and material balance
        assert_relative_eq!(sol.x.sum(), 1.0, epsilon = 1e-8);
        assert_relative_eq!(sol.y.sum(), 1.0, epsilon = 1e-8);
        for i in 0..z.len() {
            let recon = sol.beta * sol.y[i] + (1.0 - sol.beta) * sol.x[i];
            assert_relative_eq!(recon, z[i], epsilon = 1e-6);
        }

        // isofugacity for present components
        for i in 3..5 {
            let f_l = sol.phi_l[i] * sol.x[i];
            let f_v = sol.phi_v[i] * sol.y[i];
            assert_relative_eq!(f_l, f_v, max_relative = 1e-5);
        }

        // the liquid is richer in water than the vapor
        assert!(sol.x[4] > sol.y[4]);
        assert!(sol.z_v > sol.z_l);
    }

    #[test]
    fn hot_nitrogen_rich_feed_is_single_phase_vapor() {
        let eos = eos();
        let options = FlashOptions::default();
        let z = arr1(&[0.2, 0.6, 0.15, 0.05, 0.0]);
        let sol = isothermal_flash(&eos, 600.0, 1e5, &z, &options, None).unwrap();
        assert_eq!(sol.single_phase, Some(Phase::Vapor));
        assert_relative_eq!(sol.beta, 1.0);
        assert_relative_eq!(sol.y[1], z[1]);
    }

    #[test]
    fn warm_start_reproduces_the_split() {
        let eos = eos();
        let options = FlashOptions::default();
        let z = arr1(&[0.0, 0.0, 0.0, 0.5, 0.5]);
        let first = isothermal_flash(&eos, 400.0, 1e6, &z, &options, None).unwrap();
        let second = isothermal_flash(&eos, 400.0, 1e6, &z, &options, Some(&first.k)).unwrap();
        assert_relative_eq!(first.beta, second.beta, epsilon = 1e-5);
        for i in 0..z.len() {
            assert_relative_eq!(first.x[i], second.x[i], epsilon = 1e-5);
        }
    }

    #[test]
    fn plain_substitution_matches_accelerated_result() {
        let eos = eos();
        let z = arr1(&[0.0, 0.0, 0.0, 0.5, 0.5]);
        let fast = isothermal_flash(&eos, 400.0, 1e6, &z, &FlashOptions::default(), None).unwrap();
        let plain_options = FlashOptions {
            use_anderson: false,
            use_line_search: false,
            ..FlashOptions::default()
        };
        let plain = isothermal_flash(&eos, 400.0, 1e6, &z, &plain_options, None).unwrap();
        assert!(plain.converged);
        assert_relative_eq!(fast.beta, plain.beta, epsilon = 1e-4);
    }
}
