//! Pressure-enthalpy flash: a Newton iteration over temperature with line
//! search, wrapped around the isothermal equilibrium solver.

use super::vle::{isothermal_flash, VleSolution};
use crate::enthalpy::{ideal_gas_enthalpy, ideal_gas_heat_capacity};
use crate::eos::PengRobinson;
use crate::errors::{FlashError, FlashResult};
use crate::options::{FlashOptions, OperatingCondition};
use crate::parameter::FlashParameters;
use crate::phase_equilibria::Phase;
use crate::state::{FlashStatus, StateProperties};
use crate::utils::{clip, normalize};
use crate::{log_iter, log_result, N_COMP, P_ATM};
use ndarray::Array1;
use std::rc::Rc;

const MAX_ITER_OUTER: usize = 50;
/// Temperature window searched for the initial guess, in K.
const T_BRACKET: (f64, f64) = (150.0, 1000.0);
/// Hard bounds the Newton iteration may not leave, in K.
const T_DOMAIN: (f64, f64) = (120.0, 1200.0);
/// Newton steps are clamped to this magnitude, in K.
const MAX_STEP: f64 = 50.0;

const TOL_ENTHALPY_STANDARD: f64 = 5.0;
const TOL_ENTHALPY_DIFFICULT: f64 = 50.0;
const TOL_ENTHALPY_EXTREME: f64 = 150.0;

/// The documented default options: Anderson on, line search on, damping 0.5,
/// recommended BIPs, quantum H₂ correction on, adaptive tolerance on.
pub fn default_options() -> FlashOptions {
    FlashOptions::default()
}

/// Check a feed specification against the input contract: five normalized
/// non-negative mole fractions, 0 < P ≤ 5·10⁸ Pa and a finite enthalpy.
pub fn validate_inputs(z: &Array1<f64>, pressure: f64, h_spec: f64) -> FlashResult<()> {
    if z.len() != N_COMP {
        return Err(FlashError::InvalidInput(format!(
            "feed must have {} components, got {}",
            N_COMP,
            z.len()
        )));
    }
    for (i, &zi) in z.iter().enumerate() {
        if !zi.is_finite() || zi < 0.0 {
            return Err(FlashError::InvalidInput(format!(
                "mole fraction z[{}] = {}",
                i, zi
            )));
        }
    }
    if (z.sum() - 1.0).abs() > 1e-6 {
        return Err(FlashError::InvalidInput(format!(
            "feed mole fractions sum to {}",
            z.sum()
        )));
    }
    if !pressure.is_finite() || pressure <= 0.0 || pressure > 5e8 {
        return Err(FlashError::InvalidInput(format!(
            "pressure {} Pa outside (0, 5e8]",
            pressure
        )));
    }
    if !h_spec.is_finite() {
        return Err(FlashError::InvalidInput("enthalpy must be finite".into()));
    }
    Ok(())
}

/// Difficulty classification from the operating point.
fn classify_operating_condition(t: f64, p: f64) -> OperatingCondition {
    let standard_t = (250.0..=400.0).contains(&t);
    if (P_ATM..=10.0 * P_ATM).contains(&p) && standard_t {
        OperatingCondition::Standard
    } else if p <= 100.0 * P_ATM || !standard_t {
        OperatingCondition::Difficult
    } else {
        OperatingCondition::Extreme
    }
}

fn enthalpy_tolerance(condition: OperatingCondition, options: &FlashOptions) -> f64 {
    if let Some(tol) = options.custom_enthalpy_tol {
        return tol;
    }
    let base = match condition {
        OperatingCondition::Standard => TOL_ENTHALPY_STANDARD,
        OperatingCondition::Difficult => TOL_ENTHALPY_DIFFICULT,
        OperatingCondition::Extreme => TOL_ENTHALPY_EXTREME,
    };
    base * options.tol_factor
}

/// Bracket the ideal-gas enthalpy over the temperature window and bisect
/// five times. Targets outside the window clamp to the nearer bound; the
/// real-fluid Newton iteration recovers from there.
fn estimate_initial_temperature(
    parameters: &FlashParameters,
    z: &Array1<f64>,
    h_spec: f64,
    cold_start: bool,
) -> f64 {
    let (mut lo, mut hi) = T_BRACKET;
    let h_lo = ideal_gas_enthalpy(&parameters.models, lo, z);
    let h_hi = ideal_gas_enthalpy(&parameters.models, hi, z);
    let mut t = if h_spec <= h_lo {
        lo
    } else if h_spec >= h_hi {
        hi
    } else {
        for _ in 0..5 {
            let mid = 0.5 * (lo + hi);
            if ideal_gas_enthalpy(&parameters.models, mid, z) < h_spec {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    };
    if cold_start {
        t = (t - 10.0).max(T_BRACKET.0);
    }
    t
}

/// One full evaluation of the energy balance at a temperature.
struct Evaluation {
    h: f64,
    h_l: f64,
    h_v: f64,
    vle: VleSolution,
}

fn evaluate(
    eos: &PengRobinson,
    t: f64,
    p: f64,
    z: &Array1<f64>,
    options: &FlashOptions,
    k_warm: Option<&Array1<f64>>,
) -> FlashResult<Evaluation> {
    let vle = isothermal_flash(eos, t, p, z, options, k_warm)?;
    let enthalpy_of = |w: &Array1<f64>, phase: Phase| -> FlashResult<f64> {
        match eos.phase_enthalpy(t, p, w, phase) {
            Err(FlashError::NoCubicRoot(_)) => {
                Ok(eos.phase_enthalpy(t, p, w, phase.other())?.0)
            }
            other => Ok(other?.0),
        }
    };
    let (h_l, h_v) = match vle.single_phase {
        Some(phase) => {
            let h = enthalpy_of(z, phase)?;
            (h, h)
        }
        None => (
            enthalpy_of(&vle.x, Phase::Liquid)?,
            enthalpy_of(&vle.y, Phase::Vapor)?,
        ),
    };
    let h = vle.beta * h_v + (1.0 - vle.beta) * h_l;
    if !h.is_finite() {
        return Err(FlashError::InvalidResult {
            routine: "evaluate_enthalpy",
            iteration: vle.iterations,
        });
    }
    Ok(Evaluation { h, h_l, h_v, vle })
}

/// Finite-difference dH/dT around `t`, warm-started from the current
/// K-values. `None` when no difference could be evaluated; the caller then
/// falls back to the analytical estimate or halves the previous step.
fn finite_difference_dhdt(
    eos: &PengRobinson,
    t: f64,
    p: f64,
    z: &Array1<f64>,
    options: &FlashOptions,
    current: &Evaluation,
    tol: f64,
) -> Option<f64> {
    let warm = Some(&current.vle.k);
    let mut h_step = options
        .derivative_perturbation
        .unwrap_or_else(|| (1e-4 * t).max(0.01));

    if !options.adaptive_derivative {
        return match evaluate(eos, t + h_step, p, z, options, warm) {
            Ok(e) => Some((e.h - current.h) / h_step),
            Err(_) => evaluate(eos, t - h_step, p, z, options, warm)
                .ok()
                .map(|e| (current.h - e.h) / h_step),
        };
    }

    // adapt the perturbation until the enthalpy change it produces sits
    // between 10 and 1000 tolerances
    let mut dhdt = None;
    for _ in 0..3 {
        let plus = evaluate(eos, t + h_step, p, z, options, warm).ok();
        let minus = evaluate(eos, t - h_step, p, z, options, warm).ok();
        let estimate = match (plus, minus) {
            (Some(p_), Some(m)) => Some((p_.h - m.h) / (2.0 * h_step)),
            (Some(p_), None) => Some((p_.h - current.h) / h_step),
            (None, Some(m)) => Some((current.h - m.h) / h_step),
            (None, None) => None,
        };
        dhdt = estimate;
        let d = match estimate {
            Some(d) if d.is_finite() && d != 0.0 => d,
            _ => break,
        };
        let sensitivity = (h_step * d).abs();
        if sensitivity < 10.0 * tol {
            h_step *= 4.0;
        } else if sensitivity > 1000.0 * tol {
            h_step /= 4.0;
        } else {
            break;
        }
    }
    dhdt
}

/// Pressure-enthalpy flash of the five-component feed.
///
/// The feed is normalized on entry, so uniformly scaled compositions give
/// identical results. The returned state always carries a status; warning
/// statuses ([`FlashStatus::is_warning`]) mark usable but degraded results,
/// while hard failures surface as errors.
pub fn calculate(
    z: &Array1<f64>,
    pressure: f64,
    h_spec: f64,
    options: &FlashOptions,
) -> FlashResult<StateProperties> {
    options.validate()?;
    if z.len() != N_COMP {
        return Err(FlashError::InvalidInput(format!(
            "feed must have {} components, got {}",
            N_COMP,
            z.len()
        )));
    }
    if z.iter().any(|zi| !zi.is_finite() || *zi < 0.0) || z.sum() <= 0.0 {
        return Err(FlashError::InvalidInput(
            "feed mole fractions must be non-negative with a positive sum".into(),
        ));
    }
    let mut z = z.clone();
    normalize(&mut z);
    validate_inputs(&z, pressure, h_spec)?;

    let parameters = Rc::new(FlashParameters::from_options(options)?);
    let eos = PengRobinson::new(parameters.clone());
    let verbosity = options.verbosity;

    let cold_start = matches!(options.condition_type, OperatingCondition::Extreme);
    let mut t = estimate_initial_temperature(&parameters, &z, h_spec, cold_start);
    let mut eval = evaluate(&eos, t, pressure, &z, options, None)?;
    let mut prev_step = MAX_STEP / 2.0;

    log_iter!(
        verbosity,
        " iter |  temperature  |   residual    |  beta    "
    );
    log_iter!(verbosity, "{:-<48}", "");

    let mut iteration = 0;
    let mut residual = eval.h - h_spec;
    let mut tol = enthalpy_tolerance(classify_operating_condition(t, pressure), options);
    while iteration < MAX_ITER_OUTER {
        iteration += 1;
        if options.is_cancelled() {
            return Err(FlashError::Cancelled);
        }

        let condition = if options.adaptive_tolerance {
            classify_operating_condition(t, pressure)
        } else {
            options.condition_type
        };
        tol = enthalpy_tolerance(condition, options);
        residual = eval.h - h_spec;
        log_iter!(
            verbosity,
            " {:4} | {:11.5} K | {:13.6e} | {:8.6}",
            iteration,
            t,
            residual,
            eval.vle.beta
        );

        if residual.abs() <= tol {
            log_result!(
                verbosity,
                "P-H flash converged in {} iteration(s): T = {:.3} K, beta = {:.6}",
                iteration,
                t,
                eval.vle.beta
            );
            return finish(t, pressure, h_spec, &z, eval, iteration, false);
        }

        // enthalpy derivative, with the ideal-gas Cp as analytical backup
        let fd = finite_difference_dhdt(&eos, t, pressure, &z, options, &eval, tol);
        let direction = match fd {
            Some(d)
                if d.is_finite()
                    && d.abs() > 1e-12
                    && d.abs() <= options.max_reasonable_dhdt =>
            {
                clip(-residual / d, -MAX_STEP, MAX_STEP)
            }
            _ if options.analytical_backup => {
                let cp = eval.vle.beta
                    * ideal_gas_heat_capacity(&parameters.models, t, &eval.vle.y)
                    + (1.0 - eval.vle.beta)
                        * ideal_gas_heat_capacity(&parameters.models, t, &eval.vle.x);
                clip(-residual / cp, -MAX_STEP, MAX_STEP)
            }
            _ => -residual.signum() * (prev_step.abs() * 0.5).max(0.01),
        };

        // accept the first fraction of the Newton step that gives a real
        // residual reduction; d/4 is kept even without one, and the ladder
        // doubles as recovery when an evaluation fails outright
        let fractions: &[f64] = &[1.0, 0.5, 0.25];
        let mut advanced = false;
        for (rank, &frac) in fractions.iter().enumerate() {
            let t_try = clip(t + frac * direction, T_DOMAIN.0, T_DOMAIN.1);
            match evaluate(&eos, t_try, pressure, &z, options, Some(&eval.vle.k)) {
                Ok(next) => {
                    let improved =
                        (next.h - h_spec).abs() <= (1.0 - 1e-2) * residual.abs();
                    let last_resort = rank + 1 == fractions.len();
                    if improved || last_resort || !options.use_line_search {
                        prev_step = t_try - t;
                        t = t_try;
                        eval = next;
                        advanced = true;
                        break;
                    }
                }
                Err(_) => continue,
            }
        }
        if !advanced {
            return Err(FlashError::NotConverged {
                routine: "ph_flash_temperature_iteration",
                iterations: iteration,
                residual: residual.abs(),
            });
        }
    }

    residual = eval.h - h_spec;
    if residual.abs() < 5.0 * tol {
        log_result!(
            verbosity,
            "P-H flash stopped at the iteration cap with residual {:.3e} J/mol",
            residual
        );
        return finish(t, pressure, h_spec, &z, eval, iteration, true);
    }
    Err(FlashError::NotConverged {
        routine: "ph_flash_calculate",
        iterations: iteration,
        residual: residual.abs(),
    })
}

fn finish(
    t: f64,
    pressure: f64,
    h_spec: f64,
    z: &Array1<f64>,
    eval: Evaluation,
    iterations: usize,
    relaxed: bool,
) -> FlashResult<StateProperties> {
    let vle = eval.vle;
    if !vle.converged {
        return Err(FlashError::NotConverged {
            routine: "isothermal_flash",
            iterations: vle.iterations,
            residual: vle.residual,
        });
    }
    let status = if relaxed {
        FlashStatus::ToleranceRelaxed
    } else if let Some(phase) = vle.single_phase {
        FlashStatus::SinglePhase(phase)
    } else if (vle.z_v - vle.z_l).abs() < 1e-3
        || vle.k.iter().all(|ki| (ki - 1.0).abs() < 5e-3)
    {
        FlashStatus::CriticalRegion
    } else {
        FlashStatus::Converged
    };
    let state = StateProperties {
        temperature: t,
        pressure,
        beta: vle.beta,
        z: z.clone(),
        x: vle.x,
        y: vle.y,
        k: vle.k,
        z_l: vle.z_l,
        z_v: vle.z_v,
        phi_l: vle.phi_l,
        phi_v: vle.phi_v,
        h_l: eval.h_l,
        h_v: eval.h_v,
        h_calc: eval.h,
        h_spec,
        iterations,
        status,
    };
    state.validate()?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn input_validation() {
        let z = arr1(&[0.2, 0.2, 0.2, 0.2, 0.2]);
        validate_inputs(&z, 1e5, 0.0).unwrap();
        assert!(validate_inputs(&z, -1.0, 0.0).is_err());
        assert!(validate_inputs(&z, 1e9, 0.0).is_err());
        assert!(validate_inputs(&z, 1e5, f64::NAN).is_err());

        let short = arr1(&[0.5, 0.5]);
        assert!(validate_inputs(&short, 1e5, 0.0).is_err());

        let negative = arr1(&[-0.1, 0.4, 0.3, 0.2, 0.2]);
        assert!(validate_inputs(&negative, 1e5, 0.0).is_err());

        let unnormalized = arr1(&[0.4, 0.4, 0.4, 0.2, 0.2]);
        assert!(validate_inputs(&unnormalized, 1e5, 0.0).is_err());
    }

    #[test]
    fn condition_classification() {
        assert_eq!(
            classify_operating_condition(300.0, 5.0 * P_ATM),
            OperatingCondition::Standard
        );
        assert_eq!(
            classify_operating_condition(500.0, 5.0 * P_ATM),
            OperatingCondition::Difficult
        );
        assert_eq!(
            classify_operating_condition(300.0, 50.0 * P_ATM),
            OperatingCondition::Difficult
        );
        assert_eq!(
            classify_operating_condition(300.0, 200.0 * P_ATM),
            OperatingCondition::Extreme
        );
    }

    #[test]
    fn tolerance_scaling() {
        let options = FlashOptions::default();
        assert_eq!(
            enthalpy_tolerance(OperatingCondition::Standard, &options),
            5.0
        );
        assert_eq!(
            enthalpy_tolerance(OperatingCondition::Extreme, &options),
            150.0
        );

        let options = FlashOptions {
            tol_factor: 2.0,
            ..FlashOptions::default()
        };
        assert_eq!(
            enthalpy_tolerance(OperatingCondition::Difficult, &options),
            100.0
        );

        let options = FlashOptions {
            custom_enthalpy_tol: Some(0.5),
            ..FlashOptions::default()
        };
        assert_eq!(
            enthalpy_tolerance(OperatingCondition::Extreme, &options),
            0.5
        );
    }

    #[test]
    fn initial_temperature_brackets_the_target() {
        let parameters = FlashParameters::from_options(&FlashOptions::default()).unwrap();
        let z = arr1(&[0.0, 0.78, 0.21, 0.0, 0.01]);
        // H = 0 corresponds to the 298.15 K reference
        let t = estimate_initial_temperature(&parameters, &z, 0.0, false);
        assert!((250.0..350.0).contains(&t), "t0 = {}", t);

        let t_cold = estimate_initial_temperature(&parameters, &z, 0.0, true);
        assert!(t_cold < t);

        // targets below the window clamp to its lower edge
        let t = estimate_initial_temperature(&parameters, &z, -1e5, false);
        assert_eq!(t, T_BRACKET.0);
    }
}
