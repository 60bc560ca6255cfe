//! Michelsen tangent-plane stability analysis.
//!
//! Up to seven trial compositions are driven toward stationary points of the
//! tangent-plane distance around the feed. Any non-trivial stationary point
//! with a negative modified TPD proves the feed unstable; the most negative
//! trial seeds the equilibrium calculation.

use super::vle::wilson_k;
use crate::eos::PengRobinson;
use crate::errors::FlashResult;
use crate::log_iter;
use crate::utils::max_abs_diff;
use crate::Verbosity;
use ndarray::Array1;

const MAX_ITER_TPD: usize = 20;
const MAX_TPD_TRIALS: usize = 7;
const TOL_TPD: f64 = 1e-8;
/// Stationary points closer to the feed than this are trivial.
const TOL_TRIVIAL: f64 = 1e-3;
/// Feed mole fractions below this do not participate in the test.
const Z_EPS: f64 = 1e-15;

/// Outcome of the stability test at fixed temperature and pressure.
#[derive(Debug, Clone)]
pub struct StabilityResult {
    /// True if a non-trivial trial produced TPD* < −1e-8.
    pub unstable: bool,
    /// The most negative modified tangent-plane distance observed.
    pub tpd_min: f64,
    /// Composition of the most unstable direction, if any trial survived the
    /// trivial-solution filter.
    pub trial: Option<Array1<f64>>,
    /// Runner-up composition used for re-seeding after a trivial collapse.
    pub second_trial: Option<Array1<f64>>,
}

fn trial_seeds(eos: &PengRobinson, t: f64, p: f64, z: &Array1<f64>) -> Vec<Array1<f64>> {
    let n = z.len();
    let k = wilson_k(eos.parameters(), t, p);
    let mut seeds = Vec::with_capacity(MAX_TPD_TRIALS);

    // Wilson vapor-like and liquid-like directions
    let mut vapor = z * &k;
    let mut liquid = z / &k;
    normalize_seed(&mut vapor);
    normalize_seed(&mut liquid);
    seeds.push(vapor);
    seeds.push(liquid);

    // pure-dominant seeds for the major feed components
    let mut order: Vec<usize> = (0..n).filter(|&i| z[i] > 0.01).collect();
    order.sort_by(|&a, &b| z[b].total_cmp(&z[a]));
    for &i in order.iter().take(MAX_TPD_TRIALS - 3) {
        let mut w = Array1::from_elem(n, 0.2 / (n - 1) as f64);
        w[i] = 0.8;
        seeds.push(w);
    }

    // perturbed feed
    let mut perturbed = z * 0.9 + Array1::from_elem(n, 0.1 / n as f64);
    normalize_seed(&mut perturbed);
    seeds.push(perturbed);

    seeds.truncate(MAX_TPD_TRIALS);
    seeds
}

fn normalize_seed(w: &mut Array1<f64>) {
    w.mapv_inplace(|wi| wi.max(0.0));
    let sum = w.sum();
    if sum > 0.0 {
        w.mapv_inplace(|wi| wi / sum);
    }
}

/// Tangent-plane stability test around the feed `z` at `(t, p)`.
///
/// Fugacities of both the feed and the trial compositions use minimum-Gibbs
/// root selection, so no phase identity has to be assumed up front.
pub fn tpd_analysis(
    eos: &PengRobinson,
    t: f64,
    p: f64,
    z: &Array1<f64>,
    verbosity: Verbosity,
) -> FlashResult<StabilityResult> {
    let n = z.len();
    let ln_phi_z = eos.ln_phi_min_gibbs(t, p, z)?;
    let support: Vec<usize> = (0..n).filter(|&i| z[i] > Z_EPS).collect();

    let mut result = StabilityResult {
        unstable: false,
        tpd_min: f64::INFINITY,
        trial: None,
        second_trial: None,
    };

    for (trial_index, seed) in trial_seeds(eos, t, p, z).into_iter().enumerate() {
        // work in W-space: capital W carries the tangent-plane scaling
        let mut w_cap = seed;
        let mut w = w_cap.clone();
        let mut failed = false;

        for _ in 0..MAX_ITER_TPD {
            let ln_phi_w = match eos.ln_phi_min_gibbs(t, p, &w) {
                Ok(v) => v,
                Err(_) => {
                    failed = true;
                    break;
                }
            };
            let mut residual = 0.0f64;
            let mut w_next = Array1::zeros(n);
            for &i in &support {
                let ln_w = z[i].ln() + ln_phi_z[i] - ln_phi_w[i];
                w_next[i] = ln_w.exp();
                if w_cap[i] > 0.0 {
                    residual = residual.max((ln_w - w_cap[i].ln()).abs());
                }
            }
            w_cap = w_next;
            w = w_cap.clone();
            normalize_seed(&mut w);
            if residual < TOL_TPD {
                break;
            }
        }
        if failed {
            continue;
        }

        let ln_phi_w = match eos.ln_phi_min_gibbs(t, p, &w) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let mut tpd = 1.0;
        for &i in &support {
            if w_cap[i] > 0.0 {
                tpd += w_cap[i]
                    * (w_cap[i].ln() + ln_phi_w[i] - z[i].ln() - ln_phi_z[i] - 1.0);
            }
        }

        let trivial = max_abs_diff(&w, z) < TOL_TRIVIAL;
        log_iter!(
            verbosity,
            "tpd trial {:2}: tpd* = {:12.5e}{}",
            trial_index,
            tpd,
            if trivial { " (trivial)" } else { "" }
        );
        if trivial || !tpd.is_finite() {
            continue;
        }

        if tpd < result.tpd_min {
            result.second_trial = result.trial.take();
            result.tpd_min = tpd;
            result.trial = Some(w);
        } else if result.second_trial.is_none() {
            result.second_trial = Some(w);
        }
    }

    result.unstable = result.trial.is_some() && result.tpd_min < -TOL_TPD;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::FlashOptions;
    use crate::parameter::FlashParameters;
    use ndarray::arr1;
    use std::rc::Rc;

    fn eos() -> PengRobinson {
        let options = FlashOptions::default();
        PengRobinson::new(Rc::new(FlashParameters::from_options(&options).unwrap()))
    }

    #[test]
    fn dilute_air_is_stable() {
        let eos = eos();
        let z = arr1(&[0.0, 0.78, 0.21, 0.0, 0.01]);
        let result = tpd_analysis(&eos, 350.0, 101325.0, &z, Verbosity::None).unwrap();
        assert!(!result.unstable, "tpd_min = {}", result.tpd_min);
    }

    #[test]
    fn wet_ammonia_splits_at_depressed_temperature() {
        let eos = eos();
        let z = arr1(&[0.0, 0.0, 0.0, 0.5, 0.5]);
        // well inside the two-phase region at 10 bar
        let result = tpd_analysis(&eos, 380.0, 1e6, &z, Verbosity::None).unwrap();
        assert!(result.unstable, "tpd_min = {}", result.tpd_min);
        let trial = result.trial.expect("unstable result must carry a trial");
        assert!((trial.sum() - 1.0).abs() < 1e-8);
        assert!(max_abs_diff(&trial, &z) > 1e-3);
    }

    #[test]
    fn hot_lean_feed_is_stable() {
        let eos = eos();
        let z = arr1(&[0.2, 0.6, 0.15, 0.05, 0.0]);
        let result = tpd_analysis(&eos, 600.0, 1e5, &z, Verbosity::None).unwrap();
        assert!(!result.unstable);
    }
}
