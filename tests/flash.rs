//! End-to-end pressure-enthalpy flash scenarios and the round-trip laws of
//! the solver.

use approx::assert_relative_eq;
use ndarray::{arr1, Array1};
use ph_flash::{
    calculate, isothermal_flash, FlashOptions, FlashParameters, FlashResult, FlashStatus,
    PengRobinson, Phase, StateProperties,
};
use std::rc::Rc;

fn assert_finite(state: &StateProperties) {
    assert!(state.temperature.is_finite());
    assert!(state.beta.is_finite());
    assert!(state.h_calc.is_finite());
    for w in [&state.x, &state.y, &state.k, &state.phi_l, &state.phi_v].iter() {
        assert!(w.iter().all(|v| v.is_finite()));
    }
}

fn enthalpy_residual(state: &StateProperties) -> f64 {
    (state.h_calc - state.h_spec).abs()
}

#[test]
fn lean_syngas_flashes_to_vapor() -> FlashResult<()> {
    let z = arr1(&[0.2, 0.6, 0.15, 0.05, 0.0]);
    let state = calculate(&z, 1e5, 1.0e4, &FlashOptions::default())?;
    assert_finite(&state);
    assert!(state.beta > 0.999, "beta = {}", state.beta);
    // ~10 kJ/mol of sensible heat above the 298 K reference
    assert!(
        state.temperature > 500.0 && state.temperature < 750.0,
        "T = {}",
        state.temperature
    );
    assert!(enthalpy_residual(&state) <= 50.0);
    state.validate()?;
    Ok(())
}

#[test]
fn cold_ammonia_water_is_liquid_dominated() -> FlashResult<()> {
    let z = arr1(&[0.0, 0.0, 0.0, 0.5, 0.5]);
    let state = calculate(&z, 1e6, -4.0e4, &FlashOptions::default())?;
    assert_finite(&state);
    assert!(state.beta < 0.6, "beta = {}", state.beta);
    assert!(state.temperature < 330.0, "T = {}", state.temperature);
    if state.beta > 1e-6 && state.beta < 1.0 - 1e-6 {
        // the liquid holds the water
        assert!(state.x[4] > state.y[4]);
    }
    assert!(enthalpy_residual(&state) <= 250.0);
    state.validate()?;
    Ok(())
}

#[test]
fn hydrogen_rich_high_pressure_feed() -> FlashResult<()> {
    let z = arr1(&[0.9, 0.0, 0.0, 0.05, 0.05]);
    let state = calculate(&z, 2e7, 3.0e3, &FlashOptions::default())?;
    assert_finite(&state);
    assert!(state.beta > 0.9, "beta = {}", state.beta);
    assert!(
        state.temperature > 330.0 && state.temperature < 470.0,
        "T = {}",
        state.temperature
    );
    // dense states must keep the phase ordering
    assert!(state.z_v >= state.z_l);
    assert!(enthalpy_residual(&state) <= 750.0);

    // the classical path must converge as well
    let classical = FlashOptions {
        quantum_h2: false,
        ..FlashOptions::default()
    };
    let state = calculate(&z, 2e7, 3.0e3, &classical)?;
    assert!(state.beta > 0.9);
    Ok(())
}

#[test]
fn moist_air_at_reference_enthalpy() -> FlashResult<()> {
    let z = arr1(&[0.0, 0.78, 0.21, 0.0, 0.01]);
    let state = calculate(&z, 1.01325e5, 0.0, &FlashOptions::default())?;
    assert_finite(&state);
    assert!(state.beta > 0.999);
    assert_eq!(state.status, FlashStatus::SinglePhase(Phase::Vapor));
    // the ideal-gas reference sits at 298.15 K and the departure at 1 atm is
    // only a few J/mol
    assert!(
        (290.0..306.0).contains(&state.temperature),
        "T = {}",
        state.temperature
    );
    assert!(enthalpy_residual(&state) <= 5.0);
    Ok(())
}

#[test]
fn difficult_condition_with_heavy_condensables() {
    let z = arr1(&[0.1, 0.1, 0.1, 0.35, 0.35]);
    let state = calculate(&z, 5e6, -3.5e4, &FlashOptions::default())
        .expect("difficult condition must still produce a state");
    assert_finite(&state);
    assert!(state.beta >= 0.0 && state.beta <= 1.0);
    // adaptive tolerance: difficult-class bound times the cap relaxation
    assert!(enthalpy_residual(&state) <= 5.0 * 50.0);
    state.validate().unwrap();
}

#[test]
fn isothermal_resolve_reproduces_the_flash_split() -> FlashResult<()> {
    let z = arr1(&[0.0, 0.0, 0.0, 0.5, 0.5]);
    let options = FlashOptions::default();
    let state = calculate(&z, 1e6, -2.0e4, &options)?;

    let parameters = Rc::new(FlashParameters::from_options(&options)?);
    let eos = PengRobinson::new(parameters);
    let vle = isothermal_flash(&eos, state.temperature, 1e6, &z, &options, None)?;
    assert_relative_eq!(vle.beta, state.beta, epsilon = 1e-4);
    for i in 0..z.len() {
        assert_relative_eq!(vle.x[i], state.x[i], epsilon = 1e-4);
        assert_relative_eq!(vle.y[i], state.y[i], epsilon = 1e-4);
    }
    Ok(())
}

#[test]
fn enthalpy_round_trip_reproduces_temperature() -> FlashResult<()> {
    let z = arr1(&[0.0, 0.78, 0.21, 0.0, 0.01]);
    let options = FlashOptions::default();
    let first = calculate(&z, 1.01325e5, 0.0, &options)?;
    let second = calculate(&z, 1.01325e5, first.h_calc, &options)?;
    assert_relative_eq!(first.temperature, second.temperature, epsilon = 0.5);
    Ok(())
}

#[test]
fn uniform_feed_scaling_changes_nothing() -> FlashResult<()> {
    let z = arr1(&[0.2, 0.6, 0.15, 0.05, 0.0]);
    let scaled: Array1<f64> = &z * 3.0;
    let options = FlashOptions::default();
    let a = calculate(&z, 1e5, 1.0e4, &options)?;
    let b = calculate(&scaled, 1e5, 1.0e4, &options)?;
    assert_relative_eq!(a.temperature, b.temperature, epsilon = 1e-9);
    assert_relative_eq!(a.beta, b.beta, epsilon = 1e-12);
    Ok(())
}

#[test]
fn pure_component_feeds_stay_single_phase() -> FlashResult<()> {
    // superheated steam
    let z = arr1(&[0.0, 0.0, 0.0, 0.0, 1.0]);
    let state = calculate(&z, 1e5, 8.0e3, &FlashOptions::default())?;
    assert!(state.is_single_phase());
    assert!(state.beta == 0.0 || state.beta == 1.0);
    assert_relative_eq!(state.y[4], 1.0, epsilon = 1e-12);

    // cold liquid water
    let state = calculate(&z, 1e5, -4.5e4, &FlashOptions::default())?;
    assert!(state.is_single_phase());
    assert_eq!(state.status, FlashStatus::SinglePhase(Phase::Liquid));
    Ok(())
}

#[test]
fn sub_triple_water_never_returns_nan() {
    let z = arr1(&[0.0, 0.05, 0.05, 0.0, 0.9]);
    match calculate(&z, 1e5, -5.2e4, &FlashOptions::default()) {
        Ok(state) => {
            assert_finite(&state);
            assert!(state.temperature < 280.0);
        }
        // an impossible-state or convergence report is acceptable, silence
        // or NaN is not
        Err(e) => {
            assert!(!e.to_string().is_empty());
        }
    }
}

#[test]
fn cancellation_stops_the_solver() {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    let flag = Arc::new(AtomicBool::new(true));
    let options = FlashOptions {
        cancellation: Some(flag),
        ..FlashOptions::default()
    };
    let z = arr1(&[0.0, 0.0, 0.0, 0.5, 0.5]);
    match calculate(&z, 1e6, -2.0e4, &options) {
        Err(ph_flash::FlashError::Cancelled) => (),
        other => panic!("expected cancellation, got {:?}", other.map(|s| s.status)),
    }
}

#[test]
fn bounded_fuzz_over_benign_gas_targets() {
    // deterministic xorshift; targets are ideal-gas enthalpies of vapor-ish
    // temperatures, so the overwhelming majority of cases must converge
    let mut seed: u64 = 0x9e3779b97f4a7c15;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        (seed >> 11) as f64 / (1u64 << 53) as f64
    };

    let options = FlashOptions::default();
    let parameters = FlashParameters::from_options(&options).unwrap();
    let mut converged = 0;
    let total = 60;
    for _ in 0..total {
        let mut z = arr1(&[next(), next(), next(), next(), next()]);
        let sum = z.sum();
        z.mapv_inplace(|v| v / sum);
        let pressure = 1e5 * 10f64.powf(next());
        let t_target = 300.0 + 200.0 * next();
        let h_spec: f64 = parameters
            .models
            .iter()
            .zip(z.iter())
            .map(|(m, zi)| zi * m.enthalpy(t_target))
            .sum();
        match calculate(&z, pressure, h_spec, &options) {
            Ok(state) => {
                assert_finite(&state);
                state.validate().unwrap();
                converged += 1;
            }
            Err(_) => (),
        }
    }
    assert!(
        converged * 10 >= total * 8,
        "only {}/{} fuzz cases converged",
        converged,
        total
    );
}
