//! Ideal-gas enthalpies from piecewise Shomate / NASA-7 polynomials.
//!
//! Each component joins a Shomate fit and a NASA-7 fit at a per-component
//! crossover temperature. The two fits carry different reference conventions
//! (the NASA polynomials embed the enthalpy of formation), so the pieces are
//! stitched at initialization: the NASA-7 integration constant absorbs the
//! offset observed at the crossover, and both pieces are then re-anchored so
//! that H = 0 at 298.15 K for every component.

use crate::parameter::EnthalpyRecord;
use crate::{R, T_REFERENCE};
use ndarray::Array1;

/// Pieces must agree at the crossover within this bound before stitching is
/// considered necessary, in J/mol.
const CONTINUITY_TOL: f64 = 1.0;

fn shomate_enthalpy(c: &[f64; 7], t: f64) -> f64 {
    // NIST convention: H(T) - H(298.15) in kJ/mol with t in 1000 K.
    let t = t / 1000.0;
    1000.0
        * (c[0] * t + c[1] * t.powi(2) / 2.0 + c[2] * t.powi(3) / 3.0 + c[3] * t.powi(4) / 4.0
            - c[4] / t
            + c[5]
            - c[6])
}

fn shomate_cp(c: &[f64; 7], t: f64) -> f64 {
    let t = t / 1000.0;
    c[0] + c[1] * t + c[2] * t.powi(2) + c[3] * t.powi(3) + c[4] / t.powi(2)
}

fn nasa7_enthalpy(a: &[f64; 7], t: f64) -> f64 {
    R * t
        * (a[0]
            + a[1] * t / 2.0
            + a[2] * t.powi(2) / 3.0
            + a[3] * t.powi(3) / 4.0
            + a[4] * t.powi(4) / 5.0
            + a[5] / t)
}

fn nasa7_cp(a: &[f64; 7], t: f64) -> f64 {
    R * (a[0] + a[1] * t + a[2] * t.powi(2) + a[3] * t.powi(3) + a[4] * t.powi(4))
}

/// Stitched ideal-gas enthalpy model of a single component.
#[derive(Debug, Clone)]
pub struct EnthalpyModel {
    shomate: [f64; 7],
    nasa7: [f64; 7],
    t_switch: f64,
    nasa_below: bool,
}

impl EnthalpyModel {
    /// Build the model from raw coefficients, enforcing continuity at the
    /// crossover and anchoring H = 0 at the 298.15 K reference.
    pub fn from_record(record: &EnthalpyRecord) -> Self {
        let mut model = Self {
            shomate: record.shomate,
            nasa7: record.nasa7,
            t_switch: record.t_switch,
            nasa_below: record.nasa_below,
        };

        // A shift of the a6 coefficient moves the NASA-7 enthalpy by R*da6
        // independent of temperature, so one shift heals the whole range.
        let offset = nasa7_enthalpy(&model.nasa7, model.t_switch)
            - shomate_enthalpy(&model.shomate, model.t_switch);
        if offset.abs() > CONTINUITY_TOL {
            model.nasa7[5] -= offset / R;
        }

        let h_ref = model.enthalpy(T_REFERENCE);
        model.shomate[5] -= h_ref / 1000.0;
        model.nasa7[5] -= h_ref / R;
        model
    }

    fn use_nasa(&self, t: f64) -> bool {
        (t < self.t_switch) == self.nasa_below
    }

    /// Ideal-gas enthalpy in J/mol, zero at 298.15 K.
    pub fn enthalpy(&self, t: f64) -> f64 {
        if self.use_nasa(t) {
            nasa7_enthalpy(&self.nasa7, t)
        } else {
            shomate_enthalpy(&self.shomate, t)
        }
    }

    /// Ideal-gas isobaric heat capacity in J/(mol K).
    pub fn heat_capacity(&self, t: f64) -> f64 {
        if self.use_nasa(t) {
            nasa7_cp(&self.nasa7, t)
        } else {
            shomate_cp(&self.shomate, t)
        }
    }
}

/// Mixture ideal-gas enthalpy H_ig(T, w) = Σ w_i H_ig,i(T) in J/mol.
pub fn ideal_gas_enthalpy(models: &[EnthalpyModel], t: f64, w: &Array1<f64>) -> f64 {
    models
        .iter()
        .zip(w.iter())
        .map(|(m, wi)| wi * m.enthalpy(t))
        .sum()
}

/// Mixture ideal-gas heat capacity in J/(mol K). Used as the analytical
/// backup when the finite-difference enthalpy derivative degenerates.
pub fn ideal_gas_heat_capacity(models: &[EnthalpyModel], t: f64, w: &Array1<f64>) -> f64 {
    models
        .iter()
        .zip(w.iter())
        .map(|(m, wi)| wi * m.heat_capacity(t))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::enthalpy_records;
    use crate::Component;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    fn models() -> Vec<EnthalpyModel> {
        enthalpy_records()
            .iter()
            .map(EnthalpyModel::from_record)
            .collect()
    }

    #[test]
    fn reference_is_zero_at_298() {
        for model in models() {
            assert!(model.enthalpy(T_REFERENCE).abs() < 1e-9);
        }
    }

    #[test]
    fn pieces_join_continuously() {
        for (model, record) in models().iter().zip(enthalpy_records().iter()) {
            let below = model.enthalpy(record.t_switch - 1e-6);
            let above = model.enthalpy(record.t_switch + 1e-6);
            assert!(
                (below - above).abs() < CONTINUITY_TOL,
                "discontinuity of {} J/mol at {} K",
                below - above,
                record.t_switch
            );
        }
    }

    #[test]
    fn water_uses_nasa_piece_below_crossover() {
        let record = &enthalpy_records()[Component::Water.index()];
        assert!(record.nasa_below);
        let model = EnthalpyModel::from_record(record);
        // still smooth and monotone through the crossover
        assert!(model.enthalpy(400.0) < model.enthalpy(499.0));
        assert!(model.enthalpy(499.0) < model.enthalpy(501.0));
    }

    #[test]
    fn heat_capacities_are_physical() {
        for model in models() {
            for &t in &[200.0, 298.15, 400.0, 700.0, 1000.0] {
                let cp = model.heat_capacity(t);
                // gas-phase Cp of small molecules: between 5/2 R and ~7 R
                assert!(cp > 20.0 && cp < 60.0, "cp = {} at {} K", cp, t);
            }
        }
    }

    #[test]
    fn heat_capacity_matches_enthalpy_slope() {
        for model in models() {
            for &t in &[250.0, 350.0, 600.0] {
                let h = 1e-3;
                let slope = (model.enthalpy(t + h) - model.enthalpy(t - h)) / (2.0 * h);
                assert_relative_eq!(slope, model.heat_capacity(t), max_relative = 1e-4);
            }
        }
    }

    #[test]
    fn nitrogen_sensible_heat() {
        let model = &models()[Component::Nitrogen.index()];
        // N2 from 298.15 K to 500 K: about 5.9 kJ/mol (NIST)
        assert_relative_eq!(model.enthalpy(500.0), 5911.0, max_relative = 2e-2);
    }

    #[test]
    fn mixture_enthalpy_is_mole_weighted() {
        let models = models();
        let w = arr1(&[0.0, 0.5, 0.5, 0.0, 0.0]);
        let h = ideal_gas_enthalpy(&models, 400.0, &w);
        let expected = 0.5 * models[1].enthalpy(400.0) + 0.5 * models[2].enthalpy(400.0);
        assert_relative_eq!(h, expected, max_relative = 1e-12);
        assert!(ideal_gas_heat_capacity(&models, 400.0, &w) > 0.0);
    }
}
