//! Flash configuration: equation-of-state selection, binary interaction
//! source and the numerical toggles of the nested solvers.

use crate::errors::{FlashError, FlashResult};
use crate::parameter::validate_bip;
use crate::Verbosity;
use ndarray::Array2;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Equation of state used by the flash.
///
/// Only Peng-Robinson is implemented; the associating PR-CPA extension of
/// the options layout is reserved. [`FlashOptions::validate`] is the single
/// rejection point should a non-PR variant ever be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EosModel {
    PengRobinson,
}

/// Source of the binary interaction parameter matrix.
#[derive(Debug, Clone)]
pub enum BipSource {
    /// Engineering-recommended values.
    Recommended,
    /// Values matching the UniSim databank.
    Unisim,
    /// A caller-supplied matrix; must be symmetric with a zero diagonal and
    /// |kij| ≤ 0.5.
    Custom(Array2<f64>),
}

/// Difficulty class of the operating point, controlling the enthalpy
/// tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingCondition {
    /// 1-10 atm and 250-400 K.
    Standard,
    /// Elevated pressure or temperature outside the standard window.
    Difficult,
    /// Very high pressure combined with a standard-range temperature.
    Extreme,
}

/// Options of a flash invocation.
#[derive(Debug, Clone)]
pub struct FlashOptions {
    // physical model
    pub eos_model: EosModel,
    /// Apply the temperature-dependent effective critical constants to H₂.
    pub quantum_h2: bool,
    pub bip_source: BipSource,

    // inner-loop numerics
    pub use_anderson: bool,
    pub use_line_search: bool,
    /// Initial damping factor of the successive-substitution step, in (0, 1].
    pub damping: f64,

    // tolerance control
    /// Multiplier on the enthalpy tolerance for known-difficult cases.
    pub tol_factor: f64,
    /// Classify the operating condition from (T, P) instead of trusting
    /// `condition_type`.
    pub adaptive_tolerance: bool,
    pub condition_type: OperatingCondition,
    /// Overrides the adaptive enthalpy tolerance when set, in J/mol.
    pub custom_enthalpy_tol: Option<f64>,

    // enthalpy derivative control
    /// Adapt the finite-difference perturbation to the local dH/dT scale.
    pub adaptive_derivative: bool,
    /// Manual temperature perturbation in K; `None` selects it automatically.
    pub derivative_perturbation: Option<f64>,
    /// Substitute an ideal-gas Cp estimate when the finite difference
    /// degenerates.
    pub analytical_backup: bool,
    /// Sanity bound on |dH/dT| in J/(mol K).
    pub max_reasonable_dhdt: f64,

    // host integration
    pub verbosity: Verbosity,
    /// Checked at iteration boundaries of the VLE and temperature loops.
    pub cancellation: Option<Arc<AtomicBool>>,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            eos_model: EosModel::PengRobinson,
            quantum_h2: true,
            bip_source: BipSource::Recommended,
            use_anderson: true,
            use_line_search: true,
            damping: 0.5,
            tol_factor: 1.0,
            adaptive_tolerance: true,
            condition_type: OperatingCondition::Standard,
            custom_enthalpy_tol: None,
            adaptive_derivative: true,
            derivative_perturbation: None,
            analytical_backup: true,
            max_reasonable_dhdt: 1e6,
            verbosity: Verbosity::None,
            cancellation: None,
        }
    }
}

impl FlashOptions {
    pub fn validate(&self) -> FlashResult<()> {
        match self.eos_model {
            EosModel::PengRobinson => (),
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(FlashError::InvalidInput(format!(
                "damping factor {} outside (0, 1]",
                self.damping
            )));
        }
        if !(self.tol_factor > 0.0 && self.tol_factor.is_finite()) {
            return Err(FlashError::InvalidInput(format!(
                "tolerance factor {} must be positive",
                self.tol_factor
            )));
        }
        if let Some(tol) = self.custom_enthalpy_tol {
            if !(tol > 0.0 && tol.is_finite()) {
                return Err(FlashError::InvalidInput(format!(
                    "custom enthalpy tolerance {} must be positive",
                    tol
                )));
            }
        }
        if let Some(h) = self.derivative_perturbation {
            if !(h > 0.0 && h.is_finite()) {
                return Err(FlashError::InvalidInput(format!(
                    "derivative perturbation {} must be positive",
                    h
                )));
            }
        }
        if !(self.max_reasonable_dhdt > 0.0) {
            return Err(FlashError::InvalidInput(
                "dH/dT sanity bound must be positive".into(),
            ));
        }
        if let BipSource::Custom(kij) = &self.bip_source {
            validate_bip(kij)?;
        }
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::recommended_bip;

    #[test]
    fn defaults_are_valid() {
        let options = FlashOptions::default();
        options.validate().unwrap();
        assert!(options.use_anderson);
        assert!(options.use_line_search);
        assert!(options.quantum_h2);
        assert!(options.adaptive_tolerance);
        assert_eq!(options.damping, 0.5);
        assert!(matches!(options.bip_source, BipSource::Recommended));
    }

    #[test]
    fn rejects_bad_numerics() {
        let options = FlashOptions {
            damping: 0.0,
            ..FlashOptions::default()
        };
        assert!(options.validate().is_err());

        let options = FlashOptions {
            custom_enthalpy_tol: Some(-5.0),
            ..FlashOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn validates_custom_bip() {
        let mut kij = recommended_bip();
        kij[(0, 4)] = 0.9;
        kij[(4, 0)] = 0.9;
        let options = FlashOptions {
            bip_source: BipSource::Custom(kij),
            ..FlashOptions::default()
        };
        assert!(options.validate().is_err());

        let options = FlashOptions {
            bip_source: BipSource::Custom(recommended_bip()),
            ..FlashOptions::default()
        };
        options.validate().unwrap();
    }

    #[test]
    fn cancellation_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let options = FlashOptions {
            cancellation: Some(flag.clone()),
            ..FlashOptions::default()
        };
        assert!(!options.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(options.is_cancelled());
    }
}
