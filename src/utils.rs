//! Small numeric helpers shared by the solvers, plus unit conversions for
//! hosts that work in non-SI units.

use ndarray::Array1;

/// Restrict a value to the closed interval [min, max].
pub(crate) fn clip(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Largest absolute elementwise difference between two vectors.
pub(crate) fn max_abs_diff(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(ai, bi)| (ai - bi).abs())
        .fold(0.0, f64::max)
}

/// Normalize a composition in place. Returns the original sum.
///
/// A non-positive or non-finite sum leaves the vector untouched so the
/// caller can surface a meaningful error.
pub(crate) fn normalize(w: &mut Array1<f64>) -> f64 {
    let sum = w.sum();
    if sum > 0.0 && sum.is_finite() {
        w.mapv_inplace(|wi| wi / sum);
    }
    sum
}

/// Unit conversions for temperature, pressure and molar enthalpy.
pub mod units {
    /// Temperature units understood by [`convert_temperature`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TemperatureUnit {
        Kelvin,
        Celsius,
        Fahrenheit,
    }

    /// Pressure units understood by [`convert_pressure`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PressureUnit {
        Pascal,
        Kilopascal,
        Megapascal,
        Bar,
        Atmosphere,
    }

    /// Enthalpy units understood by [`convert_enthalpy`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EnthalpyUnit {
        JoulePerMole,
        KilojoulePerMole,
        JoulePerKilogram,
        KilojoulePerKilogram,
    }

    pub fn convert_temperature(value: f64, from: TemperatureUnit, to: TemperatureUnit) -> f64 {
        use TemperatureUnit::*;
        let kelvin = match from {
            Kelvin => value,
            Celsius => value + 273.15,
            Fahrenheit => (value - 32.0) / 1.8 + 273.15,
        };
        match to {
            Kelvin => kelvin,
            Celsius => kelvin - 273.15,
            Fahrenheit => (kelvin - 273.15) * 1.8 + 32.0,
        }
    }

    pub fn convert_pressure(value: f64, from: PressureUnit, to: PressureUnit) -> f64 {
        use PressureUnit::*;
        fn factor(unit: PressureUnit) -> f64 {
            match unit {
                Pascal => 1.0,
                Kilopascal => 1e3,
                Megapascal => 1e6,
                Bar => 1e5,
                Atmosphere => 101325.0,
            }
        }
        value * factor(from) / factor(to)
    }

    /// Convert a molar or specific enthalpy. `molar_mass` is in g/mol and is
    /// only consulted when crossing between the molar and mass basis.
    pub fn convert_enthalpy(value: f64, from: EnthalpyUnit, to: EnthalpyUnit, molar_mass: f64) -> f64 {
        use EnthalpyUnit::*;
        // to J/mol
        let joule_per_mole = match from {
            JoulePerMole => value,
            KilojoulePerMole => value * 1e3,
            JoulePerKilogram => value * molar_mass * 1e-3,
            KilojoulePerKilogram => value * molar_mass,
        };
        match to {
            JoulePerMole => joule_per_mole,
            KilojoulePerMole => joule_per_mole * 1e-3,
            JoulePerKilogram => joule_per_mole / (molar_mass * 1e-3),
            KilojoulePerKilogram => joule_per_mole / molar_mass,
        }
    }
}
