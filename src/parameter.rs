//! Static parameter tables for the fixed H₂/N₂/O₂/NH₃/H₂O mixture and the
//! [`FlashParameters`] assembly consumed by the equation of state.

use crate::enthalpy::EnthalpyModel;
use crate::errors::{FlashError, FlashResult};
use crate::options::{BipSource, FlashOptions};
use crate::N_COMP;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Critical constants and molar mass of a single component.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CriticalRecord {
    pub name: String,
    /// critical temperature in Kelvin
    pub tc: f64,
    /// critical pressure in Pascal
    pub pc: f64,
    /// acentric factor
    pub acentric_factor: f64,
    /// molar mass in g/mol
    pub molar_mass: f64,
}

impl std::fmt::Display for CriticalRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CriticalRecord({}: tc={} K", self.name, self.tc)?;
        write!(f, ", pc={} Pa", self.pc)?;
        write!(f, ", acentric factor={})", self.acentric_factor)
    }
}

/// Piecewise ideal-gas enthalpy coefficients of a single component.
///
/// `shomate` holds the NIST coefficients `[A, B, C, D, E, F, H]` (the entropy
/// coefficient G is not needed for enthalpies); `nasa7` holds the seven NASA
/// polynomial coefficients `a1..a7`. One piece is valid below `t_switch`, the
/// other above; `nasa_below` selects which. The pieces are stitched together
/// during initialization, see [`EnthalpyModel::from_record`].
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EnthalpyRecord {
    pub shomate: [f64; 7],
    pub nasa7: [f64; 7],
    /// crossover temperature between the two pieces in Kelvin
    pub t_switch: f64,
    /// true if the NASA-7 piece covers temperatures below `t_switch`
    pub nasa_below: bool,
    /// validity window in Kelvin
    pub t_min: f64,
    pub t_max: f64,
}

/// Critical property table (DIPPR-style constants).
pub fn critical_records() -> [CriticalRecord; N_COMP] {
    let rec = |name: &str, tc: f64, pc: f64, acentric_factor: f64, molar_mass: f64| CriticalRecord {
        name: name.to_string(),
        tc,
        pc,
        acentric_factor,
        molar_mass,
    };
    [
        rec("H2", 33.19, 1.313e6, -0.216, 2.0159),
        rec("N2", 126.19, 3.3958e6, 0.0372, 28.0134),
        rec("O2", 154.58, 5.043e6, 0.0222, 31.9988),
        rec("NH3", 405.40, 11.333e6, 0.2526, 17.0305),
        rec("H2O", 647.096, 22.064e6, 0.3443, 18.0153),
    ]
}

/// Ideal-gas enthalpy coefficient table.
///
/// Shomate coefficients follow the NIST gas-phase tables, the NASA-7 sets are
/// the low-temperature GRI-Mech fits. Water is the one component whose NASA-7
/// piece sits *below* the crossover: its Shomate fit is only valid above
/// 500 K.
pub fn enthalpy_records() -> [EnthalpyRecord; N_COMP] {
    [
        // H2
        EnthalpyRecord {
            shomate: [
                33.066178, -11.363417, 11.432816, -2.772874, -0.158558, -9.980797, 0.0,
            ],
            nasa7: [
                2.34433112,
                7.98052075e-3,
                -1.94781510e-5,
                2.01572094e-8,
                -7.37611761e-12,
                -917.935173,
                0.683010238,
            ],
            t_switch: 1000.0,
            nasa_below: false,
            t_min: 100.0,
            t_max: 1500.0,
        },
        // N2
        EnthalpyRecord {
            shomate: [
                28.98641, 1.853978, -9.647459, 16.63537, 0.000117, -8.671914, 0.0,
            ],
            nasa7: [
                3.298677,
                1.4082404e-3,
                -3.963222e-6,
                5.641515e-9,
                -2.444854e-12,
                -1020.8999,
                3.950372,
            ],
            t_switch: 500.0,
            nasa_below: false,
            t_min: 100.0,
            t_max: 1500.0,
        },
        // O2
        EnthalpyRecord {
            shomate: [
                31.32234, -20.23531, 57.86644, -36.50624, -0.007374, -8.903471, 0.0,
            ],
            nasa7: [
                3.78245636,
                -2.99673416e-3,
                9.84730201e-6,
                -9.68129509e-9,
                3.24372837e-12,
                -1063.94356,
                3.65767573,
            ],
            t_switch: 700.0,
            nasa_below: false,
            t_min: 100.0,
            t_max: 1500.0,
        },
        // NH3
        EnthalpyRecord {
            shomate: [
                19.99563, 49.77119, -15.37599, 1.921168, 0.189174, -53.30667, -45.89806,
            ],
            nasa7: [
                4.28602740,
                -4.66052300e-3,
                2.17185100e-5,
                -2.28088900e-8,
                8.26380460e-12,
                -6741.72850,
                -0.625372770,
            ],
            t_switch: 1000.0,
            nasa_below: false,
            t_min: 100.0,
            t_max: 1400.0,
        },
        // H2O: NASA-7 below 500 K, Shomate above
        EnthalpyRecord {
            shomate: [
                30.09200, 6.832514, 6.793435, -2.534480, 0.082139, -250.8810, -241.8264,
            ],
            nasa7: [
                4.19864056,
                -2.0364341e-3,
                6.52040211e-6,
                -5.48797062e-9,
                1.77197817e-12,
                -30293.7267,
                -0.849032208,
            ],
            t_switch: 500.0,
            nasa_below: true,
            t_min: 100.0,
            t_max: 1700.0,
        },
    ]
}

/// Engineering-recommended binary interaction parameters.
pub fn recommended_bip() -> Array2<f64> {
    bip_from_upper(&[
        // H2-N2, H2-O2, H2-NH3, H2-H2O
        0.103, 0.10, 0.0, 0.0, //
        // N2-O2, N2-NH3, N2-H2O
        -0.0119, 0.2193, 0.325, //
        // O2-NH3, O2-H2O
        0.14, 0.33, //
        // NH3-H2O
        -0.2589,
    ])
}

/// Binary interaction parameters matching the UniSim databank.
pub fn unisim_bip() -> Array2<f64> {
    bip_from_upper(&[
        0.0711, 0.0, 0.0, 0.0, //
        -0.012, 0.25, 0.48, //
        0.10, 0.36, //
        -0.25,
    ])
}

fn bip_from_upper(upper: &[f64]) -> Array2<f64> {
    let mut kij = Array2::zeros((N_COMP, N_COMP));
    let mut it = upper.iter();
    for i in 0..N_COMP {
        for j in (i + 1)..N_COMP {
            let k = *it.next().unwrap();
            kij[(i, j)] = k;
            kij[(j, i)] = k;
        }
    }
    kij
}

/// Check symmetry, zero diagonal and magnitude of a user-supplied BIP matrix.
pub fn validate_bip(kij: &Array2<f64>) -> FlashResult<()> {
    if kij.shape() != [N_COMP, N_COMP] {
        return Err(FlashError::InvalidInput(format!(
            "BIP matrix must be {0}x{0}",
            N_COMP
        )));
    }
    for i in 0..N_COMP {
        if kij[(i, i)] != 0.0 {
            return Err(FlashError::InvalidInput(
                "BIP matrix must have a zero diagonal".into(),
            ));
        }
        for j in 0..N_COMP {
            let k = kij[(i, j)];
            if !k.is_finite() || k.abs() > 0.5 {
                return Err(FlashError::InvalidInput(format!(
                    "BIP k({},{}) = {} outside |kij| <= 0.5",
                    i, j, k
                )));
            }
            if (k - kij[(j, i)]).abs() > 1e-12 {
                return Err(FlashError::InvalidInput(
                    "BIP matrix must be symmetric".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Assembled parameter set for one flash invocation.
pub struct FlashParameters {
    pub critical: [CriticalRecord; N_COMP],
    pub models: [EnthalpyModel; N_COMP],
    pub kij: Array2<f64>,
    pub quantum_h2: bool,
}

impl FlashParameters {
    /// Build the parameter set selected by the options.
    ///
    /// Stitches the enthalpy pieces together (continuity at the crossover,
    /// reference anchored to H = 0 at 298.15 K) and validates a custom BIP
    /// matrix if one is supplied.
    pub fn from_options(options: &FlashOptions) -> FlashResult<Self> {
        let kij = match &options.bip_source {
            BipSource::Recommended => recommended_bip(),
            BipSource::Unisim => unisim_bip(),
            BipSource::Custom(kij) => {
                validate_bip(kij)?;
                kij.clone()
            }
        };
        let records = enthalpy_records();
        let models = [
            EnthalpyModel::from_record(&records[0]),
            EnthalpyModel::from_record(&records[1]),
            EnthalpyModel::from_record(&records[2]),
            EnthalpyModel::from_record(&records[3]),
            EnthalpyModel::from_record(&records[4]),
        ];
        Ok(Self {
            critical: critical_records(),
            models,
            kij,
            quantum_h2: options.quantum_h2,
        })
    }

    pub fn tc(&self) -> Array1<f64> {
        Array1::from_iter(self.critical.iter().map(|r| r.tc))
    }

    pub fn pc(&self) -> Array1<f64> {
        Array1::from_iter(self.critical.iter().map(|r| r.pc))
    }

    pub fn acentric_factor(&self) -> Array1<f64> {
        Array1::from_iter(self.critical.iter().map(|r| r.acentric_factor))
    }

    /// Mixture molar mass in g/mol for a given composition.
    pub fn molar_mass(&self, w: &Array1<f64>) -> f64 {
        self.critical
            .iter()
            .zip(w.iter())
            .map(|(r, wi)| r.molar_mass * wi)
            .sum()
    }
}
