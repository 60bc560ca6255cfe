//! Pressure-enthalpy flash calculations for a fixed five-component
//! H₂/N₂/O₂/NH₃/H₂O mixture using the Peng-Robinson equation of state.
//!
//! The entry point is [`calculate`]: given a feed composition, a pressure and
//! a target molar enthalpy, it returns the temperature, vapor fraction and
//! phase compositions that close the mole balance, the isofugacity conditions
//! and the energy balance simultaneously. The solver nests an energy-balance
//! Newton iteration over temperature around an isothermal vapor-liquid
//! equilibrium loop with tangent-plane stability analysis, Rachford-Rice root
//! finding and Anderson-accelerated successive substitution.
//!
//! ```
//! use ndarray::arr1;
//! use ph_flash::{calculate, FlashOptions};
//!
//! # fn main() -> ph_flash::FlashResult<()> {
//! let z = arr1(&[0.0, 0.78, 0.21, 0.0, 0.01]);
//! let state = calculate(&z, 101325.0, 0.0, &FlashOptions::default())?;
//! assert!(state.beta > 0.99);
//! # Ok(())
//! # }
//! ```

mod enthalpy;
mod eos;
mod errors;
mod options;
mod parameter;
mod phase_equilibria;
mod state;
mod utils;

pub use enthalpy::EnthalpyModel;
pub use eos::{PengRobinson, PrMixtureParams};
pub use errors::{ErrorKind, FlashError, FlashResult};
pub use options::{BipSource, EosModel, FlashOptions, OperatingCondition};
pub use parameter::{
    critical_records, enthalpy_records, recommended_bip, unisim_bip, CriticalRecord,
    EnthalpyRecord, FlashParameters,
};
pub use phase_equilibria::{
    calculate, default_options, isothermal_flash, solve_rachford_rice, tpd_analysis,
    validate_inputs, Phase, RachfordRiceSolution, StabilityResult, VleSolution,
};
pub use state::{FlashStatus, StateProperties};
pub use utils::units;

/// Universal gas constant in J/(mol K).
pub const R: f64 = 8.314462618;

/// Number of components in the fixed mixture.
pub const N_COMP: usize = 5;

/// Reference temperature in K. Ideal-gas enthalpies are anchored to zero here.
pub const T_REFERENCE: f64 = 298.15;

/// Standard atmospheric pressure in Pa.
pub const P_ATM: f64 = 101325.0;

/// Component labels of the fixed mixture, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Hydrogen,
    Nitrogen,
    Oxygen,
    Ammonia,
    Water,
}

impl Component {
    /// All components in storage order (H₂ = 0 ... H₂O = 4).
    pub const ALL: [Component; N_COMP] = [
        Component::Hydrogen,
        Component::Nitrogen,
        Component::Oxygen,
        Component::Ammonia,
        Component::Water,
    ];

    /// Index of the component in composition vectors.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Component::Hydrogen => "H2",
            Component::Nitrogen => "N2",
            Component::Oxygen => "O2",
            Component::Ammonia => "NH3",
            Component::Water => "H2O",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Level of detail printed during iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Do not print anything.
    None,
    /// Print a summary line once an algorithm has finished.
    Result,
    /// Print a line for every iteration.
    Iter,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::None
    }
}

/// Print a line if the verbosity is set to [`Verbosity::Iter`].
#[macro_export]
macro_rules! log_iter {
    ($verbosity:expr, $($arg:tt)*) => {
        if let $crate::Verbosity::Iter = $verbosity {
            println!($($arg)*);
        }
    };
}

/// Print a line if the verbosity is at least [`Verbosity::Result`].
#[macro_export]
macro_rules! log_result {
    ($verbosity:expr, $($arg:tt)*) => {
        match $verbosity {
            $crate::Verbosity::Result | $crate::Verbosity::Iter => println!($($arg)*),
            _ => (),
        }
    };
}
