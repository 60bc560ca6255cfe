//! Phase-equilibrium solvers: Rachford-Rice material balance, tangent-plane
//! stability analysis, the Anderson-accelerated isothermal VLE loop and the
//! pressure-enthalpy flash driver on top of them.

mod anderson;
mod ph_flash;
mod rachford_rice;
mod stability;
mod vle;

pub use ph_flash::{calculate, default_options, validate_inputs};
pub use rachford_rice::{solve_rachford_rice, RachfordRiceSolution};
pub use stability::{tpd_analysis, StabilityResult};
pub use vle::{isothermal_flash, VleSolution};

/// Fluid phase label. States that have not seen the equation of state yet
/// are represented as `Option<Phase>`, so an "unknown" phase value cannot
/// leak into results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Liquid,
    Vapor,
}

impl Phase {
    pub fn other(&self) -> Phase {
        match self {
            Phase::Liquid => Phase::Vapor,
            Phase::Vapor => Phase::Liquid,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Liquid => write!(f, "liquid"),
            Phase::Vapor => write!(f, "vapor"),
        }
    }
}
