use crate::phase_equilibria::Phase;
use thiserror::Error;

/// Coarse classification of flash failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Numerical,
    Convergence,
    Physical,
    Algorithm,
    NotImplemented,
    Internal,
}

/// Error type for invalid inputs, numeric breakdowns and convergence problems.
///
/// Variants carry the routine name, the iteration count and the residual
/// magnitude where those are meaningful, so a host can log the failure
/// without the solver keeping any global state.
#[derive(Error, Debug, Clone)]
pub enum FlashError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("`{routine}` produced a non-finite value in iteration {iteration}")]
    InvalidResult {
        routine: &'static str,
        iteration: usize,
    },
    #[error("no real compressibility root above the covolume for the {0} phase")]
    NoCubicRoot(Phase),
    #[error("ill-conditioned least-squares system in `{0}`")]
    SingularMatrix(&'static str),
    #[error("`{routine}` did not converge within {iterations} iterations (residual {residual:.3e})")]
    NotConverged {
        routine: &'static str,
        iterations: usize,
        residual: f64,
    },
    #[error("Rachford-Rice iteration stalled at beta = {beta:.6} (residual {residual:.3e})")]
    RachfordRice { beta: f64, residual: f64 },
    #[error("iteration collapsed onto the trivial solution")]
    TrivialSolution,
    #[error("negative composition in `{0}`")]
    NegativeComposition(&'static str),
    #[error("fugacity balance violated by {0:.3e} in the converged state")]
    FugacityImbalance(f64),
    #[error("physically impossible state: {0}")]
    ImpossibleState(String),
    #[error("{feature} is not implemented")]
    NotImplemented { feature: &'static str },
    #[error("calculation cancelled by the host")]
    Cancelled,
    #[error("internal invariant violated in `{0}`")]
    Internal(&'static str),
}

impl FlashError {
    /// The coarse error kind this variant belongs to.
    pub fn kind(&self) -> ErrorKind {
        use FlashError::*;
        match self {
            InvalidInput(_) => ErrorKind::Input,
            InvalidResult { .. } | NoCubicRoot(_) | SingularMatrix(_) => ErrorKind::Numerical,
            NotConverged { .. } | Cancelled => ErrorKind::Convergence,
            TrivialSolution | NegativeComposition(_) | FugacityImbalance(_)
            | ImpossibleState(_) => ErrorKind::Physical,
            RachfordRice { .. } => ErrorKind::Algorithm,
            NotImplemented { .. } => ErrorKind::NotImplemented,
            Internal(_) => ErrorKind::Internal,
        }
    }

    /// One-line advice a host may log next to the error message.
    pub fn suggested_action(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Input => "check composition, pressure and enthalpy ranges",
            ErrorKind::Numerical => {
                "retry with a larger damping factor or without Anderson acceleration"
            }
            ErrorKind::Convergence => {
                "relax the enthalpy tolerance or mark the case as a difficult condition"
            }
            ErrorKind::Physical => {
                "verify that the specification lies inside the two-phase envelope"
            }
            ErrorKind::Algorithm => "restart from a perturbed feed composition",
            ErrorKind::NotImplemented => "select the Peng-Robinson model",
            ErrorKind::Internal => "report the input that triggered this",
        }
    }
}

/// Convenience type for `Result<T, FlashError>`.
pub type FlashResult<T> = Result<T, FlashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_messages() {
        let e = FlashError::NotConverged {
            routine: "isothermal_flash",
            iterations: 100,
            residual: 3.2e-4,
        };
        assert_eq!(e.kind(), ErrorKind::Convergence);
        assert!(e.to_string().contains("isothermal_flash"));
        assert!(e.to_string().contains("100"));

        let e = FlashError::NoCubicRoot(Phase::Liquid);
        assert_eq!(e.kind(), ErrorKind::Numerical);
        assert!(e.to_string().contains("liquid"));
        assert!(!e.suggested_action().is_empty());
    }
}
