use thiserror::Error;

/// Errors raised while building or analysing a network.
///
/// Non-convergence is not an error: the power flow reports it through
/// [`crate::loadflow::PowerFlowOutcome::converged`].
#[derive(Error, Debug)]
pub enum GridError {
    /// A branch, load, generator or external grid names a bus that was never created.
    #[error("unknown bus '{name}' referenced by {element}")]
    UnknownBus { name: String, element: String },

    /// Two buses share a name, so name lookups would be ambiguous.
    #[error("duplicate bus name '{0}'")]
    DuplicateBus(String),

    #[error("unknown {kind} standard type '{name}' referenced by {element}")]
    UnknownStdType {
        kind: &'static str,
        name: String,
        element: String,
    },

    /// An element carries a value the models cannot work with.
    #[error("invalid parameter for {element}: {reason}")]
    InvalidParameter { element: String, reason: String },

    #[error("network has no in-service external grid")]
    NoExternalGrid,

    #[error("external grid '{0}' has no short-circuit power (s_sc_max_mva)")]
    MissingShortCircuitData(String),

    #[error("bus index {0} is out of range")]
    BusOutOfRange(usize),

    /// Linear algebra failure outside the Newton iteration (e.g. a singular impedance matrix).
    #[error("numerical error: {0}")]
    Numerical(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type GridResult<T> = Result<T, GridError>;
