//! Error types for solver operations.

use gd_components::ComponentError;
use gd_core::error::CoreError;
use thiserror::Error;

/// Errors that can occur while assembling or advancing the global system.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Problem setup error: {what}")]
    ProblemSetup { what: String },

    #[error("Convergence failed: {what}")]
    ConvergenceFailure { what: String },

    #[error("Invalid state: {what}")]
    InvalidState { what: String },

    #[error("Offsets are stale; reassign before evaluating")]
    StaleOffsets,

    #[error("Component {name}: {source}")]
    Component {
        name: String,
        #[source]
        source: ComponentError,
    },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Numeric error: {what}")]
    Numeric { what: String },
}

pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    /// Attach the failing component's name to a component error.
    pub fn component(name: &str, source: ComponentError) -> Self {
        SolverError::Component {
            name: name.to_string(),
            source,
        }
    }
}

impl From<ComponentError> for SolverError {
    fn from(source: ComponentError) -> Self {
        SolverError::Component {
            name: String::from("?"),
            source,
        }
    }
}
