//! System composition errors.

use gd_components::ComponentError;
use gd_core::CoreError;
use gd_solver::SolverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SystemError {
    /// An object was offered to a slot or container that cannot hold it.
    #[error("Structural mismatch: {container} cannot hold a {found} (expects {expected})")]
    StructuralMismatch {
        container: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("No {what} named '{name}'")]
    NotFound { what: &'static str, name: String },

    #[error("Duplicate {what} name '{name}'")]
    Duplicate { what: &'static str, name: String },

    #[error("Component {name}: {source}")]
    Component {
        name: String,
        #[source]
        source: ComponentError,
    },

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type SystemResult<T> = Result<T, SystemError>;

impl SystemError {
    pub fn component(name: &str, source: ComponentError) -> Self {
        Self::Component {
            name: name.to_string(),
            source,
        }
    }
}

impl From<SystemError> for SolverError {
    fn from(err: SystemError) -> Self {
        match err {
            SystemError::Solver(e) => e,
            SystemError::Component { name, source } => SolverError::Component { name, source },
            other => SolverError::ProblemSetup {
                what: other.to_string(),
            },
        }
    }
}
