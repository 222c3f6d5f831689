//! Error types for component operations.

use gd_core::error::CoreError;
use gd_core::units::Unit;
use thiserror::Error;

use crate::cosim::UnitStatus;
use crate::traits::ComponentKind;

/// Errors that can occur while configuring or evaluating a component.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Unrecognized parameter: {field}")]
    UnrecognizedParameter { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: &'static str },

    #[error("Unit mismatch: cannot convert {from} to {to}")]
    UnitMismatch { from: Unit, to: Unit },

    #[error("Unknown unit: {name}")]
    UnknownUnit { name: String },

    #[error("Unknown model type: {model}")]
    UnknownModel { model: String },

    #[error("Structurally incomplete configuration: {what}")]
    Structure { what: &'static str },

    #[error("Structural mismatch: expected {expected}, found {found}")]
    StructuralMismatch {
        expected: &'static str,
        found: ComponentKind,
    },

    #[error("Convergence failed: {what}")]
    ConvergenceFailure { what: String },

    #[error("External unit discarded the result: {what}")]
    Discard { what: String },

    #[error("External unit returned {status:?}: {what}")]
    External { status: UnitStatus, what: String },
}

pub type ComponentResult<T> = Result<T, ComponentError>;

impl ComponentError {
    pub fn unrecognized(field: &str) -> Self {
        ComponentError::UnrecognizedParameter {
            field: field.to_string(),
        }
    }

    /// Recoverable configuration problems that a loader may log and skip.
    pub fn is_parameter_error(&self) -> bool {
        matches!(
            self,
            ComponentError::UnrecognizedParameter { .. } | ComponentError::InvalidValue { .. }
        )
    }
}

impl From<CoreError> for ComponentError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnitMismatch { from, to } => ComponentError::UnitMismatch { from, to },
            CoreError::UnknownUnit { name } => ComponentError::UnknownUnit { name },
            CoreError::NonFinite { what, .. } => ComponentError::InvalidValue {
                field: what.to_string(),
                reason: "value must be finite",
            },
            CoreError::IndexOob { what, .. } => ComponentError::InvalidValue {
                field: what.to_string(),
                reason: "index out of bounds",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ComponentError::unrecognized("kq");
        assert!(err.to_string().contains("kq"));
        assert!(err.is_parameter_error());
    }

    #[test]
    fn unit_mismatch_conversion() {
        let core = CoreError::UnitMismatch {
            from: Unit::Second,
            to: Unit::Megawatt,
        };
        let err: ComponentError = core.into();
        assert!(matches!(err, ComponentError::UnitMismatch { .. }));
        assert!(!err.is_parameter_error());
    }
}
