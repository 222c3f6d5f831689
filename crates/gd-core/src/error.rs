use thiserror::Error;

use crate::units::Unit;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Unit mismatch: cannot convert {from} to {to}")]
    UnitMismatch { from: Unit, to: Unit },

    #[error("Unknown unit: {name}")]
    UnknownUnit { name: String },
}
