//! Common utilities for component calculations.

use crate::error::{ComponentError, ComponentResult};
use gd_core::numeric::ensure_finite;

/// Ensure a value is finite, returning ComponentError if not.
pub fn check_finite(value: f64, what: &'static str) -> ComponentResult<f64> {
    Ok(ensure_finite(value, what)?)
}

/// Reject non-positive time constants and gains used as divisors.
pub fn check_positive(value: f64, field: &str) -> ComponentResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ComponentError::InvalidValue {
            field: field.to_string(),
            reason: "must be positive",
        })
    }
}

/// Copy `values` into `out[start..]`, failing when the buffer is too short.
pub fn write_block(out: &mut [f64], start: usize, values: &[f64]) -> ComponentResult<()> {
    let dest = out
        .get_mut(start..start + values.len())
        .ok_or(ComponentError::Structure {
            what: "result buffer shorter than assigned offsets",
        })?;
    dest.copy_from_slice(values);
    Ok(())
}

/// Write a single slot, failing when out of range.
pub fn write_at(out: &mut [f64], index: usize, value: f64) -> ComponentResult<()> {
    write_block(out, index, &[value])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_finite() {
        assert!(check_finite(1.0, "test").is_ok());
        assert!(check_finite(f64::INFINITY, "test").is_err());
        assert!(check_finite(f64::NAN, "test").is_err());
    }

    #[test]
    fn test_check_positive() {
        assert!(check_positive(0.2, "ta").is_ok());
        let err = check_positive(0.0, "ta").unwrap_err();
        assert!(err.is_parameter_error());
    }

    #[test]
    fn test_write_block() {
        let mut buf = [0.0; 4];
        write_block(&mut buf, 1, &[1.0, 2.0]).unwrap();
        assert_eq!(buf, [0.0, 1.0, 2.0, 0.0]);
        assert!(write_block(&mut buf, 3, &[1.0, 2.0]).is_err());
        assert!(write_at(&mut buf, 4, 1.0).is_err());
    }
}
