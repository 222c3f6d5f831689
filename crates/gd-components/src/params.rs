//! Parameter-name parsing and unit handling for the configuration surface.

use gd_core::units::{PuBase, Unit, convert};

use crate::error::ComponentResult;
use crate::traits::DaeComponent;

/// A configuration key split into its normalized name and optional inline unit.
///
/// `"Ka"` → `ka`, `"Ta(ms)"` → `ta` in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamField {
    pub name: String,
    pub unit: Option<Unit>,
}

impl ParamField {
    pub fn parse(raw: &str) -> ComponentResult<ParamField> {
        let raw = raw.trim();
        if let Some(open) = raw.find('(') {
            if let Some(body) = raw[open + 1..].strip_suffix(')') {
                let unit = Unit::parse(body)?;
                return Ok(ParamField {
                    name: raw[..open].trim().to_ascii_lowercase(),
                    unit: Some(unit),
                });
            }
        }
        Ok(ParamField {
            name: raw.to_ascii_lowercase(),
            unit: None,
        })
    }

    /// Explicit unit wins; otherwise the inline suffix; otherwise `Default`.
    pub fn effective_unit(&self, explicit: Unit) -> Unit {
        match explicit {
            Unit::Default => self.unit.unwrap_or(Unit::Default),
            u => u,
        }
    }
}

/// A parameter value as read from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

/// Set a parameter by raw key, honouring an inline unit suffix.
pub fn set_param(
    comp: &mut dyn DaeComponent,
    raw_field: &str,
    value: &ParamValue,
    unit: Unit,
) -> ComponentResult<()> {
    let field = ParamField::parse(raw_field)?;
    match value {
        ParamValue::Number(v) => comp.set(&field.name, *v, field.effective_unit(unit)),
        ParamValue::Text(s) => comp.set_str(&field.name, s),
    }
}

/// Read a numeric parameter by raw key, honouring an inline unit suffix.
pub fn get_param(comp: &dyn DaeComponent, raw_field: &str, unit: Unit) -> ComponentResult<f64> {
    let field = ParamField::parse(raw_field)?;
    comp.get(&field.name, field.effective_unit(unit))
}

/// Convert a caller value into the field's internal base unit.
#[inline]
pub fn to_base(value: f64, unit: Unit, base_unit: Unit, pu: &PuBase) -> ComponentResult<f64> {
    Ok(convert(value, unit, base_unit, pu)?)
}

/// Convert an internal value into the caller's unit.
#[inline]
pub fn from_base(value: f64, base_unit: Unit, unit: Unit, pu: &PuBase) -> ComponentResult<f64> {
    Ok(convert(value, base_unit, unit, pu)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComponentError;

    #[test]
    fn parses_inline_unit() {
        let f = ParamField::parse("Ta(ms)").unwrap();
        assert_eq!(f.name, "ta");
        assert_eq!(f.unit, Some(Unit::Millisecond));
        assert_eq!(f.effective_unit(Unit::Default), Unit::Millisecond);
        assert_eq!(f.effective_unit(Unit::Second), Unit::Second);
    }

    #[test]
    fn plain_name_is_lowercased() {
        let f = ParamField::parse(" Vrmax ").unwrap();
        assert_eq!(f.name, "vrmax");
        assert!(f.unit.is_none());
    }

    #[test]
    fn unknown_suffix_is_rejected() {
        let err = ParamField::parse("ta(fortnights)").unwrap_err();
        assert!(matches!(err, ComponentError::UnknownUnit { .. }));
    }

    #[test]
    fn base_conversion() {
        let pu = PuBase::default();
        let v = to_base(200.0, Unit::Millisecond, Unit::Second, &pu).unwrap();
        assert!((v - 0.2).abs() < 1e-12);
        let back = from_base(v, Unit::Second, Unit::Millisecond, &pu).unwrap();
        assert!((back - 200.0).abs() < 1e-9);
    }
}
