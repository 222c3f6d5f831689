// gd-core/src/units.rs

use core::fmt;

use uom::si::f64::{
    Angle as UomAngle, AngularVelocity as UomAngularVelocity,
    ElectricPotential as UomElectricPotential, Frequency as UomFrequency, Power as UomPower,
    Ratio as UomRatio, Time as UomTime,
};

use crate::error::{CoreError, CoreResult};

// Public canonical unit types (SI, f64)
pub type Angle = UomAngle;
pub type AngularVelocity = UomAngularVelocity;
pub type Frequency = UomFrequency;
pub type Power = UomPower;
pub type Ratio = UomRatio;
pub type Time = UomTime;
pub type Voltage = UomElectricPotential;

/// Physical quantity a unit measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Time,
    Frequency,
    Angle,
    Power,
    Voltage,
    Dimensionless,
}

/// Units accepted on the configuration surface.
///
/// `Default` means "already in the field's internal base unit" and is never converted.
/// `PerUnit` is relative to a [`PuBase`] chosen by the quantity of the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    #[default]
    Default,
    PerUnit,
    Second,
    Millisecond,
    Minute,
    Hour,
    Hertz,
    RadianPerSecond,
    Radian,
    Degree,
    Watt,
    Kilowatt,
    Megawatt,
    Volt,
    Kilovolt,
    Ratio,
    Percent,
}

impl Unit {
    /// Quantity measured by this unit; `None` for the relative units.
    pub fn quantity(self) -> Option<Quantity> {
        match self {
            Unit::Default | Unit::PerUnit => None,
            Unit::Second | Unit::Millisecond | Unit::Minute | Unit::Hour => Some(Quantity::Time),
            Unit::Hertz | Unit::RadianPerSecond => Some(Quantity::Frequency),
            Unit::Radian | Unit::Degree => Some(Quantity::Angle),
            Unit::Watt | Unit::Kilowatt | Unit::Megawatt => Some(Quantity::Power),
            Unit::Volt | Unit::Kilovolt => Some(Quantity::Voltage),
            Unit::Ratio | Unit::Percent => Some(Quantity::Dimensionless),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Default => "default",
            Unit::PerUnit => "pu",
            Unit::Second => "s",
            Unit::Millisecond => "ms",
            Unit::Minute => "min",
            Unit::Hour => "hr",
            Unit::Hertz => "Hz",
            Unit::RadianPerSecond => "rad/s",
            Unit::Radian => "rad",
            Unit::Degree => "deg",
            Unit::Watt => "W",
            Unit::Kilowatt => "kW",
            Unit::Megawatt => "MW",
            Unit::Volt => "V",
            Unit::Kilovolt => "kV",
            Unit::Ratio => "ratio",
            Unit::Percent => "%",
        }
    }

    /// Parse a unit name as written in model files (case-insensitive).
    pub fn parse(name: &str) -> CoreResult<Unit> {
        let unit = match name.trim().to_ascii_lowercase().as_str() {
            "" | "default" | "def" => Unit::Default,
            "pu" | "p.u." | "perunit" => Unit::PerUnit,
            "s" | "sec" | "second" | "seconds" => Unit::Second,
            "ms" | "millisecond" | "milliseconds" => Unit::Millisecond,
            "min" | "minute" | "minutes" => Unit::Minute,
            "hr" | "h" | "hour" | "hours" => Unit::Hour,
            "hz" => Unit::Hertz,
            "rad/s" | "rps" | "radpersec" => Unit::RadianPerSecond,
            "rad" | "radian" | "radians" => Unit::Radian,
            "deg" | "degree" | "degrees" => Unit::Degree,
            "w" | "watt" | "watts" => Unit::Watt,
            "kw" | "kilowatt" => Unit::Kilowatt,
            "mw" | "megawatt" | "mva" | "mvar" => Unit::Megawatt,
            "v" | "volt" | "volts" => Unit::Volt,
            "kv" | "kilovolt" => Unit::Kilovolt,
            "ratio" => Unit::Ratio,
            "%" | "pct" | "percent" => Unit::Percent,
            _ => {
                return Err(CoreError::UnknownUnit {
                    name: name.to_string(),
                });
            }
        };
        Ok(unit)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Bases used when converting between per-unit and physical values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuBase {
    pub power_mw: f64,
    pub voltage_kv: f64,
    pub frequency_hz: f64,
}

impl Default for PuBase {
    fn default() -> Self {
        Self {
            power_mw: 100.0,
            voltage_kv: 1.0,
            frequency_hz: 60.0,
        }
    }
}

impl PuBase {
    pub fn with_power(power_mw: f64) -> Self {
        Self {
            power_mw,
            ..Self::default()
        }
    }

    /// Base value expressed in the SI unit of `q`.
    fn si_base(&self, q: Quantity, from: Unit, to: Unit) -> CoreResult<f64> {
        match q {
            Quantity::Power => Ok(self.power_mw * 1e6),
            Quantity::Voltage => Ok(self.voltage_kv * 1e3),
            Quantity::Frequency => Ok(self.frequency_hz),
            Quantity::Dimensionless => Ok(1.0),
            Quantity::Time | Quantity::Angle => Err(CoreError::UnitMismatch { from, to }),
        }
    }
}

fn to_si(value: f64, unit: Unit) -> f64 {
    use uom::si::{
        angle::{degree, radian},
        angular_velocity::radian_per_second,
        electric_potential::{kilovolt, volt},
        frequency::hertz,
        power::{kilowatt, megawatt, watt},
        ratio::{percent, ratio},
        time::{hour, millisecond, minute, second},
    };
    match unit {
        Unit::Default | Unit::PerUnit => value,
        Unit::Second => Time::new::<second>(value).get::<second>(),
        Unit::Millisecond => Time::new::<millisecond>(value).get::<second>(),
        Unit::Minute => Time::new::<minute>(value).get::<second>(),
        Unit::Hour => Time::new::<hour>(value).get::<second>(),
        Unit::Hertz => Frequency::new::<hertz>(value).get::<hertz>(),
        Unit::RadianPerSecond => {
            AngularVelocity::new::<radian_per_second>(value).get::<radian_per_second>()
                / core::f64::consts::TAU
        }
        Unit::Radian => Angle::new::<radian>(value).get::<radian>(),
        Unit::Degree => Angle::new::<degree>(value).get::<radian>(),
        Unit::Watt => Power::new::<watt>(value).get::<watt>(),
        Unit::Kilowatt => Power::new::<kilowatt>(value).get::<watt>(),
        Unit::Megawatt => Power::new::<megawatt>(value).get::<watt>(),
        Unit::Volt => Voltage::new::<volt>(value).get::<volt>(),
        Unit::Kilovolt => Voltage::new::<kilovolt>(value).get::<volt>(),
        Unit::Ratio => Ratio::new::<ratio>(value).get::<ratio>(),
        Unit::Percent => Ratio::new::<percent>(value).get::<ratio>(),
    }
}

fn from_si(value: f64, unit: Unit) -> f64 {
    use uom::si::{
        angle::{degree, radian},
        electric_potential::{kilovolt, volt},
        frequency::hertz,
        power::{kilowatt, megawatt, watt},
        ratio::{percent, ratio},
        time::{hour, millisecond, minute, second},
    };
    match unit {
        Unit::Default | Unit::PerUnit => value,
        Unit::Second => Time::new::<second>(value).get::<second>(),
        Unit::Millisecond => Time::new::<second>(value).get::<millisecond>(),
        Unit::Minute => Time::new::<second>(value).get::<minute>(),
        Unit::Hour => Time::new::<second>(value).get::<hour>(),
        Unit::Hertz => Frequency::new::<hertz>(value).get::<hertz>(),
        Unit::RadianPerSecond => value * core::f64::consts::TAU,
        Unit::Radian => Angle::new::<radian>(value).get::<radian>(),
        Unit::Degree => Angle::new::<radian>(value).get::<degree>(),
        Unit::Watt => Power::new::<watt>(value).get::<watt>(),
        Unit::Kilowatt => Power::new::<watt>(value).get::<kilowatt>(),
        Unit::Megawatt => Power::new::<watt>(value).get::<megawatt>(),
        Unit::Volt => Voltage::new::<volt>(value).get::<volt>(),
        Unit::Kilovolt => Voltage::new::<volt>(value).get::<kilovolt>(),
        Unit::Ratio => Ratio::new::<ratio>(value).get::<ratio>(),
        Unit::Percent => Ratio::new::<ratio>(value).get::<percent>(),
    }
}

/// Convert `value` from `from` to `to`.
///
/// Either side being [`Unit::Default`] means no conversion. Per-unit values are scaled by the
/// base matching the physical side's quantity; time and angle have no per-unit base.
pub fn convert(value: f64, from: Unit, to: Unit, base: &PuBase) -> CoreResult<f64> {
    if from == to || from == Unit::Default || to == Unit::Default {
        return Ok(value);
    }
    match (from.quantity(), to.quantity()) {
        (Some(qf), Some(qt)) if qf == qt => Ok(from_si(to_si(value, from), to)),
        (Some(_), Some(_)) => Err(CoreError::UnitMismatch { from, to }),
        (None, Some(q)) => Ok(from_si(value * base.si_base(q, from, to)?, to)),
        (Some(q), None) => Ok(to_si(value, from) / base.si_base(q, from, to)?),
        (None, None) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::{Tolerances, nearly_equal};

    fn close(a: f64, b: f64) -> bool {
        nearly_equal(a, b, Tolerances::default())
    }

    #[test]
    fn time_conversions() {
        let base = PuBase::default();
        assert!(close(
            convert(20.0, Unit::Millisecond, Unit::Second, &base).unwrap(),
            0.02
        ));
        assert!(close(
            convert(1.5, Unit::Minute, Unit::Second, &base).unwrap(),
            90.0
        ));
    }

    #[test]
    fn per_unit_power_uses_base() {
        let base = PuBase::with_power(50.0);
        assert!(close(
            convert(25.0, Unit::Megawatt, Unit::PerUnit, &base).unwrap(),
            0.5
        ));
        assert!(close(
            convert(0.5, Unit::PerUnit, Unit::Kilowatt, &base).unwrap(),
            25_000.0
        ));
    }

    #[test]
    fn angle_and_frequency() {
        let base = PuBase::default();
        let rad = convert(180.0, Unit::Degree, Unit::Radian, &base).unwrap();
        assert!(close(rad, core::f64::consts::PI));
        let hz = convert(core::f64::consts::TAU * 60.0, Unit::RadianPerSecond, Unit::Hertz, &base)
            .unwrap();
        assert!(close(hz, 60.0));
        assert!(close(
            convert(61.2, Unit::Hertz, Unit::PerUnit, &base).unwrap(),
            1.02
        ));
    }

    #[test]
    fn incompatible_quantities_fail() {
        let base = PuBase::default();
        let err = convert(1.0, Unit::Second, Unit::Megawatt, &base).unwrap_err();
        assert_eq!(
            err,
            CoreError::UnitMismatch {
                from: Unit::Second,
                to: Unit::Megawatt
            }
        );
        assert!(convert(1.0, Unit::PerUnit, Unit::Second, &base).is_err());
    }

    #[test]
    fn default_unit_is_identity() {
        let base = PuBase::default();
        assert_eq!(convert(3.0, Unit::Default, Unit::Second, &base).unwrap(), 3.0);
        assert_eq!(convert(3.0, Unit::Megawatt, Unit::Default, &base).unwrap(), 3.0);
    }

    #[test]
    fn parse_names() {
        assert_eq!(Unit::parse("MS").unwrap(), Unit::Millisecond);
        assert_eq!(Unit::parse("deg").unwrap(), Unit::Degree);
        assert_eq!(Unit::parse(" pu ").unwrap(), Unit::PerUnit);
        assert!(matches!(
            Unit::parse("furlong"),
            Err(CoreError::UnknownUnit { .. })
        ));
    }
}
