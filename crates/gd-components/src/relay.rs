//! Protective relay watching a bus voltage or frequency.
//!
//! Inputs: `[V, f]` in per unit. One root per relay: positive while the measured signal is on
//! the healthy side of the threshold. A trip is irreversible and only taken when the check
//! level allows it; setting `reset` re-arms the relay.

use std::any::Any;
use std::fmt;

use gd_core::units::Unit;
use tracing::info;

use crate::error::{ComponentError, ComponentResult};
use crate::flags::{InitFlags, OpFlags};
use crate::io::IoData;
use crate::mode::{ChangeCode, CheckLevel, SolverMode};
use crate::offsets::ComponentSizes;
use crate::params::{from_base, to_base};
use crate::state::StateData;
use crate::traits::{
    CloneTarget, Cloned, ComponentCore, ComponentKind, DaeComponent, clone_into_target,
};

const V_IN: usize = 0;
const F_IN: usize = 1;

const FIELDS: &[&str] = &["threshold", "basepower"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCondition {
    UnderVoltage,
    OverVoltage,
    UnderFrequency,
    OverFrequency,
}

impl RelayCondition {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "undervoltage" | "uv" => Some(Self::UnderVoltage),
            "overvoltage" | "ov" => Some(Self::OverVoltage),
            "underfrequency" | "uf" => Some(Self::UnderFrequency),
            "overfrequency" | "of" => Some(Self::OverFrequency),
            _ => None,
        }
    }

    fn input(self) -> usize {
        match self {
            Self::UnderVoltage | Self::OverVoltage => V_IN,
            Self::UnderFrequency | Self::OverFrequency => F_IN,
        }
    }

    /// Signed margin; negative once the condition is violated.
    fn margin(self, value: f64, threshold: f64) -> f64 {
        match self {
            Self::UnderVoltage | Self::UnderFrequency => value - threshold,
            Self::OverVoltage | Self::OverFrequency => threshold - value,
        }
    }
}

impl fmt::Display for RelayCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnderVoltage => "undervoltage",
            Self::OverVoltage => "overvoltage",
            Self::UnderFrequency => "underfrequency",
            Self::OverFrequency => "overfrequency",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Relay {
    core: ComponentCore,
    pub condition: RelayCondition,
    pub threshold: f64,
}

impl Relay {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: ComponentCore::new(name),
            condition: RelayCondition::UnderVoltage,
            threshold: 0.8,
        }
    }

    pub fn with_condition(mut self, condition: RelayCondition, threshold: f64) -> Self {
        self.condition = condition;
        self.threshold = threshold;
        self
    }

    pub fn is_tripped(&self) -> bool {
        self.core.flags.contains(OpFlags::TRIPPED)
    }

    fn margin(&self, inputs: &IoData) -> f64 {
        let value = inputs.value_or(self.condition.input(), 1.0);
        self.condition.margin(value, self.threshold)
    }
}

impl DaeComponent for Relay {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Relay
    }

    fn initialize_a(&mut self, _start_time: f64, _flags: InitFlags) -> ComponentResult<()> {
        self.core.set_sizes(ComponentSizes {
            diff: 0,
            alg: 0,
            roots: 1,
            jac: 0,
        });
        Ok(())
    }

    fn initialize_b(
        &mut self,
        _inputs: &IoData,
        _desired: &IoData,
        _output_set: &mut IoData,
    ) -> ComponentResult<()> {
        self.core.flags.insert(OpFlags::INITIALIZED_B);
        Ok(())
    }

    fn root_test(
        &self,
        inputs: &IoData,
        _sd: &StateData<'_>,
        roots: &mut [f64],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        // A tripped relay keeps its slot but never fires again.
        let root = if self.is_tripped() { 1.0 } else { self.margin(inputs) };
        self.core.write_roots(roots, mode, &[root])
    }

    fn root_check(
        &mut self,
        inputs: &IoData,
        _state: &mut [f64],
        _mode: SolverMode,
        level: CheckLevel,
    ) -> ComponentResult<ChangeCode> {
        if self.is_tripped() || self.core.flags.contains(OpFlags::DISABLED) {
            return Ok(ChangeCode::NoChange);
        }
        let margin = self.margin(inputs);
        if margin >= 0.0 || !level.allows_irreversible() {
            return Ok(ChangeCode::NoChange);
        }
        self.core.flags.insert(OpFlags::TRIPPED);
        info!(
            relay = %self.core.name,
            condition = %self.condition,
            threshold = self.threshold,
            margin,
            "relay tripped"
        );
        Ok(ChangeCode::ValueChange)
    }

    fn set(&mut self, field: &str, value: f64, unit: Unit) -> ComponentResult<()> {
        match field {
            "threshold" => {
                self.threshold = to_base(value, unit, Unit::PerUnit, &self.core.pu_base)?;
            }
            "reset" => {
                if value != 0.0 {
                    self.core.flags.remove(OpFlags::TRIPPED);
                }
            }
            _ => return self.core.set(field, value),
        }
        Ok(())
    }

    fn set_str(&mut self, field: &str, value: &str) -> ComponentResult<()> {
        match field {
            "condition" => {
                self.condition =
                    RelayCondition::parse(value).ok_or_else(|| ComponentError::InvalidValue {
                        field: field.to_string(),
                        reason: "unknown relay condition",
                    })?;
                Ok(())
            }
            _ => self.core.set_str(field, value),
        }
    }

    fn get(&self, field: &str, unit: Unit) -> ComponentResult<f64> {
        match field {
            "threshold" => from_base(self.threshold, Unit::PerUnit, unit, &self.core.pu_base),
            "tripped" => Ok(if self.is_tripped() { 1.0 } else { 0.0 }),
            _ => self.core.get(field),
        }
    }

    fn fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn clone_component(&self, target: CloneTarget<'_>) -> ComponentResult<Cloned> {
        clone_into_target(self, target)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn output(
        &self,
        _inputs: &IoData,
        _sd: &StateData<'_>,
        _mode: SolverMode,
    ) -> ComponentResult<f64> {
        Ok(if self.is_tripped() { 1.0 } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offsets::OffsetBlock;

    fn armed(condition: RelayCondition, threshold: f64) -> Relay {
        let mut r = Relay::new("r1").with_condition(condition, threshold);
        r.initialize_a(0.0, InitFlags::empty()).unwrap();
        let sizes = r.core.sizes;
        r.core.offsets.set(
            SolverMode::DifferentialOnly,
            OffsetBlock {
                root: 2,
                sizes,
                ..OffsetBlock::default()
            },
        );
        r
    }

    #[test]
    fn root_sign_follows_condition() {
        let r = armed(RelayCondition::UnderFrequency, 0.98);
        let mut roots = [0.0; 3];
        let sd = StateData::states_only(0.0, &[]);
        let mode = SolverMode::DifferentialOnly;
        let healthy = IoData::from_pairs(&[("v", 1.0), ("f", 0.99)]);
        r.root_test(&healthy, &sd, &mut roots, mode).unwrap();
        assert!(roots[2] > 0.0);
        let sagging = IoData::from_pairs(&[("v", 1.0), ("f", 0.97)]);
        r.root_test(&sagging, &sd, &mut roots, mode).unwrap();
        assert!(roots[2] < 0.0);
    }

    #[test]
    fn trip_requires_irreversible_level() {
        let mut r = armed(RelayCondition::UnderVoltage, 0.8);
        let low = IoData::from_pairs(&[("v", 0.7), ("f", 1.0)]);
        let mode = SolverMode::DifferentialOnly;
        assert_eq!(
            r.root_check(&low, &mut [], mode, CheckLevel::ReversibleOnly).unwrap(),
            ChangeCode::NoChange
        );
        assert!(!r.is_tripped());
        assert_eq!(
            r.root_check(&low, &mut [], mode, CheckLevel::Full).unwrap(),
            ChangeCode::ValueChange
        );
        assert!(r.is_tripped());
        assert_eq!(
            r.root_check(&low, &mut [], mode, CheckLevel::Full).unwrap(),
            ChangeCode::NoChange
        );

        r.set("reset", 1.0, Unit::Default).unwrap();
        assert!(!r.is_tripped());
    }

    #[test]
    fn condition_from_text() {
        let mut r = Relay::new("r");
        r.set_str("condition", "overfrequency").unwrap();
        assert_eq!(r.condition, RelayCondition::OverFrequency);
        assert!(r.set_str("condition", "sideways").is_err());
    }
}
