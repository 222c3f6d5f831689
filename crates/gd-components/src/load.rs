//! Constant-power load.

use std::any::Any;

use gd_core::units::{PuBase, Unit};

use crate::common::check_positive;
use crate::error::ComponentResult;
use crate::flags::{InitFlags, OpFlags};
use crate::io::IoData;
use crate::mode::SolverMode;
use crate::offsets::ComponentSizes;
use crate::params::{from_base, to_base};
use crate::state::StateData;
use crate::traits::{
    CloneTarget, Cloned, ComponentCore, ComponentKind, DaeComponent, clone_into_target,
};

const FIELDS: &[&str] = &["p", "q", "base", "basepower"];

/// Leaf load drawing fixed real and reactive power. Owns no states.
#[derive(Debug, Clone)]
pub struct Load {
    core: ComponentCore,
    /// Per unit on `base_mw`.
    pub p: f64,
    pub q: f64,
    pub base_mw: f64,
}

impl Load {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: ComponentCore::new(name),
            p: 0.0,
            q: 0.0,
            base_mw: 100.0,
        }
    }

    /// Demand in per unit on the load's own base; zero once shed.
    pub fn demand(&self) -> (f64, f64) {
        if self.core.flags.contains(OpFlags::DISABLED) {
            (0.0, 0.0)
        } else {
            (self.p, self.q)
        }
    }

    fn pu(&self) -> PuBase {
        PuBase {
            power_mw: self.base_mw,
            ..self.core.pu_base
        }
    }
}

impl DaeComponent for Load {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Load
    }

    fn initialize_a(&mut self, _start_time: f64, _flags: InitFlags) -> ComponentResult<()> {
        self.core.set_sizes(ComponentSizes::default());
        Ok(())
    }

    fn initialize_b(
        &mut self,
        _inputs: &IoData,
        _desired: &IoData,
        output_set: &mut IoData,
    ) -> ComponentResult<()> {
        output_set.set_named("p", self.p);
        output_set.set_named("q", self.q);
        self.core.flags.insert(OpFlags::INITIALIZED_B);
        Ok(())
    }

    fn set(&mut self, field: &str, value: f64, unit: Unit) -> ComponentResult<()> {
        match field {
            "p" => self.p = to_base(value, unit, Unit::PerUnit, &self.pu())?,
            "q" => self.q = to_base(value, unit, Unit::PerUnit, &self.pu())?,
            "base" => {
                let mw = to_base(value, unit, Unit::Megawatt, &self.core.pu_base)?;
                self.base_mw = check_positive(mw, field)?;
            }
            _ => return self.core.set(field, value),
        }
        Ok(())
    }

    fn get(&self, field: &str, unit: Unit) -> ComponentResult<f64> {
        match field {
            "p" => from_base(self.p, Unit::PerUnit, unit, &self.pu()),
            "q" => from_base(self.q, Unit::PerUnit, unit, &self.pu()),
            "base" => from_base(self.base_mw, Unit::Megawatt, unit, &self.core.pu_base),
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
        Ok(self.demand().0)
    }
}
