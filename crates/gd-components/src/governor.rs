//! Droop governor with a first-order valve lag and valve-position limits.
//!
//! Inputs: `[omega, pref]`; `pref` is optional and falls back to the initialized reference.
//! State: `[pm]`.

use std::any::Any;

use gd_core::units::Unit;
use tracing::{debug, warn};

use crate::common::{check_positive, write_at};
use crate::error::{ComponentError, ComponentResult};
use crate::flags::{InitFlags, LimitSide, OpFlags};
use crate::io::IoData;
use crate::jacobian::JacobianSink;
use crate::limiter::Limiter;
use crate::mode::{ChangeCode, CheckLevel, SolverMode};
use crate::offsets::ComponentSizes;
use crate::params::{from_base, to_base};
use crate::state::StateData;
use crate::traits::{
    CloneTarget, Cloned, ComponentCore, ComponentKind, DaeComponent, clone_into_target,
};

const OMEGA_IN: usize = 0;
const PREF_IN: usize = 1;

const FIELDS: &[&str] = &["r", "t1", "pmax", "pmin", "pref", "basepower"];

#[derive(Debug, Clone)]
pub struct GovernorBasic {
    core: ComponentCore,
    /// Droop (pu speed per pu power).
    pub r: f64,
    pub t1: f64,
    pub pmax: f64,
    pub pmin: f64,
    pub pref: f64,
    no_limits: bool,
}

impl GovernorBasic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: ComponentCore::new(name),
            r: 0.05,
            t1: 0.1,
            pmax: 1.0,
            pmin: 0.0,
            pref: 1.0,
            no_limits: false,
        }
    }

    pub fn limiter(&self) -> Limiter {
        Limiter::new(self.pmin, self.pmax)
    }

    fn base_unit(field: &str) -> Option<Unit> {
        match field {
            "t1" => Some(Unit::Second),
            "r" => Some(Unit::Ratio),
            "pmax" | "pmin" | "pref" => Some(Unit::PerUnit),
            _ => None,
        }
    }

    fn reference(&self, inputs: &IoData) -> f64 {
        inputs.value_or(PREF_IN, self.pref)
    }

    /// Unclamped `T1·dpm/dt`.
    fn recovery(&self, pm: f64, inputs: &IoData) -> f64 {
        let omega = inputs.value_or(OMEGA_IN, 1.0);
        self.reference(inputs) - (omega - 1.0) / self.r - pm
    }

    fn rate(&self, pm: f64, inputs: &IoData) -> f64 {
        if self.core.flags.is_limited() {
            0.0
        } else {
            self.recovery(pm, inputs) / self.t1
        }
    }

    fn jac_count(&self) -> usize {
        if self.core.flags.is_limited() { 1 } else { 3 }
    }
}

impl DaeComponent for GovernorBasic {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Governor
    }

    fn initialize_a(&mut self, _start_time: f64, flags: InitFlags) -> ComponentResult<()> {
        self.no_limits |= flags.contains(InitFlags::NO_LIMITS);
        let roots = usize::from(!self.no_limits && self.limiter().is_active());
        self.core.set_sizes(ComponentSizes {
            diff: 1,
            alg: 0,
            roots,
            jac: 0,
        });
        self.core.sizes.jac = self.jac_count();
        Ok(())
    }

    fn initialize_b(
        &mut self,
        inputs: &IoData,
        desired: &IoData,
        output_set: &mut IoData,
    ) -> ComponentResult<()> {
        let omega = inputs.value_or(OMEGA_IN, 1.0);
        let pm = desired
            .get_named("pm")
            .or_else(|| desired.value(0))
            .unwrap_or(self.pref);
        if !self.no_limits {
            match self.limiter().initial_side(pm) {
                Some(LimitSide::High) => {
                    warn!(
                        governor = %self.core.name,
                        pm,
                        pmax = self.pmax,
                        "initial power above Pmax, widening limit"
                    );
                    self.pmax = pm;
                }
                Some(LimitSide::Low) => {
                    warn!(
                        governor = %self.core.name,
                        pm,
                        pmin = self.pmin,
                        "initial power below Pmin, widening limit"
                    );
                    self.pmin = pm;
                }
                None => {}
            }
        }
        self.pref = pm + (omega - 1.0) / self.r;

        self.core.local.resize(1, 0);
        self.core.local.diff[0] = pm;
        self.core.local.ddiff[0] = 0.0;
        self.core.flags.release();
        self.core.sizes.jac = self.jac_count();
        self.core.flags.insert(OpFlags::INITIALIZED_B);
        output_set.set_named("pref", self.pref);
        Ok(())
    }

    fn residual(
        &self,
        inputs: &IoData,
        sd: &StateData<'_>,
        resid: &mut [f64],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        let Some(row) = self.core.diff_row(mode, 0) else {
            return Ok(());
        };
        let view = self.core.locate(sd, mode)?;
        write_at(resid, row, self.rate(view.diff[0], inputs) - view.dx(0))
    }

    fn derivative(
        &self,
        inputs: &IoData,
        sd: &StateData<'_>,
        deriv: &mut [f64],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        let Some(row) = self.core.diff_row(mode, 0) else {
            return Ok(());
        };
        let view = self.core.locate(sd, mode)?;
        write_at(deriv, row, self.rate(view.diff[0], inputs))
    }

    fn jacobian_elements(
        &self,
        _inputs: &IoData,
        sd: &StateData<'_>,
        sink: &mut dyn JacobianSink,
        input_locs: &[Option<usize>],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        let Some(r) = self.core.diff_row(mode, 0) else {
            return Ok(());
        };
        if self.core.flags.is_limited() {
            sink.assign(r, r, -sd.cj);
            return Ok(());
        }
        sink.assign(r, r, -1.0 / self.t1 - sd.cj);
        if let Some(Some(loc)) = input_locs.get(OMEGA_IN) {
            sink.assign(r, *loc, -1.0 / (self.r * self.t1));
        }
        if let Some(Some(loc)) = input_locs.get(PREF_IN) {
            sink.assign(r, *loc, 1.0 / self.t1);
        }
        Ok(())
    }

    fn root_test(
        &self,
        inputs: &IoData,
        sd: &StateData<'_>,
        roots: &mut [f64],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        if self.core.sizes.roots == 0 {
            return Ok(());
        }
        let pm = self.core.locate(sd, mode)?.diff[0];
        let root = self
            .limiter()
            .root(self.core.flags, pm, self.recovery(pm, inputs));
        self.core.write_roots(roots, mode, &[root])
    }

    fn root_check(
        &mut self,
        inputs: &IoData,
        state: &mut [f64],
        mode: SolverMode,
        _level: CheckLevel,
    ) -> ComponentResult<ChangeCode> {
        if self.core.sizes.roots == 0 {
            return Ok(ChangeCode::NoChange);
        }
        let pm = {
            let sd = StateData::states_only(0.0, state);
            self.core.locate(&sd, mode)?.diff[0]
        };
        let mut flags = self.core.flags;
        let mut value = pm;
        let code = self
            .limiter()
            .check(&mut flags, &mut value, self.recovery(pm, inputs));
        self.core.flags = flags;
        if code != ChangeCode::NoChange {
            self.core.store_diff(state, mode, 0, value)?;
            self.core.sizes.jac = self.jac_count();
            debug!(
                governor = %self.core.name,
                side = ?flags.limit_side(),
                pm = value,
                "valve limit switched"
            );
        }
        Ok(code)
    }

    fn set(&mut self, field: &str, value: f64, unit: Unit) -> ComponentResult<()> {
        let Some(base) = Self::base_unit(field) else {
            return self.core.set(field, value);
        };
        let v = to_base(value, unit, base, &self.core.pu_base)?;
        match field {
            "r" => self.r = check_positive(v, field)?,
            "t1" => self.t1 = check_positive(v, field)?,
            "pmax" => self.pmax = v,
            "pmin" => self.pmin = v,
            "pref" => self.pref = v,
            _ => return Err(ComponentError::unrecognized(field)),
        }
        Ok(())
    }

    fn get(&self, field: &str, unit: Unit) -> ComponentResult<f64> {
        let Some(base) = Self::base_unit(field) else {
            return self.core.get(field);
        };
        let v = match field {
            "r" => self.r,
            "t1" => self.t1,
            "pmax" => self.pmax,
            "pmin" => self.pmin,
            "pref" => self.pref,
            _ => return Err(ComponentError::unrecognized(field)),
        };
        from_base(v, base, unit, &self.core.pu_base)
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
        sd: &StateData<'_>,
        mode: SolverMode,
    ) -> ComponentResult<f64> {
        Ok(self.core.locate(sd, mode)?.diff[0])
    }

    fn output_loc(&self, mode: SolverMode) -> Option<usize> {
        self.core.diff_row(mode, 0)
    }

    fn local_state_names(&self) -> &'static [&'static str] {
        &["pm"]
    }
}
