//! IEEE type 1 and type 2 rotating exciters.
//!
//! Both share one parameter block and one voltage-regulator limiter. Inputs: `[V]`, the
//! terminal voltage magnitude. Output: field voltage `ef`.

use std::any::Any;

use gd_core::units::Unit;
use tracing::{debug, warn};

use crate::common::{check_positive, write_block};
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

const V_IN: usize = 0;

/// Parameters shared by the exciter family.
#[derive(Debug, Clone, PartialEq)]
pub struct ExciterParams {
    pub ka: f64,
    pub ta: f64,
    pub ke: f64,
    pub te: f64,
    pub kf: f64,
    pub tf: f64,
    pub aex: f64,
    pub bex: f64,
    pub vrmin: f64,
    pub vrmax: f64,
    pub vref: f64,
    pub vbias: f64,
    /// Limiter events disabled for this instance.
    pub no_limits: bool,
}

impl Default for ExciterParams {
    fn default() -> Self {
        Self {
            ka: 20.0,
            ta: 0.2,
            ke: 1.0,
            te: 1.2,
            kf: 0.063,
            tf: 0.35,
            aex: 0.0056,
            bex: 1.075,
            vrmin: -5.1,
            vrmax: 6.6,
            vref: 1.0,
            vbias: 0.0,
            no_limits: false,
        }
    }
}

impl ExciterParams {
    fn base_unit(field: &str) -> Option<Unit> {
        match field {
            "ta" | "te" | "tf" | "tf1" | "tf2" => Some(Unit::Second),
            "ka" | "ke" | "kf" | "aex" | "bex" => Some(Unit::Ratio),
            "vrmin" | "vrmax" | "vref" | "vbias" => Some(Unit::PerUnit),
            _ => None,
        }
    }

    fn set(
        &mut self,
        core: &ComponentCore,
        field: &str,
        value: f64,
        unit: Unit,
    ) -> ComponentResult<()> {
        let base = Self::base_unit(field).ok_or_else(|| ComponentError::unrecognized(field))?;
        let v = to_base(value, unit, base, &core.pu_base)?;
        match field {
            "ka" => self.ka = check_positive(v, field)?,
            "ta" => self.ta = check_positive(v, field)?,
            "ke" => self.ke = v,
            "te" => self.te = check_positive(v, field)?,
            "kf" => self.kf = v,
            "tf" | "tf1" => self.tf = check_positive(v, field)?,
            "aex" => self.aex = v,
            "bex" => self.bex = v,
            "vrmin" => self.vrmin = v,
            "vrmax" => self.vrmax = v,
            "vref" => self.vref = v,
            "vbias" => self.vbias = v,
            _ => return Err(ComponentError::unrecognized(field)),
        }
        Ok(())
    }

    fn get(&self, core: &ComponentCore, field: &str, unit: Unit) -> ComponentResult<f64> {
        let base = Self::base_unit(field).ok_or_else(|| ComponentError::unrecognized(field))?;
        let v = match field {
            "ka" => self.ka,
            "ta" => self.ta,
            "ke" => self.ke,
            "te" => self.te,
            "kf" => self.kf,
            "tf" | "tf1" => self.tf,
            "aex" => self.aex,
            "bex" => self.bex,
            "vrmin" => self.vrmin,
            "vrmax" => self.vrmax,
            "vref" => self.vref,
            "vbias" => self.vbias,
            _ => return Err(ComponentError::unrecognized(field)),
        };
        from_base(v, base, unit, &core.pu_base)
    }

    pub fn limiter(&self) -> Limiter {
        Limiter::new(self.vrmin, self.vrmax)
    }

    /// Exciter saturation-loaded gain `Ke + Aex·e^(Bex·ef)`.
    #[inline]
    pub fn saturation(&self, ef: f64) -> f64 {
        self.ke + self.aex * (self.bex * ef).exp()
    }

    /// `∂/∂ef` of `saturation(ef)·ef`.
    #[inline]
    fn saturation_slope(&self, ef: f64) -> f64 {
        self.ke + self.aex * (self.bex * ef).exp() * (1.0 + self.bex * ef)
    }

    /// Regulator drive `Ka·(Vref + vBias − V)`.
    #[inline]
    fn drive(&self, v: f64) -> f64 {
        self.ka * (self.vref + self.vbias - v)
    }

    /// Field voltage rate, shared by both variants.
    #[inline]
    fn ef_rate(&self, ef: f64, vr: f64) -> f64 {
        (-self.saturation(ef) * ef + vr) / self.te
    }

    /// Widen a violated regulator limit so the steady state is admissible.
    fn admit_initial_vr(&mut self, name: &str, vr: f64) {
        match self.limiter().initial_side(vr) {
            Some(LimitSide::High) => {
                warn!(
                    exciter = name,
                    vr,
                    vrmax = self.vrmax,
                    "initial regulator output above Vrmax, widening limit"
                );
                self.vrmax = vr;
            }
            Some(LimitSide::Low) => {
                warn!(
                    exciter = name,
                    vr,
                    vrmin = self.vrmin,
                    "initial regulator output below Vrmin, widening limit"
                );
                self.vrmin = vr;
            }
            None => {}
        }
    }

    fn has_limits(&self) -> bool {
        !self.no_limits && self.limiter().is_active()
    }
}

fn desired_ef(desired: &IoData, fallback: f64) -> f64 {
    desired
        .get_named("ef")
        .or_else(|| desired.value(0))
        .unwrap_or(fallback)
}

/// Shared root and limiter handling. `states` is `[ef, vr, ...]`; `recovery` is the unclamped
/// `Ta·dvr/dt`.
fn limiter_check(
    core: &mut ComponentCore,
    params: &ExciterParams,
    state: &mut [f64],
    vr: f64,
    recovery: f64,
    mode: SolverMode,
) -> ComponentResult<ChangeCode> {
    let mut flags = core.flags;
    let mut value = vr;
    let code = params.limiter().check(&mut flags, &mut value, recovery);
    core.flags = flags;
    if code != ChangeCode::NoChange {
        core.store_diff(state, mode, 1, value)?;
        debug!(
            exciter = %core.name,
            side = ?core.flags.limit_side(),
            vr = value,
            "regulator limit switched"
        );
    }
    Ok(code)
}

fn clamp_to_active_limit(
    core: &mut ComponentCore,
    params: &ExciterParams,
    state: &mut [f64],
    mode: SolverMode,
) -> ComponentResult<()> {
    match core.flags.limit_side() {
        Some(LimitSide::High) => core.store_diff(state, mode, 1, params.vrmax),
        Some(LimitSide::Low) => core.store_diff(state, mode, 1, params.vrmin),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// IEEE type 1
// ---------------------------------------------------------------------------

const TYPE1_STATES: &[&str] = &["ef", "vr", "rf"];
const TYPE1_FIELDS: &[&str] = &[
    "ka", "ta", "ke", "te", "kf", "tf", "aex", "bex", "vrmin", "vrmax", "vref", "vbias",
    "basepower",
];

/// IEEE type 1 exciter with rate feedback. States: `[ef, vr, rf]`.
#[derive(Debug, Clone)]
pub struct ExciterIeeeType1 {
    core: ComponentCore,
    pub params: ExciterParams,
}

impl ExciterIeeeType1 {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: ComponentCore::new(name),
            params: ExciterParams::default(),
        }
    }

    fn jac_count(&self) -> usize {
        if self.core.flags.is_limited() { 5 } else { 8 }
    }

    /// Unclamped `Ta·dvr/dt`.
    fn recovery(&self, x: &[f64], v: f64) -> f64 {
        let p = &self.params;
        -x[1] + p.ka * x[2] - p.ka * p.kf / p.tf * x[0] + p.drive(v)
    }

    fn rates(&self, x: &[f64], v: f64) -> [f64; 3] {
        let p = &self.params;
        let vr_rate = if self.core.flags.is_limited() {
            0.0
        } else {
            self.recovery(x, v) / p.ta
        };
        [
            p.ef_rate(x[0], x[1]),
            vr_rate,
            (-x[2] + p.kf / p.tf * x[0]) / p.tf,
        ]
    }
}

impl DaeComponent for ExciterIeeeType1 {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Exciter
    }

    fn initialize_a(&mut self, _start_time: f64, flags: InitFlags) -> ComponentResult<()> {
        if flags.contains(InitFlags::NO_LIMITS) {
            self.params.no_limits = true;
        }
        let roots = usize::from(self.params.has_limits());
        self.core.set_sizes(ComponentSizes {
            diff: 3,
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
        let v = inputs.value_or(V_IN, 1.0);
        let ef = desired_ef(desired, self.core.local.diff.first().copied().unwrap_or(0.0));
        let p = &mut self.params;
        let vr = p.saturation(ef) * ef;
        if !p.no_limits {
            p.admit_initial_vr(&self.core.name, vr);
        }
        let rf = p.kf / p.tf * ef;
        p.vbias = v + vr / p.ka - p.vref;

        self.core.local.resize(3, 0);
        self.core.local.diff.copy_from_slice(&[ef, vr, rf]);
        self.core.local.ddiff.fill(0.0);
        self.core.flags.release();
        self.core.sizes.jac = self.jac_count();
        self.core.flags.insert(OpFlags::INITIALIZED_B);
        output_set.set_named("vset", self.params.vref);
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
        let f = self.rates(view.diff, inputs.value_or(V_IN, 1.0));
        let out = [
            f[0] - view.dx(0),
            f[1] - view.dx(1),
            f[2] - view.dx(2),
        ];
        write_block(resid, row, &out)
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
        write_block(deriv, row, &self.rates(view.diff, inputs.value_or(V_IN, 1.0)))
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
        let view = self.core.locate(sd, mode)?;
        let p = &self.params;
        let cj = sd.cj;
        let ef = view.diff[0];

        sink.assign(r, r, -p.saturation_slope(ef) / p.te - cj);
        sink.assign(r, r + 1, 1.0 / p.te);

        if self.core.flags.is_limited() {
            sink.assign(r + 1, r + 1, -cj);
        } else {
            sink.assign(r + 1, r, -p.ka * p.kf / (p.tf * p.ta));
            sink.assign(r + 1, r + 1, -1.0 / p.ta - cj);
            sink.assign(r + 1, r + 2, p.ka / p.ta);
            if let Some(Some(vloc)) = input_locs.get(V_IN) {
                sink.assign(r + 1, *vloc, -p.ka / p.ta);
            }
        }

        sink.assign(r + 2, r, p.kf / (p.tf * p.tf));
        sink.assign(r + 2, r + 2, -1.0 / p.tf - cj);
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
        let view = self.core.locate(sd, mode)?;
        let rec = self.recovery(view.diff, inputs.value_or(V_IN, 1.0));
        let root = self.params.limiter().root(self.core.flags, view.diff[1], rec);
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
        let (vr, rec) = {
            let sd = StateData::states_only(0.0, state);
            let view = self.core.locate(&sd, mode)?;
            (view.diff[1], self.recovery(view.diff, inputs.value_or(V_IN, 1.0)))
        };
        let code = limiter_check(&mut self.core, &self.params, state, vr, rec, mode)?;
        self.core.sizes.jac = self.jac_count();
        Ok(code)
    }

    fn correct_consistency(
        &mut self,
        _inputs: &IoData,
        state: &mut [f64],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        clamp_to_active_limit(&mut self.core, &self.params, state, mode)
    }

    fn set(&mut self, field: &str, value: f64, unit: Unit) -> ComponentResult<()> {
        match self.params.set(&self.core, field, value, unit) {
            Err(ComponentError::UnrecognizedParameter { .. }) => self.core.set(field, value),
            other => other,
        }
    }

    fn get(&self, field: &str, unit: Unit) -> ComponentResult<f64> {
        match self.params.get(&self.core, field, unit) {
            Err(ComponentError::UnrecognizedParameter { .. }) => self.core.get(field),
            other => other,
        }
    }

    fn fields(&self) -> &'static [&'static str] {
        TYPE1_FIELDS
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
        TYPE1_STATES
    }
}

// ---------------------------------------------------------------------------
// IEEE type 2
// ---------------------------------------------------------------------------

const TYPE2_STATES: &[&str] = &["ef", "vr", "x1", "x2"];
const TYPE2_FIELDS: &[&str] = &[
    "ka", "ta", "ke", "te", "kf", "tf", "tf2", "aex", "bex", "vrmin", "vrmax", "vref", "vbias",
    "basepower",
];

/// IEEE type 2 exciter with a two-stage feedback filter. States: `[ef, vr, x1, x2]`.
#[derive(Debug, Clone)]
pub struct ExciterIeeeType2 {
    core: ComponentCore,
    pub params: ExciterParams,
    pub tf2: f64,
}

impl ExciterIeeeType2 {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: ComponentCore::new(name),
            params: ExciterParams::default(),
            tf2: 1.0,
        }
    }

    fn jac_count(&self) -> usize {
        if self.core.flags.is_limited() { 8 } else { 10 }
    }

    fn recovery(&self, x: &[f64], v: f64) -> f64 {
        let p = &self.params;
        -x[1] + p.ka * p.kf * x[2] + p.drive(v)
    }

    fn rates(&self, x: &[f64], v: f64) -> [f64; 4] {
        let p = &self.params;
        let vr_rate = if self.core.flags.is_limited() {
            0.0
        } else {
            self.recovery(x, v) / p.ta
        };
        [
            p.ef_rate(x[0], x[1]),
            vr_rate,
            (-x[2] + x[1] / self.tf2 - x[3] / self.tf2) / p.tf,
            (-x[3] + x[1]) / self.tf2,
        ]
    }
}

impl DaeComponent for ExciterIeeeType2 {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Exciter
    }

    fn initialize_a(&mut self, _start_time: f64, flags: InitFlags) -> ComponentResult<()> {
        if flags.contains(InitFlags::NO_LIMITS) {
            self.params.no_limits = true;
        }
        let roots = usize::from(self.params.has_limits());
        self.core.set_sizes(ComponentSizes {
            diff: 4,
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
        let v = inputs.value_or(V_IN, 1.0);
        let ef = desired_ef(desired, self.core.local.diff.first().copied().unwrap_or(0.0));
        let p = &mut self.params;
        let vr = p.saturation(ef) * ef;
        if !p.no_limits {
            p.admit_initial_vr(&self.core.name, vr);
        }
        p.vbias = v + vr / p.ka - p.vref;

        self.core.local.resize(4, 0);
        self.core.local.diff.copy_from_slice(&[ef, vr, 0.0, vr]);
        self.core.local.ddiff.fill(0.0);
        self.core.flags.release();
        self.core.sizes.jac = self.jac_count();
        self.core.flags.insert(OpFlags::INITIALIZED_B);
        output_set.set_named("vset", self.params.vref);
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
        let f = self.rates(view.diff, inputs.value_or(V_IN, 1.0));
        let out = [
            f[0] - view.dx(0),
            f[1] - view.dx(1),
            f[2] - view.dx(2),
            f[3] - view.dx(3),
        ];
        write_block(resid, row, &out)
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
        write_block(deriv, row, &self.rates(view.diff, inputs.value_or(V_IN, 1.0)))
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
        let view = self.core.locate(sd, mode)?;
        let p = &self.params;
        let cj = sd.cj;
        let ef = view.diff[0];

        // ef
        sink.assign(r, r, -p.saturation_slope(ef) / p.te - cj);
        sink.assign(r, r + 1, 1.0 / p.te);

        // vr
        if self.core.flags.is_limited() {
            sink.assign(r + 1, r + 1, -cj);
        } else {
            sink.assign(r + 1, r + 1, -1.0 / p.ta - cj);
            sink.assign(r + 1, r + 2, p.ka * p.kf / p.ta);
            if let Some(Some(vloc)) = input_locs.get(V_IN) {
                sink.assign(r + 1, *vloc, -p.ka / p.ta);
            }
        }

        // x1
        sink.assign(r + 2, r + 1, 1.0 / (p.tf * self.tf2));
        sink.assign(r + 2, r + 2, -1.0 / p.tf - cj);
        sink.assign(r + 2, r + 3, -1.0 / (p.tf * self.tf2));

        // x2
        sink.assign(r + 3, r + 1, 1.0 / self.tf2);
        sink.assign(r + 3, r + 3, -1.0 / self.tf2 - cj);
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
        let view = self.core.locate(sd, mode)?;
        let rec = self.recovery(view.diff, inputs.value_or(V_IN, 1.0));
        let root = self.params.limiter().root(self.core.flags, view.diff[1], rec);
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
        let (vr, rec) = {
            let sd = StateData::states_only(0.0, state);
            let view = self.core.locate(&sd, mode)?;
            (view.diff[1], self.recovery(view.diff, inputs.value_or(V_IN, 1.0)))
        };
        let code = limiter_check(&mut self.core, &self.params, state, vr, rec, mode)?;
        self.core.sizes.jac = self.jac_count();
        Ok(code)
    }

    fn correct_consistency(
        &mut self,
        _inputs: &IoData,
        state: &mut [f64],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        clamp_to_active_limit(&mut self.core, &self.params, state, mode)
    }

    fn set(&mut self, field: &str, value: f64, unit: Unit) -> ComponentResult<()> {
        if field == "tf2" {
            let v = to_base(value, unit, Unit::Second, &self.core.pu_base)?;
            self.tf2 = check_positive(v, field)?;
            return Ok(());
        }
        match self.params.set(&self.core, field, value, unit) {
            Err(ComponentError::UnrecognizedParameter { .. }) => self.core.set(field, value),
            other => other,
        }
    }

    fn get(&self, field: &str, unit: Unit) -> ComponentResult<f64> {
        if field == "tf2" {
            return from_base(self.tf2, Unit::Second, unit, &self.core.pu_base);
        }
        match self.params.get(&self.core, field, unit) {
            Err(ComponentError::UnrecognizedParameter { .. }) => self.core.get(field),
            other => other,
        }
    }

    fn fields(&self) -> &'static [&'static str] {
        TYPE2_FIELDS
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
        TYPE2_STATES
    }
}
