//! Adapter for externally implemented model units.
//!
//! An [`ExternalUnit`] is the boundary to a model whose equations live elsewhere (a loaded
//! binary, another process). Every call reports a [`UnitStatus`]; the adapter maps those into
//! [`ComponentError`]s, polls `Pending` operations up to a timeout, and applies a
//! [`DiscardPolicy`] when the unit refuses a result.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use gd_core::units::Unit;
use tracing::{debug, warn};

use crate::common::write_block;
use crate::error::{ComponentError, ComponentResult};
use crate::flags::{InitFlags, OpFlags};
use crate::io::IoData;
use crate::jacobian::JacobianSink;
use crate::mode::{ChangeCode, CheckLevel, SolverMode};
use crate::offsets::ComponentSizes;
use crate::params::{from_base, to_base};
use crate::state::StateData;
use crate::traits::{
    CloneTarget, Cloned, ComponentCore, ComponentKind, DaeComponent, clone_into_target,
};

/// Status returned by every external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
    /// The operation continues asynchronously; completion is observed through `poll`.
    Pending,
}

/// Reference to a real variable inside an external unit.
pub type ValueRef = u32;

/// Operations an external model unit exposes.
pub trait ExternalUnit: Send {
    fn num_states(&self) -> usize;
    fn num_event_indicators(&self) -> usize;

    /// Value references of the continuous states and of their derivatives, in state order.
    fn state_refs(&self) -> Vec<ValueRef>;
    fn derivative_refs(&self) -> Vec<ValueRef>;

    fn set_time(&mut self, time: f64) -> UnitStatus;
    fn set_reals(&mut self, refs: &[ValueRef], values: &[f64]) -> UnitStatus;
    fn get_reals(&mut self, refs: &[ValueRef], out: &mut [f64]) -> UnitStatus;
    fn set_states(&mut self, states: &[f64]) -> UnitStatus;
    fn get_states(&mut self, out: &mut [f64]) -> UnitStatus;
    fn get_derivatives(&mut self, out: &mut [f64]) -> UnitStatus;
    fn get_event_indicators(&mut self, out: &mut [f64]) -> UnitStatus;

    /// `dv_unknown = ∂unknown/∂known · dv_known`.
    fn directional_derivative(
        &mut self,
        unknown: &[ValueRef],
        known: &[ValueRef],
        dv_known: &[f64],
        dv_unknown: &mut [f64],
    ) -> UnitStatus;

    /// Process a discrete event; the unit may update its states.
    fn handle_event(&mut self) -> UnitStatus;

    fn save_snapshot(&mut self) -> (UnitStatus, Vec<u8>);
    fn restore_snapshot(&mut self, snapshot: &[u8]) -> UnitStatus;

    /// Completion status of the last `Pending` operation.
    fn poll(&mut self) -> UnitStatus;

    fn boxed_clone(&self) -> Box<dyn ExternalUnit>;
}

impl Clone for Box<dyn ExternalUnit> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

impl ExternalUnit for Box<dyn ExternalUnit> {
    fn num_states(&self) -> usize {
        (**self).num_states()
    }
    fn num_event_indicators(&self) -> usize {
        (**self).num_event_indicators()
    }
    fn state_refs(&self) -> Vec<ValueRef> {
        (**self).state_refs()
    }
    fn derivative_refs(&self) -> Vec<ValueRef> {
        (**self).derivative_refs()
    }
    fn set_time(&mut self, time: f64) -> UnitStatus {
        (**self).set_time(time)
    }
    fn set_reals(&mut self, refs: &[ValueRef], values: &[f64]) -> UnitStatus {
        (**self).set_reals(refs, values)
    }
    fn get_reals(&mut self, refs: &[ValueRef], out: &mut [f64]) -> UnitStatus {
        (**self).get_reals(refs, out)
    }
    fn set_states(&mut self, states: &[f64]) -> UnitStatus {
        (**self).set_states(states)
    }
    fn get_states(&mut self, out: &mut [f64]) -> UnitStatus {
        (**self).get_states(out)
    }
    fn get_derivatives(&mut self, out: &mut [f64]) -> UnitStatus {
        (**self).get_derivatives(out)
    }
    fn get_event_indicators(&mut self, out: &mut [f64]) -> UnitStatus {
        (**self).get_event_indicators(out)
    }
    fn directional_derivative(
        &mut self,
        unknown: &[ValueRef],
        known: &[ValueRef],
        dv_known: &[f64],
        dv_unknown: &mut [f64],
    ) -> UnitStatus {
        (**self).directional_derivative(unknown, known, dv_known, dv_unknown)
    }
    fn handle_event(&mut self) -> UnitStatus {
        (**self).handle_event()
    }
    fn save_snapshot(&mut self) -> (UnitStatus, Vec<u8>) {
        (**self).save_snapshot()
    }
    fn restore_snapshot(&mut self, snapshot: &[u8]) -> UnitStatus {
        (**self).restore_snapshot(snapshot)
    }
    fn poll(&mut self) -> UnitStatus {
        (**self).poll()
    }
    fn boxed_clone(&self) -> Box<dyn ExternalUnit> {
        (**self).boxed_clone()
    }
}

/// What to do when a unit answers `Discard`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiscardPolicy {
    /// Substitute this value for every requested output and carry on.
    UseDefault(f64),
    /// Fail the call with [`ComponentError::Discard`].
    Escalate,
}

/// Outcome of a settled call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Done,
    Discarded,
}

/// Wait out a `Pending` status and map the final status into the error taxonomy.
fn settle<U: ExternalUnit + ?Sized>(
    unit: &mut U,
    status: UnitStatus,
    what: &'static str,
    timeout: Duration,
    poll_interval: Duration,
) -> ComponentResult<Settled> {
    let mut status = status;
    if status == UnitStatus::Pending {
        let start = Instant::now();
        loop {
            status = unit.poll();
            if status != UnitStatus::Pending {
                break;
            }
            if start.elapsed() >= timeout {
                return Err(ComponentError::ConvergenceFailure {
                    what: format!("{what}: external unit still pending after {timeout:?}"),
                });
            }
            thread::sleep(poll_interval);
        }
    }
    match status {
        UnitStatus::Ok => Ok(Settled::Done),
        UnitStatus::Warning => {
            warn!(call = what, "external unit returned a warning");
            Ok(Settled::Done)
        }
        UnitStatus::Discard => Ok(Settled::Discarded),
        UnitStatus::Error | UnitStatus::Fatal | UnitStatus::Pending => {
            Err(ComponentError::External {
                status,
                what: what.to_string(),
            })
        }
    }
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

const FIELDS: &[&str] = &["timeout", "discard_default", "basepower"];

/// A component whose equations are evaluated by an [`ExternalUnit`].
///
/// Inputs are forwarded to the unit through `input_refs` in order. States map one-to-one to
/// the unit's continuous states, roots to its event indicators.
pub struct CoSimModel<U: ExternalUnit = Box<dyn ExternalUnit>> {
    core: ComponentCore,
    unit: Mutex<U>,
    /// Bits of the time last pushed into the unit.
    last_time: AtomicU64,
    pub input_refs: Vec<ValueRef>,
    pub output_ref: Option<ValueRef>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub discard: DiscardPolicy,
}

impl<U: ExternalUnit + Clone> Clone for CoSimModel<U> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            unit: Mutex::new(lock(&self.unit).clone()),
            last_time: AtomicU64::new(self.last_time.load(Ordering::Relaxed)),
            input_refs: self.input_refs.clone(),
            output_ref: self.output_ref,
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            discard: self.discard,
        }
    }
}

impl<U: ExternalUnit> CoSimModel<U> {
    pub fn new(name: impl Into<String>, unit: U) -> Self {
        Self {
            core: ComponentCore::new(name),
            unit: Mutex::new(unit),
            last_time: AtomicU64::new(0.0_f64.to_bits()),
            input_refs: Vec::new(),
            output_ref: None,
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
            discard: DiscardPolicy::Escalate,
        }
    }

    pub fn with_io(mut self, input_refs: Vec<ValueRef>, output_ref: Option<ValueRef>) -> Self {
        self.input_refs = input_refs;
        self.output_ref = output_ref;
        self
    }

    fn call(
        &self,
        unit: &mut U,
        status: UnitStatus,
        what: &'static str,
    ) -> ComponentResult<Settled> {
        settle(unit, status, what, self.timeout, self.poll_interval)
    }

    /// Fill `out` with the policy default after a discard, or escalate.
    fn discarded(&self, what: &'static str, out: &mut [f64]) -> ComponentResult<()> {
        match self.discard {
            DiscardPolicy::UseDefault(v) => {
                warn!(
                    unit = %self.core.name,
                    call = what,
                    default = v,
                    "result discarded, substituting default"
                );
                out.fill(v);
                Ok(())
            }
            DiscardPolicy::Escalate => Err(self.refused(what)),
        }
    }

    /// Time of the most recent evaluation pushed into the unit.
    pub fn last_time(&self) -> f64 {
        f64::from_bits(self.last_time.load(Ordering::Relaxed))
    }

    /// Capture the unit's internal state.
    ///
    /// A discarded snapshot has no usable default and always fails.
    pub fn save_snapshot(&self) -> ComponentResult<Vec<u8>> {
        let mut unit = lock(&self.unit);
        let (st, snapshot) = unit.save_snapshot();
        if self.call(&mut unit, st, "save_snapshot")? == Settled::Discarded {
            return Err(self.refused("save_snapshot"));
        }
        Ok(snapshot)
    }

    /// Return the unit to a saved snapshot and refresh the local state copy from it.
    pub fn restore_snapshot(&mut self, snapshot: &[u8]) -> ComponentResult<()> {
        let mut x = vec![0.0; self.core.sizes.diff];
        {
            let mut unit = lock(&self.unit);
            let st = unit.restore_snapshot(snapshot);
            if self.call(&mut unit, st, "restore_snapshot")? == Settled::Discarded {
                return Err(self.refused("restore_snapshot"));
            }
            if !x.is_empty() {
                let st = unit.get_states(&mut x);
                if self.call(&mut unit, st, "get_states")? == Settled::Discarded {
                    return Err(self.refused("get_states"));
                }
            }
        }
        self.core.local.resize(x.len(), 0);
        self.core.local.diff.copy_from_slice(&x);
        debug!(unit = %self.core.name, "snapshot restored");
        Ok(())
    }

    fn refused(&self, what: &'static str) -> ComponentError {
        ComponentError::Discard {
            what: format!("{}: {what}", self.core.name),
        }
    }

    /// Push time, inputs and states into the unit.
    fn load(&self, unit: &mut U, inputs: &IoData, time: f64, x: &[f64]) -> ComponentResult<()> {
        self.last_time.store(time.to_bits(), Ordering::Relaxed);
        let st = unit.set_time(time);
        self.call(unit, st, "set_time")?;
        let n = self.input_refs.len().min(inputs.len());
        if n > 0 {
            let st = unit.set_reals(&self.input_refs[..n], &inputs.values()[..n]);
            self.call(unit, st, "set_reals")?;
        }
        if !x.is_empty() {
            let st = unit.set_states(x);
            self.call(unit, st, "set_states")?;
        }
        Ok(())
    }

    fn derivatives(
        &self,
        inputs: &IoData,
        sd: &StateData<'_>,
        mode: SolverMode,
    ) -> ComponentResult<Vec<f64>> {
        let view = self.core.locate(sd, mode)?;
        let mut unit = lock(&self.unit);
        self.load(&mut unit, inputs, sd.time, view.diff)?;
        let mut d = vec![0.0; self.core.sizes.diff];
        let st = unit.get_derivatives(&mut d);
        if self.call(&mut unit, st, "get_derivatives")? == Settled::Discarded {
            self.discarded("get_derivatives", &mut d)?;
        }
        Ok(d)
    }
}

impl<U: ExternalUnit + Clone + 'static> DaeComponent for CoSimModel<U> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::External
    }

    fn initialize_a(&mut self, _start_time: f64, _flags: InitFlags) -> ComponentResult<()> {
        let (n, m) = {
            let unit = lock(&self.unit);
            (unit.num_states(), unit.num_event_indicators())
        };
        self.core.set_sizes(ComponentSizes {
            diff: n,
            alg: 0,
            roots: m,
            jac: n * (n + self.input_refs.len()),
        });
        Ok(())
    }

    fn initialize_b(
        &mut self,
        inputs: &IoData,
        _desired: &IoData,
        output_set: &mut IoData,
    ) -> ComponentResult<()> {
        let n = self.core.sizes.diff;
        let mut x = vec![0.0; n];
        let mut y = [0.0];
        {
            let mut unit = lock(&self.unit);
            self.load(&mut unit, inputs, 0.0, &[])?;
            let st = unit.get_states(&mut x);
            if self.call(&mut unit, st, "get_states")? == Settled::Discarded {
                self.discarded("get_states", &mut x)?;
            }
            if let Some(r) = self.output_ref {
                let st = unit.get_reals(&[r], &mut y);
                if self.call(&mut unit, st, "get_reals")? == Settled::Discarded {
                    self.discarded("get_reals", &mut y)?;
                }
            }
        }
        self.core.local.resize(n, 0);
        self.core.local.diff.copy_from_slice(&x);
        self.core.local.ddiff.fill(0.0);
        self.core.flags.insert(OpFlags::INITIALIZED_B);
        if self.output_ref.is_some() {
            output_set.set_named("output", y[0]);
        }
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
        let mut f = self.derivatives(inputs, sd, mode)?;
        let view = self.core.locate(sd, mode)?;
        for (i, v) in f.iter_mut().enumerate() {
            *v -= view.dx(i);
        }
        write_block(resid, row, &f)
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
        let f = self.derivatives(inputs, sd, mode)?;
        write_block(deriv, row, &f)
    }

    fn jacobian_elements(
        &self,
        inputs: &IoData,
        sd: &StateData<'_>,
        sink: &mut dyn JacobianSink,
        input_locs: &[Option<usize>],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        let Some(r0) = self.core.diff_row(mode, 0) else {
            return Ok(());
        };
        let n = self.core.sizes.diff;
        let view = self.core.locate(sd, mode)?;
        let mut unit = lock(&self.unit);
        self.load(&mut unit, inputs, sd.time, view.diff)?;
        let unknown = unit.derivative_refs();
        let states = unit.state_refs();

        // One directional derivative per known column: states first, then inputs.
        let mut columns: Vec<(ValueRef, usize, bool)> =
            states.iter().enumerate().map(|(j, r)| (*r, r0 + j, true)).collect();
        for (i, r) in self.input_refs.iter().enumerate() {
            if let Some(Some(loc)) = input_locs.get(i) {
                columns.push((*r, *loc, false));
            }
        }
        let mut col = vec![0.0; n];
        for (known, global, is_state) in columns {
            let st = unit.directional_derivative(&unknown, &[known], &[1.0], &mut col);
            if self.call(&mut unit, st, "directional_derivative")? == Settled::Discarded {
                self.discarded("directional_derivative", &mut col)?;
            }
            for (i, v) in col.iter().enumerate() {
                let diag = if is_state && global == r0 + i { sd.cj } else { 0.0 };
                sink.assign(r0 + i, global, v - diag);
            }
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
        let m = self.core.sizes.roots;
        if m == 0 {
            return Ok(());
        }
        let view = self.core.locate(sd, mode)?;
        let mut ind = vec![0.0; m];
        {
            let mut unit = lock(&self.unit);
            self.load(&mut unit, inputs, sd.time, view.diff)?;
            let st = unit.get_event_indicators(&mut ind);
            if self.call(&mut unit, st, "get_event_indicators")? == Settled::Discarded {
                self.discarded("get_event_indicators", &mut ind)?;
            }
        }
        self.core.write_roots(roots, mode, &ind)
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
        let x = {
            let sd = StateData::states_only(0.0, state);
            self.core.locate(&sd, mode)?.diff.to_vec()
        };
        let mut after = vec![0.0; x.len()];
        {
            let mut unit = lock(&self.unit);
            self.load(&mut unit, inputs, self.last_time(), &x)?;
            let st = unit.handle_event();
            if self.call(&mut unit, st, "handle_event")? == Settled::Discarded {
                self.discarded("handle_event", &mut [])?;
            }
            let st = unit.get_states(&mut after);
            if self.call(&mut unit, st, "get_states")? == Settled::Discarded {
                self.discarded("get_states", &mut after)?;
            }
        }
        if after == x {
            return Ok(ChangeCode::NoChange);
        }
        for (i, v) in after.into_iter().enumerate() {
            self.core.store_diff(state, mode, i, v)?;
        }
        debug!(unit = %self.core.name, "external event updated states");
        Ok(ChangeCode::ValueChange)
    }

    fn set(&mut self, field: &str, value: f64, unit: Unit) -> ComponentResult<()> {
        match field {
            "timeout" => {
                let s = to_base(value, unit, Unit::Second, &self.core.pu_base)?;
                self.timeout = Duration::try_from_secs_f64(s).map_err(|_| {
                    ComponentError::InvalidValue {
                        field: field.to_string(),
                        reason: "timeout must be a non-negative duration",
                    }
                })?;
            }
            "discard_default" => self.discard = DiscardPolicy::UseDefault(value),
            _ => return self.core.set(field, value),
        }
        Ok(())
    }

    fn set_str(&mut self, field: &str, value: &str) -> ComponentResult<()> {
        match (field, value.to_ascii_lowercase().as_str()) {
            ("discard", "escalate") => self.discard = DiscardPolicy::Escalate,
            ("discard", "default") => self.discard = DiscardPolicy::UseDefault(0.0),
            ("discard", _) => {
                return Err(ComponentError::InvalidValue {
                    field: field.to_string(),
                    reason: "expected escalate or default",
                });
            }
            _ => return self.core.set_str(field, value),
        }
        Ok(())
    }

    fn get(&self, field: &str, unit: Unit) -> ComponentResult<f64> {
        match field {
            "timeout" => {
                from_base(self.timeout.as_secs_f64(), Unit::Second, unit, &self.core.pu_base)
            }
            "discard_default" => match self.discard {
                DiscardPolicy::UseDefault(v) => Ok(v),
                DiscardPolicy::Escalate => Ok(f64::NAN),
            },
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
        inputs: &IoData,
        sd: &StateData<'_>,
        mode: SolverMode,
    ) -> ComponentResult<f64> {
        let Some(r) = self.output_ref else {
            return Ok(0.0);
        };
        let view = self.core.locate(sd, mode)?;
        let mut unit = lock(&self.unit);
        self.load(&mut unit, inputs, sd.time, view.diff)?;
        let mut y = [0.0];
        let st = unit.get_reals(&[r], &mut y);
        if self.call(&mut unit, st, "get_reals")? == Settled::Discarded {
            self.discarded("get_reals", &mut y)?;
        }
        Ok(y[0])
    }
}

/// A loaded external library able to instantiate units.
pub trait UnitLibrary: Send + Sync {
    fn instantiate(&self, name: &str) -> ComponentResult<Box<dyn ExternalUnit>>;
}

type Loader = dyn Fn(&str) -> ComponentResult<Arc<dyn UnitLibrary>> + Send + Sync;

#[derive(Default)]
struct CacheInner {
    shortcuts: HashMap<String, String>,
    libraries: HashMap<String, Arc<dyn UnitLibrary>>,
}

/// Process-wide cache of loaded libraries keyed by location.
///
/// The lock is not held while a library loads; two concurrent loads of the same key both
/// complete and the later insert replaces the earlier one.
pub struct LibraryCache {
    inner: Mutex<CacheInner>,
    loader: Box<Loader>,
}

impl LibraryCache {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn(&str) -> ComponentResult<Arc<dyn UnitLibrary>> + Send + Sync + 'static,
    {
        Self {
            inner: Mutex::new(CacheInner::default()),
            loader: Box::new(loader),
        }
    }

    pub fn add_shortcut(&self, name: &str, location: &str) {
        lock(&self.inner)
            .shortcuts
            .insert(name.to_string(), location.to_string());
    }

    pub fn library(&self, key: &str) -> ComponentResult<Arc<dyn UnitLibrary>> {
        let location = {
            let inner = lock(&self.inner);
            let location = inner
                .shortcuts
                .get(key)
                .cloned()
                .unwrap_or_else(|| key.to_string());
            if let Some(lib) = inner.libraries.get(&location) {
                return Ok(Arc::clone(lib));
            }
            location
        };

        let lib = (self.loader)(&location)?;
        debug!(%location, "external library loaded");
        lock(&self.inner)
            .libraries
            .insert(location, Arc::clone(&lib));
        Ok(lib)
    }

    /// Instantiate a unit from a cached library and wrap it as a component.
    pub fn create_model(&self, key: &str, name: &str) -> ComponentResult<CoSimModel> {
        let unit = self.library(key)?.instantiate(name)?;
        Ok(CoSimModel::new(name, unit))
    }

    pub fn loaded(&self) -> usize {
        lock(&self.inner).libraries.len()
    }
}
