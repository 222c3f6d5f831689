//! Core traits for dynamic component models.

use std::any::Any;
use std::fmt;

use gd_core::ids::ObjectId;
use gd_core::units::{PuBase, Unit};

use crate::common::{write_at, write_block};
use crate::error::{ComponentError, ComponentResult};
use crate::flags::{InitFlags, OpFlags};
use crate::io::IoData;
use crate::jacobian::JacobianSink;
use crate::mode::{ChangeCode, CheckLevel, SolverMode};
use crate::offsets::{ComponentSizes, OffsetBlock, OffsetTable};
use crate::state::{LocalState, StateData, StateView};

/// Broad role of a component, used for slot compatibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Exciter,
    Governor,
    Machine,
    Source,
    Relay,
    Load,
    External,
}

impl ComponentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Exciter => "exciter",
            ComponentKind::Governor => "governor",
            ComponentKind::Machine => "machine",
            ComponentKind::Source => "source",
            ComponentKind::Relay => "relay",
            ComponentKind::Load => "load",
            ComponentKind::External => "external",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by every component: identity, tree link, flags, sizes and offsets.
#[derive(Debug, Clone, Default)]
pub struct ComponentCore {
    pub name: String,
    pub description: String,
    /// Assigned when the component is inserted into a tree.
    pub id: Option<ObjectId>,
    /// Non-owning link to the containing object.
    pub parent: Option<ObjectId>,
    pub flags: OpFlags,
    /// Full-mode sizes; the registry derives the per-mode view.
    pub sizes: ComponentSizes,
    pub offsets: OffsetTable,
    pub local: LocalState,
    pub pu_base: PuBase,
}

impl ComponentCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Configuration-only copy: no offsets, no tree links, fresh flags and sizes.
    pub fn config_copy(&self) -> ComponentCore {
        ComponentCore {
            name: self.name.clone(),
            description: self.description.clone(),
            id: None,
            parent: None,
            flags: self.flags & OpFlags::DISABLED,
            sizes: ComponentSizes::default(),
            offsets: OffsetTable::default(),
            local: LocalState::default(),
            pu_base: self.pu_base,
        }
    }

    /// Fix local sizes and allocate the local state copy.
    pub fn set_sizes(&mut self, sizes: ComponentSizes) {
        self.sizes = sizes;
        self.local.resize(sizes.diff, sizes.alg);
        self.flags.insert(OpFlags::INITIALIZED_A);
        self.flags.set(OpFlags::HAS_ROOTS, sizes.roots > 0);
    }

    #[inline]
    pub fn block(&self, mode: SolverMode) -> Option<&OffsetBlock> {
        self.offsets.get(mode)
    }

    /// Resolve this component's states: global slices where offsets are assigned for the
    /// mode, the local copy otherwise. An assigned offset past the end of the global buffer is
    /// a structure error. An empty `dstate_dt` reads derivatives from the local copy.
    pub fn locate<'a>(
        &'a self,
        sd: &StateData<'a>,
        mode: SolverMode,
    ) -> ComponentResult<StateView<'a>> {
        let nd = self.sizes.diff;
        let na = self.sizes.alg;
        let block = self.offsets.get(mode);
        let diff_at = block.filter(|_| mode.has_differential()).map(|b| b.diff);
        let alg_at = block.filter(|_| mode.has_algebraic()).map(|b| b.alg);

        let diff = global_or_local(sd.state, diff_at, nd, &self.local.diff)?;
        let ddiff = if sd.dstate_dt.is_empty() {
            self.local.ddiff.as_slice()
        } else {
            global_or_local(sd.dstate_dt, diff_at, nd, &self.local.ddiff)?
        };
        let alg = global_or_local(sd.state, alg_at, na, &self.local.alg)?;

        if diff.len() < nd || alg.len() < na {
            return Err(ComponentError::Structure {
                what: "state not allocated; call initialize_a first",
            });
        }
        Ok(StateView { diff, ddiff, alg })
    }

    /// Global row of differential state `i`, if the mode carries differential states.
    pub fn diff_row(&self, mode: SolverMode, i: usize) -> Option<usize> {
        if !mode.has_differential() || i >= self.sizes.diff {
            return None;
        }
        self.offsets.get(mode).map(|b| b.diff + i)
    }

    /// Global row of algebraic state `i`, if the mode carries algebraic states.
    pub fn alg_row(&self, mode: SolverMode, i: usize) -> Option<usize> {
        if !mode.has_algebraic() || i >= self.sizes.alg {
            return None;
        }
        self.offsets.get(mode).map(|b| b.alg + i)
    }

    /// Write `values` into this component's root slots.
    pub fn write_roots(
        &self,
        roots: &mut [f64],
        mode: SolverMode,
        values: &[f64],
    ) -> ComponentResult<()> {
        match self.offsets.get(mode) {
            Some(b) => write_block(roots, b.root, values),
            None => Ok(()),
        }
    }

    /// Store a possibly clamped differential state both locally and in the global vector.
    pub fn store_diff(
        &mut self,
        state: &mut [f64],
        mode: SolverMode,
        i: usize,
        value: f64,
    ) -> ComponentResult<()> {
        if let Some(slot) = self.local.diff.get_mut(i) {
            *slot = value;
        }
        match self.diff_row(mode, i) {
            Some(row) if row < state.len() => write_at(state, row, value),
            _ => Ok(()),
        }
    }

    pub fn set_str(&mut self, field: &str, value: &str) -> ComponentResult<()> {
        match field {
            "name" => self.name = value.to_string(),
            "description" => self.description = value.to_string(),
            _ => return Err(ComponentError::unrecognized(field)),
        }
        Ok(())
    }

    /// Fields common to every component.
    pub fn set(&mut self, field: &str, value: f64) -> ComponentResult<()> {
        match field {
            "basepower" => {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ComponentError::InvalidValue {
                        field: field.to_string(),
                        reason: "must be positive",
                    });
                }
                self.pu_base.power_mw = value;
            }
            "disabled" => self.flags.set(OpFlags::DISABLED, value != 0.0),
            _ => return Err(ComponentError::unrecognized(field)),
        }
        Ok(())
    }

    pub fn get(&self, field: &str) -> ComponentResult<f64> {
        match field {
            "basepower" => Ok(self.pu_base.power_mw),
            "disabled" => Ok(if self.flags.contains(OpFlags::DISABLED) { 1.0 } else { 0.0 }),
            _ => Err(ComponentError::unrecognized(field)),
        }
    }

    /// Write the local copy into the global buffers at this component's offsets.
    pub fn guess_state(&self, state: &mut [f64], dstate_dt: &mut [f64], mode: SolverMode) {
        let Some(b) = self.offsets.get(mode) else {
            return;
        };
        if mode.has_differential() {
            copy_into(state, b.diff, &self.local.diff);
            copy_into(dstate_dt, b.diff, &self.local.ddiff);
        }
        if mode.has_algebraic() {
            copy_into(state, b.alg, &self.local.alg);
        }
    }

    /// Copy accepted global values back into the local copy.
    pub fn set_state(&mut self, state: &[f64], dstate_dt: &[f64], mode: SolverMode) {
        let Some(b) = self.offsets.get(mode).copied() else {
            return;
        };
        let nd = self.sizes.diff;
        let na = self.sizes.alg;
        if mode.has_differential() {
            if let Some(src) = state.get(b.diff..b.diff + nd) {
                self.local.diff.copy_from_slice(src);
            }
            if let Some(src) = dstate_dt.get(b.diff..b.diff + nd) {
                self.local.ddiff.copy_from_slice(src);
            }
        }
        if mode.has_algebraic() {
            if let Some(src) = state.get(b.alg..b.alg + na) {
                self.local.alg.copy_from_slice(src);
            }
        }
    }
}

fn global_or_local<'a>(
    global: &'a [f64],
    at: Option<usize>,
    len: usize,
    local: &'a [f64],
) -> ComponentResult<&'a [f64]> {
    match at {
        None => Ok(local),
        Some(_) if len == 0 => Ok(&global[..0]),
        Some(o) => global.get(o..o + len).ok_or(ComponentError::Structure {
            what: "global state shorter than the assigned offsets",
        }),
    }
}

fn copy_into(dest: &mut [f64], start: usize, src: &[f64]) {
    if let Some(d) = dest.get_mut(start..start + src.len()) {
        d.copy_from_slice(src);
    }
}

/// Where a clone should land.
pub enum CloneTarget<'a> {
    /// Allocate a fresh component.
    New,
    /// Populate an existing component of the same variant in place.
    Into(&'a mut dyn DaeComponent),
}

/// Result of [`DaeComponent::clone_component`].
pub enum Cloned {
    Allocated(Box<dyn DaeComponent>),
    Populated,
}

impl Cloned {
    /// The allocated component, if this clone allocated one.
    pub fn into_boxed(self) -> Option<Box<dyn DaeComponent>> {
        match self {
            Cloned::Allocated(b) => Some(b),
            Cloned::Populated => None,
        }
    }
}

/// Shared clone implementation for `Clone` models.
///
/// The copy carries configuration only. Populating in place keeps the destination's id and
/// parent link.
pub fn clone_into_target<T>(src: &T, target: CloneTarget<'_>) -> ComponentResult<Cloned>
where
    T: DaeComponent + Clone + 'static,
{
    let mut copy = src.clone();
    *copy.core_mut() = src.core().config_copy();
    match target {
        CloneTarget::New => Ok(Cloned::Allocated(Box::new(copy))),
        CloneTarget::Into(dest) => {
            let found = dest.kind();
            let id = dest.core().id;
            let parent = dest.core().parent;
            let slot = dest
                .as_any_mut()
                .downcast_mut::<T>()
                .ok_or(ComponentError::StructuralMismatch {
                    expected: src.kind().as_str(),
                    found,
                })?;
            *slot = copy;
            slot.core_mut().id = id;
            slot.core_mut().parent = parent;
            Ok(Cloned::Populated)
        }
    }
}

/// The contract every dynamic model satisfies.
///
/// Evaluation methods borrow the component immutably; only initialization, configuration
/// and discrete checks take `&mut self`. Results are written at the offsets the registry
/// assigned for the given mode.
pub trait DaeComponent: Send {
    fn core(&self) -> &ComponentCore;
    fn core_mut(&mut self) -> &mut ComponentCore;
    fn kind(&self) -> ComponentKind;

    fn name(&self) -> &str {
        &self.core().name
    }

    fn id(&self) -> Option<ObjectId> {
        self.core().id
    }

    /// Fix state, root and Jacobian counts from the current configuration.
    fn initialize_a(&mut self, start_time: f64, flags: InitFlags) -> ComponentResult<()>;

    /// Back-solve a steady initial state.
    ///
    /// `desired` carries requested outputs (may be empty); derived references for the parent
    /// are written into `output_set`.
    fn initialize_b(
        &mut self,
        inputs: &IoData,
        desired: &IoData,
        output_set: &mut IoData,
    ) -> ComponentResult<()>;

    /// `F(x, x', u)` for owned equations.
    fn residual(
        &self,
        _inputs: &IoData,
        _sd: &StateData<'_>,
        _resid: &mut [f64],
        _mode: SolverMode,
    ) -> ComponentResult<()> {
        Ok(())
    }

    /// Explicit `dx/dt` for owned differential states.
    fn derivative(
        &self,
        _inputs: &IoData,
        _sd: &StateData<'_>,
        _deriv: &mut [f64],
        _mode: SolverMode,
    ) -> ComponentResult<()> {
        Ok(())
    }

    /// `∂F/∂x + cj·∂F/∂x'` as triplets. Input columns come from `input_locs`.
    fn jacobian_elements(
        &self,
        _inputs: &IoData,
        _sd: &StateData<'_>,
        _sink: &mut dyn JacobianSink,
        _input_locs: &[Option<usize>],
        _mode: SolverMode,
    ) -> ComponentResult<()> {
        Ok(())
    }

    /// One value per owned event; positive keeps the current regime.
    fn root_test(
        &self,
        _inputs: &IoData,
        _sd: &StateData<'_>,
        _roots: &mut [f64],
        _mode: SolverMode,
    ) -> ComponentResult<()> {
        Ok(())
    }

    /// Re-evaluate events with hysteresis and switch regimes.
    ///
    /// May clamp owned entries of `state`.
    fn root_check(
        &mut self,
        _inputs: &IoData,
        _state: &mut [f64],
        _mode: SolverMode,
        _level: CheckLevel,
    ) -> ComponentResult<ChangeCode> {
        Ok(ChangeCode::NoChange)
    }

    /// Restore consistency of states after a discrete change.
    fn correct_consistency(
        &mut self,
        _inputs: &IoData,
        _state: &mut [f64],
        _mode: SolverMode,
    ) -> ComponentResult<()> {
        Ok(())
    }

    fn set(&mut self, field: &str, value: f64, unit: Unit) -> ComponentResult<()>;

    fn set_str(&mut self, field: &str, value: &str) -> ComponentResult<()> {
        self.core_mut().set_str(field, value)
    }

    fn get(&self, field: &str, unit: Unit) -> ComponentResult<f64>;

    /// Recognized numeric fields.
    fn fields(&self) -> &'static [&'static str];

    fn clone_component(&self, target: CloneTarget<'_>) -> ComponentResult<Cloned>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn guess_state(&self, _time: f64, state: &mut [f64], dstate_dt: &mut [f64], mode: SolverMode) {
        self.core().guess_state(state, dstate_dt, mode);
    }

    fn set_state(&mut self, _time: f64, state: &[f64], dstate_dt: &[f64], mode: SolverMode) {
        self.core_mut().set_state(state, dstate_dt, mode);
    }

    /// Primary output signal.
    fn output(
        &self,
        _inputs: &IoData,
        _sd: &StateData<'_>,
        _mode: SolverMode,
    ) -> ComponentResult<f64> {
        Ok(0.0)
    }

    /// Global index of the state the primary output is read from.
    fn output_loc(&self, _mode: SolverMode) -> Option<usize> {
        None
    }

    /// Apply time-indexed discrete updates due at `time`.
    fn update_a(&mut self, _time: f64) -> ComponentResult<ChangeCode> {
        Ok(ChangeCode::NoChange)
    }

    fn next_update_time(&self) -> Option<f64> {
        None
    }

    fn local_state_names(&self) -> &'static [&'static str] {
        &[]
    }

    /// Number of Jacobian entries written in `mode` under the current regime when every input
    /// has a state location. Entries for inputs without one are skipped, so this is also the
    /// reservation upper bound.
    fn jac_size(&self, mode: SolverMode) -> usize {
        if mode.is_algebraic_only() && self.core().sizes.alg == 0 {
            0
        } else {
            self.core().sizes.jac
        }
    }
}
