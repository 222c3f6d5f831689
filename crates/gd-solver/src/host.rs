//! The view of a component tree the solver works against.

use gd_components::{ChangeCode, DaeComponent, IoData, IoLocs, OpFlags, SolverMode, StateData};

use crate::error::SolverResult;

/// A flattened, fixed-order view of every component in a system.
///
/// Index `i` must name the same component between two calls to
/// [`OffsetRegistry::assign`](crate::OffsetRegistry::assign); reordering is a topology change.
pub trait ComponentHost {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn component(&self, index: usize) -> &dyn DaeComponent;

    fn component_mut(&mut self, index: usize) -> &mut dyn DaeComponent;

    /// Input signals of component `index` at the candidate state.
    fn inputs(&self, index: usize, sd: &StateData<'_>, mode: SolverMode) -> SolverResult<IoData>;

    /// Global state index behind each input, `None` for inputs that are not states.
    fn input_locs(&self, _index: usize, _mode: SolverMode) -> IoLocs {
        Vec::new()
    }

    /// Host-level discrete updates due at `time`, applied before the components' own.
    fn update_host(&mut self, _time: f64) -> SolverResult<ChangeCode> {
        Ok(ChangeCode::NoChange)
    }

    /// Earliest pending host-level update.
    fn next_host_update(&self) -> Option<f64> {
        None
    }

    /// Called after `root_check` on component `index` changed something. Returns true when
    /// the reaction altered which components are active.
    fn after_root_check(&mut self, _index: usize, _code: ChangeCode) -> SolverResult<bool> {
        Ok(false)
    }
}

/// Disabled components are skipped by offset assignment and evaluation.
#[inline]
pub fn is_active(comp: &dyn DaeComponent) -> bool {
    !comp.core().flags.contains(OpFlags::DISABLED)
}
