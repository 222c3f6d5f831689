//! Global evaluation passes over every active component.

use gd_components::{ChangeCode, ComponentError, DaeComponent, SolverMode, StateData};

use crate::accumulator::TripletAccumulator;
use crate::error::{SolverError, SolverResult};
use crate::host::{ComponentHost, is_active};
use crate::offsets::OffsetRegistry;

fn named(comp: &dyn DaeComponent) -> impl FnOnce(ComponentError) -> SolverError + '_ {
    move |e| SolverError::component(comp.name(), e)
}

fn active<H: ComponentHost + ?Sized>(host: &H) -> impl Iterator<Item = usize> + '_ {
    (0..host.len()).filter(|&i| is_active(host.component(i)))
}

/// Gather the initial guess from the components' local copies.
pub fn guess_state<H: ComponentHost + ?Sized>(
    host: &H,
    registry: &OffsetRegistry,
    time: f64,
    mode: SolverMode,
) -> SolverResult<(Vec<f64>, Vec<f64>)> {
    let n = registry.require(mode)?.states();
    let mut state = vec![0.0; n];
    let mut dstate = vec![0.0; n];
    for i in active(host) {
        host.component(i).guess_state(time, &mut state, &mut dstate, mode);
    }
    Ok((state, dstate))
}

/// Push an accepted state back into every component's local copy.
pub fn accept_state<H: ComponentHost + ?Sized>(
    host: &mut H,
    time: f64,
    state: &[f64],
    dstate: &[f64],
    mode: SolverMode,
) {
    for i in 0..host.len() {
        let comp = host.component_mut(i);
        if is_active(comp) {
            comp.set_state(time, state, dstate, mode);
        }
    }
}

pub fn residual<H: ComponentHost + ?Sized>(
    host: &H,
    registry: &OffsetRegistry,
    sd: &StateData<'_>,
    mode: SolverMode,
) -> SolverResult<Vec<f64>> {
    let mut out = vec![0.0; registry.require(mode)?.states()];
    for i in active(host) {
        let comp = host.component(i);
        let inputs = host.inputs(i, sd, mode)?;
        comp.residual(&inputs, sd, &mut out, mode).map_err(named(comp))?;
    }
    Ok(out)
}

pub fn derivative<H: ComponentHost + ?Sized>(
    host: &H,
    registry: &OffsetRegistry,
    sd: &StateData<'_>,
    mode: SolverMode,
) -> SolverResult<Vec<f64>> {
    let mut out = vec![0.0; registry.require(mode)?.states()];
    for i in active(host) {
        let comp = host.component(i);
        let inputs = host.inputs(i, sd, mode)?;
        comp.derivative(&inputs, sd, &mut out, mode).map_err(named(comp))?;
    }
    Ok(out)
}

/// Collect every component's Jacobian entries into `acc` (cleared first).
pub fn jacobian<H: ComponentHost + ?Sized>(
    host: &H,
    registry: &OffsetRegistry,
    sd: &StateData<'_>,
    mode: SolverMode,
    acc: &mut TripletAccumulator,
) -> SolverResult<()> {
    let totals = registry.require(mode)?;
    acc.clear();
    for i in active(host) {
        let comp = host.component(i);
        let inputs = host.inputs(i, sd, mode)?;
        let locs = host.input_locs(i, mode);
        comp.jacobian_elements(&inputs, sd, acc, &locs, mode).map_err(named(comp))?;
    }
    if acc.len() > totals.jac {
        return Err(SolverError::InvalidState {
            what: format!("{} Jacobian entries exceed the assigned {}", acc.len(), totals.jac),
        });
    }
    Ok(())
}

pub fn roots<H: ComponentHost + ?Sized>(
    host: &H,
    registry: &OffsetRegistry,
    sd: &StateData<'_>,
    mode: SolverMode,
) -> SolverResult<Vec<f64>> {
    let mut out = vec![0.0; registry.require(mode)?.roots];
    for i in active(host) {
        let comp = host.component(i);
        if comp.core().sizes.roots == 0 {
            continue;
        }
        let inputs = host.inputs(i, sd, mode)?;
        comp.root_test(&inputs, sd, &mut out, mode).map_err(named(comp))?;
    }
    Ok(out)
}

/// Apply time-indexed discrete updates; returns the strongest change reported.
pub fn update_discrete<H: ComponentHost + ?Sized>(
    host: &mut H,
    time: f64,
) -> SolverResult<ChangeCode> {
    let mut code = host.update_host(time)?;
    for i in 0..host.len() {
        let comp = host.component_mut(i);
        let c = comp
            .update_a(time)
            .map_err(|e| SolverError::component(comp.name(), e))?;
        code = code.max(c);
    }
    Ok(code)
}

/// Earliest pending discrete update across the host.
pub fn next_update_time<H: ComponentHost + ?Sized>(host: &H) -> Option<f64> {
    active(host)
        .filter_map(|i| host.component(i).next_update_time())
        .chain(host.next_host_update())
        .min_by(f64::total_cmp)
}
