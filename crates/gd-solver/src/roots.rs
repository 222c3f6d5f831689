//! Zero-crossing detection and discrete regime resolution.
//!
//! The engine keeps the root values of the last accepted step as a baseline. After a step it
//! re-polls every root; for each slot whose sign changed, the owning component's `root_check`
//! runs once per pass. The baseline of the checked components is then refreshed from a new
//! poll, so a switch that exposes another threshold shows up as a fresh sign change on the next
//! pass. Resolution stops once a pass sees no changes.
//!
//! A structural change renumbers the root slots. The baseline is then rebuilt per component:
//! checked components take their fresh values, untouched components keep their previous ones,
//! and components whose root count changed start from positive, so anything already negative
//! in the new layout is resolved on the next pass.

use std::collections::BTreeSet;

use gd_components::{ChangeCode, CheckLevel, SolverMode, StateData};
use gd_core::numeric::root_sign;
use tracing::{debug, info};

use crate::assembly;
use crate::error::{SolverError, SolverResult};
use crate::host::ComponentHost;
use crate::offsets::OffsetRegistry;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Summary of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RootOutcome {
    /// Passes that found at least one sign change.
    pub passes: usize,
    /// Root slots that changed sign, summed over passes.
    pub flips: usize,
    /// Passes in which the Jacobian structure or topology changed.
    pub structure_changes: usize,
    /// Strongest change code returned by any check.
    pub code: ChangeCode,
}

impl RootOutcome {
    pub fn changed(&self) -> bool {
        self.code != ChangeCode::NoChange
    }
}

#[derive(Debug, Clone)]
pub struct RootEngine {
    pub max_iterations: usize,
    pub(crate) baseline: Vec<f64>,
}

impl Default for RootEngine {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            baseline: Vec::new(),
        }
    }
}

impl RootEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn baseline(&self) -> &[f64] {
        &self.baseline
    }

    /// Take the current root values as the accepted baseline.
    pub fn arm<H: ComponentHost + ?Sized>(
        &mut self,
        host: &H,
        registry: &OffsetRegistry,
        time: f64,
        state: &[f64],
        mode: SolverMode,
    ) -> SolverResult<()> {
        let sd = StateData::states_only(time, state);
        self.baseline = assembly::roots(host, registry, &sd, mode)?;
        Ok(())
    }

    /// Baseline of all-positive roots, so any root already negative is resolved by the next
    /// call to [`resolve`](Self::resolve). Used right after initialization.
    pub fn arm_positive(
        &mut self,
        registry: &OffsetRegistry,
        mode: SolverMode,
    ) -> SolverResult<()> {
        self.baseline = vec![1.0; registry.require(mode)?.roots];
        Ok(())
    }

    /// Resolve every sign change since the baseline, re-polling until stable.
    ///
    /// A structural change invalidates `registry`, reassigns it and rebuilds `state` in the new
    /// layout before the next poll.
    pub fn resolve<H: ComponentHost + ?Sized>(
        &mut self,
        host: &mut H,
        registry: &mut OffsetRegistry,
        time: f64,
        state: &mut Vec<f64>,
        mode: SolverMode,
        level: CheckLevel,
    ) -> SolverResult<RootOutcome> {
        let mut outcome = RootOutcome::default();
        let mut current = poll(host, registry, time, state, mode)?;
        if current.len() != self.baseline.len() {
            debug!(
                stale = self.baseline.len(),
                roots = current.len(),
                "root baseline does not match layout, arming positive"
            );
            self.baseline = vec![1.0; current.len()];
        }

        loop {
            let flipped: Vec<usize> = (0..current.len())
                .filter(|&i| root_sign(current[i]) != root_sign(self.baseline[i]))
                .collect();
            if flipped.is_empty() {
                self.baseline = current;
                return Ok(outcome);
            }
            if outcome.passes >= self.max_iterations {
                return Err(SolverError::ConvergenceFailure {
                    what: format!(
                        "root resolution still changing after {} passes ({} slots)",
                        outcome.passes,
                        flipped.len()
                    ),
                });
            }
            outcome.passes += 1;
            outcome.flips += flipped.len();

            let owners: BTreeSet<usize> = flipped
                .iter()
                .filter_map(|&r| registry.root_owner(mode, r))
                .collect();
            debug!(pass = outcome.passes, ?flipped, ?owners, "root sign changes");

            let mut structural = false;
            for &owner in &owners {
                let code = check_one(host, owner, time, state, mode, level)?;
                outcome.code = outcome.code.max(code);
                if code == ChangeCode::NoChange {
                    continue;
                }
                structural |= code == ChangeCode::JacobianChange;
                structural |= host.after_root_check(owner, code)?;
            }

            if structural {
                outcome.structure_changes += 1;
                // Per-component baselines must be read before a reassignment renumbers them.
                let previous = self.per_component(host, mode);
                assembly::accept_state(host, time, state, &[], mode);
                registry.invalidate();
                registry.assign(host)?;
                *state = assembly::guess_state(host, registry, time, mode)?.0;
                current = poll(host, registry, time, state, mode)?;
                self.relayout(host, mode, &previous, &owners, &current);
                continue;
            }

            let next = poll(host, registry, time, state, mode)?;
            for &o in &owners {
                if let Some(range) = root_range(host, o, mode) {
                    self.baseline[range.clone()].copy_from_slice(&next[range]);
                }
            }
            current = next;
        }
    }
}

impl RootEngine {
    /// Baseline values of each component under the current layout.
    fn per_component<H: ComponentHost + ?Sized>(
        &self,
        host: &H,
        mode: SolverMode,
    ) -> Vec<Option<Vec<f64>>> {
        (0..host.len())
            .map(|i| {
                root_range(host, i, mode).and_then(|r| self.baseline.get(r).map(<[f64]>::to_vec))
            })
            .collect()
    }

    /// Rebuild the baseline for a new root layout.
    fn relayout<H: ComponentHost + ?Sized>(
        &mut self,
        host: &H,
        mode: SolverMode,
        previous: &[Option<Vec<f64>>],
        checked: &BTreeSet<usize>,
        current: &[f64],
    ) {
        let mut baseline = vec![1.0; current.len()];
        for i in 0..host.len() {
            let Some(range) = root_range(host, i, mode) else {
                continue;
            };
            let carried = if checked.contains(&i) {
                current.get(range.clone())
            } else {
                previous
                    .get(i)
                    .and_then(Option::as_deref)
                    .filter(|v| v.len() == range.len())
            };
            if let Some(values) = carried {
                baseline[range].copy_from_slice(values);
            }
        }
        self.baseline = baseline;
    }
}

fn root_range<H: ComponentHost + ?Sized>(
    host: &H,
    index: usize,
    mode: SolverMode,
) -> Option<std::ops::Range<usize>> {
    host.component(index)
        .core()
        .block(mode)
        .map(|b| b.root_range())
        .filter(|r| !r.is_empty())
}

fn poll<H: ComponentHost + ?Sized>(
    host: &H,
    registry: &OffsetRegistry,
    time: f64,
    state: &[f64],
    mode: SolverMode,
) -> SolverResult<Vec<f64>> {
    let sd = StateData::states_only(time, state);
    assembly::roots(host, registry, &sd, mode)
}

fn check_one<H: ComponentHost + ?Sized>(
    host: &mut H,
    index: usize,
    time: f64,
    state: &mut [f64],
    mode: SolverMode,
    level: CheckLevel,
) -> SolverResult<ChangeCode> {
    let inputs = {
        let sd = StateData::states_only(time, state);
        host.inputs(index, &sd, mode)?
    };
    let comp = host.component_mut(index);
    let code = comp
        .root_check(&inputs, state, mode, level)
        .map_err(|e| SolverError::component(comp.name(), e))?;
    if code != ChangeCode::NoChange {
        info!(component = %comp.name(), ?code, time, "discrete state changed");
        if level.wants_consistency() {
            comp.correct_consistency(&inputs, state, mode)
                .map_err(|e| SolverError::component(comp.name(), e))?;
        }
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gd_components::{
        CloneTarget, Cloned, ComponentCore, ComponentKind, ComponentResult, ComponentSizes,
        DaeComponent, InitFlags, IoData, Limiter, OpFlags, ROOT_HYSTERESIS,
        traits::clone_into_target,
    };
    use gd_core::units::Unit;
    use std::any::Any;

    macro_rules! boilerplate {
        () => {
            fn core(&self) -> &ComponentCore {
                &self.core
            }
            fn core_mut(&mut self) -> &mut ComponentCore {
                &mut self.core
            }
            fn kind(&self) -> ComponentKind {
                ComponentKind::External
            }
            fn initialize_b(
                &mut self,
                _inputs: &IoData,
                _desired: &IoData,
                _output_set: &mut IoData,
            ) -> ComponentResult<()> {
                Ok(())
            }
            fn set(&mut self, field: &str, value: f64, _unit: Unit) -> ComponentResult<()> {
                self.core.set(field, value)
            }
            fn get(&self, field: &str, _unit: Unit) -> ComponentResult<f64> {
                self.core.get(field)
            }
            fn fields(&self) -> &'static [&'static str] {
                &[]
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
        };
    }

    /// One state held inside `[0, ∞)` by a low limiter; recovery pulls it back up.
    #[derive(Clone)]
    struct Clamp {
        core: ComponentCore,
    }

    const LIM: Limiter = Limiter {
        min: 0.0,
        max: f64::INFINITY,
    };

    impl DaeComponent for Clamp {
        boilerplate!();

        fn initialize_a(&mut self, _t: f64, _f: InitFlags) -> ComponentResult<()> {
            self.core.set_sizes(ComponentSizes {
                diff: 1,
                alg: 0,
                roots: 1,
                jac: 1,
            });
            Ok(())
        }

        fn root_test(
            &self,
            _inputs: &IoData,
            sd: &StateData<'_>,
            roots: &mut [f64],
            mode: SolverMode,
        ) -> ComponentResult<()> {
            let x = self.core.locate(sd, mode)?.diff[0];
            self.core.write_roots(roots, mode, &[LIM.root(self.core.flags, x, -x)])
        }

        fn root_check(
            &mut self,
            _inputs: &IoData,
            state: &mut [f64],
            mode: SolverMode,
            _level: CheckLevel,
        ) -> ComponentResult<ChangeCode> {
            let x = {
                let sd = StateData::states_only(0.0, state);
                self.core.locate(&sd, mode)?.diff[0]
            };
            let mut flags = self.core.flags;
            let mut value = x;
            let code = LIM.check(&mut flags, &mut value, -x);
            self.core.flags = flags;
            self.core.store_diff(state, mode, 0, value)?;
            Ok(code)
        }
    }

    /// Alarm raised while input 0 is set; tripping is latched.
    #[derive(Clone)]
    struct Alarm {
        core: ComponentCore,
    }

    impl DaeComponent for Alarm {
        boilerplate!();

        fn initialize_a(&mut self, _t: f64, _f: InitFlags) -> ComponentResult<()> {
            self.core.set_sizes(ComponentSizes {
                roots: 1,
                ..ComponentSizes::default()
            });
            Ok(())
        }

        fn root_test(
            &self,
            inputs: &IoData,
            _sd: &StateData<'_>,
            roots: &mut [f64],
            mode: SolverMode,
        ) -> ComponentResult<()> {
            let tripped = self.core.flags.contains(OpFlags::TRIPPED);
            let root = if !tripped && inputs.value_or(0, 0.0) > 0.5 { -1.0 } else { 1.0 };
            self.core.write_roots(roots, mode, &[root])
        }

        fn root_check(
            &mut self,
            _inputs: &IoData,
            _state: &mut [f64],
            _mode: SolverMode,
            _level: CheckLevel,
        ) -> ComponentResult<ChangeCode> {
            self.core.flags.insert(OpFlags::TRIPPED);
            Ok(ChangeCode::ValueChange)
        }
    }

    /// Root sign follows the parity of the partner's check counter.
    #[derive(Clone)]
    struct Toggle {
        core: ComponentCore,
        count: u32,
    }

    impl DaeComponent for Toggle {
        boilerplate!();

        fn initialize_a(&mut self, _t: f64, _f: InitFlags) -> ComponentResult<()> {
            self.core.set_sizes(ComponentSizes {
                roots: 1,
                ..ComponentSizes::default()
            });
            Ok(())
        }

        fn root_test(
            &self,
            inputs: &IoData,
            _sd: &StateData<'_>,
            roots: &mut [f64],
            mode: SolverMode,
        ) -> ComponentResult<()> {
            let odd = inputs.value_or(0, 0.0) as u32 % 2 == 1;
            self.core.write_roots(roots, mode, &[if odd { -1.0 } else { 1.0 }])
        }

        fn root_check(
            &mut self,
            _inputs: &IoData,
            _state: &mut [f64],
            _mode: SolverMode,
            _level: CheckLevel,
        ) -> ComponentResult<ChangeCode> {
            self.count += 1;
            Ok(ChangeCode::ValueChange)
        }
    }

    /// State kept at or above input 0; engaging lifts it onto the input.
    #[derive(Clone)]
    struct Floor {
        core: ComponentCore,
    }

    impl DaeComponent for Floor {
        boilerplate!();

        fn initialize_a(&mut self, _t: f64, _f: InitFlags) -> ComponentResult<()> {
            self.core.set_sizes(ComponentSizes {
                diff: 1,
                alg: 0,
                roots: 1,
                jac: 1,
            });
            Ok(())
        }

        fn root_test(
            &self,
            inputs: &IoData,
            sd: &StateData<'_>,
            roots: &mut [f64],
            mode: SolverMode,
        ) -> ComponentResult<()> {
            let x = self.core.locate(sd, mode)?.diff[0];
            let root = if self.core.flags.is_limited() {
                1.0
            } else {
                x - inputs.value_or(0, 0.0) + ROOT_HYSTERESIS
            };
            self.core.write_roots(roots, mode, &[root])
        }

        fn root_check(
            &mut self,
            inputs: &IoData,
            state: &mut [f64],
            mode: SolverMode,
            _level: CheckLevel,
        ) -> ComponentResult<ChangeCode> {
            let x = {
                let sd = StateData::states_only(0.0, state);
                self.core.locate(&sd, mode)?.diff[0]
            };
            let floor = inputs.value_or(0, 0.0);
            if self.core.flags.is_limited() || x >= floor - ROOT_HYSTERESIS {
                return Ok(ChangeCode::NoChange);
            }
            self.core.flags.engage_low();
            self.core.store_diff(state, mode, 0, floor)?;
            Ok(ChangeCode::JacobianChange)
        }
    }

    struct Host {
        comps: Vec<Box<dyn DaeComponent>>,
        feed: fn(&Host, usize) -> f64,
        /// Reaction to a changed component; true when it altered the active set.
        react: fn(&mut Host, usize) -> bool,
    }

    impl ComponentHost for Host {
        fn len(&self) -> usize {
            self.comps.len()
        }
        fn component(&self, index: usize) -> &dyn DaeComponent {
            self.comps[index].as_ref()
        }
        fn component_mut(&mut self, index: usize) -> &mut dyn DaeComponent {
            self.comps[index].as_mut()
        }
        fn inputs(
            &self,
            index: usize,
            _sd: &StateData<'_>,
            _m: SolverMode,
        ) -> SolverResult<IoData> {
            Ok(IoData::from_pairs(&[("u", (self.feed)(self, index))]))
        }
        fn after_root_check(&mut self, index: usize, _code: ChangeCode) -> SolverResult<bool> {
            let react = self.react;
            Ok(react(self, index))
        }
    }

    fn ready(mut comps: Vec<Box<dyn DaeComponent>>, feed: fn(&Host, usize) -> f64) -> Host {
        for c in &mut comps {
            c.initialize_a(0.0, InitFlags::empty()).unwrap();
        }
        Host {
            comps,
            feed,
            react: |_, _| false,
        }
    }

    #[test]
    fn clamp_exposes_second_threshold() {
        let clamp = Clamp {
            core: ComponentCore::new("clamp"),
        };
        let alarm = Alarm {
            core: ComponentCore::new("alarm"),
        };
        // The alarm watches whether the clamp is limited.
        let mut host = ready(vec![Box::new(clamp), Box::new(alarm)], |h, i| {
            if i == 1 && h.comps[0].core().flags.is_limited() { 1.0 } else { 0.0 }
        });
        let mode = SolverMode::DifferentialOnly;
        let mut reg = OffsetRegistry::new();
        reg.assign(&mut host).unwrap();
        let version = reg.structure_version();

        let mut engine = RootEngine::new();
        let mut state = vec![0.5];
        engine.arm(&host, &reg, 0.0, &state, mode).unwrap();

        state[0] = -0.3;
        let out = engine
            .resolve(&mut host, &mut reg, 0.1, &mut state, mode, CheckLevel::Full)
            .unwrap();
        assert_eq!(out.structure_changes, 1);
        assert_eq!(out.flips, 2);
        assert_eq!(out.passes, 2);
        assert_eq!(out.code, ChangeCode::JacobianChange);
        assert_eq!(state[0], 0.0);
        assert!(host.comps[1].core().flags.contains(OpFlags::TRIPPED));
        assert!(reg.is_valid());
        assert_eq!(reg.structure_version(), version + 1);
        assert!(engine.baseline().iter().all(|r| *r > 0.0));

        // Nothing left to resolve.
        let again = engine
            .resolve(&mut host, &mut reg, 0.2, &mut state, mode, CheckLevel::Full)
            .unwrap();
        assert_eq!(again, RootOutcome::default());
    }

    #[test]
    fn overshoot_inside_margin_is_not_an_event() {
        let clamp = Clamp {
            core: ComponentCore::new("clamp"),
        };
        let mut host = ready(vec![Box::new(clamp)], |_, _| 0.0);
        let mode = SolverMode::DifferentialOnly;
        let mut reg = OffsetRegistry::new();
        reg.assign(&mut host).unwrap();
        let mut engine = RootEngine::new();
        let mut state = vec![0.5];
        engine.arm(&host, &reg, 0.0, &state, mode).unwrap();

        state[0] = -0.5 * ROOT_HYSTERESIS;
        let out = engine
            .resolve(&mut host, &mut reg, 0.1, &mut state, mode, CheckLevel::Full)
            .unwrap();
        assert_eq!(out.passes, 0);
        assert!(!out.changed());
    }

    #[test]
    fn endless_cascade_hits_the_cap() {
        let a = Toggle {
            core: ComponentCore::new("a"),
            count: 0,
        };
        let b = Toggle {
            core: ComponentCore::new("b"),
            count: 0,
        };
        // Each toggle watches the other's counter.
        let mut host = ready(vec![Box::new(a), Box::new(b)], |h, i| {
            let other = h.comps[1 - i].as_any().downcast_ref::<Toggle>();
            other.map_or(0.0, |t| f64::from(t.count))
        });
        let mode = SolverMode::DifferentialOnly;
        let mut reg = OffsetRegistry::new();
        reg.assign(&mut host).unwrap();
        let mut engine = RootEngine::new();
        engine.arm(&host, &reg, 0.0, &[], mode).unwrap();

        host.comps[0]
            .as_any_mut()
            .downcast_mut::<Toggle>()
            .unwrap()
            .count = 1;
        let err = engine
            .resolve(&mut host, &mut reg, 0.1, &mut Vec::new(), mode, CheckLevel::Full)
            .unwrap_err();
        assert!(matches!(err, SolverError::ConvergenceFailure { .. }));
    }

    #[test]
    fn armed_positive_resolves_initial_violations() {
        let alarm = Alarm {
            core: ComponentCore::new("alarm"),
        };
        let mut host = ready(vec![Box::new(alarm)], |_, _| 1.0);
        let mode = SolverMode::DifferentialOnly;
        let mut reg = OffsetRegistry::new();
        reg.assign(&mut host).unwrap();
        let mut engine = RootEngine::new();
        engine.arm_positive(&reg, mode).unwrap();
        let out = engine
            .resolve(&mut host, &mut reg, 0.0, &mut Vec::new(), mode, CheckLevel::Full)
            .unwrap();
        assert_eq!(out.code, ChangeCode::ValueChange);
        assert_eq!(out.structure_changes, 0);
    }
    #[test]
    fn trip_that_removes_roots_still_resolves_exposed_limit() {
        let breaker = Alarm {
            core: ComponentCore::new("breaker"),
        };
        let spare = Alarm {
            core: ComponentCore::new("spare"),
        };
        let floor = Floor {
            core: ComponentCore::new("floor"),
        };
        // The breaker trips at once; its trip raises the floor above the held state.
        let mut host = ready(vec![Box::new(breaker), Box::new(spare), Box::new(floor)], |h, i| {
            let tripped = h.comps[0].core().flags.contains(OpFlags::TRIPPED);
            match i {
                0 => 1.0,
                2 if tripped => 0.8,
                _ => 0.0,
            }
        });
        // Tripping takes the spare out of service, so the root layout shrinks.
        host.react = |h, i| {
            if i == 0 {
                h.comps[1].core_mut().flags.insert(OpFlags::DISABLED);
            }
            i == 0
        };
        let mode = SolverMode::DifferentialOnly;
        let mut reg = OffsetRegistry::new();
        reg.assign(&mut host).unwrap();
        assert_eq!(reg.require(mode).unwrap().roots, 3);

        let mut engine = RootEngine::new();
        engine.arm_positive(&reg, mode).unwrap();
        let mut state = vec![0.5];
        let out = engine
            .resolve(&mut host, &mut reg, 0.0, &mut state, mode, CheckLevel::Full)
            .unwrap();

        assert_eq!(reg.require(mode).unwrap().roots, 2);
        assert_eq!(out.passes, 2);
        assert_eq!(out.structure_changes, 2);
        assert!(host.comps[2].core().flags.is_limited());
        assert_eq!(state, [0.8]);
        assert!(engine.baseline().iter().all(|r| *r > 0.0));
    }

    #[test]
    fn stale_baseline_is_armed_positive() {
        let alarm = Alarm {
            core: ComponentCore::new("alarm"),
        };
        let mut host = ready(vec![Box::new(alarm)], |_, _| 1.0);
        let mode = SolverMode::DifferentialOnly;
        let mut reg = OffsetRegistry::new();
        reg.assign(&mut host).unwrap();
        // Never armed: the empty baseline does not match the one-root layout.
        let mut engine = RootEngine::new();
        let out = engine
            .resolve(&mut host, &mut reg, 0.0, &mut Vec::new(), mode, CheckLevel::Full)
            .unwrap();
        assert_eq!(out.passes, 1);
        assert!(host.comps[0].core().flags.contains(OpFlags::TRIPPED));
    }
}
