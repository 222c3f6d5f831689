//! Fixed-step explicit reference driver.
//!
//! Advances the differential-only system with forward Euler and resolves root events between
//! steps. It exists to exercise the component contract end to end; it has no error control.

use gd_components::{ChangeCode, CheckLevel, SolverMode, StateData};
use tracing::{debug, info};

use crate::assembly;
use crate::error::{SolverError, SolverResult};
use crate::host::ComponentHost;
use crate::offsets::OffsetRegistry;
use crate::roots::{DEFAULT_MAX_ITERATIONS, RootEngine, RootOutcome};

const MODE: SolverMode = SolverMode::DifferentialOnly;

/// Options for a driver run.
#[derive(Clone, Debug)]
pub struct DriverOptions {
    /// Fixed time step (seconds)
    pub dt: f64,
    pub t_start: f64,
    pub t_end: f64,
    /// Safety limit on the number of steps
    pub max_steps: usize,
    /// Record every N-th step
    pub record_every: usize,
    pub check_level: CheckLevel,
    pub max_root_iterations: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            dt: 1e-3,
            t_start: 0.0,
            t_end: 1.0,
            max_steps: 1_000_000,
            record_every: 10,
            check_level: CheckLevel::Full,
            max_root_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Discrete events resolved during a run.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub time: f64,
    pub outcome: RootOutcome,
}

/// Recorded trajectory. States are in the layout current at the time of recording.
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    pub t: Vec<f64>,
    pub x: Vec<Vec<f64>>,
    pub events: Vec<EventRecord>,
    pub steps: usize,
}

impl Trajectory {
    fn record(&mut self, t: f64, x: &[f64]) {
        self.t.push(t);
        self.x.push(x.to_vec());
    }
}

/// Run from the components' initialized local states to `t_end`.
pub fn run<H: ComponentHost + ?Sized>(
    host: &mut H,
    registry: &mut OffsetRegistry,
    opts: &DriverOptions,
) -> SolverResult<Trajectory> {
    if !(opts.dt > 0.0) {
        return Err(SolverError::ProblemSetup {
            what: "dt must be positive".into(),
        });
    }
    if opts.t_end < opts.t_start {
        return Err(SolverError::ProblemSetup {
            what: "t_end must not precede t_start".into(),
        });
    }
    if opts.record_every == 0 {
        return Err(SolverError::ProblemSetup {
            what: "record_every must be positive".into(),
        });
    }
    if !registry.is_valid() {
        registry.assign(host)?;
    }

    let mut engine = RootEngine {
        max_iterations: opts.max_root_iterations,
        ..RootEngine::default()
    };
    let mut t = opts.t_start;
    let mut x = assembly::guess_state(host, registry, t, MODE)?.0;
    let mut traj = Trajectory::default();

    // Roots already negative at start are resolved before the first step.
    engine.arm_positive(registry, MODE)?;
    resolve(&mut engine, host, registry, t, &mut x, opts, &mut traj)?;
    traj.record(t, &x);

    while t < opts.t_end - 1e-12 * opts.dt && traj.steps < opts.max_steps {
        match assembly::update_discrete(host, t)? {
            ChangeCode::NoChange => {}
            ChangeCode::ValueChange => debug!(t, "discrete updates applied"),
            ChangeCode::JacobianChange => {
                debug!(t, "discrete update changed structure");
                registry.invalidate();
                registry.assign(host)?;
                x = assembly::guess_state(host, registry, t, MODE)?.0;
                // Roots are renumbered; anything negative in the new layout is an event now.
                engine.arm_positive(registry, MODE)?;
                resolve(&mut engine, host, registry, t, &mut x, opts, &mut traj)?;
            }
        }
        // Land exactly on the next scheduled discrete update.
        let mut h = opts.dt.min(opts.t_end - t);
        if let Some(next) = assembly::next_update_time(host).filter(|&n| n > t + 1e-12) {
            h = h.min(next - t);
        }
        let dx = {
            let sd = StateData::states_only(t, &x);
            assembly::derivative(host, registry, &sd, MODE)?
        };
        for (xi, di) in x.iter_mut().zip(&dx) {
            *xi += h * di;
        }
        if let Some(bad) = x.iter().position(|v| !v.is_finite()) {
            return Err(SolverError::Numeric {
                what: format!("state {bad} became non-finite at t = {t}"),
            });
        }
        t += h;
        traj.steps += 1;

        assembly::accept_state(host, t, &x, &dx, MODE);
        resolve(&mut engine, host, registry, t, &mut x, opts, &mut traj)?;

        if traj.steps % opts.record_every == 0 {
            traj.record(t, &x);
        }
    }

    if traj.steps % opts.record_every != 0 {
        traj.record(t, &x);
    }
    info!(steps = traj.steps, events = traj.events.len(), t, "run finished");
    Ok(traj)
}

fn resolve<H: ComponentHost + ?Sized>(
    engine: &mut RootEngine,
    host: &mut H,
    registry: &mut OffsetRegistry,
    t: f64,
    x: &mut Vec<f64>,
    opts: &DriverOptions,
    traj: &mut Trajectory,
) -> SolverResult<()> {
    let outcome = engine.resolve(host, registry, t, x, MODE, opts.check_level)?;
    if outcome.passes > 0 {
        assembly::accept_state(host, t, x, &[], MODE);
        traj.events.push(EventRecord { time: t, outcome });
    }
    Ok(())
}
