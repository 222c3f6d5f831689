//! End-to-end tests of the assembled bus tree against the solver.

use gd_components::factory::create_model;
use gd_components::{SolverMode, StateData};
use gd_core::Unit;
use gd_solver::jacobian::{Difference, iteration_matrix_fd};
use gd_solver::{
    ComponentHost, DriverOptions, OffsetRegistry, TripletAccumulator, assembly, run,
};
use gd_system::{Bus, Generator, Slot, System, SystemError};

fn generator(name: &str) -> Generator {
    let mut g = Generator::new(name);
    g.set("p", 70.0, Unit::Megawatt).unwrap();
    g.set("q", 0.1, Unit::PerUnit).unwrap();
    g.attach(Slot::Exciter, create_model("ieee1", &format!("{name}.avr")).unwrap())
        .unwrap();
    g.attach(Slot::Governor, create_model("basic", &format!("{name}.gov")).unwrap())
        .unwrap();
    g.attach(Slot::Source, create_model("scheduler", &format!("{name}.pset")).unwrap())
        .unwrap();
    g
}

fn single_bus() -> System {
    let mut bus = Bus::new("b1");
    bus.add_generator(generator("g1"));
    let mut load = create_model("load", "l1").unwrap();
    load.set("p", 0.7, Unit::PerUnit).unwrap();
    bus.add_load(load).unwrap();
    let mut relay = create_model("relay", "uv1").unwrap();
    relay.set_str("condition", "undervoltage").unwrap();
    relay.set("threshold", 0.8, Unit::PerUnit).unwrap();
    bus.add_relay(relay).unwrap();

    let mut system = System::new("test");
    system.add_bus(bus).unwrap();
    system
}

#[test]
fn initialized_system_is_at_rest() {
    let mut system = single_bus();
    system.initialize(0.0).unwrap();
    let mut reg = OffsetRegistry::new();
    reg.assign(&mut system).unwrap();
    reg.verify(&system).unwrap();

    let mode = SolverMode::DifferentialOnly;
    let (x, _) = assembly::guess_state(&system, &reg, 0.0, mode).unwrap();
    assert_eq!(x.len(), 2 + 3 + 1);
    let d = assembly::derivative(&system, &reg, &StateData::states_only(0.0, &x), mode).unwrap();
    assert!(d.iter().all(|v| v.abs() < 1e-9), "{d:?}");

    let mode = SolverMode::Full;
    let (x, xp) = assembly::guess_state(&system, &reg, 0.0, mode).unwrap();
    let sd = StateData::new(0.0, &x, &xp, 1.0);
    let r = assembly::residual(&system, &reg, &sd, mode).unwrap();
    assert!(r.iter().all(|v| v.abs() < 1e-9), "{r:?}");
}

#[test]
fn coupled_jacobian_matches_finite_differences() {
    let mut system = single_bus();
    system.initialize(0.0).unwrap();
    let mut reg = OffsetRegistry::new();
    reg.assign(&mut system).unwrap();

    for mode in [SolverMode::DifferentialOnly, SolverMode::Full] {
        let n = reg.require(mode).unwrap().states();
        let (mut x, _) = assembly::guess_state(&system, &reg, 0.0, mode).unwrap();
        for (i, v) in x.iter_mut().enumerate() {
            *v *= 1.0 + 0.005 * (i as f64 + 1.0);
        }
        let xp = vec![0.0; n];
        let cj = 20.0;

        let sd = StateData::new(0.0, &x, &xp, cj);
        let mut acc = TripletAccumulator::default();
        assembly::jacobian(&system, &reg, &sd, mode, &mut acc).unwrap();
        let analytic = acc.to_dense(n);
        let numeric =
            iteration_matrix_fd(&system, &reg, 0.0, &x, &xp, cj, mode, Difference::default())
                .unwrap();
        for r in 0..n {
            for c in 0..n {
                let (a, f) = (analytic[(r, c)], numeric[(r, c)]);
                assert!((a - f).abs() <= 1e-5 * a.abs().max(1.0), "{mode} ({r},{c}) {a} vs {f}");
            }
        }
    }
}

#[test]
fn clone_gets_fresh_ids_and_no_offsets() {
    let mut system = single_bus();
    system.initialize(0.0).unwrap();
    let mut reg = OffsetRegistry::new();
    reg.assign(&mut system).unwrap();

    let b2 = system.clone_bus("b1", "b2").unwrap();
    let b1 = system.bus("b1").unwrap().id.unwrap();
    assert_ne!(b1, b2);

    let src = system.bus("b1").unwrap().generator("g1").unwrap();
    let copy = system.bus("b2").unwrap().generator("g1").unwrap();
    assert_eq!(copy.bus(), Some(b2));
    assert_ne!(copy.id, src.id);
    assert_ne!(copy.machine().core().id, src.machine().core().id);
    assert!(src.machine().core().block(SolverMode::Full).is_some());
    assert!(copy.machine().core().block(SolverMode::Full).is_none());
    assert_eq!(copy.slot(Slot::Governor).unwrap().name(), "g1.gov");
    assert!(!system.is_initialized());

    system
        .modify_bus("b2", |b| b.generators_mut()[0].set("h", 9.0, Unit::Second))
        .unwrap()
        .unwrap();
    let h = |bus: &str| {
        let g = system.bus(bus).unwrap().generator("g1").unwrap();
        g.get("h", Unit::Second).unwrap()
    };
    assert_eq!(h("b2"), 9.0);
    assert_ne!(h("b1"), 9.0);
    assert_eq!(system.len(), 2 * (4 + 1 + 1));
}

#[test]
fn duplicate_bus_rejected() {
    let mut system = single_bus();
    let err = system.add_bus(Bus::new("b1")).unwrap_err();
    assert!(matches!(err, SystemError::Duplicate { what: "bus", .. }));
    assert!(system.clone_bus("missing", "b9").is_err());
}

#[test]
fn undervoltage_trip_disconnects_bus() {
    let mut system = single_bus();
    system.clone_bus("b1", "b2").unwrap();
    system
        .modify_bus("b1", |b| b.schedule(0.05, "v", 0.5, Unit::PerUnit))
        .unwrap()
        .unwrap();
    system.initialize(0.0).unwrap();

    let mut reg = OffsetRegistry::new();
    let opts = DriverOptions {
        dt: 0.01,
        t_end: 0.2,
        record_every: 1,
        ..DriverOptions::default()
    };
    let traj = run(&mut system, &mut reg, &opts).unwrap();

    let structural: Vec<_> = traj
        .events
        .iter()
        .filter(|e| e.outcome.structure_changes > 0)
        .collect();
    assert_eq!(structural.len(), 1, "{:?}", traj.events);
    assert!(structural[0].time >= 0.05);

    assert!(!system.bus("b1").unwrap().in_service());
    assert!(system.bus("b2").unwrap().in_service());
    let healthy = system.bus("b2").unwrap().relays();
    assert!(healthy.iter().all(|r| r.get("tripped", Unit::Default).unwrap() == 0.0));

    // Only the healthy bus's generator remains in the state vector.
    let totals = reg.require(SolverMode::DifferentialOnly).unwrap();
    assert_eq!(totals.diff, 2 + 3 + 1);
    assert_eq!(traj.x.last().unwrap().len(), totals.states());
    assert!(traj.x.last().unwrap().iter().all(|v| v.is_finite()));
}
