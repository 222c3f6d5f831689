//! Reference driver runs across host-level structural updates.

mod common;

use common::FixedHost;
use gd_components::{LimitSide, SolverMode};
use gd_core::Unit;
use gd_solver::{DriverOptions, OffsetRegistry, run};

#[test]
fn structural_update_resolves_limits_it_violates() {
    let mut host = FixedHost::new();
    host.add("basic", &[("omega", 1.0), ("pref", 0.6)], &[("pm", 0.6)]);
    host.add("basic", &[("omega", 1.0), ("pref", 0.4)], &[("pm", 0.4)]);
    // At 50 ms the second unit leaves service and the first one's valve limit drops below
    // its present output.
    host.updates.push((0.05, |h: &mut FixedHost| {
        h.disable(1);
        h.comps[0].set("pmax", 0.5, Unit::Default).unwrap();
    }));

    let mut reg = OffsetRegistry::new();
    let opts = DriverOptions {
        dt: 0.01,
        t_end: 0.1,
        record_every: 1,
        ..DriverOptions::default()
    };
    let traj = run(&mut host, &mut reg, &opts).unwrap();

    assert_eq!(reg.require(SolverMode::DifferentialOnly).unwrap().roots, 1);
    assert_eq!(host.comps[0].core().flags.limit_side(), Some(LimitSide::High));
    let event = traj.events.first().expect("limit event recorded");
    assert!((event.time - 0.05).abs() < 1e-9, "{}", event.time);
    assert_eq!(traj.x.last().unwrap(), &vec![0.5]);
}
