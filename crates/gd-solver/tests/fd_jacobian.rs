//! Analytic iteration matrices against finite differences of the global residual.

mod common;

use common::{FixedHost, generator_set};
use gd_components::{
    ChangeCode, CheckLevel, ComponentKind, IoData, ROOT_HYSTERESIS, SolverMode, StateData,
};
use gd_core::Unit;
use gd_core::numeric::Tolerances;
use gd_solver::jacobian::{Difference, first_mismatch, iteration_matrix_fd};
use gd_solver::{ComponentHost, OffsetRegistry, TripletAccumulator, assembly};

const AGREE: Tolerances = Tolerances {
    abs: 1e-5,
    rel: 1e-5,
};

fn analytic(
    host: &FixedHost,
    reg: &OffsetRegistry,
    x: &[f64],
    xp: &[f64],
    cj: f64,
    mode: SolverMode,
) -> (TripletAccumulator, usize) {
    let n = reg.require(mode).unwrap().states();
    let sd = StateData::new(0.0, x, xp, cj);
    let mut acc = TripletAccumulator::default();
    assembly::jacobian(host, reg, &sd, mode, &mut acc).unwrap();
    (acc, n)
}

fn assert_matches(host: &FixedHost, reg: &OffsetRegistry, x: &[f64], cj: f64, mode: SolverMode) {
    let n = reg.require(mode).unwrap().states();
    let xp: Vec<f64> = (0..n).map(|i| 0.1 * i as f64).collect();
    let (acc, n) = analytic(host, reg, x, &xp, cj, mode);
    let exact = acc.to_dense(n);
    let numeric = iteration_matrix_fd(host, reg, 0.0, x, &xp, cj, mode, Difference::default())
        .unwrap();
    if let Some((r, c)) = first_mismatch(&exact, &numeric, AGREE) {
        panic!(
            "{mode} ({r}, {c}): analytic {}, numeric {}",
            exact[(r, c)],
            numeric[(r, c)]
        );
    }
}

/// Initial guess moved off equilibrium without crossing any limit.
fn displaced(host: &FixedHost, reg: &OffsetRegistry, mode: SolverMode) -> Vec<f64> {
    let (mut x, _) = assembly::guess_state(host, reg, 0.0, mode).unwrap();
    for (i, v) in x.iter_mut().enumerate() {
        *v *= 1.0 + 0.01 * (i as f64 + 1.0);
    }
    x
}

fn compare(mode: SolverMode, cj: f64) {
    let mut host = generator_set();
    let mut reg = OffsetRegistry::new();
    reg.assign(&mut host).unwrap();
    let x = displaced(&host, &reg, mode);
    assert_matches(&host, &reg, &x, cj, mode);
}

#[test]
fn differential_only_matches_finite_differences() {
    compare(SolverMode::DifferentialOnly, 10.0);
}

#[test]
fn full_mode_matches_finite_differences() {
    compare(SolverMode::Full, 25.0);
}

#[test]
fn forward_differences_agree_loosely() {
    let mode = SolverMode::DifferentialOnly;
    let mut host = generator_set();
    let mut reg = OffsetRegistry::new();
    reg.assign(&mut host).unwrap();
    let x = displaced(&host, &reg, mode);
    let xp = vec![0.0; x.len()];

    let (acc, n) = analytic(&host, &reg, &x, &xp, 10.0, mode);
    let forward = Difference::Forward { epsilon: 1e-7 };
    let numeric = iteration_matrix_fd(&host, &reg, 0.0, &x, &xp, 10.0, mode, forward).unwrap();
    let loose = Tolerances {
        abs: 1e-3,
        rel: 1e-3,
    };
    assert_eq!(first_mismatch(&acc.to_dense(n), &numeric, loose), None);
}

/// Push every limiter of an exciter/governor set past its upper bound and let it clamp.
fn clamp_all(host: &mut FixedHost, reg: &mut OffsetRegistry, mode: SolverMode) -> Vec<f64> {
    reg.assign(host).unwrap();
    let (mut x, _) = assembly::guess_state(&*host, reg, 0.0, mode).unwrap();
    for i in 0..host.len() {
        let comp = host.component(i);
        let start = comp.core().block(mode).unwrap().diff;
        let (slot, upper) = match comp.kind() {
            ComponentKind::Exciter => (start + 1, comp.get("vrmax", Unit::Default).unwrap()),
            _ => (start, comp.get("pmax", Unit::Default).unwrap()),
        };
        x[slot] = upper + 2.0 * ROOT_HYSTERESIS;
    }
    for i in 0..host.len() {
        let inputs: IoData = host.inputs[i].clone();
        let code = host.comps[i]
            .root_check(&inputs, &mut x, mode, CheckLevel::Full)
            .unwrap();
        assert_eq!(code, ChangeCode::JacobianChange, "{}", host.comps[i].core().name);
        assert!(host.comps[i].core().flags.is_limited());
    }
    reg.invalidate();
    reg.assign(host).unwrap();
    x
}

#[test]
fn limited_regimes_match_finite_differences() {
    for (mode, cj) in [(SolverMode::DifferentialOnly, 10.0), (SolverMode::Full, 25.0)] {
        let mut host = FixedHost::new();
        host.add("ieee1", &[("v", 1.0)], &[("ef", 1.6)]);
        host.add("ieee2", &[("v", 1.0)], &[("ef", 1.6)]);
        host.add("basic", &[("omega", 1.0), ("pref", 0.6)], &[("pm", 0.6)]);
        let mut reg = OffsetRegistry::new();
        let x = clamp_all(&mut host, &mut reg, mode);

        let counts: Vec<usize> = host.comps.iter().map(|c| c.jac_size(mode)).collect();
        assert_eq!(counts, [5, 8, 1], "{mode}");

        // Clamped branches never reference the unwired inputs.
        let xp = vec![0.0; x.len()];
        let (acc, _) = analytic(&host, &reg, &x, &xp, cj, mode);
        assert_eq!(acc.len(), reg.require(mode).unwrap().jac, "{mode}");

        assert_matches(&host, &reg, &x, cj, mode);
    }
}

#[test]
fn wired_machine_matches_finite_differences() {
    let mut host = FixedHost::new();
    let ex = host.add("ieee1", &[("v", 1.0)], &[("ef", 1.1)]);
    let gov = host.add("basic", &[("omega", 1.0), ("pref", 0.6)], &[("pm", 0.6)]);
    let machine = host.add(
        "classical",
        &[("v", 1.0), ("theta", 0.0), ("f", 1.0), ("pm", 0.6), ("ef", 1.1)],
        &[("p", 0.6), ("q", 0.1)],
    );
    host.wire(machine, 3, gov);
    host.wire(machine, 4, ex);
    host.wire(gov, 0, machine);

    let mut reg = OffsetRegistry::new();
    reg.assign(&mut host).unwrap();
    for (mode, cj) in [
        (SolverMode::DifferentialOnly, 10.0),
        (SolverMode::Full, 25.0),
        (SolverMode::AlgebraicOnly, 1.0),
    ] {
        let x = displaced(&host, &reg, mode);
        assert_matches(&host, &reg, &x, cj, mode);
    }
}

#[test]
fn entry_count_never_exceeds_assignment() {
    let mut host = generator_set();
    let mut reg = OffsetRegistry::new();
    reg.assign(&mut host).unwrap();
    for mode in SolverMode::ALL {
        let (x, xp) = assembly::guess_state(&host, &reg, 0.0, mode).unwrap();
        let sd = StateData::new(0.0, &x, &xp, 1.0);
        let mut acc = TripletAccumulator::default();
        assembly::jacobian(&host, &reg, &sd, mode, &mut acc).unwrap();
        assert!(acc.len() <= reg.require(mode).unwrap().jac, "{mode}");
    }
}
