use std::path::Path;

use gd_components::SolverMode;
use gd_core::Unit;
use gd_project::{ProjectError, ValidationError, build_system, from_str, load_yaml};
use gd_solver::{ComponentHost, DriverOptions, OffsetRegistry, run};
use gd_system::Slot;

fn demo_path() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/smib.yaml")
}

const MINIMAL: &str = r#"
version: 1
name: minimal
buses:
  - name: b1
    generators:
      - name: g1
        params:
          p: 0.5
"#;

fn validation_error(yaml: &str) -> ValidationError {
    match from_str(yaml) {
        Err(ProjectError::Validation(e)) => e,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn demo_loads_and_builds() {
    let scenario = load_yaml(&demo_path()).unwrap();
    assert_eq!(scenario.name, "smib");
    let built = build_system(&scenario).unwrap();
    assert!(built.skipped.is_empty(), "{:?}", built.skipped);

    let system = &built.system;
    assert_eq!(system.buses().len(), 2);
    assert_eq!(system.len(), 2 * (4 + 1 + 1));

    let b1 = system.bus("b1").unwrap();
    assert!((b1.f - 1.0).abs() < 1e-12);
    let g1 = b1.generator("g1").unwrap();
    assert!((g1.p - 0.7).abs() < 1e-12);
    assert!((g1.get("h", Unit::Second).unwrap() - 4.0).abs() < 1e-12);
    let avr = g1.slot(Slot::Exciter).unwrap();
    assert!((avr.get("ta", Unit::Second).unwrap() - 0.2).abs() < 1e-12);
    assert!((b1.loads()[0].get("p", Unit::PerUnit).unwrap() - 0.7).abs() < 1e-12);

    // The disturbance is scheduled after cloning, so only b1 carries it.
    assert_eq!(b1.next_disturbance(), Some(0.1));
    assert_eq!(system.bus("b2").unwrap().next_disturbance(), None);
}

#[test]
fn demo_run_trips_only_the_disturbed_bus() {
    let scenario = load_yaml(&demo_path()).unwrap();
    let mut system = build_system(&scenario).unwrap().system;
    system.initialize(0.0).unwrap();

    let mut registry = OffsetRegistry::new();
    let opts = DriverOptions {
        dt: scenario.run.dt,
        t_end: scenario.run.t_end,
        record_every: scenario.run.record_every,
        check_level: scenario.run.check_level.into(),
        ..DriverOptions::default()
    };
    let traj = run(&mut system, &mut registry, &opts).unwrap();

    assert!(!system.bus("b1").unwrap().in_service());
    assert!(system.bus("b2").unwrap().in_service());
    let trips = traj.events.iter().filter(|e| e.outcome.structure_changes > 0).count();
    assert_eq!(trips, 1);
    let totals = registry.require(SolverMode::DifferentialOnly).unwrap();
    assert_eq!(totals.diff, 2 + 3 + 1);
}

#[test]
fn defaults_fill_missing_sections() {
    let scenario = from_str(MINIMAL).unwrap();
    assert_eq!(scenario.run.dt, 1e-3);
    assert!(scenario.clones.is_empty());
    let built = build_system(&scenario).unwrap();
    assert_eq!(built.system.len(), 1);
}

#[test]
fn bad_parameters_are_skipped() {
    let yaml = r#"
version: 1
name: sloppy
buses:
  - name: b1
    params:
      v: 1.02
      v(furlongs): 3.0
    generators:
      - name: g1
        params:
          p: 0.5
          h: -2.0
          flux: 1.0
        governor:
          model: droop
          params:
            pmax: 1.1
            r: fast
"#;
    let built = build_system(&from_str(yaml).unwrap()).unwrap();
    let mut skipped = built.skipped.clone();
    skipped.sort();
    assert_eq!(
        skipped,
        vec!["b1.v(furlongs)", "g1.flux", "g1.governor.r", "g1.h"]
    );

    let b1 = built.system.bus("b1").unwrap();
    assert!((b1.v - 1.02).abs() < 1e-12);
    let gov = b1.generator("g1").unwrap().slot(Slot::Governor).unwrap();
    assert!((gov.get("pmax", Unit::PerUnit).unwrap() - 1.1).abs() < 1e-12);
}

#[test]
fn unknown_model_is_rejected() {
    let yaml = format!("{MINIMAL}        exciter:\n          model: sexs\n");
    assert!(matches!(
        validation_error(&yaml),
        ValidationError::UnknownModel { model, .. } if model == "sexs"
    ));
}

#[test]
fn slot_kind_is_checked() {
    let yaml = format!("{MINIMAL}        governor:\n          model: ieee1\n");
    assert!(matches!(validation_error(&yaml), ValidationError::WrongKind { .. }));
}

#[test]
fn duplicate_names_are_rejected() {
    let yaml = format!("{MINIMAL}    loads:\n      - name: g1\n        model: load\n");
    assert!(matches!(
        validation_error(&yaml),
        ValidationError::DuplicateName { name, .. } if name == "g1"
    ));

    let yaml = format!("{MINIMAL}clones:\n  - source: b1\n    name: b1\n");
    assert!(matches!(validation_error(&yaml), ValidationError::DuplicateName { .. }));
}

#[test]
fn references_must_resolve() {
    let yaml = format!("{MINIMAL}clones:\n  - source: b9\n    name: b2\n");
    assert!(matches!(validation_error(&yaml), ValidationError::MissingReference { .. }));

    let yaml = format!(
        "{MINIMAL}disturbances:\n  - {{bus: b1, time: 1.0, field: impedance, value: 2.0}}\n"
    );
    assert!(matches!(validation_error(&yaml), ValidationError::InvalidValue { .. }));
}

#[test]
fn unsupported_version_is_rejected() {
    let yaml = MINIMAL.replace("version: 1", "version: 7");
    assert!(matches!(
        validation_error(&yaml),
        ValidationError::UnsupportedVersion { version: 7 }
    ));
}

#[test]
fn saved_scenario_reads_back() {
    let scenario = load_yaml(&demo_path()).unwrap();
    let path = std::env::temp_dir().join("gd_project_roundtrip_smib.yaml");
    gd_project::save_yaml(&path, &scenario).unwrap();
    assert_eq!(load_yaml(&path).unwrap(), scenario);
}
