//! Scenario validation, run before anything is built.

use std::collections::HashSet;

use gd_components::ComponentKind;
use gd_components::factory::model_kind;
use gd_core::Unit;
use gd_system::{BusField, Slot};

use crate::schema::{BusDef, GeneratorDef, ModelDef, Scenario, SubModelDef};

pub const LATEST_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate name: {name} in {context}")]
    DuplicateName { name: String, context: String },

    #[error("Missing reference: {name} in {context}")]
    MissingReference { name: String, context: String },

    #[error("Unknown model: {model} in {context}")]
    UnknownModel { model: String, context: String },

    #[error("Model {model} in {context} is a {found:?}, expected a {expected:?}")]
    WrongKind {
        model: String,
        context: String,
        expected: ComponentKind,
        found: ComponentKind,
    },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_scenario(scenario: &Scenario) -> Result<(), ValidationError> {
    if scenario.version == 0 || scenario.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: scenario.version,
        });
    }

    let run = &scenario.run;
    if !(run.dt > 0.0) {
        return Err(invalid("run.dt", run.dt, "must be positive"));
    }
    if !(run.t_end >= 0.0) {
        return Err(invalid("run.t_end", run.t_end, "must not be negative"));
    }
    if run.record_every == 0 {
        return Err(invalid("run.record_every", 0, "must be positive"));
    }

    let mut bus_names = HashSet::new();
    for bus in &scenario.buses {
        if !bus_names.insert(bus.name.as_str()) {
            return Err(duplicate(&bus.name, "buses"));
        }
        validate_bus(bus)?;
    }

    for clone in &scenario.clones {
        if !bus_names.contains(clone.source.as_str()) {
            return Err(ValidationError::MissingReference {
                name: clone.source.clone(),
                context: format!("clone '{}'", clone.name),
            });
        }
        if !bus_names.insert(clone.name.as_str()) {
            return Err(duplicate(&clone.name, "buses"));
        }
    }

    for d in &scenario.disturbances {
        if !bus_names.contains(d.bus.as_str()) {
            return Err(ValidationError::MissingReference {
                name: d.bus.clone(),
                context: "disturbances".to_string(),
            });
        }
        if BusField::parse(&d.field).is_none() {
            return Err(invalid("disturbance.field", &d.field, "not a bus field"));
        }
        if !(d.time >= 0.0) {
            return Err(invalid("disturbance.time", d.time, "must not be negative"));
        }
        if let Some(unit) = &d.unit {
            Unit::parse(unit).map_err(|e| invalid("disturbance.unit", unit, e))?;
        }
    }

    Ok(())
}

fn validate_bus(bus: &BusDef) -> Result<(), ValidationError> {
    let context = format!("bus '{}'", bus.name);

    // Objects are looked up by name within their bus.
    let mut names = HashSet::new();
    let all = bus
        .generators
        .iter()
        .map(|g| &g.name)
        .chain(bus.loads.iter().map(|l| &l.name))
        .chain(bus.relays.iter().map(|r| &r.name));
    for name in all {
        if !names.insert(name.as_str()) {
            return Err(duplicate(name, &context));
        }
    }

    for generator in &bus.generators {
        validate_generator(generator, &context)?;
    }
    for load in &bus.loads {
        validate_model(load, ComponentKind::Load, &context)?;
    }
    for relay in &bus.relays {
        validate_model(relay, ComponentKind::Relay, &context)?;
    }

    Ok(())
}

fn validate_generator(generator: &GeneratorDef, bus: &str) -> Result<(), ValidationError> {
    let slots: [(Slot, &Option<SubModelDef>); 3] = [
        (Slot::Exciter, &generator.exciter),
        (Slot::Governor, &generator.governor),
        (Slot::Source, &generator.source),
    ];
    for (slot, def) in slots {
        let Some(def) = def else { continue };
        let context = format!("{bus} generator '{}' {slot}", generator.name);
        check_kind(&def.model, slot.accepts(), context)?;
    }
    Ok(())
}

fn validate_model(
    def: &ModelDef,
    expected: ComponentKind,
    bus: &str,
) -> Result<(), ValidationError> {
    check_kind(&def.model, expected, format!("{bus} object '{}'", def.name))
}

fn check_kind(
    model: &str,
    expected: ComponentKind,
    context: String,
) -> Result<(), ValidationError> {
    match model_kind(model) {
        None => Err(ValidationError::UnknownModel {
            model: model.to_string(),
            context,
        }),
        Some(found) if found != expected => Err(ValidationError::WrongKind {
            model: model.to_string(),
            context,
            expected,
            found,
        }),
        Some(_) => Ok(()),
    }
}

fn duplicate(name: &str, context: &str) -> ValidationError {
    ValidationError::DuplicateName {
        name: name.to_string(),
        context: context.to_string(),
    }
}

fn invalid(field: &str, value: impl ToString, reason: impl ToString) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
