//! Construction of a [`System`] from a validated scenario.

use gd_components::factory::create_model;
use gd_components::{DaeComponent, ParamField, ParamValue, set_param};
use gd_core::Unit;
use gd_system::{Bus, Generator, Slot, System};
use tracing::{debug, warn};

use crate::ProjectResult;
use crate::schema::{BusDef, GeneratorDef, ParamDef, ParamMap, Scenario, SubModelDef};

/// A built system plus the parameters that could not be applied.
#[derive(Debug)]
pub struct Built {
    pub system: System,
    /// `object.key` for every parameter that was rejected and skipped.
    pub skipped: Vec<String>,
}

/// Build the component tree. Bad parameter values are logged and skipped; structural
/// problems (unknown models, wrong slot kinds) are errors.
pub fn build_system(scenario: &Scenario) -> ProjectResult<Built> {
    let mut skipped = Vec::new();
    let mut system = System::new(&scenario.name);
    for def in &scenario.buses {
        let bus = build_bus(def, &mut skipped)?;
        system.add_bus(bus)?;
    }
    for clone in &scenario.clones {
        system.clone_bus(&clone.source, clone.name.as_str())?;
        debug!(source = %clone.source, bus = %clone.name, "bus cloned");
    }
    for d in &scenario.disturbances {
        let unit = match &d.unit {
            Some(u) => Unit::parse(u)?,
            None => Unit::Default,
        };
        system.modify_bus(&d.bus, |bus| bus.schedule(d.time, &d.field, d.value, unit))??;
    }
    Ok(Built { system, skipped })
}

fn build_bus(def: &BusDef, skipped: &mut Vec<String>) -> ProjectResult<Bus> {
    let mut bus = Bus::new(&def.name);
    for (key, value) in &def.params {
        let applied = match (ParamField::parse(key), value) {
            (Ok(field), ParamDef::Number(v)) => bus
                .set(&field.name, *v, field.effective_unit(Unit::Default))
                .map_err(|e| e.to_string()),
            (Ok(_), ParamDef::Text(_)) => Err("expected a number".to_string()),
            (Err(e), _) => Err(e.to_string()),
        };
        if let Err(error) = applied {
            skip(&def.name, key, &error, skipped);
        }
    }

    for g in &def.generators {
        bus.add_generator(build_generator(g, skipped)?);
    }
    for l in &def.loads {
        let mut load = create_model(&l.model, &l.name)?;
        apply_params(load.as_mut(), &l.params, skipped);
        bus.add_load(load)?;
    }
    for r in &def.relays {
        let mut relay = create_model(&r.model, &r.name)?;
        apply_params(relay.as_mut(), &r.params, skipped);
        bus.add_relay(relay)?;
    }
    Ok(bus)
}

fn build_generator(def: &GeneratorDef, skipped: &mut Vec<String>) -> ProjectResult<Generator> {
    let mut g = Generator::new(&def.name);
    for (key, value) in &def.params {
        let applied = match ParamField::parse(key) {
            Ok(field) if field.name == "p" || field.name == "q" => match value {
                ParamDef::Number(v) => g
                    .set(&field.name, *v, field.effective_unit(Unit::Default))
                    .map_err(|e| e.to_string()),
                ParamDef::Text(_) => Err("expected a number".to_string()),
            },
            Ok(_) => set_param(g.machine_mut(), key, &ParamValue::from(value), Unit::Default)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(error) = applied {
            skip(&def.name, key, &error, skipped);
        }
    }

    let slots = [
        (Slot::Exciter, &def.exciter),
        (Slot::Governor, &def.governor),
        (Slot::Source, &def.source),
    ];
    for (slot, sub) in slots {
        if let Some(sub) = sub {
            g.attach(slot, build_sub_model(&def.name, slot, sub, skipped)?)?;
        }
    }
    Ok(g)
}

fn build_sub_model(
    generator: &str,
    slot: Slot,
    def: &SubModelDef,
    skipped: &mut Vec<String>,
) -> ProjectResult<Box<dyn DaeComponent>> {
    let mut comp = create_model(&def.model, &format!("{generator}.{slot}"))?;
    apply_params(comp.as_mut(), &def.params, skipped);
    Ok(comp)
}

fn apply_params(comp: &mut dyn DaeComponent, params: &ParamMap, skipped: &mut Vec<String>) {
    for (key, value) in params {
        if let Err(e) = set_param(comp, key, &ParamValue::from(value), Unit::Default) {
            skip(comp.name(), key, &e.to_string(), skipped);
        }
    }
}

fn skip(object: &str, key: &str, error: &str, skipped: &mut Vec<String>) {
    warn!(object, param = key, error, "parameter skipped");
    skipped.push(format!("{object}.{key}"));
}
