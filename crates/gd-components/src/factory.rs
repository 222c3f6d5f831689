//! Construction of components by model name.

use crate::error::{ComponentError, ComponentResult};
use crate::exciter::{ExciterIeeeType1, ExciterIeeeType2};
use crate::governor::GovernorBasic;
use crate::load::Load;
use crate::machine::Machine;
use crate::relay::Relay;
use crate::scheduler::Scheduler;
use crate::traits::{ComponentKind, DaeComponent};

/// Model names understood by [`create_model`], with the kind each produces.
pub const MODELS: &[(&str, ComponentKind)] = &[
    ("ieee1", ComponentKind::Exciter),
    ("ieee2", ComponentKind::Exciter),
    ("basic", ComponentKind::Governor),
    ("classical", ComponentKind::Machine),
    ("scheduler", ComponentKind::Source),
    ("relay", ComponentKind::Relay),
    ("load", ComponentKind::Load),
];

fn canonical(model: &str) -> Option<&'static str> {
    let name = match model.trim().to_ascii_lowercase().as_str() {
        "ieee1" | "type1" | "exciter_type1" | "ieeetype1" => "ieee1",
        "ieee2" | "type2" | "exciter_type2" | "ieeetype2" => "ieee2",
        "basic" | "governor" | "droop" => "basic",
        "classical" | "machine" | "gencls" => "classical",
        "scheduler" | "schedule" | "source" => "scheduler",
        "relay" => "relay",
        "load" | "pq" => "load",
        _ => return None,
    };
    Some(name)
}

/// Kind of component `model` would produce, if the name is known.
pub fn model_kind(model: &str) -> Option<ComponentKind> {
    let name = canonical(model)?;
    MODELS.iter().find(|(m, _)| *m == name).map(|(_, k)| *k)
}

/// Allocate an unconfigured component for `model`.
pub fn create_model(model: &str, name: &str) -> ComponentResult<Box<dyn DaeComponent>> {
    let component: Box<dyn DaeComponent> = match canonical(model) {
        Some("ieee1") => Box::new(ExciterIeeeType1::new(name)),
        Some("ieee2") => Box::new(ExciterIeeeType2::new(name)),
        Some("basic") => Box::new(GovernorBasic::new(name)),
        Some("classical") => Box::new(Machine::new(name)),
        Some("scheduler") => Box::new(Scheduler::new(name)),
        Some("relay") => Box::new(Relay::new(name)),
        Some("load") => Box::new(Load::new(name)),
        _ => {
            return Err(ComponentError::UnknownModel {
                model: model.to_string(),
            });
        }
    };
    Ok(component)
}
