//! Generator: a machine plus optional control sub-models in fixed named slots.

use std::fmt;

use gd_components::{
    CloneTarget, ComponentKind, DaeComponent, IoData, Machine, SolverMode, StateData,
};
use gd_core::{ObjectId, Unit, convert};
use tracing::debug;

use crate::error::{SystemError, SystemResult};

/// Named sub-model slot of a [`Generator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Exciter,
    Governor,
    Source,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Exciter, Slot::Governor, Slot::Source];

    pub fn parse(name: &str) -> Option<Slot> {
        match name.trim().to_ascii_lowercase().as_str() {
            "exciter" | "avr" => Some(Slot::Exciter),
            "governor" | "gov" => Some(Slot::Governor),
            "source" | "scheduler" | "pset" => Some(Slot::Source),
            _ => None,
        }
    }

    /// Component kind the slot accepts.
    pub fn accepts(self) -> ComponentKind {
        match self {
            Slot::Exciter => ComponentKind::Exciter,
            Slot::Governor => ComponentKind::Governor,
            Slot::Source => ComponentKind::Source,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.accepts().as_str())
    }
}

pub(crate) fn clone_new(comp: &dyn DaeComponent) -> SystemResult<Box<dyn DaeComponent>> {
    comp.clone_component(CloneTarget::New)
        .map_err(|e| SystemError::component(comp.name(), e))?
        .into_boxed()
        .ok_or_else(|| SystemError::StructuralMismatch {
            container: comp.name().to_string(),
            expected: comp.kind().as_str(),
            found: "populated clone",
        })
}

pub(crate) fn require_kind(
    container: &str,
    comp: &dyn DaeComponent,
    expected: ComponentKind,
) -> SystemResult<()> {
    if comp.kind() == expected {
        Ok(())
    } else {
        Err(SystemError::StructuralMismatch {
            container: container.to_string(),
            expected: expected.as_str(),
            found: comp.kind().as_str(),
        })
    }
}

pub struct Generator {
    pub name: String,
    pub id: Option<ObjectId>,
    /// Requested electrical output in per unit on the system base.
    pub p: f64,
    pub q: f64,
    /// Bus this generator is attached to; an external link, never cloned.
    bus: Option<ObjectId>,
    /// Machine at index 0, then sub-models in attachment order.
    parts: Vec<Box<dyn DaeComponent>>,
    slots: [Option<usize>; 3],
    /// Operating point from the machine's initialization (`pm`, `ef`).
    operating: IoData,
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<_> = Slot::ALL
            .iter()
            .filter_map(|s| self.slot(*s).map(|c| (s.to_string(), c.name().to_string())))
            .collect();
        f.debug_struct("Generator")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("bus", &self.bus)
            .field("machine", &self.machine().name())
            .field("slots", &slots)
            .finish()
    }
}

impl Generator {
    /// Generator with a default classical machine and empty slots.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let machine: Box<dyn DaeComponent> = Box::new(Machine::new(format!("{name}.machine")));
        Self {
            name,
            id: None,
            p: 0.0,
            q: 0.0,
            bus: None,
            parts: vec![machine],
            slots: [None; 3],
            operating: IoData::new(),
        }
    }

    pub fn bus(&self) -> Option<ObjectId> {
        self.bus
    }

    pub(crate) fn set_bus(&mut self, bus: Option<ObjectId>) {
        self.bus = bus;
    }

    pub fn machine(&self) -> &dyn DaeComponent {
        self.parts[0].as_ref()
    }

    pub fn machine_mut(&mut self) -> &mut dyn DaeComponent {
        self.parts[0].as_mut()
    }

    /// Replace the machine model.
    pub fn set_machine(&mut self, machine: Box<dyn DaeComponent>) -> SystemResult<()> {
        require_kind(&self.name, machine.as_ref(), ComponentKind::Machine)?;
        self.parts[0] = machine;
        Ok(())
    }

    /// Place `comp` in `slot`, returning the model it replaces.
    pub fn attach(
        &mut self,
        slot: Slot,
        comp: Box<dyn DaeComponent>,
    ) -> SystemResult<Option<Box<dyn DaeComponent>>> {
        require_kind(&format!("{} {slot} slot", self.name), comp.as_ref(), slot.accepts())?;
        debug!(generator = %self.name, %slot, model = comp.name(), "sub-model attached");
        match self.slots[slot.index()] {
            Some(k) => Ok(Some(std::mem::replace(&mut self.parts[k], comp))),
            None => {
                self.slots[slot.index()] = Some(self.parts.len());
                self.parts.push(comp);
                Ok(None)
            }
        }
    }

    pub fn detach(&mut self, slot: Slot) -> Option<Box<dyn DaeComponent>> {
        let k = self.slots[slot.index()].take()?;
        for other in self.slots.iter_mut().flatten() {
            if *other > k {
                *other -= 1;
            }
        }
        Some(self.parts.remove(k))
    }

    pub fn slot(&self, slot: Slot) -> Option<&dyn DaeComponent> {
        self.slots[slot.index()].map(|k| self.parts[k].as_ref())
    }

    pub fn slot_mut(&mut self, slot: Slot) -> Option<&mut dyn DaeComponent> {
        match self.slots[slot.index()] {
            Some(k) => Some(self.parts[k].as_mut() as &mut dyn DaeComponent),
            None => None,
        }
    }

    /// Sub-model in `slot` if present and not disabled.
    pub(crate) fn active_slot(&self, slot: Slot) -> Option<&dyn DaeComponent> {
        self.slot(slot).filter(|c| gd_solver::is_active(*c))
    }

    /// Number of components: the machine plus filled slots.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub(crate) fn part(&self, k: usize) -> &dyn DaeComponent {
        self.parts[k].as_ref()
    }

    pub(crate) fn part_mut(&mut self, k: usize) -> &mut dyn DaeComponent {
        self.parts[k].as_mut()
    }

    /// Slot held by part `k`; `None` for the machine.
    pub(crate) fn role(&self, k: usize) -> Option<Slot> {
        Slot::ALL.into_iter().find(|s| self.slots[s.index()] == Some(k))
    }

    /// Machine first, then sub-models in attachment order.
    pub fn components(&self) -> impl Iterator<Item = &dyn DaeComponent> + '_ {
        self.parts.iter().map(|c| c.as_ref() as &dyn DaeComponent)
    }

    pub fn operating_point(&self) -> &IoData {
        &self.operating
    }

    /// Set a generator-level field; anything else goes to the machine. Per-unit conversions
    /// use the machine's base.
    pub fn set(&mut self, field: &str, value: f64, unit: Unit) -> SystemResult<()> {
        let pu = self.machine().core().pu_base;
        match field {
            "p" => self.p = convert(value, unit, Unit::PerUnit, &pu)?,
            "q" => self.q = convert(value, unit, Unit::PerUnit, &pu)?,
            _ => {
                return self
                    .machine_mut()
                    .set(field, value, unit)
                    .map_err(|e| SystemError::component(&self.name, e));
            }
        }
        Ok(())
    }

    pub fn get(&self, field: &str, unit: Unit) -> SystemResult<f64> {
        let pu = self.machine().core().pu_base;
        match field {
            "p" => Ok(convert(self.p, Unit::PerUnit, unit, &pu)?),
            "q" => Ok(convert(self.q, Unit::PerUnit, unit, &pu)?),
            _ => self
                .machine()
                .get(field, unit)
                .map_err(|e| SystemError::component(&self.name, e)),
        }
    }

    /// Structural copy: configuration of every sub-model, no ids, offsets or bus link.
    pub fn clone_tree(&self) -> SystemResult<Generator> {
        let parts = self
            .parts
            .iter()
            .map(|c| clone_new(c.as_ref()))
            .collect::<SystemResult<Vec<_>>>()?;
        Ok(Generator {
            name: self.name.clone(),
            id: None,
            p: self.p,
            q: self.q,
            bus: None,
            parts,
            slots: self.slots,
            operating: IoData::new(),
        })
    }

    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut dyn DaeComponent)) {
        for c in &mut self.parts {
            f(c.as_mut());
        }
    }

    /// Initialize the machine at the requested output, then each controller at the value the
    /// machine needs from it.
    pub(crate) fn initialize_b(&mut self, terminal: &IoData) -> SystemResult<()> {
        let desired = IoData::from_pairs(&[("p", self.p), ("q", self.q)]);
        let mut operating = IoData::new();
        let machine = self.machine_mut();
        machine
            .initialize_b(terminal, &desired, &mut operating)
            .map_err(|e| SystemError::component(machine.name(), e))?;

        let ef = operating.get_named("ef").unwrap_or(1.0);
        let pm = operating.get_named("pm").unwrap_or(self.p);
        let omega = terminal.get_named("f").unwrap_or(1.0);

        let mut derived = IoData::new();
        if let Some(ex) = self.slot_mut(Slot::Exciter) {
            let inputs = IoData::from_pairs(&[("v", terminal.value_or(0, 1.0))]);
            ex.initialize_b(&inputs, &IoData::from_pairs(&[("ef", ef)]), &mut derived)
                .map_err(|e| SystemError::component(ex.name(), e))?;
        }
        let mut pref = pm;
        if let Some(gov) = self.slot_mut(Slot::Governor) {
            let inputs = IoData::from_pairs(&[("omega", omega)]);
            gov.initialize_b(&inputs, &IoData::from_pairs(&[("pm", pm)]), &mut derived)
                .map_err(|e| SystemError::component(gov.name(), e))?;
            pref = derived.get_named("pref").unwrap_or(pm);
        }
        if let Some(src) = self.slot_mut(Slot::Source) {
            src.initialize_b(&IoData::new(), &IoData::from_pairs(&[("pref", pref)]), &mut derived)
                .map_err(|e| SystemError::component(src.name(), e))?;
        }
        debug!(generator = %self.name, pm, ef, pref, "generator initialized");
        self.operating = operating;
        Ok(())
    }

    /// Output of the sub-model in `slot` at `sd`, if it is present and active.
    pub(crate) fn slot_output(
        &self,
        slot: Slot,
        sd: &StateData<'_>,
        mode: SolverMode,
    ) -> SystemResult<Option<f64>> {
        match self.active_slot(slot) {
            Some(c) => c
                .output(&IoData::new(), sd, mode)
                .map(Some)
                .map_err(|e| SystemError::component(c.name(), e)),
            None => Ok(None),
        }
    }
}
