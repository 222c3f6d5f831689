//! The assembled system: a bus tree flattened into a fixed-order component host.

use std::fmt;

use gd_components::{
    ChangeCode, DaeComponent, InitFlags, IoData, IoLocs, OpFlags, SolverMode, StateData,
};
use gd_core::{IdAllocator, ObjectId};
use gd_solver::{ComponentHost, SolverError, SolverResult, is_active};
use tracing::{debug, info};

use crate::bus::Bus;
use crate::error::{SystemError, SystemResult};
use crate::generator::{Generator, Slot};

/// Position of one component in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Address {
    /// Part `part` of generator `unit`; part 0 is the machine.
    Unit { bus: usize, unit: usize, part: usize },
    Load { bus: usize, load: usize },
    Relay { bus: usize, relay: usize },
}

fn assign_id(ids: &mut IdAllocator, comp: &mut dyn DaeComponent, parent: Option<ObjectId>) {
    let core = comp.core_mut();
    if core.id.is_none() {
        core.id = Some(ids.allocate());
    }
    core.parent = parent;
}

pub struct System {
    pub name: String,
    buses: Vec<Bus>,
    ids: IdAllocator,
    /// Host index to tree position; rebuilt on every structural edit.
    order: Vec<Address>,
    initialized: bool,
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("buses", &self.buses)
            .field("components", &self.order.len())
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl System {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buses: Vec::new(),
            ids: IdAllocator::new(),
            order: Vec::new(),
            initialized: false,
        }
    }

    /// Take ownership of `bus`, assigning ids to it and everything below it. The system must
    /// be initialized again afterwards.
    pub fn add_bus(&mut self, mut bus: Bus) -> SystemResult<ObjectId> {
        if self.bus(&bus.name).is_some() {
            return Err(SystemError::Duplicate {
                what: "bus",
                name: bus.name,
            });
        }
        let id = self.adopt(&mut bus);
        debug!(bus = %bus.name, %id, "bus added");
        self.buses.push(bus);
        self.reindex();
        self.initialized = false;
        Ok(id)
    }

    /// Structural copy of bus `source` under a new name, with fresh ids.
    pub fn clone_bus(&mut self, source: &str, name: impl Into<String>) -> SystemResult<ObjectId> {
        let mut copy = self
            .bus(source)
            .ok_or_else(|| SystemError::NotFound {
                what: "bus",
                name: source.to_string(),
            })?
            .clone_tree()?;
        copy.name = name.into();
        self.add_bus(copy)
    }

    /// Edit bus `name` in place. Ids are assigned to new objects, the host order is rebuilt
    /// and the system must be initialized again.
    pub fn modify_bus<R>(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut Bus) -> R,
    ) -> SystemResult<R> {
        let index = self
            .buses
            .iter()
            .position(|b| b.name == name)
            .ok_or_else(|| SystemError::NotFound {
                what: "bus",
                name: name.to_string(),
            })?;
        let out = edit(&mut self.buses[index]);
        adopt_with(&mut self.ids, &mut self.buses[index]);
        self.reindex();
        self.initialized = false;
        Ok(out)
    }

    fn adopt(&mut self, bus: &mut Bus) -> ObjectId {
        adopt_with(&mut self.ids, bus)
    }

    pub fn bus(&self, name: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.name == name)
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Host index of the component named `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        (0..self.order.len()).find(|&i| self.component(i).name() == name)
    }

    fn reindex(&mut self) {
        self.order.clear();
        for (b, bus) in self.buses.iter().enumerate() {
            for (u, g) in bus.generators().iter().enumerate() {
                for k in 0..g.part_count() {
                    self.order.push(Address::Unit {
                        bus: b,
                        unit: u,
                        part: k,
                    });
                }
            }
            for l in 0..bus.loads().len() {
                self.order.push(Address::Load { bus: b, load: l });
            }
            for r in 0..bus.relays().len() {
                self.order.push(Address::Relay { bus: b, relay: r });
            }
        }
    }

    /// Size every component, then compute a consistent starting point: each generator from
    /// its requested output, the other objects from their bus conditions.
    pub fn initialize(&mut self, time: f64) -> SystemResult<()> {
        let flags = InitFlags::empty();
        for i in 0..self.order.len() {
            let comp = self.component_mut(i);
            comp.initialize_a(time, flags)
                .map_err(|e| SystemError::component(comp.name(), e))?;
        }
        for bus in &mut self.buses {
            let terminal = bus.terminal();
            for g in bus.generators_mut() {
                g.initialize_b(&terminal)?;
            }
            for load in bus.loads_mut() {
                load.initialize_b(&terminal, &IoData::new(), &mut IoData::new())
                    .map_err(|e| SystemError::component(load.name(), e))?;
            }
            let measured = IoData::from_pairs(&[("v", bus.v), ("f", bus.f)]);
            for relay in bus.relays_mut().iter_mut() {
                relay
                    .initialize_b(&measured, &IoData::new(), &mut IoData::new())
                    .map_err(|e| SystemError::component(relay.name(), e))?;
            }
        }
        self.initialized = true;
        info!(system = %self.name, components = self.order.len(), "system initialized");
        Ok(())
    }

    fn generator(&self, bus: usize, unit: usize) -> &Generator {
        &self.buses[bus].generators()[unit]
    }

    /// Take bus `b` out of service: every object on it is disabled.
    fn disconnect(&mut self, b: usize) {
        let bus = &mut self.buses[b];
        bus.set_in_service(false);
        for load in bus.loads_mut() {
            load.core_mut().flags.insert(OpFlags::DISABLED);
        }
        for g in bus.generators_mut() {
            g.for_each_mut(|c| c.core_mut().flags.insert(OpFlags::DISABLED));
        }
        info!(bus = %bus.name, "bus disconnected");
    }

    fn machine_inputs(
        &self,
        bus: usize,
        unit: usize,
        sd: &StateData<'_>,
        mode: SolverMode,
    ) -> SystemResult<IoData> {
        let g = self.generator(bus, unit);
        let op = g.operating_point();
        let pm = g.slot_output(Slot::Governor, sd, mode)?;
        let ef = g.slot_output(Slot::Exciter, sd, mode)?;
        let mut io = self.buses[bus].terminal();
        io.push("pm", pm.or(op.get_named("pm")).unwrap_or(g.p));
        io.push("ef", ef.or(op.get_named("ef")).unwrap_or(1.0));
        Ok(io)
    }

    fn governor_inputs(
        &self,
        bus: usize,
        unit: usize,
        sd: &StateData<'_>,
        mode: SolverMode,
    ) -> SystemResult<IoData> {
        let g = self.generator(bus, unit);
        let machine = g.machine();
        let omega = machine
            .output(&IoData::new(), sd, mode)
            .map_err(|e| SystemError::component(machine.name(), e))?;
        let mut io = IoData::from_pairs(&[("omega", omega)]);
        if let Some(pref) = g.slot_output(Slot::Source, sd, mode)? {
            io.push("pref", pref);
        }
        Ok(io)
    }

    fn inputs_at(&self, at: Address, sd: &StateData<'_>, mode: SolverMode) -> SystemResult<IoData> {
        match at {
            Address::Unit { bus, unit, part } => match self.generator(bus, unit).role(part) {
                None => self.machine_inputs(bus, unit, sd, mode),
                Some(Slot::Exciter) => Ok(IoData::from_pairs(&[("v", self.buses[bus].v)])),
                Some(Slot::Governor) => self.governor_inputs(bus, unit, sd, mode),
                Some(Slot::Source) => Ok(IoData::new()),
            },
            Address::Load { bus, .. } => Ok(self.buses[bus].terminal()),
            Address::Relay { bus, .. } => {
                let b = &self.buses[bus];
                Ok(IoData::from_pairs(&[("v", b.v), ("f", b.f)]))
            }
        }
    }
}

fn adopt_with(ids: &mut IdAllocator, bus: &mut Bus) -> ObjectId {
    let bus_id = *bus.id.get_or_insert_with(|| ids.allocate());
    for load in bus.loads_mut() {
        assign_id(ids, load.as_mut(), Some(bus_id));
    }
    for relay in bus.relays_mut().iter_mut() {
        assign_id(ids, relay.as_mut(), Some(bus_id));
    }
    for g in bus.generators_mut() {
        let gen_id = *g.id.get_or_insert_with(|| ids.allocate());
        g.set_bus(Some(bus_id));
        g.for_each_mut(|c| assign_id(ids, c, Some(gen_id)));
    }
    bus_id
}

impl ComponentHost for System {
    fn len(&self) -> usize {
        self.order.len()
    }

    fn component(&self, index: usize) -> &dyn DaeComponent {
        match self.order[index] {
            Address::Unit { bus, unit, part } => self.generator(bus, unit).part(part),
            Address::Load { bus, load } => self.buses[bus].loads()[load].as_ref(),
            Address::Relay { bus, relay } => self.buses[bus].relays().at(relay),
        }
    }

    fn component_mut(&mut self, index: usize) -> &mut dyn DaeComponent {
        match self.order[index] {
            Address::Unit { bus, unit, part } => {
                self.buses[bus].generators_mut()[unit].part_mut(part)
            }
            Address::Load { bus, load } => self.buses[bus].loads_mut()[load].as_mut(),
            Address::Relay { bus, relay } => self.buses[bus].relays_mut().at_mut(relay),
        }
    }

    fn inputs(&self, index: usize, sd: &StateData<'_>, mode: SolverMode) -> SolverResult<IoData> {
        Ok(self.inputs_at(self.order[index], sd, mode)?)
    }

    fn input_locs(&self, index: usize, mode: SolverMode) -> IoLocs {
        let loc = |c: Option<&dyn DaeComponent>| c.and_then(|c| c.output_loc(mode));
        let Address::Unit { bus, unit, part } = self.order[index] else {
            return Vec::new();
        };
        let g = self.generator(bus, unit);
        match g.role(part) {
            None => vec![
                None,
                None,
                None,
                loc(g.active_slot(Slot::Governor)),
                loc(g.active_slot(Slot::Exciter)),
            ],
            Some(Slot::Governor) => vec![loc(Some(g.machine())), loc(g.active_slot(Slot::Source))],
            Some(_) => Vec::new(),
        }
    }

    fn update_host(&mut self, time: f64) -> SolverResult<ChangeCode> {
        let applied: usize = self.buses.iter_mut().map(|b| b.apply_due(time)).sum();
        Ok(if applied > 0 {
            ChangeCode::ValueChange
        } else {
            ChangeCode::NoChange
        })
    }

    fn next_host_update(&self) -> Option<f64> {
        self.buses
            .iter()
            .filter_map(Bus::next_disturbance)
            .min_by(f64::total_cmp)
    }

    fn after_root_check(&mut self, index: usize, _code: ChangeCode) -> SolverResult<bool> {
        let Address::Relay { bus, .. } = self.order[index] else {
            return Ok(false);
        };
        let comp = self.component(index);
        let tripped = comp
            .get("tripped", gd_core::Unit::Default)
            .map_err(|e| SolverError::component(comp.name(), e))?;
        if tripped == 0.0 || !self.buses[bus].in_service() || !is_active(comp) {
            return Ok(false);
        }
        self.disconnect(bus);
        Ok(true)
    }
}
