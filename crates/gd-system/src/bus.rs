//! Buses and the objects they own.

use std::fmt;

use gd_components::{ComponentError, ComponentKind, DaeComponent, IoData};
use gd_core::{ObjectId, PuBase, Unit, convert};
use tracing::info;

use crate::error::{SystemError, SystemResult};
use crate::generator::{Generator, clone_new, require_kind};

/// Bus quantity that a scheduled disturbance can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusField {
    Voltage,
    Angle,
    Frequency,
}

impl BusField {
    pub fn parse(name: &str) -> Option<BusField> {
        match name.trim().to_ascii_lowercase().as_str() {
            "v" | "voltage" => Some(BusField::Voltage),
            "theta" | "angle" => Some(BusField::Angle),
            "f" | "freq" | "frequency" => Some(BusField::Frequency),
            _ => None,
        }
    }

    fn base(self) -> Unit {
        match self {
            BusField::Voltage | BusField::Frequency => Unit::PerUnit,
            BusField::Angle => Unit::Radian,
        }
    }
}

/// A bus value change applied once simulation time reaches `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disturbance {
    pub time: f64,
    pub field: BusField,
    /// Value in the field's base unit.
    pub value: f64,
}

/// Container that only accepts relays.
#[derive(Default)]
pub struct RelayContainer {
    relays: Vec<Box<dyn DaeComponent>>,
}

impl RelayContainer {
    pub fn add(&mut self, relay: Box<dyn DaeComponent>) -> SystemResult<()> {
        require_kind("relay container", relay.as_ref(), ComponentKind::Relay)?;
        self.relays.push(relay);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&dyn DaeComponent> {
        self.relays.get(i).map(|r| r.as_ref())
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut dyn DaeComponent> {
        match self.relays.get_mut(i) {
            Some(r) => Some(r.as_mut() as &mut dyn DaeComponent),
            None => None,
        }
    }

    pub(crate) fn at(&self, i: usize) -> &dyn DaeComponent {
        self.relays[i].as_ref()
    }

    pub(crate) fn at_mut(&mut self, i: usize) -> &mut dyn DaeComponent {
        self.relays[i].as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn DaeComponent> + '_ {
        self.relays.iter().map(|r| r.as_ref() as &dyn DaeComponent)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn DaeComponent>> + '_ {
        self.relays.iter_mut()
    }
}

/// A network bus holding fixed terminal conditions and its attached objects.
pub struct Bus {
    pub name: String,
    pub id: Option<ObjectId>,
    /// Voltage magnitude (pu).
    pub v: f64,
    /// Voltage angle (rad).
    pub theta: f64,
    /// Frequency (pu).
    pub f: f64,
    loads: Vec<Box<dyn DaeComponent>>,
    generators: Vec<Generator>,
    relays: RelayContainer,
    /// Pending disturbances, sorted by time.
    disturbances: Vec<Disturbance>,
    in_service: bool,
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("v", &self.v)
            .field("theta", &self.theta)
            .field("f", &self.f)
            .field("loads", &self.loads.len())
            .field("generators", &self.generators)
            .field("relays", &self.relays.len())
            .field("in_service", &self.in_service)
            .finish()
    }
}

impl Bus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            v: 1.0,
            theta: 0.0,
            f: 1.0,
            loads: Vec::new(),
            generators: Vec::new(),
            relays: RelayContainer::default(),
            disturbances: Vec::new(),
            in_service: true,
        }
    }

    /// Terminal signals `[v, theta, f]` seen by attached objects.
    pub fn terminal(&self) -> IoData {
        IoData::from_pairs(&[("v", self.v), ("theta", self.theta), ("f", self.f)])
    }

    pub fn in_service(&self) -> bool {
        self.in_service
    }

    pub(crate) fn set_in_service(&mut self, in_service: bool) {
        self.in_service = in_service;
    }

    pub fn add_load(&mut self, load: Box<dyn DaeComponent>) -> SystemResult<()> {
        require_kind(&self.name, load.as_ref(), ComponentKind::Load)?;
        self.loads.push(load);
        Ok(())
    }

    pub fn add_generator(&mut self, mut generator: Generator) {
        generator.set_bus(self.id);
        self.generators.push(generator);
    }

    /// Add a relay to the bus's relay container.
    pub fn add_relay(&mut self, relay: Box<dyn DaeComponent>) -> SystemResult<()> {
        self.relays.add(relay)
    }

    pub fn loads(&self) -> &[Box<dyn DaeComponent>] {
        &self.loads
    }

    pub(crate) fn loads_mut(&mut self) -> &mut [Box<dyn DaeComponent>] {
        &mut self.loads
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn generators_mut(&mut self) -> &mut [Generator] {
        &mut self.generators
    }

    pub fn generator(&self, name: &str) -> Option<&Generator> {
        self.generators.iter().find(|g| g.name == name)
    }

    pub fn relays(&self) -> &RelayContainer {
        &self.relays
    }

    pub(crate) fn relays_mut(&mut self) -> &mut RelayContainer {
        &mut self.relays
    }

    pub fn set(&mut self, field: &str, value: f64, unit: Unit) -> SystemResult<()> {
        let which = self.field(field)?;
        let v = convert(value, unit, which.base(), &PuBase::default())?;
        self.apply(which, v);
        Ok(())
    }

    pub fn get(&self, field: &str, unit: Unit) -> SystemResult<f64> {
        let which = self.field(field)?;
        let v = match which {
            BusField::Voltage => self.v,
            BusField::Angle => self.theta,
            BusField::Frequency => self.f,
        };
        Ok(convert(v, which.base(), unit, &PuBase::default())?)
    }

    fn field(&self, name: &str) -> SystemResult<BusField> {
        BusField::parse(name)
            .ok_or_else(|| SystemError::component(&self.name, ComponentError::unrecognized(name)))
    }

    fn apply(&mut self, field: BusField, value: f64) {
        match field {
            BusField::Voltage => self.v = value,
            BusField::Angle => self.theta = value,
            BusField::Frequency => self.f = value,
        }
    }

    /// Schedule a change of `field` at `time`; `value` is converted from `unit`.
    pub fn schedule(
        &mut self,
        time: f64,
        field: &str,
        value: f64,
        unit: Unit,
    ) -> SystemResult<()> {
        let which = self.field(field)?;
        let value = convert(value, unit, which.base(), &PuBase::default())?;
        let at = self.disturbances.partition_point(|d| d.time <= time);
        self.disturbances.insert(
            at,
            Disturbance {
                time,
                field: which,
                value,
            },
        );
        Ok(())
    }

    pub fn next_disturbance(&self) -> Option<f64> {
        self.disturbances.first().map(|d| d.time)
    }

    /// Apply every disturbance due by `time`; returns how many were applied.
    pub(crate) fn apply_due(&mut self, time: f64) -> usize {
        let due = self.disturbances.partition_point(|d| d.time <= time);
        let applied: Vec<_> = self.disturbances.drain(..due).collect();
        for d in applied {
            info!(bus = %self.name, time, field = ?d.field, value = d.value, "bus disturbance");
            self.apply(d.field, d.value);
        }
        due
    }

    /// Structural copy of the bus and everything it owns. Pending disturbances, ids and
    /// offsets stay with the original.
    pub fn clone_tree(&self) -> SystemResult<Bus> {
        let mut copy = Bus {
            name: self.name.clone(),
            id: None,
            v: self.v,
            theta: self.theta,
            f: self.f,
            loads: Vec::with_capacity(self.loads.len()),
            generators: Vec::with_capacity(self.generators.len()),
            relays: RelayContainer::default(),
            disturbances: Vec::new(),
            in_service: true,
        };
        for load in &self.loads {
            copy.loads.push(clone_new(load.as_ref())?);
        }
        for g in &self.generators {
            copy.add_generator(g.clone_tree()?);
        }
        for r in self.relays.iter() {
            copy.relays.add(clone_new(r)?)?;
        }
        Ok(copy)
    }
}
