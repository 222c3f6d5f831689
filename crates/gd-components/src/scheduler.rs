//! Time-indexed setpoint source.
//!
//! Holds an ordered queue of `(time, target)` points and steps its output to each target once
//! simulation time reaches it, clamped to `[min, max]`. Remote dispatch talks to it through an
//! in-process inbox that is drained at the start of every `update_a`.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

use gd_core::units::Unit;
use tracing::{debug, info};

use crate::error::{ComponentError, ComponentResult};
use crate::flags::{InitFlags, OpFlags};
use crate::io::IoData;
use crate::mode::{ChangeCode, SolverMode};
use crate::offsets::ComponentSizes;
use crate::params::{from_base, to_base};
use crate::state::StateData;
use crate::traits::{
    CloneTarget, Cloned, ComponentCore, ComponentKind, DaeComponent, clone_into_target,
};

const FIELDS: &[&str] = &["min", "max", "base", "basepower"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPoint {
    pub time: f64,
    pub target: f64,
}

/// Messages accepted by a scheduler's inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleMessage {
    ClearTargets,
    AddTargets { times: Vec<f64>, targets: Vec<f64> },
    /// Replace the whole schedule.
    UpdateTargets { times: Vec<f64>, targets: Vec<f64> },
    Startup,
    Shutdown,
    RegisterDispatcher { id: u64 },
}

pub struct Scheduler {
    core: ComponentCore,
    pub pmin: f64,
    pub pmax: f64,
    /// Rating in MW used for per-unit conversion of targets.
    pub base_mw: f64,
    current: f64,
    targets: VecDeque<TargetPoint>,
    prev_time: f64,
    dispatcher: Option<u64>,
    inbox: Receiver<ScheduleMessage>,
    handle: Sender<ScheduleMessage>,
}

impl Clone for Scheduler {
    /// Copies configuration and pending targets; the clone gets its own inbox.
    fn clone(&self) -> Self {
        let (handle, inbox) = mpsc::channel();
        Self {
            core: self.core.clone(),
            pmin: self.pmin,
            pmax: self.pmax,
            base_mw: self.base_mw,
            current: self.current,
            targets: self.targets.clone(),
            prev_time: self.prev_time,
            dispatcher: None,
            inbox,
            handle,
        }
    }
}

impl Scheduler {
    pub fn new(name: impl Into<String>) -> Self {
        let (handle, inbox) = mpsc::channel();
        Self {
            core: ComponentCore::new(name),
            pmin: f64::NEG_INFINITY,
            pmax: f64::INFINITY,
            base_mw: 100.0,
            current: 0.0,
            targets: VecDeque::new(),
            prev_time: f64::NEG_INFINITY,
            dispatcher: None,
            inbox,
            handle,
        }
    }

    /// Sender for remote dispatch messages.
    pub fn handle(&self) -> Sender<ScheduleMessage> {
        self.handle.clone()
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn dispatcher(&self) -> Option<u64> {
        self.dispatcher
    }

    /// Next pending target, or the current output when the queue is empty.
    pub fn target(&self) -> f64 {
        self.targets.front().map_or(self.current, |t| t.target)
    }

    pub fn pending(&self) -> usize {
        self.targets.len()
    }

    /// Queue a target, keeping the schedule ordered by time.
    pub fn insert_target(&mut self, time: f64, target: f64) {
        let at = self.targets.partition_point(|t| t.time <= time);
        self.targets.insert(at, TargetPoint { time, target });
    }

    pub fn add_targets(&mut self, times: &[f64], targets: &[f64]) {
        for (t, v) in times.iter().zip(targets) {
            self.insert_target(*t, *v);
        }
    }

    pub fn clear_schedule(&mut self) {
        self.targets.clear();
    }

    fn clamp(&self, v: f64) -> f64 {
        v.max(self.pmin).min(self.pmax)
    }

    /// Value the output will take at `time` if no further messages arrive.
    pub fn predict(&self, time: f64) -> f64 {
        match self.targets.front() {
            Some(t) if time >= t.time => self.clamp(t.target),
            _ => self.current,
        }
    }

    fn drain_inbox(&mut self) {
        while let Ok(msg) = self.inbox.try_recv() {
            self.handle_message(msg);
        }
    }

    fn handle_message(&mut self, msg: ScheduleMessage) {
        debug!(scheduler = %self.core.name, ?msg, "schedule message");
        match msg {
            ScheduleMessage::ClearTargets => self.clear_schedule(),
            ScheduleMessage::AddTargets { times, targets } => self.add_targets(&times, &targets),
            ScheduleMessage::UpdateTargets { times, targets } => {
                self.clear_schedule();
                self.add_targets(&times, &targets);
            }
            ScheduleMessage::Startup => self.core.flags.remove(OpFlags::DISABLED),
            ScheduleMessage::Shutdown => self.core.flags.insert(OpFlags::DISABLED),
            ScheduleMessage::RegisterDispatcher { id } => self.dispatcher = Some(id),
        }
    }

    fn base_unit(field: &str) -> Option<Unit> {
        match field {
            "min" | "max" | "target" => Some(Unit::PerUnit),
            "base" => Some(Unit::Megawatt),
            _ => None,
        }
    }
}

impl DaeComponent for Scheduler {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Source
    }

    fn initialize_a(&mut self, start_time: f64, _flags: InitFlags) -> ComponentResult<()> {
        self.core.set_sizes(ComponentSizes::default());
        self.prev_time = start_time;
        Ok(())
    }

    fn initialize_b(
        &mut self,
        _inputs: &IoData,
        desired: &IoData,
        _output_set: &mut IoData,
    ) -> ComponentResult<()> {
        if let Some(p) = desired.get_named("pref").or_else(|| desired.value(0)) {
            if p > self.pmax {
                self.pmax = p;
            } else if p < self.pmin {
                self.pmin = p;
            }
            self.current = p;
        }
        self.core.flags.insert(OpFlags::INITIALIZED_B);
        Ok(())
    }

    fn update_a(&mut self, time: f64) -> ComponentResult<ChangeCode> {
        self.drain_inbox();
        if time == self.prev_time || self.core.flags.contains(OpFlags::DISABLED) {
            return Ok(ChangeCode::NoChange);
        }
        let before = self.current;
        while let Some(next) = self.targets.front().copied() {
            if time < next.time {
                break;
            }
            self.current = self.clamp(next.target);
            self.targets.pop_front();
        }
        self.prev_time = time;
        if self.current != before {
            info!(scheduler = %self.core.name, time, output = self.current, "setpoint applied");
            Ok(ChangeCode::ValueChange)
        } else {
            Ok(ChangeCode::NoChange)
        }
    }

    fn next_update_time(&self) -> Option<f64> {
        self.targets.front().map(|t| t.time)
    }

    fn set(&mut self, field: &str, value: f64, unit: Unit) -> ComponentResult<()> {
        let Some(base) = Self::base_unit(field) else {
            return self.core.set(field, value);
        };
        let pu = gd_core::units::PuBase::with_power(self.base_mw);
        let v = to_base(value, unit, base, &pu)?;
        match field {
            "min" => {
                self.pmin = v;
                self.current = self.current.max(v);
            }
            "max" => {
                self.pmax = v;
                self.current = self.current.min(v);
            }
            "base" => self.base_mw = v,
            "target" => self.insert_target(self.prev_time, v),
            _ => return Err(ComponentError::unrecognized(field)),
        }
        Ok(())
    }

    fn get(&self, field: &str, unit: Unit) -> ComponentResult<f64> {
        let Some(base) = Self::base_unit(field) else {
            return self.core.get(field);
        };
        let pu = gd_core::units::PuBase::with_power(self.base_mw);
        let v = match field {
            "min" => self.pmin,
            "max" => self.pmax,
            "base" => self.base_mw,
            "target" => self.target(),
            _ => return Err(ComponentError::unrecognized(field)),
        };
        from_base(v, base, unit, &pu)
    }

    fn fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn clone_component(&self, target: CloneTarget<'_>) -> ComponentResult<Cloned> {
        clone_into_target(self, target)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn output(
        &self,
        _inputs: &IoData,
        _sd: &StateData<'_>,
        _mode: SolverMode,
    ) -> ComponentResult<f64> {
        Ok(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> Scheduler {
        let mut s = Scheduler::new("sched");
        s.set("min", 0.1, Unit::Default).unwrap();
        s.set("max", 0.9, Unit::Default).unwrap();
        s.initialize_a(0.0, InitFlags::empty()).unwrap();
        s.initialize_b(&IoData::new(), &IoData::from_pairs(&[("pref", 0.5)]), &mut IoData::new())
            .unwrap();
        s
    }

    #[test]
    fn applies_due_targets_in_order() {
        let mut s = ready();
        s.add_targets(&[2.0, 1.0, 3.0], &[0.6, 0.7, 1.5]);
        assert_eq!(s.next_update_time(), Some(1.0));
        assert_eq!(s.update_a(0.5).unwrap(), ChangeCode::NoChange);
        assert_eq!(s.update_a(2.0).unwrap(), ChangeCode::ValueChange);
        assert_eq!(s.current(), 0.6);
        assert_eq!(s.predict(3.5), 0.9);
        s.update_a(3.0).unwrap();
        assert_eq!(s.current(), 0.9);
        assert_eq!(s.next_update_time(), None);
    }

    #[test]
    fn inbox_is_drained_before_update() {
        let mut s = ready();
        let tx = s.handle();
        tx.send(ScheduleMessage::AddTargets {
            times: vec![1.0],
            targets: vec![0.2],
        })
        .unwrap();
        tx.send(ScheduleMessage::RegisterDispatcher { id: 7 }).unwrap();
        assert_eq!(s.update_a(1.0).unwrap(), ChangeCode::ValueChange);
        assert_eq!(s.current(), 0.2);
        assert_eq!(s.dispatcher(), Some(7));

        tx.send(ScheduleMessage::UpdateTargets {
            times: vec![5.0],
            targets: vec![0.3],
        })
        .unwrap();
        tx.send(ScheduleMessage::Shutdown).unwrap();
        assert_eq!(s.update_a(6.0).unwrap(), ChangeCode::NoChange);
        assert_eq!(s.pending(), 1);
    }

    #[test]
    fn base_scales_per_unit_targets() {
        let mut s = ready();
        s.set("base", 50.0, Unit::Megawatt).unwrap();
        s.set("max", 40.0, Unit::Megawatt).unwrap();
        assert!((s.pmax - 0.8).abs() < 1e-12);
        assert!((s.get("max", Unit::Megawatt).unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn clone_has_independent_inbox() {
        let mut s = ready();
        s.insert_target(4.0, 0.4);
        let copy = s.clone();
        assert_eq!(copy.pending(), 1);
        s.handle().send(ScheduleMessage::ClearTargets).unwrap();
        s.update_a(0.5).unwrap();
        assert_eq!(s.pending(), 0);
        assert_eq!(copy.pending(), 1);
    }
}
