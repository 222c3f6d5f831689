//! Shared host for solver integration tests.

#![allow(dead_code)]

use gd_components::factory::create_model;
use gd_components::{
    ChangeCode, DaeComponent, InitFlags, IoData, IoLocs, OpFlags, SolverMode, StateData,
};
use gd_solver::{ComponentHost, SolverError, SolverResult};

/// Components fed constant input signals, optionally overridden by other components' outputs.
pub struct FixedHost {
    pub comps: Vec<Box<dyn DaeComponent>>,
    pub inputs: Vec<IoData>,
    /// `(input slot, source component)` per component.
    pub wires: Vec<Vec<(usize, usize)>>,
    /// Host-level structural edits applied once their time is reached.
    pub updates: Vec<(f64, fn(&mut FixedHost))>,
}

impl FixedHost {
    pub fn new() -> Self {
        Self {
            comps: Vec::new(),
            inputs: Vec::new(),
            wires: Vec::new(),
            updates: Vec::new(),
        }
    }

    /// Add a model initialized against `inputs` and `desired`.
    pub fn add(&mut self, model: &str, inputs: &[(&str, f64)], desired: &[(&str, f64)]) -> usize {
        let mut c = create_model(model, &format!("{model}{}", self.comps.len())).unwrap();
        let inputs = IoData::from_pairs(inputs);
        c.initialize_a(0.0, InitFlags::empty()).unwrap();
        c.initialize_b(&inputs, &IoData::from_pairs(desired), &mut IoData::new())
            .unwrap();
        self.comps.push(c);
        self.inputs.push(inputs);
        self.wires.push(Vec::new());
        self.comps.len() - 1
    }

    /// Feed input `slot` of `target` from the output of `source`.
    pub fn wire(&mut self, target: usize, slot: usize, source: usize) {
        self.wires[target].push((slot, source));
    }

    pub fn disable(&mut self, index: usize) {
        self.comps[index].core_mut().flags.insert(OpFlags::DISABLED);
    }
}

impl ComponentHost for FixedHost {
    fn len(&self) -> usize {
        self.comps.len()
    }

    fn component(&self, index: usize) -> &dyn DaeComponent {
        self.comps[index].as_ref()
    }

    fn component_mut(&mut self, index: usize) -> &mut dyn DaeComponent {
        self.comps[index].as_mut()
    }

    fn inputs(&self, index: usize, sd: &StateData<'_>, mode: SolverMode) -> SolverResult<IoData> {
        let mut io = self.inputs[index].clone();
        for &(slot, source) in &self.wires[index] {
            let src = &self.comps[source];
            let value = src
                .output(&self.inputs[source], sd, mode)
                .map_err(|e| SolverError::component(&src.core().name, e))?;
            io.set(slot, value);
        }
        Ok(io)
    }

    fn update_host(&mut self, time: f64) -> SolverResult<ChangeCode> {
        let (due, pending): (Vec<_>, Vec<_>) =
            self.updates.drain(..).partition(|(at, _)| *at <= time + 1e-12);
        self.updates = pending;
        for (_, edit) in &due {
            edit(self);
        }
        Ok(if due.is_empty() {
            ChangeCode::NoChange
        } else {
            ChangeCode::JacobianChange
        })
    }

    fn next_host_update(&self) -> Option<f64> {
        self.updates.iter().map(|(at, _)| *at).min_by(f64::total_cmp)
    }

    fn input_locs(&self, index: usize, mode: SolverMode) -> IoLocs {
        let mut locs = vec![None; self.inputs[index].len()];
        for &(slot, source) in &self.wires[index] {
            locs[slot] = self.comps[source].output_loc(mode);
        }
        locs
    }
}

/// Exciter, governor and machine at a plausible operating point.
pub fn generator_set() -> FixedHost {
    let mut host = FixedHost::new();
    host.add("ieee1", &[("v", 1.0)], &[("ef", 1.6)]);
    host.add("basic", &[("omega", 1.0), ("pref", 0.6)], &[("pm", 0.6)]);
    host.add(
        "classical",
        &[("v", 1.0), ("theta", 0.0), ("f", 1.0), ("pm", 0.6), ("ef", 1.1)],
        &[("p", 0.6), ("q", 0.1)],
    );
    host
}
