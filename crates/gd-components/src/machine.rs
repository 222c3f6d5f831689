//! Classical swing-equation generator.
//!
//! Inputs: `[V, theta, f, pm, ef]` (terminal voltage magnitude and angle, bus frequency,
//! mechanical power, internal EMF). Differential states `[delta, omega]`, algebraic state
//! `[pe]`. Output: rotor speed.
//!
//! Without the algebraic partition (differential-only solves) `pe` is evaluated directly
//! from the rotor angle instead of being read from the state vector.

use std::any::Any;
use std::f64::consts::TAU;

use gd_core::units::Unit;
use nalgebra::Complex;

use crate::common::{check_positive, write_at, write_block};
use crate::error::{ComponentError, ComponentResult};
use crate::flags::{InitFlags, OpFlags};
use crate::io::IoData;
use crate::jacobian::JacobianSink;
use crate::mode::SolverMode;
use crate::offsets::ComponentSizes;
use crate::params::{from_base, to_base};
use crate::state::{StateData, StateView};
use crate::traits::{
    CloneTarget, Cloned, ComponentCore, ComponentKind, DaeComponent, clone_into_target,
};

const V_IN: usize = 0;
const THETA_IN: usize = 1;
const F_IN: usize = 2;
const PM_IN: usize = 3;
const EF_IN: usize = 4;

const FIELDS: &[&str] = &["h", "d", "xdp", "basepower"];

#[derive(Debug, Clone)]
pub struct Machine {
    core: ComponentCore,
    /// Inertia constant (s).
    pub h: f64,
    /// Damping (pu power per pu speed).
    pub d: f64,
    /// Transient reactance (pu).
    pub xdp: f64,
    /// Internal EMF and mechanical power found by `initialize_b`.
    e0: f64,
    pm0: f64,
}

struct Signals {
    v: f64,
    theta: f64,
    f: f64,
    pm: f64,
    e: f64,
}

impl Machine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: ComponentCore::new(name),
            h: 3.0,
            d: 1.0,
            xdp: 0.3,
            e0: 1.0,
            pm0: 0.0,
        }
    }

    fn base_unit(field: &str) -> Option<Unit> {
        match field {
            "h" => Some(Unit::Second),
            "d" | "xdp" => Some(Unit::PerUnit),
            _ => None,
        }
    }

    fn omega_s(&self) -> f64 {
        TAU * self.core.pu_base.frequency_hz
    }

    fn signals(&self, inputs: &IoData) -> Signals {
        Signals {
            v: inputs.value_or(V_IN, 1.0),
            theta: inputs.value_or(THETA_IN, 0.0),
            f: inputs.value_or(F_IN, 1.0),
            pm: inputs.value_or(PM_IN, self.pm0),
            e: inputs.value_or(EF_IN, self.e0),
        }
    }

    fn air_gap_power(&self, delta: f64, s: &Signals) -> f64 {
        s.e * s.v / self.xdp * (delta - s.theta).sin()
    }

    /// Electrical power: the algebraic state when carried, the direct evaluation otherwise.
    fn pe(&self, view: &StateView<'_>, s: &Signals, mode: SolverMode) -> f64 {
        if mode.has_algebraic() {
            view.alg[0]
        } else {
            self.air_gap_power(view.diff[0], s)
        }
    }

    fn rates(&self, view: &StateView<'_>, s: &Signals, mode: SolverMode) -> [f64; 2] {
        let omega = view.diff[1];
        let pe = self.pe(view, s, mode);
        [
            self.omega_s() * (omega - 1.0),
            (s.pm - pe - self.d * (omega - s.f)) / (2.0 * self.h),
        ]
    }
}

impl DaeComponent for Machine {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ComponentCore {
        &mut self.core
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Machine
    }

    fn initialize_a(&mut self, _start_time: f64, _flags: InitFlags) -> ComponentResult<()> {
        self.core.set_sizes(ComponentSizes {
            diff: 2,
            alg: 1,
            roots: 0,
            jac: 11,
        });
        Ok(())
    }

    fn initialize_b(
        &mut self,
        inputs: &IoData,
        desired: &IoData,
        output_set: &mut IoData,
    ) -> ComponentResult<()> {
        let v = inputs.value_or(V_IN, 1.0);
        let theta = inputs.value_or(THETA_IN, 0.0);
        let f = inputs.value_or(F_IN, 1.0);
        if v <= 0.0 {
            return Err(ComponentError::InvalidValue {
                field: "v".to_string(),
                reason: "terminal voltage must be positive to initialize",
            });
        }
        let p = desired.get_named("p").unwrap_or(0.0);
        let q = desired.get_named("q").unwrap_or(0.0);

        let vt = Complex::from_polar(v, theta);
        let current = (Complex::new(p, q) / vt).conj();
        let emf = vt + Complex::new(0.0, self.xdp) * current;

        self.e0 = emf.norm();
        let delta = emf.arg();
        let pe = self.e0 * v / self.xdp * (delta - theta).sin();
        self.pm0 = pe;

        self.core.local.resize(2, 1);
        self.core.local.diff.copy_from_slice(&[delta, f]);
        self.core.local.ddiff.fill(0.0);
        self.core.local.alg[0] = pe;
        self.core.flags.insert(OpFlags::INITIALIZED_B);

        output_set.set_named("pm", self.pm0);
        output_set.set_named("ef", self.e0);
        Ok(())
    }

    fn residual(
        &self,
        inputs: &IoData,
        sd: &StateData<'_>,
        resid: &mut [f64],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        let view = self.core.locate(sd, mode)?;
        let s = self.signals(inputs);
        if let Some(row) = self.core.diff_row(mode, 0) {
            let f = self.rates(&view, &s, mode);
            write_block(resid, row, &[f[0] - view.dx(0), f[1] - view.dx(1)])?;
        }
        if let Some(row) = self.core.alg_row(mode, 0) {
            write_at(resid, row, self.air_gap_power(view.diff[0], &s) - view.alg[0])?;
        }
        Ok(())
    }

    fn derivative(
        &self,
        inputs: &IoData,
        sd: &StateData<'_>,
        deriv: &mut [f64],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        let Some(row) = self.core.diff_row(mode, 0) else {
            return Ok(());
        };
        let view = self.core.locate(sd, mode)?;
        write_block(deriv, row, &self.rates(&view, &self.signals(inputs), mode))
    }

    fn jacobian_elements(
        &self,
        inputs: &IoData,
        sd: &StateData<'_>,
        sink: &mut dyn JacobianSink,
        input_locs: &[Option<usize>],
        mode: SolverMode,
    ) -> ComponentResult<()> {
        let view = self.core.locate(sd, mode)?;
        let s = self.signals(inputs);
        let cj = sd.cj;
        let angle = view.diff[0] - s.theta;
        let (sin, cos) = angle.sin_cos();
        let m = 2.0 * self.h;
        let loc = |i: usize| input_locs.get(i).copied().flatten();

        // Sensitivities of the air-gap power.
        let dp_ddelta = s.e * s.v / self.xdp * cos;
        let dp_dv = s.e / self.xdp * sin;
        let dp_dtheta = -dp_ddelta;
        let dp_de = s.v / self.xdp * sin;

        if let (Some(rd), Some(rw)) = (self.core.diff_row(mode, 0), self.core.diff_row(mode, 1)) {
            sink.assign(rd, rd, -cj);
            sink.assign(rd, rw, self.omega_s());

            sink.assign(rw, rw, -self.d / m - cj);
            if let Some(c) = loc(PM_IN) {
                sink.assign(rw, c, 1.0 / m);
            }
            if let Some(c) = loc(F_IN) {
                sink.assign(rw, c, self.d / m);
            }
            match self.core.alg_row(mode, 0) {
                Some(rp) => sink.assign(rw, rp, -1.0 / m),
                None => {
                    sink.assign(rw, rd, -dp_ddelta / m);
                    for (i, dp) in [(V_IN, dp_dv), (THETA_IN, dp_dtheta), (EF_IN, dp_de)] {
                        if let Some(c) = loc(i) {
                            sink.assign(rw, c, -dp / m);
                        }
                    }
                }
            }
        }

        if let Some(rp) = self.core.alg_row(mode, 0) {
            sink.assign(rp, rp, -1.0);
            if let Some(rd) = self.core.diff_row(mode, 0) {
                sink.assign(rp, rd, dp_ddelta);
            }
            for (i, dp) in [(V_IN, dp_dv), (THETA_IN, dp_dtheta), (EF_IN, dp_de)] {
                if let Some(c) = loc(i) {
                    sink.assign(rp, c, dp);
                }
            }
        }
        Ok(())
    }

    fn jac_size(&self, mode: SolverMode) -> usize {
        match mode {
            SolverMode::Full => 11,
            SolverMode::DifferentialOnly => 9,
            SolverMode::AlgebraicOnly => 4,
        }
    }

    fn set(&mut self, field: &str, value: f64, unit: Unit) -> ComponentResult<()> {
        let Some(base) = Self::base_unit(field) else {
            return self.core.set(field, value);
        };
        let v = to_base(value, unit, base, &self.core.pu_base)?;
        match field {
            "h" => self.h = check_positive(v, field)?,
            "d" => self.d = v,
            "xdp" => self.xdp = check_positive(v, field)?,
            _ => return Err(ComponentError::unrecognized(field)),
        }
        Ok(())
    }

    fn get(&self, field: &str, unit: Unit) -> ComponentResult<f64> {
        let Some(base) = Self::base_unit(field) else {
            return self.core.get(field);
        };
        let v = match field {
            "h" => self.h,
            "d" => self.d,
            "xdp" => self.xdp,
            _ => return Err(ComponentError::unrecognized(field)),
        };
        from_base(v, base, unit, &self.core.pu_base)
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
        sd: &StateData<'_>,
        mode: SolverMode,
    ) -> ComponentResult<f64> {
        Ok(self.core.locate(sd, mode)?.diff[1])
    }

    fn output_loc(&self, mode: SolverMode) -> Option<usize> {
        self.core.diff_row(mode, 1)
    }

    fn local_state_names(&self) -> &'static [&'static str] {
        &["delta", "omega", "pe"]
    }
}
