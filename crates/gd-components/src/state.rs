//! Views of the global state handed to components during evaluation.

/// Candidate solution passed to every evaluation call.
#[derive(Debug, Clone, Copy)]
pub struct StateData<'a> {
    pub time: f64,
    pub state: &'a [f64],
    /// Time derivatives; may be empty when the caller has none (explicit modes).
    pub dstate_dt: &'a [f64],
    /// Coefficient multiplying `∂F/∂x'` in the iteration matrix.
    pub cj: f64,
}

impl<'a> StateData<'a> {
    pub fn new(time: f64, state: &'a [f64], dstate_dt: &'a [f64], cj: f64) -> Self {
        Self {
            time,
            state,
            dstate_dt,
            cj,
        }
    }

    /// State without derivatives, as used by explicit drivers and root polling.
    pub fn states_only(time: f64, state: &'a [f64]) -> Self {
        Self::new(time, state, &[], 0.0)
    }
}

/// Component-held copy of its own states.
///
/// Serves as the source of values whenever the active mode does not carry a partition in
/// the global vector (differential states under an algebraic-only solve, for example).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalState {
    pub diff: Vec<f64>,
    pub ddiff: Vec<f64>,
    pub alg: Vec<f64>,
}

impl LocalState {
    pub fn resize(&mut self, diff: usize, alg: usize) {
        self.diff.resize(diff, 0.0);
        self.ddiff.resize(diff, 0.0);
        self.alg.resize(alg, 0.0);
    }
}

/// Resolved slices for one component: global where available, local otherwise.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    pub diff: &'a [f64],
    pub ddiff: &'a [f64],
    pub alg: &'a [f64],
}

impl StateView<'_> {
    /// Derivative of differential state `i`, zero when none was supplied.
    #[inline]
    pub fn dx(&self, i: usize) -> f64 {
        self.ddiff.get(i).copied().unwrap_or(0.0)
    }
}
