//! Destination for sparse Jacobian contributions.

/// Receives `(row, col, value)` triplets addressed by global indices.
///
/// Duplicate coordinates are summed by the consumer.
pub trait JacobianSink {
    fn assign(&mut self, row: usize, col: usize, value: f64);
}

impl JacobianSink for Vec<(usize, usize, f64)> {
    fn assign(&mut self, row: usize, col: usize, value: f64) {
        self.push((row, col, value));
    }
}

/// Sink that discards values and only counts entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingSink {
    pub count: usize,
}

impl JacobianSink for CountingSink {
    fn assign(&mut self, _row: usize, _col: usize, _value: f64) {
        self.count += 1;
    }
}
