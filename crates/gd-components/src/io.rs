//! Named, ordered signal vectors exchanged between a component and its neighbours.
//!
//! Insertion order is the contract between producer and consumer: evaluation code reads
//! inputs by index, while initialization code builds and inspects them by name.

use std::ops::Index;

/// Ordered list of named real-valued signals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IoData {
    names: Vec<String>,
    values: Vec<f64>,
}

impl IoData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, value)` pairs, preserving their order.
    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        let mut io = Self::new();
        for (name, value) in pairs {
            io.push(name, *value);
        }
        io
    }

    /// Append a signal and return its index.
    pub fn push(&mut self, name: &str, value: f64) -> usize {
        self.names.push(name.to_ascii_lowercase());
        self.values.push(value);
        self.values.len() - 1
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, if present.
    #[inline]
    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Value at `index`, or `default` when the producer supplied fewer signals.
    #[inline]
    pub fn value_or(&self, index: usize, default: f64) -> f64 {
        self.values.get(index).copied().unwrap_or(default)
    }

    /// Overwrite the value at `index`; returns false when out of range.
    pub fn set(&mut self, index: usize, value: f64) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Position of a named signal (case-insensitive).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn get_named(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.values[i])
    }

    /// Update a named signal, appending it when absent.
    pub fn set_named(&mut self, name: &str, value: f64) -> usize {
        match self.index_of(name) {
            Some(i) => {
                self.values[i] = value;
                i
            }
            None => self.push(name, value),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

impl Index<usize> for IoData {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

/// Global state indices of each input, `None` when the input is not a solver unknown.
pub type IoLocs = Vec<Option<usize>>;
